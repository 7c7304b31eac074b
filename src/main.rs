/*!
 * transfat CLI - Command Line Interface
 */

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use transfat::{
    cli_style,
    config::{EncodeErrorPolicy, LogLevel, OrderPolicy, TransferConfig},
    error::{Result, EXIT_SUCCESS},
    logging, PipelineRun, SystemRunner,
};

#[derive(Parser)]
#[command(name = "transfat")]
#[command(
    version,
    about = "Transfer audio to FAT car-stereo media in playback order",
    long_about = None
)]
struct Cli {
    /// Source music directory
    #[arg(value_name = "SOURCE")]
    source: PathBuf,

    /// Destination directory on the mounted FAT volume
    #[arg(value_name = "DEST")]
    destination: PathBuf,

    /// TOML configuration file (flags override file values)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Extension to filter out (repeatable; replaces the default set)
    #[arg(long = "exclude-ext", value_name = "EXT")]
    exclude_ext: Vec<String>,

    /// Extension treated as audio (repeatable; replaces the default set)
    #[arg(long = "audio-ext", value_name = "EXT")]
    audio_ext: Vec<String>,

    /// Format the device plays natively (repeatable; default: mp3)
    #[arg(long = "native-ext", value_name = "EXT")]
    native_ext: Vec<String>,

    /// Ordering heuristic preference
    #[arg(long, value_enum)]
    order: Option<OrderArg>,

    /// Conversion worker pool size (0 = number of CPUs)
    #[arg(long)]
    workers: Option<usize>,

    /// Policy when a single conversion fails
    #[arg(long = "on-encode-error", value_enum)]
    on_encode_error: Option<EncodePolicyArg>,

    /// Target MP3 bitrate in kbps for converted tracks
    #[arg(long, value_name = "KBPS")]
    bitrate: Option<u32>,

    /// Encoder program (default: ffmpeg)
    #[arg(long, value_name = "PROGRAM")]
    encoder: Option<String>,

    /// Directory-entry reordering utility (default: fatsort)
    #[arg(long = "reorder-tool", value_name = "PROGRAM")]
    reorder_tool: Option<String>,

    /// Timeout for a single external tool invocation, in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Verify each copy with a SHA-256 checksum
    #[arg(long)]
    verify: bool,

    /// Show the plan without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Skip the directory-entry reorder pass
    #[arg(long)]
    no_reorder: bool,

    /// Leave the destination mounted at the end of the run
    #[arg(long)]
    no_unmount: bool,

    /// Delete source files after a fully successful run
    #[arg(long)]
    delete_sources: bool,

    /// Never prompt; prompts resolve to their default answer
    #[arg(long)]
    non_interactive: bool,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,

    /// Write JSON-lines per-track audit records to FILE
    #[arg(long = "audit-log", value_name = "FILE")]
    audit_log: Option<PathBuf>,

    /// Log to FILE instead of stderr
    #[arg(long, value_name = "FILE")]
    log: Option<PathBuf>,

    /// Log level
    #[arg(long = "log-level", value_enum, default_value = "info")]
    log_level: LogLevelArg,

    /// Verbose logging (shorthand for --log-level debug)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OrderArg {
    /// Use embedded track numbers, falling back to path order
    Metadata,
    /// Path order only
    Path,
}

impl From<OrderArg> for OrderPolicy {
    fn from(arg: OrderArg) -> Self {
        match arg {
            OrderArg::Metadata => OrderPolicy::Metadata,
            OrderArg::Path => OrderPolicy::Path,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EncodePolicyArg {
    /// Drop the track and continue
    Skip,
    /// Fail the run
    Abort,
}

impl From<EncodePolicyArg> for EncodeErrorPolicy {
    fn from(arg: EncodePolicyArg) -> Self {
        match arg {
            EncodePolicyArg::Skip => EncodeErrorPolicy::Skip,
            EncodePolicyArg::Abort => EncodeErrorPolicy::Abort,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            if e.is_data_intact() {
                cli_style::print_warning(&e.to_string());
            } else {
                cli_style::print_error(&e.to_string());
            }
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => TransferConfig::from_file(path)?,
        None => TransferConfig::default(),
    };
    apply_cli_overrides(&mut config, &cli);

    if let Err(e) = logging::init_logging(&config) {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            cancel.store(true, Ordering::SeqCst);
        }) {
            tracing::warn!("could not install interrupt handler: {}", e);
        }
    }

    let runner = SystemRunner::new(cancel.clone());
    let outcome =
        PipelineRun::new(&cli.source, &cli.destination, &config, &runner, cancel).execute();

    outcome.report.print();
    outcome.result
}

fn apply_cli_overrides(config: &mut TransferConfig, cli: &Cli) {
    if !cli.exclude_ext.is_empty() {
        config.excluded_extensions = normalize_extensions(&cli.exclude_ext);
    }
    if !cli.audio_ext.is_empty() {
        config.audio_extensions = normalize_extensions(&cli.audio_ext);
    }
    if !cli.native_ext.is_empty() {
        config.native_extensions = normalize_extensions(&cli.native_ext);
    }
    if let Some(order) = cli.order {
        config.order_policy = order.into();
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(policy) = cli.on_encode_error {
        config.encode_error_policy = policy.into();
    }
    if let Some(bitrate) = cli.bitrate {
        config.bitrate_kbps = bitrate;
    }
    if let Some(ref encoder) = cli.encoder {
        config.encoder_program = encoder.clone();
    }
    if let Some(ref reorder_tool) = cli.reorder_tool {
        config.reorder_program = reorder_tool.clone();
    }
    if let Some(timeout) = cli.timeout {
        config.tool_timeout_secs = timeout;
    }
    if cli.verify {
        config.verify_checksum = true;
    }
    if cli.dry_run {
        config.dry_run = true;
    }
    if cli.no_reorder {
        config.no_reorder = true;
    }
    if cli.no_unmount {
        config.no_unmount = true;
    }
    if cli.delete_sources {
        config.delete_sources = true;
    }
    if cli.non_interactive {
        config.non_interactive = true;
    }
    if cli.no_progress {
        config.show_progress = false;
    }
    if cli.audit_log.is_some() {
        config.audit_log_path = cli.audit_log.clone();
    }
    if cli.log.is_some() {
        config.log_file = cli.log.clone();
    }
    config.log_level = cli.log_level.into();
    if cli.verbose {
        config.verbose = true;
    }
}

/// Accept extensions with or without a leading dot, in any case
fn normalize_extensions(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "transfat",
            "/music",
            "/mnt/usb",
            "--exclude-ext",
            ".LOG",
            "--native-ext",
            "mp3",
            "--native-ext",
            "wma",
            "--order",
            "path",
            "--workers",
            "2",
            "--on-encode-error",
            "abort",
            "--bitrate",
            "320",
            "--verify",
            "--no-reorder",
            "--no-progress",
        ]);

        let mut config = TransferConfig::default();
        apply_cli_overrides(&mut config, &cli);

        assert_eq!(config.excluded_extensions, vec!["log"]);
        assert_eq!(config.native_extensions, vec!["mp3", "wma"]);
        assert_eq!(config.order_policy, OrderPolicy::Path);
        assert_eq!(config.workers, 2);
        assert_eq!(config.encode_error_policy, EncodeErrorPolicy::Abort);
        assert_eq!(config.bitrate_kbps, 320);
        assert!(config.verify_checksum);
        assert!(config.no_reorder);
        assert!(!config.show_progress);
    }

    #[test]
    fn test_defaults_survive_without_flags() {
        let cli = Cli::parse_from(["transfat", "/music", "/mnt/usb"]);
        let mut config = TransferConfig::default();
        apply_cli_overrides(&mut config, &cli);

        assert_eq!(config.order_policy, OrderPolicy::Metadata);
        assert_eq!(config.encode_error_policy, EncodeErrorPolicy::Skip);
        assert!(!config.excluded_extensions.is_empty());
        assert!(config.show_progress);
    }

    #[test]
    fn test_normalize_extensions() {
        let raw = vec![".FLAC".to_string(), "Ogg".to_string(), "mp3".to_string()];
        assert_eq!(normalize_extensions(&raw), vec!["flac", "ogg", "mp3"]);
    }
}
