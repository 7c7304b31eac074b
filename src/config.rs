/*!
 * Configuration types for transfat
 */

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, TransfatError};

/// Main configuration for a transfer run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Extensions filtered out before planning (lowercase, no dot)
    #[serde(default = "default_excluded_extensions")]
    pub excluded_extensions: Vec<String>,

    /// Extensions treated as audio tracks (lowercase, no dot)
    #[serde(default = "default_audio_extensions")]
    pub audio_extensions: Vec<String>,

    /// Formats the destination device plays natively; everything else
    /// is converted to MP3
    #[serde(default = "default_native_extensions")]
    pub native_extensions: Vec<String>,

    /// Ordering heuristic preference
    #[serde(default)]
    pub order_policy: OrderPolicy,

    /// Conversion worker pool size (0 = number of CPUs)
    #[serde(default)]
    pub workers: usize,

    /// What to do when a single conversion fails
    #[serde(default)]
    pub encode_error_policy: EncodeErrorPolicy,

    /// Target MP3 bitrate in kbps for converted tracks
    #[serde(default = "default_bitrate")]
    pub bitrate_kbps: u32,

    /// Encoder program invoked for format conversion
    #[serde(default = "default_encoder_program")]
    pub encoder_program: String,

    /// Directory-entry reordering utility
    #[serde(default = "default_reorder_program")]
    pub reorder_program: String,

    /// Timeout for a single external tool invocation, in seconds
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Verify each copy with a SHA-256 checksum (byte counts are always
    /// verified)
    #[serde(default)]
    pub verify_checksum: bool,

    /// Chunk size in bytes for buffered copying
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Plan only; no writes, no tool invocations
    #[serde(default)]
    pub dry_run: bool,

    /// Skip the directory-entry reorder pass
    #[serde(default)]
    pub no_reorder: bool,

    /// Leave the destination mounted at the end of the run
    #[serde(default)]
    pub no_unmount: bool,

    /// Delete source files after a fully successful run
    #[serde(default)]
    pub delete_sources: bool,

    /// Never prompt; every prompt resolves to its default answer
    #[serde(default)]
    pub non_interactive: bool,

    /// Show progress bars
    #[serde(default = "default_true")]
    pub show_progress: bool,

    /// JSON-lines audit log path (None = disabled)
    #[serde(default)]
    pub audit_log_path: Option<PathBuf>,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            excluded_extensions: default_excluded_extensions(),
            audio_extensions: default_audio_extensions(),
            native_extensions: default_native_extensions(),
            order_policy: OrderPolicy::default(),
            workers: 0,
            encode_error_policy: EncodeErrorPolicy::default(),
            bitrate_kbps: default_bitrate(),
            encoder_program: default_encoder_program(),
            reorder_program: default_reorder_program(),
            tool_timeout_secs: default_tool_timeout(),
            verify_checksum: false,
            chunk_size: default_chunk_size(),
            dry_run: false,
            no_reorder: false,
            no_unmount: false,
            delete_sources: false,
            non_interactive: false,
            show_progress: true,
            audit_log_path: None,
            log_level: LogLevel::Info,
            log_file: None,
            verbose: false,
        }
    }
}

/// Ordering heuristic preference for sequence assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderPolicy {
    /// Album directory chain, then embedded track number, then depth,
    /// then lexicographic path
    #[default]
    Metadata,

    /// Ignore embedded metadata; order by path alone
    Path,
}

/// What to do when the encoder fails on a single track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncodeErrorPolicy {
    /// Drop the offending track, report it, continue the pipeline
    #[default]
    Skip,

    /// Fail the entire run
    Abort,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_excluded_extensions() -> Vec<String> {
    ["log", "cue", "m3u", "m3u8", "pls", "nfo", "txt", "db", "ini"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_audio_extensions() -> Vec<String> {
    [
        "mp3", "wma", "flac", "ogg", "oga", "m4a", "aac", "wav", "opus", "wv", "ape",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_native_extensions() -> Vec<String> {
    vec!["mp3".to_string()]
}

fn default_bitrate() -> u32 {
    192
}

fn default_encoder_program() -> String {
    "ffmpeg".to_string()
}

fn default_reorder_program() -> String {
    "fatsort".to_string()
}

fn default_tool_timeout() -> u64 {
    600
}

fn default_chunk_size() -> usize {
    1024 * 1024 // 1 MB
}

impl TransferConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| TransfatError::Config(format!("{}: {}", path.display(), e)))?;
        let config: TransferConfig = toml::from_str(&contents)
            .map_err(|e| TransfatError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &PathBuf) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| TransfatError::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Effective worker pool size
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            get_cpu_count()
        }
    }

    /// Check whether an extension (lowercase, no dot) is destination-native
    pub fn is_native(&self, extension: &str) -> bool {
        self.native_extensions.iter().any(|e| e == extension)
    }
}

/// Get the number of available CPU cores
fn get_cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TransferConfig::default();
        assert_eq!(config.order_policy, OrderPolicy::Metadata);
        assert_eq!(config.encode_error_policy, EncodeErrorPolicy::Skip);
        assert_eq!(config.bitrate_kbps, 192);
        assert_eq!(config.encoder_program, "ffmpeg");
        assert_eq!(config.reorder_program, "fatsort");
        assert!(!config.verify_checksum);
        assert!(!config.dry_run);
        assert!(config.show_progress);
    }

    #[test]
    fn test_native_lookup() {
        let config = TransferConfig::default();
        assert!(config.is_native("mp3"));
        assert!(!config.is_native("flac"));
        assert!(!config.is_native("wma"));

        let mut config = TransferConfig::default();
        config.native_extensions.push("wma".to_string());
        assert!(config.is_native("wma"));
    }

    #[test]
    fn test_effective_workers() {
        let mut config = TransferConfig::default();
        config.workers = 3;
        assert_eq!(config.effective_workers(), 3);

        config.workers = 0;
        assert!(config.effective_workers() > 0);
    }

    #[test]
    fn test_serialization_round_trip() {
        let config = TransferConfig::default();
        let toml = toml::to_string(&config).unwrap();
        let deserialized: TransferConfig = toml::from_str(&toml).unwrap();
        assert_eq!(
            config.excluded_extensions,
            deserialized.excluded_extensions
        );
        assert_eq!(config.order_policy, deserialized.order_policy);
    }

    #[test]
    fn test_config_file_example() {
        let toml_str = r#"
excluded_extensions = ["log", "cue"]
native_extensions = ["mp3", "wma"]
order_policy = "path"
workers = 2
encode_error_policy = "abort"
bitrate_kbps = 320
verify_checksum = true
no_reorder = true
"#;
        let config: TransferConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.excluded_extensions, vec!["log", "cue"]);
        assert!(config.is_native("wma"));
        assert_eq!(config.order_policy, OrderPolicy::Path);
        assert_eq!(config.workers, 2);
        assert_eq!(config.encode_error_policy, EncodeErrorPolicy::Abort);
        assert_eq!(config.bitrate_kbps, 320);
        assert!(config.verify_checksum);
        assert!(config.no_reorder);
        // Unset keys fall back to defaults
        assert_eq!(config.reorder_program, "fatsort");
        assert_eq!(config.tool_timeout_secs, 600);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = TransferConfig::from_file(&PathBuf::from("/nonexistent/transfat.toml"))
            .unwrap_err();
        assert!(matches!(err, TransfatError::Config(_)));
    }
}
