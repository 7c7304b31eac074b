/*!
 * Pipeline orchestration
 *
 * One run is a strict stage sequence: scan, convert, order, transfer,
 * reorder, cleanup. Teardown is not a stage that can be skipped: it runs
 * after the stages on every path, including early aborts.
 */

pub mod checksum;
pub mod cleanup;
pub mod encode;
pub mod plan;
pub mod reorder;
pub mod scan;
pub mod transfer;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::audit::{AuditEntry, AuditLogger};
use crate::cli_style;
use crate::config::TransferConfig;
use crate::device::{DeviceHandle, RunLock};
use crate::error::{Result, TransfatError};
use crate::report::RunReport;
use crate::tool::ToolRunner;

use plan::TrackPlan;
use transfer::TransferOutcome;

/// Final result of a run: the printable report plus the error that ended
/// it, if any. The report is meaningful even when the run failed.
pub struct PipelineOutcome {
    pub report: RunReport,
    pub result: Result<()>,
}

/// Process-wide state for one invocation
pub struct PipelineRun<'a> {
    config: &'a TransferConfig,
    runner: &'a dyn ToolRunner,
    cancel: Arc<AtomicBool>,
    source_root: PathBuf,
    dest_root: PathBuf,

    device: Option<DeviceHandle>,
    lock: Option<RunLock>,
    /// Run-owned scratch space; dropping it removes any artifact the
    /// explicit cleanup could not
    scratch: Option<TempDir>,
    artifacts: Vec<PathBuf>,
    report: RunReport,
}

impl<'a> PipelineRun<'a> {
    pub fn new(
        source_root: &Path,
        dest_root: &Path,
        config: &'a TransferConfig,
        runner: &'a dyn ToolRunner,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            runner,
            cancel,
            source_root: source_root.to_path_buf(),
            dest_root: dest_root.to_path_buf(),
            device: None,
            lock: None,
            scratch: None,
            artifacts: Vec::new(),
            report: RunReport::default(),
        }
    }

    /// Run the stages, then tear down unconditionally
    pub fn execute(mut self) -> PipelineOutcome {
        let started = Instant::now();

        let result = self.run_stages();

        let cleanup = cleanup::run_cleanup(
            &self.artifacts,
            &mut self.lock,
            &mut self.device,
            self.runner,
            self.config,
        );
        debug!(
            artifacts_removed = cleanup.artifacts_removed,
            unmounted = cleanup.unmounted,
            "teardown complete"
        );
        if let Some(scratch) = self.scratch.take() {
            if let Err(e) = scratch.close() {
                warn!("could not remove scratch directory: {}", e);
            }
        }

        self.report.duration_ms = started.elapsed().as_millis() as u64;
        if let Err(ref e) = result {
            self.report.first_error = Some(e.to_string());
        }

        PipelineOutcome {
            report: self.report,
            result,
        }
    }

    fn run_stages(&mut self) -> Result<()> {
        self.check_cancelled()?;

        let reorder_wanted = !self.config.no_reorder && !self.config.dry_run;
        let device_wanted =
            !self.config.dry_run && !(self.config.no_reorder && self.config.no_unmount);

        // Fail on a missing reorder utility before any bytes move
        if reorder_wanted && !reorder::reorder_available(self.runner, self.config) {
            return Err(TransfatError::Reorder(format!(
                "{} is not available; install it or pass --no-reorder",
                self.config.reorder_program
            )));
        }

        if device_wanted {
            self.device = Some(DeviceHandle::resolve(&self.dest_root)?);
        }

        if !self.config.dry_run {
            std::fs::create_dir_all(&self.dest_root)?;
            self.lock = Some(RunLock::acquire(&self.dest_root)?);
        }

        // Scan and filter
        let summary = scan::scan_source(&self.source_root, self.config)?;
        self.report.scanned = summary.entries.len();
        self.report.filtered = summary.unwanted_count() + summary.unreadable;
        info!(
            scanned = self.report.scanned,
            filtered = self.report.filtered,
            "scan complete"
        );

        let mut plans = plan::build_plans(&summary.entries, self.config);
        self.check_cancelled()?;

        if self.config.dry_run {
            return self.print_plan(plans);
        }

        let mut audit = AuditLogger::new(self.config.audit_log_path.as_deref())?;

        // Convert what the device cannot play
        let scratch = tempfile::Builder::new()
            .prefix("transfat-")
            .tempdir()
            .map_err(TransfatError::Io)?;
        let encoded = encode::convert_pending(
            &mut plans,
            scratch.path(),
            self.runner,
            self.config,
            &self.cancel,
        )?;
        self.artifacts = encoded.artifacts.clone();
        self.scratch = Some(scratch);
        self.report.converted = encoded.converted();
        self.report.skipped = encoded.skipped.len();

        for (track, reason) in &encoded.skipped {
            emit_audit(
                &mut audit,
                AuditEntry::new(None, track, track, "skipped").with_error(reason.clone()),
            );
        }

        // Assign the playback sequence over the surviving tracks
        plan::assign_sequence(&mut plans);
        self.report.planned = plans.len();

        // Ordered copy
        let run = transfer::transfer_in_order(&plans, &self.dest_root, self.config, &self.cancel);
        self.report.transferred = run.copied_count();
        self.report.failed = run
            .outcomes
            .iter()
            .filter(|o| matches!(o, TransferOutcome::Failed(_)))
            .count();
        self.report.bytes_copied = run.bytes_copied;

        for (plan, outcome) in plans.iter().zip(&run.outcomes) {
            let entry = match outcome {
                TransferOutcome::Copied { bytes } => {
                    AuditEntry::new(
                        Some(plan.sequence),
                        &plan.source.path,
                        &plan.target_rel,
                        "copied",
                    )
                    .with_bytes(*bytes)
                    .with_converted(plan.needs_conversion)
                }
                TransferOutcome::Failed(kind) => AuditEntry::new(
                    Some(plan.sequence),
                    &plan.source.path,
                    &plan.target_rel,
                    "failed",
                )
                .with_converted(plan.needs_conversion)
                .with_error(kind.to_string()),
                TransferOutcome::Pending => AuditEntry::new(
                    Some(plan.sequence),
                    &plan.source.path,
                    &plan.target_rel,
                    "pending",
                ),
            };
            emit_audit(&mut audit, entry);
        }
        if let Err(e) = audit.flush() {
            warn!("could not flush audit log: {}", e);
        }

        if let Some(error) = run.error {
            return Err(error);
        }

        // Align directory entries with the sequence we just created
        if reorder_wanted {
            self.check_cancelled()?;
            let device = self
                .device
                .as_mut()
                .expect("device is resolved whenever reordering is enabled");
            let timeout = Duration::from_secs(self.config.tool_timeout_secs);
            device.unmount(self.runner, timeout)?;
            let device_path = device.device.clone();
            reorder::reorder_volume(&device_path, &run.outcomes, self.runner, self.config)?;
            self.report.reordered = true;
        }

        if self.config.delete_sources {
            self.delete_source_files(&plans);
        }

        Ok(())
    }

    /// Dry run: show the full plan without touching anything
    fn print_plan(&mut self, mut plans: Vec<TrackPlan>) -> Result<()> {
        plan::assign_sequence(&mut plans);
        self.report.planned = plans.len();

        for plan in &plans {
            let action = if plan.needs_conversion {
                "convert + copy"
            } else {
                "copy"
            };
            cli_style::print_note(&format!(
                "{:4}  {}  {} -> {}",
                plan.sequence,
                action,
                plan.source.rel_path.display(),
                plan.target_rel.display()
            ));
        }
        let conversions = plans.iter().filter(|p| p.needs_conversion).count();
        cli_style::print_note(&format!(
            "{} tracks planned, {} need conversion; nothing was written",
            plans.len(),
            conversions
        ));
        Ok(())
    }

    /// Remove transferred source files, confirming first when interactive
    fn delete_source_files(&self, plans: &[TrackPlan]) {
        if !confirm_prompt(
            &format!("Delete {} transferred source files?", plans.len()),
            self.config.non_interactive,
        ) {
            info!("keeping source files");
            return;
        }

        for plan in plans {
            if let Err(e) = std::fs::remove_file(&plan.source.path) {
                warn!(path = %plan.source.path.display(), "could not delete source: {}", e);
            }
        }
        // Prune directories the deletions emptied
        for plan in plans {
            let mut dir = plan.source.path.parent();
            while let Some(parent) = dir {
                if parent == self.source_root || std::fs::remove_dir(parent).is_err() {
                    break;
                }
                dir = parent.parent();
            }
        }
        info!(count = plans.len(), "source files removed");
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.load(Ordering::SeqCst) {
            Err(TransfatError::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Prompts default to yes: reaching one means the user asked for the
/// action with an explicit flag
fn confirm_prompt(prompt: &str, non_interactive: bool) -> bool {
    if non_interactive {
        return true;
    }
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(true)
        .interact()
        .unwrap_or(true)
}

fn emit_audit(audit: &mut AuditLogger, entry: AuditEntry) {
    if let Err(e) = audit.emit(&entry) {
        warn!("could not write audit record: {}", e);
    }
}
