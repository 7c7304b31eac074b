/*!
 * Directory-entry reordering
 *
 * The external utility rewrites the FAT directory entries of the
 * destination volume so they match the modification-time order the
 * transfer engine just established. It never runs against a partial
 * transfer: a gap in the copied set means the on-disk order no longer
 * corresponds to any intended sequence.
 */

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::TransferConfig;
use crate::core::transfer::TransferOutcome;
use crate::error::{Result, TransfatError};
use crate::tool::{ToolInvocation, ToolRunner};

/// Probe whether the reordering utility can be invoked at all.
///
/// Runs before the pipeline does any work, so a missing utility is
/// reported up front instead of after minutes of copying.
pub fn reorder_available(runner: &dyn ToolRunner, config: &TransferConfig) -> bool {
    let probe = ToolInvocation::new(&config.reorder_program)
        .arg("-v")
        .timeout(Duration::from_secs(10));
    match runner.run(&probe) {
        Ok(output) => {
            debug!(
                program = %config.reorder_program,
                status = ?output.status,
                "reorder utility probe"
            );
            // Some versions exit non-zero for -v; launching at all is
            // what matters
            true
        }
        Err(e) => {
            debug!("reorder utility probe failed: {}", e);
            false
        }
    }
}

/// Reorder the volume's directory entries to modification-time order.
///
/// Refuses with a precondition error unless every outcome is `Copied`.
pub fn reorder_volume(
    device: &Path,
    outcomes: &[TransferOutcome],
    runner: &dyn ToolRunner,
    config: &TransferConfig,
) -> Result<()> {
    let pending = outcomes.iter().filter(|o| !o.is_copied()).count();
    if pending > 0 {
        return Err(TransfatError::Precondition(format!(
            "{} of {} tracks are not copied; refusing to reorder a partial transfer",
            pending,
            outcomes.len()
        )));
    }

    let invocation = ToolInvocation::new(&config.reorder_program)
        .arg("-t")
        .arg(device)
        .timeout(Duration::from_secs(config.tool_timeout_secs));

    let output = runner
        .run(&invocation)
        .map_err(|e| TransfatError::Reorder(e.to_string()))?;

    if !output.success() {
        return Err(TransfatError::Reorder(format!(
            "{} exited with status {:?}: {}",
            config.reorder_program,
            output.status,
            output.stderr_tail()
        )));
    }

    info!(device = %device.display(), "directory entries reordered");
    Ok(())
}
