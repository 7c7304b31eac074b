/*!
 * End-of-run teardown
 *
 * Runs on every exit path, success or failure, and never raises: a
 * missing artifact or an already-gone device is the expected state after
 * some failure modes, not a new problem to report.
 */

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::TransferConfig;
use crate::device::{DeviceHandle, RunLock};
use crate::tool::ToolRunner;

/// What teardown actually did, for the end-of-run report
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub artifacts_removed: usize,
    pub unmounted: bool,
}

/// Delete converted artifacts, release the run lock and unmount the
/// destination if it is still there.
pub fn run_cleanup(
    artifacts: &[PathBuf],
    lock: &mut Option<RunLock>,
    device: &mut Option<DeviceHandle>,
    runner: &dyn ToolRunner,
    config: &TransferConfig,
) -> CleanupReport {
    let mut report = CleanupReport::default();

    for artifact in artifacts {
        match std::fs::remove_file(artifact) {
            Ok(()) => {
                debug!(path = %artifact.display(), "removed artifact");
                report.artifacts_removed += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %artifact.display(), "could not remove artifact: {}", e);
            }
        }
    }

    if let Some(lock) = lock.as_mut() {
        lock.release();
    }

    if let Some(device) = device.as_mut() {
        if config.no_unmount {
            debug!("leaving destination mounted as requested");
        } else if device.is_mounted() {
            let timeout = Duration::from_secs(config.tool_timeout_secs);
            match device.unmount(runner, timeout) {
                Ok(()) => report.unmounted = !device.is_mounted(),
                Err(e) => warn!("unmount during cleanup failed: {}", e),
            }
        } else {
            // Already unmounted for the reorder pass, or the device is
            // gone; nothing to do either way
            report.unmounted = true;
        }
    }

    report
}
