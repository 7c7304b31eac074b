/*!
 * Ordered transfer engine
 *
 * Precondition this engine is built around: on FAT-family volumes the
 * directory-entry order of new files equals their creation order. Copies
 * therefore run strictly one at a time, in ascending sequence order, and
 * each file is fully written, flushed and stamped before the next one is
 * opened. Anything parallel or out-of-order here would silently defeat
 * the whole pipeline.
 */

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use filetime::FileTime;
use indicatif::{ProgressBar, ProgressStyle};
use sysinfo::Disks;
use tracing::{debug, info, warn};

use crate::config::TransferConfig;
use crate::core::checksum::{file_checksum, StreamingHasher};
use crate::core::plan::TrackPlan;
use crate::error::{Result, TransfatError, TransferFailureKind};

/// FAT timestamps have two-second resolution; stamped mtimes sit on this
/// grid so the reorder utility sees the same order the engine created.
const MTIME_STEP_SECS: i64 = 2;

/// Per-plan outcome of the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Pending,
    Copied { bytes: u64 },
    Failed(TransferFailureKind),
}

impl TransferOutcome {
    pub fn is_copied(&self) -> bool {
        matches!(self, TransferOutcome::Copied { .. })
    }
}

/// Aggregate result: outcomes indexed like the plan slice, plus the error
/// that aborted the engine, if any. Prior successes stay visible for
/// manual recovery even when the run fails.
#[derive(Debug)]
pub struct TransferRun {
    pub outcomes: Vec<TransferOutcome>,
    pub bytes_copied: u64,
    pub duration: Duration,
    pub error: Option<TransfatError>,
}

impl TransferRun {
    pub fn all_copied(&self) -> bool {
        self.outcomes.iter().all(TransferOutcome::is_copied)
    }

    pub fn copied_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_copied()).count()
    }
}

/// Copy every plan to the destination, strictly in sequence order.
///
/// The engine aborts on the first failure: past a gap, continuing would
/// put later tracks into earlier directory entries.
pub fn transfer_in_order(
    plans: &[TrackPlan],
    dest_root: &Path,
    config: &TransferConfig,
    cancel: &Arc<AtomicBool>,
) -> TransferRun {
    debug_assert!(
        plans.windows(2).all(|w| w[0].sequence < w[1].sequence),
        "plans must arrive in sequence order"
    );

    let start_time = Instant::now();
    let mut run = TransferRun {
        outcomes: vec![TransferOutcome::Pending; plans.len()],
        bytes_copied: 0,
        duration: Duration::ZERO,
        error: None,
    };

    let payload_sizes: Vec<u64> = plans
        .iter()
        .map(|p| {
            std::fs::metadata(&p.payload)
                .map(|m| m.len())
                .unwrap_or(p.source.size)
        })
        .collect();
    let total_bytes: u64 = payload_sizes.iter().sum();

    if let Err(e) = check_destination_space(dest_root, total_bytes) {
        run.error = Some(e);
        run.duration = start_time.elapsed();
        return run;
    }

    let progress = if config.show_progress {
        let pb = ProgressBar::new(total_bytes);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} copying [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    // Stamp mtimes on an ascending grid ending near now, so order is
    // encoded even for files copied within the same two-second window
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let mtime_base = now - MTIME_STEP_SECS * plans.len() as i64;

    for (index, plan) in plans.iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            run.error = Some(TransfatError::Interrupted);
            break;
        }

        let dest_path = dest_root.join(&plan.target_rel);
        if let Some(ref pb) = progress {
            pb.set_message(
                plan.target_rel
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
            );
        }

        let mtime = FileTime::from_unix_time(mtime_base + MTIME_STEP_SECS * index as i64, 0);
        match copy_one(&plan.payload, &dest_path, mtime, config, progress.as_ref()) {
            Ok(bytes) => {
                debug!(
                    seq = plan.sequence,
                    track = %plan.target_rel.display(),
                    bytes,
                    "copied"
                );
                run.bytes_copied += bytes;
                run.outcomes[index] = TransferOutcome::Copied { bytes };
            }
            Err(e) => {
                let kind = classify_failure(&e, dest_root);
                // A partial destination file is useless and, on a full
                // disk, actively in the way
                if !matches!(kind, TransferFailureKind::DeviceRemoved) {
                    let _ = std::fs::remove_file(&dest_path);
                }
                warn!(
                    track = %plan.target_rel.display(),
                    "transfer aborted: {}",
                    kind
                );
                run.outcomes[index] = TransferOutcome::Failed(kind.clone());
                run.error = Some(TransfatError::Transfer {
                    track: plan.target_rel.clone(),
                    kind,
                });
                break;
            }
        }
    }

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    run.duration = start_time.elapsed();
    info!(
        copied = run.copied_count(),
        planned = plans.len(),
        bytes = run.bytes_copied,
        "transfer finished"
    );
    run
}

/// Copy a single payload, verify it, and stamp its mtime.
///
/// The destination handle is scoped to this function: it is flushed and
/// synced before the function returns on the success path, and dropped
/// (closed) on every error path.
fn copy_one(
    payload: &Path,
    dest_path: &Path,
    mtime: FileTime,
    config: &TransferConfig,
    progress: Option<&ProgressBar>,
) -> std::io::Result<u64> {
    if let Some(parent) = dest_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let source_size = std::fs::metadata(payload)?.len();
    let mut reader = BufReader::new(File::open(payload)?);
    let dest_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dest_path)?;
    let mut writer = BufWriter::new(dest_file);

    let mut hasher = config.verify_checksum.then(StreamingHasher::new);
    let mut buffer = vec![0u8; config.chunk_size];
    let mut bytes_copied = 0u64;

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        if let Some(ref mut h) = hasher {
            h.update(&buffer[..n]);
        }
        writer.write_all(&buffer[..n])?;
        bytes_copied += n as u64;
        if let Some(pb) = progress {
            pb.inc(n as u64);
        }
    }

    writer.flush()?;
    let dest_file = writer.into_inner().map_err(|e| e.into_error())?;
    dest_file.sync_all()?;
    drop(dest_file);

    if bytes_copied != source_size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!(
                "short copy: {} of {} bytes",
                bytes_copied, source_size
            ),
        ));
    }

    if let Some(h) = hasher {
        let expected = h.finalize_hex();
        let actual = file_checksum(dest_path).map_err(|e| match e {
            TransfatError::Io(io) => io,
            other => std::io::Error::other(other.to_string()),
        })?;
        if expected != actual {
            return Err(std::io::Error::other(format!(
                "checksum mismatch: expected {}, got {}",
                expected, actual
            )));
        }
    }

    filetime::set_file_mtime(dest_path, mtime)?;

    Ok(bytes_copied)
}

/// Distinguish the failure kinds the user can act on differently
fn classify_failure(error: &std::io::Error, dest_root: &Path) -> TransferFailureKind {
    if error.kind() == std::io::ErrorKind::StorageFull || error.raw_os_error() == Some(28) {
        return TransferFailureKind::DiskFull;
    }
    // If the destination root itself is gone, the device was yanked
    if !dest_root.exists() {
        return TransferFailureKind::DeviceRemoved;
    }
    TransferFailureKind::Io(error.to_string())
}

/// Refuse a run that cannot fit, before any bytes move
fn check_destination_space(dest_root: &Path, required: u64) -> Result<()> {
    let disks = Disks::new_with_refreshed_list();
    let owning = disks
        .iter()
        .filter(|d| dest_root.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len());

    match owning {
        Some(disk) if disk.available_space() < required => Err(TransfatError::Precondition(
            format!(
                "insufficient space on {}: {} bytes required, {} available",
                disk.mount_point().display(),
                required,
                disk.available_space()
            ),
        )),
        Some(_) => Ok(()),
        None => {
            warn!("could not determine available space for {}", dest_root.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransferConfig;
    use crate::core::plan::{assign_sequence, build_plans};
    use crate::core::scan::SourceEntry;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn entry(root: &Path, rel: &str, content: &[u8]) -> SourceEntry {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        SourceEntry {
            path,
            rel_path: PathBuf::from(rel),
            extension: "mp3".to_string(),
            size: content.len() as u64,
            unwanted: false,
        }
    }

    fn quiet_config() -> TransferConfig {
        TransferConfig {
            show_progress: false,
            ..Default::default()
        }
    }

    fn no_cancel() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    #[test]
    fn test_copies_everything_in_order() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let config = quiet_config();

        let entries = vec![
            entry(src.path(), "Album/01 a.mp3", b"first"),
            entry(src.path(), "Album/02 b.mp3", b"second"),
        ];
        let mut plans = build_plans(&entries, &config);
        assign_sequence(&mut plans);

        let run = transfer_in_order(&plans, dst.path(), &config, &no_cancel());

        assert!(run.error.is_none());
        assert!(run.all_copied());
        assert_eq!(run.bytes_copied, 11);
        assert_eq!(
            std::fs::read(dst.path().join("Album/01 a.mp3")).unwrap(),
            b"first"
        );
        assert_eq!(
            std::fs::read(dst.path().join("Album/02 b.mp3")).unwrap(),
            b"second"
        );
    }

    #[test]
    fn test_mtimes_follow_sequence() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let config = quiet_config();

        let entries: Vec<_> = (1..=4)
            .map(|i| entry(src.path(), &format!("A/{:02}.mp3", i), b"x"))
            .collect();
        let mut plans = build_plans(&entries, &config);
        assign_sequence(&mut plans);

        let run = transfer_in_order(&plans, dst.path(), &config, &no_cancel());
        assert!(run.all_copied());

        let mtimes: Vec<_> = plans
            .iter()
            .map(|p| {
                let meta = std::fs::metadata(dst.path().join(&p.target_rel)).unwrap();
                FileTime::from_last_modification_time(&meta)
            })
            .collect();
        assert!(
            mtimes.windows(2).all(|w| w[0] < w[1]),
            "mtimes must strictly increase with sequence: {:?}",
            mtimes
        );
    }

    #[test]
    fn test_aborts_on_first_failure_leaving_rest_pending() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let config = quiet_config();

        let entries = vec![
            entry(src.path(), "A/01.mp3", b"one"),
            entry(src.path(), "A/02.mp3", b"two"),
            entry(src.path(), "A/03.mp3", b"three"),
        ];
        let mut plans = build_plans(&entries, &config);
        assign_sequence(&mut plans);
        // Break the middle payload
        std::fs::remove_file(&plans[1].payload).unwrap();

        let run = transfer_in_order(&plans, dst.path(), &config, &no_cancel());

        assert!(matches!(run.error, Some(TransfatError::Transfer { .. })));
        assert!(run.outcomes[0].is_copied());
        assert!(matches!(run.outcomes[1], TransferOutcome::Failed(_)));
        assert_eq!(run.outcomes[2], TransferOutcome::Pending);
        assert_eq!(run.copied_count(), 1);
        assert!(!dst.path().join("A/03.mp3").exists());
    }

    #[test]
    fn test_checksum_verification_passes() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let mut config = quiet_config();
        config.verify_checksum = true;

        let entries = vec![entry(src.path(), "A/01.mp3", b"payload bytes")];
        let mut plans = build_plans(&entries, &config);
        assign_sequence(&mut plans);

        let run = transfer_in_order(&plans, dst.path(), &config, &no_cancel());
        assert!(run.error.is_none(), "{:?}", run.error);
        assert!(run.all_copied());
    }

    #[test]
    fn test_cancellation_before_first_copy() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let config = quiet_config();

        let entries = vec![entry(src.path(), "A/01.mp3", b"one")];
        let mut plans = build_plans(&entries, &config);
        assign_sequence(&mut plans);

        let cancel = Arc::new(AtomicBool::new(true));
        let run = transfer_in_order(&plans, dst.path(), &config, &cancel);

        assert!(matches!(run.error, Some(TransfatError::Interrupted)));
        assert_eq!(run.outcomes[0], TransferOutcome::Pending);
    }

    #[test]
    fn test_classify_disk_full() {
        let err = std::io::Error::from_raw_os_error(28);
        assert_eq!(
            classify_failure(&err, Path::new("/")),
            TransferFailureKind::DiskFull
        );
    }

    #[test]
    fn test_classify_device_removed() {
        let err = std::io::Error::other("write error");
        assert_eq!(
            classify_failure(&err, Path::new("/nonexistent/mount/point")),
            TransferFailureKind::DeviceRemoved
        );
    }

    #[test]
    fn test_classify_plain_io() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(
            classify_failure(&err, Path::new("/")),
            TransferFailureKind::Io(_)
        ));
    }

    #[test]
    fn test_empty_plan_set_is_a_successful_noop() {
        let dst = tempdir().unwrap();
        let config = quiet_config();
        let run = transfer_in_order(&[], dst.path(), &config, &no_cancel());
        assert!(run.error.is_none());
        assert!(run.all_copied());
        assert_eq!(run.bytes_copied, 0);
    }
}
