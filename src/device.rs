/*!
 * Destination device resolution and run locking
 *
 * The reorder utility operates on the raw block device, so the destination
 * directory has to be traced back to the device and mount point that own
 * it. Resolution reads the host mount table; nothing here talks to the
 * kernel beyond that.
 */

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, TransfatError};
use crate::tool::{ToolInvocation, ToolRunner};

/// Name of the marker file guarding a destination against concurrent runs
pub const LOCK_FILE_NAME: &str = ".transfat.lock";

const MOUNT_TABLE: &str = "/proc/mounts";

/// Filesystem types the reorder utility understands
const FAT_FAMILY: &[&str] = &["vfat", "msdos", "fat", "exfat"];

/// The block device and mount point owning the destination directory
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    pub device: PathBuf,
    pub mount_point: PathBuf,
    pub fs_type: String,
    mounted: bool,
}

impl DeviceHandle {
    /// Resolve the device containing `dest` from the host mount table.
    ///
    /// Emits a warning when the filesystem is not FAT-family: entry
    /// reordering is only meaningful there, but directory-mode runs are
    /// still valid.
    pub fn resolve(dest: &Path) -> Result<Self> {
        let canonical = dest
            .canonicalize()
            .map_err(|e| TransfatError::Device(format!("{}: {}", dest.display(), e)))?;
        let table = fs::read_to_string(MOUNT_TABLE)
            .map_err(|e| TransfatError::Device(format!("{}: {}", MOUNT_TABLE, e)))?;

        let handle = find_owning_mount(&table, &canonical).ok_or_else(|| {
            TransfatError::Device(format!(
                "no mounted volume contains {}",
                canonical.display()
            ))
        })?;

        if !handle.is_fat_family() {
            warn!(
                fs_type = %handle.fs_type,
                mount = %handle.mount_point.display(),
                "destination is not a FAT-family volume; entry reordering may not apply"
            );
        }

        debug!(
            device = %handle.device.display(),
            mount = %handle.mount_point.display(),
            "resolved destination device"
        );
        Ok(handle)
    }

    pub fn is_fat_family(&self) -> bool {
        FAT_FAMILY.iter().any(|t| *t == self.fs_type)
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Flush pending writes and unmount the volume.
    ///
    /// Idempotent: a second call is a no-op, and a mount point that has
    /// already vanished (device yanked) is treated as unmounted.
    pub fn unmount(&mut self, runner: &dyn ToolRunner, timeout: Duration) -> Result<()> {
        if !self.mounted {
            return Ok(());
        }
        if !self.mount_point.exists() {
            debug!(mount = %self.mount_point.display(), "mount point gone; nothing to unmount");
            self.mounted = false;
            return Ok(());
        }

        let sync = ToolInvocation::new("sync").timeout(timeout);
        if let Err(e) = runner.run(&sync) {
            warn!("sync before unmount failed: {}", e);
        }

        let umount = ToolInvocation::new("umount")
            .arg(&self.device)
            .timeout(timeout);
        let output = runner
            .run(&umount)
            .map_err(|e| TransfatError::Device(e.to_string()))?;
        if !output.success() {
            return Err(TransfatError::Device(format!(
                "umount {} exited with status {:?}: {}",
                self.device.display(),
                output.status,
                output.stderr_tail()
            )));
        }

        self.mounted = false;
        Ok(())
    }
}

/// Pick the mount entry with the longest mount-point prefix of `path`
fn find_owning_mount(table: &str, path: &Path) -> Option<DeviceHandle> {
    let mut best: Option<DeviceHandle> = None;

    for line in table.lines() {
        let mut fields = line.split_whitespace();
        let (Some(device), Some(mount_point), Some(fs_type)) =
            (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };

        let mount_point = PathBuf::from(unescape_mount_field(mount_point));
        if !path.starts_with(&mount_point) {
            continue;
        }

        let better = match &best {
            Some(current) => {
                mount_point.as_os_str().len() > current.mount_point.as_os_str().len()
            }
            None => true,
        };
        if better {
            best = Some(DeviceHandle {
                device: PathBuf::from(unescape_mount_field(device)),
                mount_point,
                fs_type: fs_type.to_string(),
                mounted: true,
            });
        }
    }

    best
}

/// Undo the octal escapes the kernel applies to mount-table fields
/// (space, tab, newline, backslash)
fn unescape_mount_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let digits: String = chars.clone().take(3).collect();
        if digits.len() == 3 {
            if let Ok(code) = u8::from_str_radix(&digits, 8) {
                out.push(code as char);
                chars.nth(2);
                continue;
            }
        }
        out.push(c);
    }

    out
}

/// Marker file giving one run exclusive ownership of a destination
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    held: bool,
}

impl RunLock {
    /// Create the marker, refusing if one is already present
    pub fn acquire(dest_root: &Path) -> Result<Self> {
        let path = dest_root.join(LOCK_FILE_NAME);

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(TransfatError::DestinationLocked(path));
            }
            Err(e) => return Err(TransfatError::Io(e)),
        };

        writeln!(
            file,
            "pid={} started={}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        )?;

        Ok(Self { path, held: true })
    }

    /// Remove the marker; fine to call twice or after the device vanished
    pub fn release(&mut self) {
        if !self.held {
            return;
        }
        self.held = false;
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), "could not remove lock marker: {}", e);
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        self.release();
    }
}
