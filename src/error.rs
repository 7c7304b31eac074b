/*!
 * Error types for transfat
 */

use std::fmt;
use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, TransfatError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_CONFIG: i32 = 1;
pub const EXIT_SCAN: i32 = 2;
pub const EXIT_CONVERSION: i32 = 3;
pub const EXIT_TRANSFER: i32 = 4;
pub const EXIT_PRECONDITION: i32 = 5;
pub const EXIT_REORDER: i32 = 6;
pub const EXIT_INTERRUPTED: i32 = 130;

/// How a single copy failed, distinguished so the user message and the
/// cleanup path can react appropriately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferFailureKind {
    /// Destination volume ran out of space (user can free space and retry)
    DiskFull,

    /// Destination device disappeared mid-transfer (unmount is pointless)
    DeviceRemoved,

    /// Any other I/O failure
    Io(String),
}

impl fmt::Display for TransferFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferFailureKind::DiskFull => write!(f, "destination disk full"),
            TransferFailureKind::DeviceRemoved => write!(f, "destination device removed"),
            TransferFailureKind::Io(msg) => write!(f, "I/O failure: {}", msg),
        }
    }
}

#[derive(Debug)]
pub enum TransfatError {
    /// Source root unreadable or missing
    Scan { path: PathBuf, source: io::Error },

    /// A track could not be converted (surfaced when policy is abort)
    Conversion { track: PathBuf, reason: String },

    /// A copy failed; the engine aborts to preserve creation order
    Transfer {
        track: PathBuf,
        kind: TransferFailureKind,
    },

    /// Reorder attempted against an incomplete transfer set, or the
    /// destination is owned by another run
    Precondition(String),

    /// The reordering utility failed; destination data is intact
    Reorder(String),

    /// Device or mount-point resolution / unmount failure
    Device(String),

    /// A lock marker from an in-progress run is present
    DestinationLocked(PathBuf),

    /// Configuration error
    Config(String),

    /// Run cancelled by the user
    Interrupted,

    /// I/O error outside any single track
    Io(io::Error),
}

impl TransfatError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            TransfatError::Scan { .. } => EXIT_SCAN,
            TransfatError::Conversion { .. } => EXIT_CONVERSION,
            TransfatError::Transfer { .. } => EXIT_TRANSFER,
            TransfatError::Precondition(_) | TransfatError::DestinationLocked(_) => {
                EXIT_PRECONDITION
            }
            TransfatError::Reorder(_) => EXIT_REORDER,
            TransfatError::Interrupted => EXIT_INTERRUPTED,
            TransfatError::Device(_) | TransfatError::Config(_) | TransfatError::Io(_) => {
                EXIT_CONFIG
            }
        }
    }

    /// Check if this error leaves the destination contents intact.
    ///
    /// A reorder failure means every file arrived, only entry order is
    /// stale, so it is reported as a warning rather than a transfer loss.
    pub fn is_data_intact(&self) -> bool {
        matches!(self, TransfatError::Reorder(_))
    }

    /// Check if this error is fatal for the whole run (as opposed to a
    /// per-track condition that a skip policy may absorb)
    pub fn is_fatal(&self) -> bool {
        match self {
            TransfatError::Scan { .. }
            | TransfatError::Transfer { .. }
            | TransfatError::Precondition(_)
            | TransfatError::DestinationLocked(_)
            | TransfatError::Device(_)
            | TransfatError::Config(_)
            | TransfatError::Interrupted
            | TransfatError::Io(_) => true,
            TransfatError::Conversion { .. } => false,
            TransfatError::Reorder(_) => false,
        }
    }
}

impl fmt::Display for TransfatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransfatError::Scan { path, source } => {
                write!(f, "Cannot scan source {}: {}", path.display(), source)
            }
            TransfatError::Conversion { track, reason } => {
                write!(f, "Conversion failed for {}: {}", track.display(), reason)
            }
            TransfatError::Transfer { track, kind } => {
                write!(f, "Transfer failed for {}: {}", track.display(), kind)
            }
            TransfatError::Precondition(msg) => {
                write!(f, "Precondition not met: {}", msg)
            }
            TransfatError::Reorder(msg) => {
                write!(f, "Reorder failed: {}", msg)
            }
            TransfatError::Device(msg) => {
                write!(f, "Device error: {}", msg)
            }
            TransfatError::DestinationLocked(path) => {
                write!(
                    f,
                    "Destination is locked by another run (marker: {})",
                    path.display()
                )
            }
            TransfatError::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            TransfatError::Interrupted => {
                write!(f, "Interrupted")
            }
            TransfatError::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
        }
    }
}

impl std::error::Error for TransfatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransfatError::Scan { source, .. } => Some(source),
            TransfatError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for TransfatError {
    fn from(err: io::Error) -> Self {
        TransfatError::Io(err)
    }
}
