/*!
 * transfat - ordered audio transfer to FAT car-stereo media
 *
 * Car stereos that read FAT volumes play files in directory-entry order,
 * which on most FAT implementations is file creation order, not name
 * order. This crate prepares a music tree for such devices:
 * - filters out non-audio clutter (logs, cue sheets, playlists)
 * - converts tracks the device cannot play to MP3 via an external encoder
 * - copies files strictly in the intended playback order
 * - invokes an external utility to rewrite directory entries to match
 * - cleans up temp artifacts and unmounts on every exit path
 */

pub mod audit;
pub mod cli_style;
pub mod config;
pub mod core;
pub mod device;
pub mod error;
pub mod logging;
pub mod report;
pub mod tool;

// Re-export commonly used types
pub use config::{EncodeErrorPolicy, OrderPolicy, TransferConfig};
pub use core::{PipelineOutcome, PipelineRun};
pub use error::{Result, TransfatError, TransferFailureKind};
pub use report::RunReport;
pub use tool::{SystemRunner, ToolInvocation, ToolOutput, ToolRunner};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
