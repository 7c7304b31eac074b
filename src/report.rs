/*!
 * End-of-run reporting
 */

use crate::cli_style::{self, summary_table};

/// Counts and outcome of one pipeline run, printed as the final summary
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Files seen by the scan
    pub scanned: usize,

    /// Files classified unwanted (plus unreadable ones)
    pub filtered: usize,

    /// Tracks that entered the transfer plan
    pub planned: usize,

    /// Tracks converted to MP3
    pub converted: usize,

    /// Tracks dropped after conversion failures (skip policy)
    pub skipped: usize,

    /// Tracks copied to the destination
    pub transferred: usize,

    /// Tracks whose copy failed
    pub failed: usize,

    pub bytes_copied: u64,

    /// Whether the directory-entry reorder pass completed
    pub reordered: bool,

    pub duration_ms: u64,

    /// The first fatal error, if the run had one
    pub first_error: Option<String>,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.first_error.is_none() && self.failed == 0 && self.skipped == 0
    }

    /// Print the formatted summary
    pub fn print(&self) {
        println!("\n{}", summary_table(self));

        match &self.first_error {
            Some(error) => cli_style::print_error(error),
            None if self.skipped > 0 => {
                cli_style::print_warning(&format!(
                    "{} tracks were skipped; the device is ordered but incomplete",
                    self.skipped
                ));
            }
            None => cli_style::print_success("All done"),
        }
    }
}
