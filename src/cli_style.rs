/*!
 * CLI styling utilities
 *
 * Themed text and the end-of-run summary table.
 */

use comfy_table::{presets, Attribute, Cell, ContentArrangement, Table};
use console::{style, StyledObject};

use crate::report::RunReport;

/// Theme colors for consistent styling
pub struct Theme;

impl Theme {
    pub fn primary<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).cyan()
    }

    pub fn success<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).green()
    }

    pub fn warning<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).yellow()
    }

    pub fn error<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).red()
    }

    pub fn muted<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).dim()
    }
}

/// Unicode icons for visual feedback
pub struct Icons;

impl Icons {
    pub const SUCCESS: &'static str = "✓";
    pub const ERROR: &'static str = "✗";
    pub const WARNING: &'static str = "⚠";
    pub const NOTE: &'static str = "•";
}

pub fn print_success(message: &str) {
    println!("{} {}", Theme::success(Icons::SUCCESS), message);
}

pub fn print_warning(message: &str) {
    eprintln!("{} {}", Theme::warning(Icons::WARNING), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", Theme::error(Icons::ERROR), message);
}

pub fn print_note(message: &str) {
    println!("{} {}", Theme::muted(Icons::NOTE), message);
}

/// Render the end-of-run summary as a table
pub fn summary_table(report: &RunReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_BORDERS_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Stage").add_attribute(Attribute::Bold),
        Cell::new("Result").add_attribute(Attribute::Bold),
    ]);

    table.add_row(vec![
        Cell::new("Scanned"),
        Cell::new(format!("{} files", report.scanned)),
    ]);
    table.add_row(vec![
        Cell::new("Filtered out"),
        Cell::new(format!("{} files", report.filtered)),
    ]);
    table.add_row(vec![
        Cell::new("Converted"),
        Cell::new(format!("{} tracks", report.converted)),
    ]);
    if report.skipped > 0 {
        table.add_row(vec![
            Cell::new("Skipped"),
            Cell::new(format!("{} tracks (conversion failures)", report.skipped)),
        ]);
    }
    table.add_row(vec![
        Cell::new("Transferred"),
        Cell::new(format!(
            "{} of {} tracks ({})",
            report.transferred,
            report.planned,
            format_bytes(report.bytes_copied)
        )),
    ]);
    if report.failed > 0 {
        table.add_row(vec![
            Cell::new("Failed"),
            Cell::new(format!("{} tracks", report.failed)),
        ]);
    }
    table.add_row(vec![
        Cell::new("Reordered"),
        Cell::new(if report.reordered { "yes" } else { "no" }),
    ]);
    table.add_row(vec![
        Cell::new("Duration"),
        Cell::new(format_duration(report.duration_ms)),
    ]);

    table
}

/// Format bytes into human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let base = 1024.0_f64;
    let exp = (bytes_f.ln() / base.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);

    let value = bytes_f / base.powi(exp as i32);

    if exp == 0 {
        format!("{} {}", bytes, UNITS[exp])
    } else {
        format!("{:.2} {}", value, UNITS[exp])
    }
}

/// Format a millisecond duration into human-readable form
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        return format!("{}ms", ms);
    }

    let seconds = ms / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes % 60, seconds % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(500), "500ms");
        assert_eq!(format_duration(1000), "1s");
        assert_eq!(format_duration(61000), "1m 1s");
        assert_eq!(format_duration(3661000), "1h 1m 1s");
    }

    #[test]
    fn test_summary_table_renders() {
        let report = RunReport {
            scanned: 5,
            filtered: 2,
            planned: 3,
            converted: 1,
            skipped: 0,
            transferred: 3,
            failed: 0,
            bytes_copied: 2048,
            reordered: true,
            duration_ms: 1500,
            first_error: None,
        };
        let rendered = summary_table(&report).to_string();
        assert!(rendered.contains("Transferred"));
        assert!(rendered.contains("3 of 3 tracks"));
        assert!(rendered.contains("2.00 KB"));
    }
}
