/*!
 * Audit logging for transfer runs
 *
 * Emits one JSON record per track so a failed run can be reconciled
 * against the device afterwards: which tracks arrived, in which order,
 * and where the sequence stopped.
 */

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TransfatError};

/// One per-track audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// ISO 8601 timestamp with timezone
    pub timestamp: String,

    /// Assigned playback position; absent for tracks dropped before
    /// sequencing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<usize>,

    /// Source path
    pub source: String,

    /// Destination-relative path
    pub destination: String,

    /// Track status: copied, failed, pending, skipped
    pub status: String,

    /// Bytes written for this track
    pub bytes: u64,

    /// Whether the payload was a converted artifact
    pub converted: bool,

    /// Failure reason when status is failed or skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditEntry {
    pub fn new(
        sequence: Option<usize>,
        source: &Path,
        destination: &Path,
        status: &str,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            sequence,
            source: source.to_string_lossy().to_string(),
            destination: destination.to_string_lossy().to_string(),
            status: status.to_string(),
            bytes: 0,
            converted: false,
            error: None,
        }
    }

    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = bytes;
        self
    }

    pub fn with_converted(mut self, converted: bool) -> Self {
        self.converted = converted;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// JSON-lines audit writer; a `None` path disables it entirely
pub struct AuditLogger {
    writer: Option<BufWriter<std::fs::File>>,
}

impl AuditLogger {
    pub fn new(path: Option<&Path>) -> Result<Self> {
        let writer = match path {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| {
                        TransfatError::Config(format!(
                            "cannot open audit log {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
                Some(BufWriter::new(file))
            }
            None => None,
        };
        Ok(Self { writer })
    }

    pub fn emit(&mut self, entry: &AuditEntry) -> Result<()> {
        if let Some(ref mut writer) = self.writer {
            let line = serde_json::to_string(entry)
                .map_err(|e| TransfatError::Config(format!("audit serialization: {}", e)))?;
            writeln!(writer, "{}", line)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(ref mut writer) = self.writer {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Read back an audit log (used by tests and post-run tooling)
pub fn read_audit_log(path: &PathBuf) -> Result<Vec<AuditEntry>> {
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(line)
            .map_err(|e| TransfatError::Config(format!("audit parse error: {}", e)))?;
        entries.push(entry);
    }
    Ok(entries)
}
