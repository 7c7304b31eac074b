/*!
 * Source tree scanning and classification
 */

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::TransferConfig;
use crate::error::{Result, TransfatError};

/// One file discovered under the source root. Immutable after the scan.
#[derive(Debug, Clone)]
pub struct SourceEntry {
    /// Absolute path of the file
    pub path: PathBuf,

    /// Path relative to the source root (album/disc/track hierarchy)
    pub rel_path: PathBuf,

    /// Lowercased extension without the dot; empty when absent
    pub extension: String,

    /// File size in bytes
    pub size: u64,

    /// True for excluded extensions, non-audio files and hidden entries
    pub unwanted: bool,
}

/// Scan result: classified entries in deterministic traversal order
#[derive(Debug, Default)]
pub struct ScanSummary {
    pub entries: Vec<SourceEntry>,

    /// Files dropped because they could not be read during the scan
    pub unreadable: usize,
}

impl ScanSummary {
    /// Entries surviving the filter, in scan order
    pub fn wanted(&self) -> impl Iterator<Item = &SourceEntry> {
        self.entries.iter().filter(|e| !e.unwanted)
    }

    pub fn unwanted_count(&self) -> usize {
        self.entries.iter().filter(|e| e.unwanted).count()
    }
}

/// Recursively scan `root`, classifying every file against the configured
/// extension sets.
///
/// Traversal is sorted by file name so repeated runs over an unchanged
/// tree see identical order. Unreadable individual files are logged and
/// excluded; an unreadable root is an error.
pub fn scan_source(root: &Path, config: &TransferConfig) -> Result<ScanSummary> {
    let root_meta = std::fs::metadata(root).map_err(|e| TransfatError::Scan {
        path: root.to_path_buf(),
        source: e,
    })?;
    if !root_meta.is_dir() {
        return Err(TransfatError::Scan {
            path: root.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotADirectory, "source is not a directory"),
        });
    }

    let mut summary = ScanSummary::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                // Root-level failure means the whole scan is invalid
                if e.depth() == 0 {
                    return Err(TransfatError::Scan {
                        path: root.to_path_buf(),
                        source: e.into(),
                    });
                }
                warn!("skipping unreadable entry: {}", e);
                summary.unreadable += 1;
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(path = %entry.path().display(), "skipping file without metadata: {}", e);
                summary.unreadable += 1;
                continue;
            }
        };

        let path = entry.path().to_path_buf();
        let rel_path = path
            .strip_prefix(root)
            .expect("walked entry is always under the root")
            .to_path_buf();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let unwanted = classify_unwanted(&rel_path, &extension, config);

        if unwanted {
            debug!(path = %rel_path.display(), "filtered out");
        }

        summary.entries.push(SourceEntry {
            path,
            rel_path,
            extension,
            size,
            unwanted,
        });
    }

    Ok(summary)
}

/// Classification rule: hidden entries, excluded extensions, and anything
/// not in the audio set are unwanted.
fn classify_unwanted(rel_path: &Path, extension: &str, config: &TransferConfig) -> bool {
    if is_hidden(rel_path) {
        return true;
    }
    if config.excluded_extensions.iter().any(|e| e == extension) {
        return true;
    }
    !config.audio_extensions.iter().any(|e| e == extension)
}

/// A file is hidden if any component of its relative path starts with '.'
fn is_hidden(rel_path: &Path) -> bool {
    rel_path
        .components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_classification() {
        let config = TransferConfig::default();
        assert!(!classify_unwanted(Path::new("Album/01.mp3"), "mp3", &config));
        assert!(!classify_unwanted(Path::new("Album/01.flac"), "flac", &config));
        assert!(classify_unwanted(Path::new("Album/notes.log"), "log", &config));
        assert!(classify_unwanted(Path::new("Album/album.cue"), "cue", &config));
        assert!(classify_unwanted(Path::new("Album/cover.jpg"), "jpg", &config));
        assert!(classify_unwanted(Path::new("Album/.hidden.mp3"), "mp3", &config));
        assert!(classify_unwanted(Path::new(".sync/a.mp3"), "mp3", &config));
        assert!(classify_unwanted(Path::new("README"), "", &config));
    }

    #[test]
    fn test_scan_classifies_and_orders() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("Album/02 Song.flac"));
        touch(&root.join("Album/01 Song.mp3"));
        touch(&root.join("Album/notes.log"));

        let config = TransferConfig::default();
        let summary = scan_source(root, &config).unwrap();

        assert_eq!(summary.entries.len(), 3);
        assert_eq!(summary.wanted().count(), 2);
        assert_eq!(summary.unwanted_count(), 1);

        // Name-sorted traversal: 01 before 02
        let wanted: Vec<_> = summary.wanted().map(|e| e.rel_path.clone()).collect();
        assert_eq!(wanted[0], PathBuf::from("Album/01 Song.mp3"));
        assert_eq!(wanted[1], PathBuf::from("Album/02 Song.flac"));
    }

    #[test]
    fn test_scan_is_deterministic() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        for name in ["b/2.mp3", "a/1.mp3", "c/3.flac", "a/9.ogg"] {
            touch(&root.join(name));
        }

        let config = TransferConfig::default();
        let first: Vec<_> = scan_source(root, &config)
            .unwrap()
            .entries
            .into_iter()
            .map(|e| e.rel_path)
            .collect();
        let second: Vec<_> = scan_source(root, &config)
            .unwrap()
            .entries
            .into_iter()
            .map(|e| e.rel_path)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_root_is_scan_error() {
        let config = TransferConfig::default();
        let err = scan_source(Path::new("/nonexistent/music"), &config).unwrap_err();
        assert!(matches!(err, TransfatError::Scan { .. }));
    }

    #[test]
    fn test_file_root_is_scan_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("single.mp3");
        touch(&file);

        let config = TransferConfig::default();
        let err = scan_source(&file, &config).unwrap_err();
        assert!(matches!(err, TransfatError::Scan { .. }));
    }

    #[test]
    fn test_extension_sets_are_configurable() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("show.opus"));
        touch(&root.join("show.mp3"));

        let mut config = TransferConfig::default();
        config.audio_extensions = vec!["opus".to_string()];
        let summary = scan_source(root, &config).unwrap();

        let wanted: Vec<_> = summary.wanted().map(|e| e.extension.clone()).collect();
        assert_eq!(wanted, vec!["opus"]);
    }
}
