/*!
 * Playback-order planning
 *
 * Sequence assignment is the one place an error is invisible until the
 * stereo plays tracks in the wrong order, so the comparator is kept in a
 * single function with the policy as data.
 */

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use id3::TagLike;
use tracing::debug;

use crate::config::{OrderPolicy, TransferConfig};
use crate::core::scan::SourceEntry;

/// One wanted file's destination path, conversion need and intended
/// playback position.
#[derive(Debug, Clone)]
pub struct TrackPlan {
    pub source: SourceEntry,

    /// Destination path relative to the destination root; the extension
    /// is rewritten to mp3 when conversion is required
    pub target_rel: PathBuf,

    pub needs_conversion: bool,

    /// Track number from embedded metadata or the filename, when the
    /// ordering policy uses it
    pub track_number: Option<u32>,

    /// The file actually copied: the original source, or the converted
    /// artifact once the encoder has produced one
    pub payload: PathBuf,

    /// Zero-based intended playback position; dense [0, N) after
    /// assignment
    pub sequence: usize,
}

/// Build unordered plans for every wanted entry.
///
/// The conversion decision is made here; the sequence is assigned by
/// [`assign_sequence`] once conversion outcomes are known, so skipped
/// tracks never leave holes in the index space.
pub fn build_plans(entries: &[SourceEntry], config: &TransferConfig) -> Vec<TrackPlan> {
    entries
        .iter()
        .filter(|e| !e.unwanted)
        .map(|entry| {
            let needs_conversion = !config.is_native(&entry.extension);
            let target_rel = if needs_conversion {
                entry.rel_path.with_extension("mp3")
            } else {
                entry.rel_path.clone()
            };
            let track_number = match config.order_policy {
                OrderPolicy::Metadata => read_track_number(entry),
                OrderPolicy::Path => None,
            };

            TrackPlan {
                source: entry.clone(),
                target_rel,
                needs_conversion,
                track_number,
                payload: entry.path.clone(),
                sequence: 0,
            }
        })
        .collect()
}

/// Sort the plans into playback order and assign dense sequence indices.
///
/// The resulting assignment is a permutation of [0, N): the comparator
/// ends on the relative path, which is unique per plan, so the order is
/// total and repeated runs over an unchanged source are identical.
pub fn assign_sequence(plans: &mut [TrackPlan]) {
    plans.sort_by(compare_plans);
    for (index, plan) in plans.iter_mut().enumerate() {
        plan.sequence = index;
        debug!(
            seq = index,
            track = %plan.source.rel_path.display(),
            number = ?plan.track_number,
            "planned"
        );
    }
}

/// Playback-order comparator: album directory chain, then track number,
/// then nesting depth, then relative path.
fn compare_plans(a: &TrackPlan, b: &TrackPlan) -> Ordering {
    let album_a = album_chain(&a.source.rel_path);
    let album_b = album_chain(&b.source.rel_path);
    album_a
        .cmp(&album_b)
        .then_with(|| match (a.track_number, b.track_number) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| depth(&a.source.rel_path).cmp(&depth(&b.source.rel_path)))
        .then_with(|| a.source.rel_path.cmp(&b.source.rel_path))
}

/// The directory chain above the file, i.e. the album/disc hierarchy
fn album_chain(rel_path: &Path) -> PathBuf {
    rel_path.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn depth(rel_path: &Path) -> usize {
    rel_path.components().count()
}

/// Track number for ordering: ID3 tag for mp3 sources, otherwise leading
/// digits of the file stem (the `01 Song` / `01-Song` convention).
fn read_track_number(entry: &SourceEntry) -> Option<u32> {
    if entry.extension == "mp3" {
        if let Ok(tag) = id3::Tag::read_from_path(&entry.path) {
            if let Some(track) = tag.track() {
                return Some(track);
            }
        }
    }
    filename_track_number(&entry.rel_path)
}

/// Parse a leading digit run from the file stem
fn filename_track_number(rel_path: &Path) -> Option<u32> {
    let stem = rel_path.file_stem()?.to_string_lossy();
    let digits: String = stem.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
