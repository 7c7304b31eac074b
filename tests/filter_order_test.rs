/*!
 * Property-style tests for filtering and order planning
 */

use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

use transfat::config::TransferConfig;
use transfat::core::plan::{assign_sequence, build_plans};
use transfat::core::scan::scan_source;
use transfat::core::transfer::transfer_in_order;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn quiet_config() -> TransferConfig {
    TransferConfig {
        show_progress: false,
        ..Default::default()
    }
}

#[test]
fn test_excluded_extensions_never_reach_a_plan() {
    let src = TempDir::new().unwrap();
    src.child("Album/01 Song.mp3").write_str("audio").unwrap();
    src.child("Album/notes.log").write_str("log").unwrap();
    src.child("Album/album.cue").write_str("cue").unwrap();
    src.child("Album/set.m3u").write_str("playlist").unwrap();
    src.child("Album/info.nfo").write_str("nfo").unwrap();

    let config = quiet_config();
    let summary = scan_source(src.path(), &config).unwrap();
    let plans = build_plans(&summary.entries, &config);

    assert_eq!(plans.len(), 1);
    for plan in &plans {
        let ext = plan.source.extension.as_str();
        assert!(
            !config.excluded_extensions.iter().any(|e| e == ext),
            "excluded extension {} reached a plan",
            ext
        );
    }
}

#[test]
fn test_sequence_is_a_dense_permutation_for_varied_tree_sizes() {
    for n in [0usize, 1, 2, 13] {
        let src = TempDir::new().unwrap();
        for i in 0..n {
            src.child(format!("Disc {}/{:02} track.mp3", i % 3, i))
                .write_str("x")
                .unwrap();
        }

        let config = quiet_config();
        let summary = scan_source(src.path(), &config).unwrap();
        let mut plans = build_plans(&summary.entries, &config);
        assign_sequence(&mut plans);

        let mut indices: Vec<_> = plans.iter().map(|p| p.sequence).collect();
        indices.sort();
        assert_eq!(indices, (0..n).collect::<Vec<_>>(), "n = {}", n);
    }
}

#[test]
fn test_repeated_planning_is_identical() {
    let src = TempDir::new().unwrap();
    src.child("B/2.mp3").write_str("x").unwrap();
    src.child("A/10 ten.mp3").write_str("x").unwrap();
    src.child("A/2 two.mp3").write_str("x").unwrap();
    src.child("A/untagged.mp3").write_str("x").unwrap();

    let config = quiet_config();
    let order = || {
        let summary = scan_source(src.path(), &config).unwrap();
        let mut plans = build_plans(&summary.entries, &config);
        assign_sequence(&mut plans);
        plans
            .into_iter()
            .map(|p| (p.sequence, p.source.rel_path))
            .collect::<Vec<_>>()
    };

    assert_eq!(order(), order());
}

#[test]
fn test_transfer_materializes_the_planned_tree() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    src.child("Album/02 b.mp3").write_str("bb").unwrap();
    src.child("Album/01 a.mp3").write_str("aa").unwrap();
    src.child("Album/cover.jpg").write_str("img").unwrap();

    let config = quiet_config();
    let summary = scan_source(src.path(), &config).unwrap();
    let mut plans = build_plans(&summary.entries, &config);
    assign_sequence(&mut plans);

    let run = transfer_in_order(
        &plans,
        dst.path(),
        &config,
        &Arc::new(AtomicBool::new(false)),
    );
    assert!(run.error.is_none());

    dst.child("Album/01 a.mp3").assert(predicate::path::exists());
    dst.child("Album/02 b.mp3").assert(predicate::path::exists());
    dst.child("Album/cover.jpg")
        .assert(predicate::path::missing());
}
