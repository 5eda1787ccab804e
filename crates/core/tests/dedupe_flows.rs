mod common;

use std::fs;

use common::{dir_names, gray_frames, read_time, time_frames, TextDetector, TimeOracle};
use frameweave_core::dedupe::{
    analyze, autofill, delete_duplicates, render_report, tune, AutofillOptions, BlockDiffDetector,
    TuneRange,
};
use frameweave_core::progress::ProgressStack;

#[test]
fn autofill_replaces_duplicates_with_restored_frames() {
    let dir = tempfile::tempdir().expect("tempdir");
    let frames = time_frames(&dir.path().join("in"), &["0", "0", "0", "1"]);
    let out = dir.path().join("out");

    let report = analyze(&mut TextDetector, &frames, 0, 0).expect("analyze");
    assert_eq!(report.groups.len(), 1);
    let group = &report.groups[0];
    assert_eq!(group.keep_index(), 0);
    assert_eq!(group.last_index(), 2);

    let mut oracle = TimeOracle::bisecting();
    let mut progress = ProgressStack::disabled();
    let outcome = autofill(
        &mut oracle,
        &mut progress,
        &frames,
        &report,
        &out,
        &AutofillOptions {
            ignore_over_size: 0,
            precision: 10,
            keep_samples: false,
        },
    )
    .expect("autofill");

    assert_eq!(outcome.filled_groups, 1);
    assert_eq!(outcome.filled_frames, 2);
    assert_eq!(dir_names(&out), vec!["f0.png", "f1.png", "f2.png", "f3.png"]);
    assert_eq!(fs::read(out.join("f0.png")).unwrap(), fs::read(&frames[0]).unwrap());
    assert_eq!(fs::read(out.join("f3.png")).unwrap(), fs::read(&frames[3]).unwrap());

    let first = read_time(&out.join("f1.png")).unwrap();
    let second = read_time(&out.join("f2.png")).unwrap();
    assert!((first - 1.0 / 3.0).abs() < 1e-3, "f1 at {first}");
    assert!((second - 2.0 / 3.0).abs() < 1e-3, "f2 at {second}");
}

#[test]
fn autofill_keeps_trailing_group_without_following_frame() {
    let dir = tempfile::tempdir().expect("tempdir");
    let frames = time_frames(&dir.path().join("in"), &["0", "1", "1"]);
    let out = dir.path().join("out");

    let report = analyze(&mut TextDetector, &frames, 0, 0).expect("analyze");
    let mut oracle = TimeOracle::bisecting();
    let mut progress = ProgressStack::disabled();
    let outcome = autofill(
        &mut oracle,
        &mut progress,
        &frames,
        &report,
        &out,
        &AutofillOptions {
            ignore_over_size: 0,
            precision: 4,
            keep_samples: false,
        },
    )
    .expect("autofill");

    assert!(oracle.calls.is_empty());
    assert_eq!(outcome.filled_groups, 0);
    assert_eq!(outcome.skipped_groups, 1);
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(dir_names(&out), vec!["f0.png", "f1.png", "f2.png"]);
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(fs::read(out.join(format!("f{i}.png"))).unwrap(), fs::read(frame).unwrap());
    }
}

#[test]
fn delete_respects_group_size_limit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let frames = time_frames(&dir.path().join("in"), &["0", "0", "0", "1", "1"]);
    let report = analyze(&mut TextDetector, &frames, 0, 0).expect("analyze");
    assert_eq!(report.dupe_count, 3);

    let all = delete_duplicates(&frames, &report, &dir.path().join("all"), 0).expect("delete");
    assert_eq!(all.removed, 3);
    assert_eq!(dir_names(&dir.path().join("all")), vec!["f0.png", "f3.png"]);

    let limited =
        delete_duplicates(&frames, &report, &dir.path().join("limited"), 2).expect("delete");
    assert_eq!(limited.removed, 1);
    assert_eq!(limited.skipped_groups, 1);
    assert_eq!(
        dir_names(&dir.path().join("limited")),
        vec!["f0.png", "f1.png", "f2.png", "f3.png"]
    );
}

#[test]
fn report_is_stable_across_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let frames = gray_frames(dir.path(), &[0, 0, 5, 5, 40, 200]);

    let first = analyze(&mut BlockDiffDetector::new(), &frames, 500, 0).expect("analyze");
    let second = analyze(&mut BlockDiffDetector::new(), &frames, 500, 0).expect("analyze");
    assert_eq!(render_report(&first), render_report(&second));
    assert_eq!(first.groups.len(), 1);
    assert_eq!(first.max_group, 4);
    assert_eq!(first.dupe_count, 3);
    assert_eq!(first.first_dupe, Some(1));
}

#[test]
fn group_cap_of_one_yields_no_groups() {
    let dir = tempfile::tempdir().expect("tempdir");
    let frames = gray_frames(dir.path(), &[0, 0, 0, 0]);

    let report = analyze(&mut BlockDiffDetector::new(), &frames, 500, 1).expect("analyze");
    assert!(report.groups.is_empty());
    assert_eq!(report.dupe_count, 0);
    assert_eq!(report.first_dupe, None);

    let capped = analyze(&mut BlockDiffDetector::new(), &frames, 500, 2).expect("analyze");
    assert_eq!(capped.groups.len(), 2);
    assert!(capped.groups.iter().all(|g| g.len() == 2));
}

#[test]
fn empty_input_reports_nothing() {
    let report = analyze(&mut BlockDiffDetector::new(), &[], 500, 0).expect("analyze");
    assert_eq!(report.total_frames, 0);
    assert_eq!(report.dupe_percent, 0.0);
    assert!(report.groups.is_empty());
}

#[test]
fn tuning_sweep_is_monotone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let frames = gray_frames(dir.path(), &[0, 0, 5, 5, 40, 200]);
    let mut progress = ProgressStack::disabled();

    let table = tune(
        &mut BlockDiffDetector::new(),
        &mut progress,
        &frames,
        TuneRange {
            min: 0,
            max: 2500,
            step: 500,
        },
        0,
    )
    .expect("tune");

    let thresholds: Vec<u32> = table.rows.iter().map(|r| r.threshold).collect();
    assert_eq!(thresholds, vec![0, 500, 1000, 1500, 2000]);
    let counts: Vec<usize> = table.rows.iter().map(|r| r.dupe_count).collect();
    assert_eq!(counts, vec![2, 3, 3, 3, 3]);
    assert!(table
        .rows
        .windows(2)
        .all(|pair| pair[0].dupe_percent <= pair[1].dupe_percent));
    assert!(table.warnings.is_empty());

    let csv_path = dir.path().join("reports").join("tune.csv");
    table.write_csv(&csv_path).expect("write csv");
    let csv = fs::read_to_string(csv_path).unwrap();
    assert_eq!(csv.lines().count(), 6);
}

#[test]
fn empty_tuning_range_warns() {
    let dir = tempfile::tempdir().expect("tempdir");
    let frames = gray_frames(dir.path(), &[0, 0]);
    let mut progress = ProgressStack::disabled();

    let table = tune(
        &mut BlockDiffDetector::new(),
        &mut progress,
        &frames,
        TuneRange {
            min: 2500,
            max: 2500,
            step: 500,
        },
        0,
    )
    .expect("tune");
    assert!(table.rows.is_empty());
    assert_eq!(table.warnings.len(), 1);
}

#[test]
fn delete_refuses_to_write_into_the_input_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("in");
    let frames = time_frames(&input, &["0", "0", "1"]);
    let report = analyze(&mut TextDetector, &frames, 0, 0).expect("analyze");

    assert!(delete_duplicates(&frames, &report, &input, 0).is_err());
    assert!(delete_duplicates(&frames, &report, &input.join("."), 0).is_err());

    assert_eq!(fs::read_to_string(&frames[0]).unwrap(), "0");
    assert_eq!(fs::read_to_string(&frames[1]).unwrap(), "0");
    assert_eq!(fs::read_to_string(&frames[2]).unwrap(), "1");
}

#[test]
fn autofill_refuses_to_write_into_the_input_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("in");
    let frames = time_frames(&input, &["0", "0", "1"]);
    let report = analyze(&mut TextDetector, &frames, 0, 0).expect("analyze");

    let mut oracle = TimeOracle::bisecting();
    let mut progress = ProgressStack::disabled();
    let result = autofill(
        &mut oracle,
        &mut progress,
        &frames,
        &report,
        &input.join("."),
        &AutofillOptions {
            ignore_over_size: 0,
            precision: 4,
            keep_samples: false,
        },
    );

    assert!(result.is_err());
    assert!(oracle.calls.is_empty());
    assert_eq!(dir_names(&input), vec!["f0.png", "f1.png", "f2.png"]);
    assert_eq!(fs::read_to_string(&frames[0]).unwrap(), "0");
    assert_eq!(fs::read_to_string(&frames[2]).unwrap(), "1");
}

#[test]
fn autofill_rejects_oversized_precision_before_writing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let frames = time_frames(&dir.path().join("in"), &["0", "0", "1"]);
    let report = analyze(&mut TextDetector, &frames, 0, 0).expect("analyze");
    let out = dir.path().join("out");

    let mut oracle = TimeOracle::bisecting();
    let mut progress = ProgressStack::disabled();
    let result = autofill(
        &mut oracle,
        &mut progress,
        &frames,
        &report,
        &out,
        &AutofillOptions {
            ignore_over_size: 0,
            precision: 2000,
            keep_samples: false,
        },
    );

    assert!(result.is_err());
    assert!(!out.exists());
}
