mod common;

use common::{dir_names, read_time, time_frames, TimeOracle};
use frameweave_core::progress::ProgressStack;
use frameweave_core::resample::{plan_resample, Resampler};

fn frame_times(count: usize) -> Vec<String> {
    (0..count).map(|i| i.to_string()).collect()
}

#[test]
fn resample_24_to_30_places_frames_on_the_target_grid() {
    let dir = tempfile::tempdir().expect("tempdir");
    let times = frame_times(9);
    let refs: Vec<&str> = times.iter().map(String::as_str).collect();
    let frames = time_frames(&dir.path().join("in"), &refs);
    let out = dir.path().join("out");

    for mut oracle in [TimeOracle::bisecting(), TimeOracle::direct()] {
        let out = out.join(format!("ts-{}", oracle.time_step));
        let plan = plan_resample(&frames, 24, 30, 10, oracle.time_step).expect("plan");
        let mut progress = ProgressStack::disabled();
        let outcome = Resampler::new(&mut oracle, &mut progress)
            .run(&plan, &out, "rs", "png")
            .expect("resample");

        assert_eq!(outcome.outputs.len(), 11);
        assert_eq!(outcome.copied, 3);
        assert_eq!(outcome.synthesized, 8);

        let listed = dir_names(&out);
        assert_eq!(listed.len(), 11);
        assert_eq!(listed[0], "rs00.png");
        for (k, name) in listed.iter().enumerate() {
            let time = read_time(&out.join(name)).unwrap();
            let expected = k as f64 * 0.8;
            assert!((time - expected).abs() < 1e-3, "{name} at {time}, expected {expected}");
        }
    }
}

#[test]
fn power_of_two_expansion_hits_every_fraction() {
    let dir = tempfile::tempdir().expect("tempdir");
    let frames = time_frames(&dir.path().join("in"), &["0", "1", "2"]);
    let plan = plan_resample(&frames, 15, 60, 10, false).expect("plan");
    assert_eq!(plan.precision, 2);

    let mut oracle = TimeOracle::bisecting();
    let mut progress = ProgressStack::disabled();
    let outcome = Resampler::new(&mut oracle, &mut progress)
        .run(&plan, &dir.path().join("out"), "rs", "png")
        .expect("resample");

    assert!(outcome.warnings.is_empty());
    let times: Vec<f64> = outcome
        .outputs
        .iter()
        .map(|p| read_time(p).unwrap())
        .collect();
    assert_eq!(times, vec![0.0, 0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0]);
}

#[test]
fn empty_and_single_frame_inputs_write_nothing_to_interpolate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut oracle = TimeOracle::bisecting();

    let empty = plan_resample(&[], 24, 30, 10, false).expect("plan");
    let mut progress = ProgressStack::disabled();
    let outcome = Resampler::new(&mut oracle, &mut progress)
        .run(&empty, &dir.path().join("empty"), "rs", "png")
        .expect("resample");
    assert!(outcome.outputs.is_empty());

    let single = time_frames(&dir.path().join("in"), &["0"]);
    let plan = plan_resample(&single, 24, 30, 10, false).expect("plan");
    let outcome = Resampler::new(&mut oracle, &mut progress)
        .run(&plan, &dir.path().join("single"), "rs", "png")
        .expect("resample");
    assert_eq!(outcome.copied, 1);
    assert!(oracle.calls.is_empty());
}

#[test]
fn oversized_precision_fails_before_any_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let frames = time_frames(&dir.path().join("in"), &["0", "1", "2"]);

    let err = plan_resample(&frames, 24, 30, 2000, false).unwrap_err();
    assert!(err.to_string().contains("2000"), "{err}");

    let mut plan = plan_resample(&frames, 24, 30, 10, false).expect("plan");
    plan.precision = 2000;
    let mut oracle = TimeOracle::bisecting();
    let mut progress = ProgressStack::disabled();
    let result = Resampler::new(&mut oracle, &mut progress).run(
        &plan,
        &dir.path().join("out"),
        "rs",
        "png",
    );
    assert!(result.is_err());
    assert!(!dir.path().join("out").exists());
}
