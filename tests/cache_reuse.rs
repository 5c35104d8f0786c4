/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Both cache tiers, end to end: one MVA artifact serving many altitudes,
//! up-to-date outputs skipping their writes, and cancellation leaving a
//! coherent store behind.

mod util;

use vantage::cancel::CancelToken;
use vantage::dem::SyntheticDem;
use vantage::pipeline::{run, OutputDisposition, OutputFormat, RunConfig, SensorStatus};
use vantage::sensor::SensorRecord;

use util::{count_artifacts, find_outputs, test_config};

fn record(name: &str) -> SensorRecord {
    SensorRecord {
        name: name.to_string(),
        lat: 0.0,
        lon: 0.0,
        height_m: Some(10.0),
        altitude_mode: None,
    }
}

fn fast_config(base: &std::path::Path) -> RunConfig {
    let mut config = test_config(base);
    config.max_range_km = 10.0;
    config.output_format = OutputFormat::Geojson;
    config
}

#[test]
fn one_artifact_serves_every_altitude() {
    let dirs = tempfile::tempdir().unwrap();
    let config = fast_config(dirs.path());
    let dem = SyntheticDem::flat(0.0);
    let records = vec![record("s")];

    let first = run(&config, &dem, &records, &[100.0], &CancelToken::new()).unwrap();
    assert!(first.all_completed());
    assert_eq!(first.sensors[0].zones_computed, 1);
    assert_eq!(count_artifacts(&config.cache_dir), 1);

    // A different altitude re-uses the artifact: Tier-1 keys carry no
    // altitude at all.
    let second = run(&config, &dem, &records, &[1_000.0], &CancelToken::new()).unwrap();
    assert!(second.all_completed());
    assert_eq!(second.sensors[0].zones_computed, 0);
    assert_eq!(second.sensors[0].zones_cached, 1);
    assert_eq!(count_artifacts(&config.cache_dir), 1, "still one artifact per zone");

    // Both altitude surfaces exist as distinct outputs.
    assert_eq!(find_outputs(&config.output_dir, "geojson").len(), 2);
}

#[test]
fn identical_rerun_skips_every_write() {
    let dirs = tempfile::tempdir().unwrap();
    let mut config = fast_config(dirs.path());
    let dem = SyntheticDem::flat(0.0);
    let records = vec![record("s")];

    let first = run(&config, &dem, &records, &[50.0], &CancelToken::new()).unwrap();
    assert_eq!(first.outputs_written(), 1);
    assert_eq!(first.outputs_skipped(), 0);

    let second = run(&config, &dem, &records, &[50.0], &CancelToken::new()).unwrap();
    assert_eq!(second.outputs_written(), 0);
    assert_eq!(second.outputs_skipped(), 1, "identical parameters must skip");
    assert!(second.sensors[0]
        .outputs
        .iter()
        .all(|o| o.disposition == OutputDisposition::SkippedUpToDate));

    // A style change regenerates the output while Tier-1 is untouched.
    config.style.fill_color = "00ffff".to_string();
    let third = run(&config, &dem, &records, &[50.0], &CancelToken::new()).unwrap();
    assert_eq!(third.outputs_written(), 1);
    assert_eq!(third.sensors[0].zones_cached, 1);
    assert_eq!(count_artifacts(&config.cache_dir), 1);
}

#[test]
fn cancelled_run_leaves_a_coherent_store_for_the_next() {
    let dirs = tempfile::tempdir().unwrap();
    let config = fast_config(dirs.path());
    let dem = SyntheticDem::flat(0.0);
    let records = vec![record("a"), record("b")];

    // Cancellation before any unit starts: everything reports cancelled,
    // nothing half-written.
    let cancel = CancelToken::new();
    cancel.cancel();
    let aborted = run(&config, &dem, &records, &[50.0], &cancel).unwrap();
    assert!(aborted.cancelled);
    assert_eq!(aborted.exit_code(), 130);
    assert!(aborted
        .sensors
        .iter()
        .all(|s| s.status == SensorStatus::Cancelled));
    assert_eq!(count_artifacts(&config.cache_dir), 0);

    // The next run proceeds normally and completes both sensors.
    let resumed = run(&config, &dem, &records, &[50.0], &CancelToken::new()).unwrap();
    assert!(resumed.all_completed());
    assert_eq!(resumed.exit_code(), 0);
    // Both sensors sit at the same point here, so they share one fingerprint.
    assert!(count_artifacts(&config.cache_dir) >= 1);
}

#[test]
fn deterministic_artifacts_for_identical_fingerprints() {
    let dirs_a = tempfile::tempdir().unwrap();
    let dirs_b = tempfile::tempdir().unwrap();
    let dem = SyntheticDem::flat(0.0);
    let records = vec![record("s")];

    let config_a = fast_config(dirs_a.path());
    run(&config_a, &dem, &records, &[50.0], &CancelToken::new()).unwrap();
    let config_b = fast_config(dirs_b.path());
    run(&config_b, &dem, &records, &[50.0], &CancelToken::new()).unwrap();

    let read_artifact = |config: &RunConfig| {
        let store = config.cache_dir.join("viewsheds");
        let mut files = util::find_outputs(&store, "vshd");
        assert_eq!(files.len(), 1);
        std::fs::read(files.pop().unwrap()).unwrap()
    };
    assert_eq!(
        read_artifact(&config_a),
        read_artifact(&config_b),
        "identical fingerprint and DEM must serialise identically"
    );
}
