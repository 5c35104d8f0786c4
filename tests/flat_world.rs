/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! End-to-end runs over synthetic flat terrain: the classic radio-horizon
//! disc, and the two-sensor union.

mod util;

use geo::Contains;
use vantage::cancel::CancelToken;
use vantage::dem::SyntheticDem;
use vantage::pipeline::{run, OutputFormat};
use vantage::sensor::SensorRecord;

use util::{find_outputs, parse_multipolygon, test_config};

fn record(name: &str, lat: f64, lon: f64) -> SensorRecord {
    SensorRecord {
        name: name.to_string(),
        lat,
        lon,
        height_m: Some(10.0),
        altitude_mode: None,
    }
}

/// Metres → degrees of latitude near the equator.
const DEG_PER_M: f64 = 1.0 / 110_946.0;

#[test]
fn sea_level_disc_matches_the_mutual_horizon() {
    let dirs = tempfile::tempdir().unwrap();
    let mut config = test_config(dirs.path());
    config.max_range_km = 50.0;
    config.output_format = OutputFormat::Geojson;

    let dem = SyntheticDem::flat(0.0);
    let records = vec![record("s1", 0.0, 0.0)];
    let report = run(&config, &dem, &records, &[0.0], &CancelToken::new()).unwrap();

    assert!(report.all_completed(), "{:?}", report.sensors);
    assert_eq!(report.outputs_written(), 1);

    let outputs = find_outputs(&config.output_dir, "geojson");
    assert_eq!(outputs.len(), 1);
    let name = outputs[0].file_name().unwrap().to_string_lossy().to_string();
    assert_eq!(name, "viewshed-s1-tgt_alt_0_MSL-det_rng_50.geojson");

    let polygons = parse_multipolygon(&outputs[0]);
    // A 10 m mast over a sea-level plain sees the ground out to ~13 km.
    assert!(polygons.contains(&geo::Point::new(0.0, 12_000.0 * DEG_PER_M)));
    assert!(polygons.contains(&geo::Point::new(12_000.0 * DEG_PER_M, 0.0)));
    assert!(!polygons.contains(&geo::Point::new(0.0, 14_000.0 * DEG_PER_M)));
    assert!(!polygons.contains(&geo::Point::new(0.0, -14_000.0 * DEG_PER_M)));
}

#[test]
fn two_sensor_union_covers_both_discs() {
    let dirs = tempfile::tempdir().unwrap();
    let mut config = test_config(dirs.path());
    config.max_range_km = 20.0;
    config.output_format = OutputFormat::Geojson;
    config.union_outputs = true;

    // 10 km apart along the equator; each disc reaches ~13 km.
    let separation_deg = 10_000.0 * DEG_PER_M;
    let dem = SyntheticDem::flat(0.0);
    let records = vec![record("west", 0.0, 0.0), record("east", 0.0, separation_deg)];
    let report = run(&config, &dem, &records, &[0.0], &CancelToken::new()).unwrap();

    assert!(report.all_completed());
    // Two per-sensor outputs plus the union.
    assert_eq!(report.outputs_written(), 3);
    assert_eq!(report.union_outputs.len(), 1);

    let union_path = report.union_outputs[0].path.clone();
    assert!(union_path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .contains("union"));
    let merged = parse_multipolygon(&union_path);

    // The lens between the sensors, both rims, and nothing far outside.
    assert!(merged.contains(&geo::Point::new(separation_deg / 2.0, 0.0)));
    assert!(merged.contains(&geo::Point::new(-10_000.0 * DEG_PER_M, 0.0)));
    assert!(merged.contains(&geo::Point::new(separation_deg + 10_000.0 * DEG_PER_M, 0.0)));
    assert!(!merged.contains(&geo::Point::new(separation_deg + 16_000.0 * DEG_PER_M, 0.0)));
    // A single merged outer ring, not two disjoint discs.
    assert_eq!(merged.0.len(), 1);
}
