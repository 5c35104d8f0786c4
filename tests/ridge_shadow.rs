/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! A single ridge: the shadow wedge behind it shrinks as the target climbs.

mod util;

use geo::Contains;
use vantage::cancel::CancelToken;
use vantage::dem::SyntheticDem;
use vantage::pipeline::{run, OutputFormat};
use vantage::sensor::SensorRecord;

use util::{find_outputs, parse_multipolygon, test_config};

const DEG_PER_M: f64 = 1.0 / 110_946.0;

#[test]
fn shadow_behind_a_wall_clears_with_altitude() {
    let dirs = tempfile::tempdir().unwrap();
    let mut config = test_config(dirs.path());
    config.max_range_km = 15.0;
    config.output_format = OutputFormat::Geojson;
    config.pixel_size_m = 100.0;

    // A 100 m wall across the whole 5 km parallel north of the sensor.
    let wall_south = 4_800.0 * DEG_PER_M;
    let wall_north = 5_200.0 * DEG_PER_M;
    let dem = SyntheticDem::from_fn(move |lat, _lon| {
        if lat >= wall_south && lat <= wall_north {
            100.0
        } else {
            0.0
        }
    });

    let records = vec![SensorRecord {
        name: "ridge".to_string(),
        lat: 0.0,
        lon: 0.0,
        height_m: Some(10.0),
        altitude_mode: None,
    }];
    let report = run(&config, &dem, &records, &[50.0, 200.0], &CancelToken::new()).unwrap();
    assert!(report.all_completed(), "{:?}", report.sensors);

    let outputs = find_outputs(&config.output_dir, "geojson");
    assert_eq!(outputs.len(), 2);
    // Sorted: 01_ is the 50 m surface, 02_ the 200 m surface.
    let low = parse_multipolygon(&outputs[0]);
    let high = parse_multipolygon(&outputs[1]);
    assert!(outputs[0]
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("01_"));

    let behind_wall = geo::Point::new(0.0, 8_000.0 * DEG_PER_M);
    let before_wall = geo::Point::new(0.0, 3_000.0 * DEG_PER_M);
    let due_south = geo::Point::new(0.0, -8_000.0 * DEG_PER_M);

    // In front of the wall and south of the sensor, both surfaces see.
    assert!(low.contains(&before_wall));
    assert!(high.contains(&before_wall));
    assert!(low.contains(&due_south));
    assert!(high.contains(&due_south));

    // Behind the wall: shadowed at 50 m, clear at 200 m.
    assert!(!low.contains(&behind_wall), "50 m target must sit in the shadow wedge");
    assert!(high.contains(&behind_wall), "200 m target clears the 100 m wall");

    // Deeper into the wedge the required altitude keeps climbing, so the
    // low surface stays dark while 200 m still clears at 9.5 km.
    let far_north = geo::Point::new(0.0, 9_500.0 * DEG_PER_M);
    assert!(!low.contains(&far_north));
    assert!(high.contains(&far_north));
}
