/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Shared plumbing for the end-to-end tests.

use std::path::{Path, PathBuf};

use geo::MultiPolygon;
use vantage::pipeline::RunConfig;
use vantage::sweep::zones::MultiscaleConfig;

/// A config pointed at a temp directory, tuned for fast single-zone runs.
pub fn test_config(base: &Path) -> RunConfig {
    RunConfig {
        cache_dir: base.join("cache"),
        output_dir: base.join("out"),
        max_workers: Some(2),
        pixel_size_m: 200.0,
        simplify_tolerance_m: 50.0,
        min_area_m2: 1_000.0,
        multiscale: MultiscaleConfig {
            enable: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Output files with the given extension, sorted by name.
pub fn find_outputs(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|e| e == extension))
        .collect();
    out.sort();
    out
}

/// Cached Tier-1 artifacts in the store.
pub fn count_artifacts(cache_dir: &Path) -> usize {
    let store = cache_dir.join("viewsheds");
    std::fs::read_dir(store)
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| e.path().extension().is_some_and(|x| x == "vshd"))
                .count()
        })
        .unwrap_or(0)
}

/// Reads a GeoJSON output back into a MultiPolygon.
pub fn parse_multipolygon(path: &Path) -> MultiPolygon<f64> {
    let text = std::fs::read_to_string(path).unwrap();
    let gj: geojson::GeoJson = text.parse().unwrap();
    let collection = geojson::quick_collection(&gj).unwrap();
    let mut polygons = Vec::new();
    for geometry in collection {
        match geometry {
            geo::Geometry::MultiPolygon(mp) => polygons.extend(mp.0),
            geo::Geometry::Polygon(p) => polygons.push(p),
            _ => {}
        }
    }
    MultiPolygon::new(polygons)
}
