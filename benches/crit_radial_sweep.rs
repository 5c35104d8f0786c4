/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use vantage::cancel::CancelToken;
use vantage::math::earth::{EarthCurvature, Ellipsoid};
use vantage::raster::{AeqdRaster, GridSpec};
use vantage::sweep::MvaEngine;

/// Rolling synthetic terrain so the horizon tracker actually has work to do.
fn hilly_dem(radius_m: f64, pixel_m: f64) -> AeqdRaster {
    let grid = GridSpec::centered(radius_m, pixel_m);
    let mut dem = AeqdRaster::filled(grid, 0.0);
    for row in 0..grid.height {
        for col in 0..grid.width {
            let xy = grid.xy_of(col, row);
            let elevation = 150.0 * (xy.x / 3_500.0).sin() * (xy.y / 2_750.0).cos()
                + 40.0 * (xy.x / 800.0).cos();
            dem.set(col, row, elevation as f32);
        }
    }
    dem
}

fn sweep_benchmark(c: &mut Criterion) {
    let curvature = EarthCurvature::new(Ellipsoid::WGS84, 45.0, 1.333).unwrap();
    let engine = MvaEngine::new(curvature, 350.0).unwrap();
    let cancel = CancelToken::new();

    let dem_near = hilly_dem(10_000.0, 50.0);
    c.bench_function("sweep_10km_at_50m", |b| {
        b.iter(|| {
            engine
                .sweep(black_box(&dem_near), 0.0, 10_000.0, None, &cancel)
                .unwrap()
        })
    });

    let dem_far = hilly_dem(50_000.0, 200.0);
    c.bench_function("sweep_50km_at_200m", |b| {
        b.iter(|| {
            engine
                .sweep(black_box(&dem_far), 0.0, 50_000.0, None, &cancel)
                .unwrap()
        })
    });
}

criterion_group!(benches, sweep_benchmark);
criterion_main!(benches);
