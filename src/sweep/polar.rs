/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Polar ↔ Cartesian plumbing for the sweep: nearest-sample rasterisation of
//! the polar MVA surface, and resampling of per-ray rim state to and from
//! the fixed persisted boundary resolution.

use core::f64::consts::TAU;

use rayon::prelude::*;

use crate::constants::{MVA_NEVER_VISIBLE, N_BOUNDARY_AZ};
use crate::math::angles::between_0_tau;
use crate::raster::{AeqdRaster, GridSpec};

/// Paints the polar surface onto the Cartesian grid. Pixels radially outside
/// `[r_min_m, r_max_m]` keep the never-visible sentinel; each pixel inside
/// takes its nearest polar sample, the inner of two on a tie.
pub fn rasterize(
    polar: &[f32],
    n_az: usize,
    n_r: usize,
    r_min_m: f64,
    dr_m: f64,
    grid: GridSpec,
) -> AeqdRaster {
    debug_assert_eq!(polar.len(), n_az * n_r);
    let dphi = TAU / n_az as f64;
    let r_max_m = r_min_m + n_r as f64 * dr_m;
    let mut out = AeqdRaster::filled(grid, MVA_NEVER_VISIBLE);
    out.data
        .par_chunks_mut(grid.width)
        .enumerate()
        .for_each(|(row, line)| {
            for (col, value) in line.iter_mut().enumerate() {
                let xy = grid.xy_of(col, row);
                let r = xy.norm();
                if r < r_min_m || r > r_max_m {
                    continue;
                }
                // Azimuth measured clockwise from north.
                let phi = between_0_tau(xy.x.atan2(xy.y));
                let j = ((phi / dphi).round() as usize) % n_az;
                // ceil(x - 0.5) rounds halves down: inner preference.
                let i = (((r - r_min_m) / dr_m - 0.5).ceil().max(0.0) as usize).min(n_r - 1);
                *value = polar[j * n_r + i];
            }
        });
    out
}

/// Spreads per-ray rim angles onto the persisted boundary resolution by
/// nearest azimuth. With fewer rays than bins, runs of bins share a ray.
pub fn boundary_to_horizon(final_boundary: &[f64]) -> Vec<f32> {
    let n_az = final_boundary.len();
    (0..N_BOUNDARY_AZ)
        .map(|k| {
            let az = k as f64 / N_BOUNDARY_AZ as f64 * TAU;
            let j = ((az / (TAU / n_az as f64)).round() as usize) % n_az;
            final_boundary[j] as f32
        })
        .collect()
}

/// Inverse of [boundary_to_horizon]: picks, for each of `n_az` rays, the
/// nearest persisted bin. Used to seed a continuation sweep.
pub fn horizon_to_boundary(boundary_horizon: &[f32], n_az: usize) -> Vec<f64> {
    let n_bins = boundary_horizon.len();
    (0..n_az)
        .map(|j| {
            let az = j as f64 / n_az as f64 * TAU;
            let k = ((az / (TAU / n_bins as f64)).round() as usize) % n_bins;
            f64::from(boundary_horizon[k])
        })
        .collect()
}
