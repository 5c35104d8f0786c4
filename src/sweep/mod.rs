/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! The radial sweep: from a reprojected DEM to a minimum-visible-altitude
//! (MVA) surface.
//!
//! # Algorithm
//! 1. Lay a polar grid of `N_az × N_r` samples over the zone annulus, one
//!    radial step per pixel.
//! 2. Walk each ray outward, tracking the running maximum elevation angle
//!    `M` the terrain has subtended so far (curvature and refraction folded
//!    in through the effective-radius drop). A target at distance `r` is
//!    visible exactly when it clears `M`, so the minimum visible altitude at
//!    `r` is `h_obs + r·tan(M) + drop(r)`, floored at the terrain itself.
//! 3. Resample the polar surface back onto the Cartesian grid by nearest
//!    sample, preferring the inner candidate on ties.
//!
//! Tracking the running maximum makes each ray `O(N_r)` instead of the naive
//! `O(N_r²)` sight-line re-scan, and producing an altitude surface rather
//! than a boolean mask lets a single sweep serve every target altitude.

pub mod polar;
pub mod zones;

use log::{debug, warn};
use rayon::prelude::*;
use snafu::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::cancel::CancelToken;
use crate::constants::{MAX_SWEEP_AZIMUTHS, NO_DATA_WARN_FRACTION};
use crate::math::earth::EarthCurvature;
use crate::math::PlaneVec;
use crate::raster::{is_no_data, AeqdRaster};

pub use polar::{boundary_to_horizon, horizon_to_boundary};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SweepError {
    #[snafu(display("unusable {what}: {value}"))]
    NonFiniteSweepInput { what: &'static str, value: f64 },
    #[snafu(display("starting boundary has {got} rays, sweep needs {expected}"))]
    BoundaryMismatch { expected: usize, got: usize },
    #[snafu(display("annulus [{r_min_m}, {r_max_m}] m is empty"))]
    EmptyAnnulus { r_min_m: f64, r_max_m: f64 },
    #[snafu(display("sweep cancelled"))]
    SweepCancelled,
}

/// Result of sweeping one zone.
#[derive(Debug)]
pub struct SweepOutput {
    /// Minimum visible altitude per Cartesian cell, metres MSL; `+∞` outside
    /// the annulus and wherever nothing below the numeric ceiling clears the
    /// horizon.
    pub mva: AeqdRaster,
    /// Running maximum elevation angle at the outer rim, per sweep ray
    /// (radians). Feeds the next zone outward.
    pub final_boundary: Vec<f64>,
    /// The same rim state resampled to the persisted boundary resolution.
    pub boundary_horizon: Vec<f32>,
    pub n_azimuths: usize,
    pub no_data_samples: u64,
    pub total_samples: u64,
}

/// Number of rays so the arc between neighbours at the rim is about one
/// pixel, capped at the persisted boundary resolution.
pub fn azimuth_count(r_max_m: f64, pixel_size_m: f64) -> usize {
    let wanted = (core::f64::consts::TAU * r_max_m / pixel_size_m).ceil() as usize;
    wanted.clamp(16, MAX_SWEEP_AZIMUTHS)
}

/// Sweeps rays over one zone of a reprojected DEM.
pub struct MvaEngine {
    curvature: EarthCurvature,
    observer_msl_m: f64,
}

impl MvaEngine {
    pub fn new(curvature: EarthCurvature, observer_msl_m: f64) -> Result<Self, SweepError> {
        ensure!(
            observer_msl_m.is_finite(),
            NonFiniteSweepInputSnafu {
                what: "observer height",
                value: observer_msl_m
            }
        );
        Ok(Self {
            curvature,
            observer_msl_m,
        })
    }

    /// Runs the sweep over `dem` restricted to the `[r_min_m, r_max_m]`
    /// annulus. `starting_boundary`, when given, carries each ray's horizon
    /// state at `r_min_m` (zone continuation); its length must equal the
    /// azimuth count for this zone.
    pub fn sweep(
        &self,
        dem: &AeqdRaster,
        r_min_m: f64,
        r_max_m: f64,
        starting_boundary: Option<&[f64]>,
        cancel: &CancelToken,
    ) -> Result<SweepOutput, SweepError> {
        for (what, value) in [("zone inner radius", r_min_m), ("zone outer radius", r_max_m)] {
            ensure!(
                value.is_finite() && value >= 0.0,
                NonFiniteSweepInputSnafu { what, value }
            );
        }
        ensure!(r_max_m > r_min_m, EmptyAnnulusSnafu { r_min_m, r_max_m });

        let dr = dem.grid.pixel_size_m;
        let n_az = azimuth_count(r_max_m, dr);
        if let Some(boundary) = starting_boundary {
            ensure!(
                boundary.len() == n_az,
                BoundaryMismatchSnafu {
                    expected: n_az,
                    got: boundary.len()
                }
            );
        }
        let n_r = ((r_max_m - r_min_m) / dr).ceil() as usize;
        let dphi = core::f64::consts::TAU / n_az as f64;

        // Ground clearance of the sensor's own cell; rays never look below it
        // and the cell itself is visible at its own elevation.
        let sensor_ground = {
            let v = dem.bilinear_xy(PlaneVec::new(0.0, 0.0));
            if is_no_data(v) {
                0.0
            } else {
                f64::from(v)
            }
        };

        let mut polar_mva = vec![0f32; n_az * n_r];
        let mut final_boundary = vec![f64::NEG_INFINITY; n_az];
        let no_data = AtomicU64::new(0);
        let h_obs = self.observer_msl_m;

        polar_mva
            .par_chunks_mut(n_r)
            .zip(final_boundary.par_iter_mut())
            .enumerate()
            .try_for_each(|(j, (ray, boundary))| {
                if cancel.is_cancelled() {
                    return Err(SweepError::SweepCancelled);
                }
                let (sin_phi, cos_phi) = (j as f64 * dphi).sin_cos();
                let mut max_angle = starting_boundary.map_or(f64::NEG_INFINITY, |s| s[j]);
                let mut ray_no_data = 0u64;
                for (i, out) in ray.iter_mut().enumerate() {
                    let r = r_min_m + i as f64 * dr;
                    if r < 0.5 * dr {
                        // The sensor cell sees itself at its own elevation.
                        *out = sensor_ground as f32;
                        continue;
                    }
                    let sample = dem.bilinear_xy(PlaneVec::new(r * sin_phi, r * cos_phi));
                    let h_ground = if is_no_data(sample) {
                        ray_no_data += 1;
                        0.0
                    } else {
                        f64::from(sample)
                    };
                    let drop = self.curvature.drop_m(r);
                    let theta = ((h_ground - drop - h_obs) / r).atan();
                    if theta > max_angle {
                        max_angle = theta;
                    }
                    let h_required = h_obs + r * max_angle.tan() + drop;
                    *out = h_required.max(h_ground) as f32;
                }
                if ray_no_data > 0 {
                    no_data.fetch_add(ray_no_data, Ordering::Relaxed);
                }
                *boundary = max_angle;
                Ok(())
            })?;

        let total_samples = (n_az * n_r) as u64;
        let no_data_samples = no_data.load(Ordering::Relaxed);
        let no_data_fraction = no_data_samples as f64 / total_samples.max(1) as f64;
        if no_data_fraction > NO_DATA_WARN_FRACTION {
            warn!(
                "{:.1}% of the zone [{r_min_m:.0}, {r_max_m:.0}] m had no DEM data (treated as sea level)",
                100.0 * no_data_fraction
            );
        } else if no_data_samples > 0 {
            debug!("{no_data_samples} no-data DEM samples treated as sea level");
        }

        let mva = polar::rasterize(&polar_mva, n_az, n_r, r_min_m, dr, dem.grid);
        let boundary_horizon = boundary_to_horizon(&final_boundary);
        Ok(SweepOutput {
            mva,
            final_boundary,
            boundary_horizon,
            n_azimuths: n_az,
            no_data_samples,
            total_samples,
        })
    }
}
