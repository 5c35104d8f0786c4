/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use core::fmt;

use snafu::ensure;

use crate::constants::{WGS84_POLAR_RADIUS_M, WGS84_SEMI_MAJOR_M};
use crate::errors::{NegativeSnafu, NonFiniteSnafu, PreconditionError};

/// A bi-axial ellipsoid (spheroid) Earth model.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Ellipsoid {
    pub semi_major_radius_m: f64,
    pub polar_radius_m: f64,
}

impl Ellipsoid {
    pub const WGS84: Self = Self {
        semi_major_radius_m: WGS84_SEMI_MAJOR_M,
        polar_radius_m: WGS84_POLAR_RADIUS_M,
    };

    /// Builds an ellipsoid as if it were a sphere.
    pub fn from_sphere(radius_m: f64) -> Self {
        Self {
            semi_major_radius_m: radius_m,
            polar_radius_m: radius_m,
        }
    }

    pub fn flattening(&self) -> f64 {
        (self.semi_major_radius_m - self.polar_radius_m) / self.semi_major_radius_m
    }

    /// First eccentricity squared.
    pub fn eccentricity_sq(&self) -> f64 {
        let f = self.flattening();
        f * (2.0 - f)
    }

    /// Meridional radius of curvature M at the provided latitude (north-south direction).
    pub fn meridional_radius_m(&self, lat_rad: f64) -> f64 {
        let e2 = self.eccentricity_sq();
        let s = lat_rad.sin();
        let w2 = 1.0 - e2 * s * s;
        self.semi_major_radius_m * (1.0 - e2) / (w2 * w2.sqrt())
    }

    /// Prime vertical radius of curvature N at the provided latitude (east-west direction).
    pub fn prime_vertical_radius_m(&self, lat_rad: f64) -> f64 {
        let e2 = self.eccentricity_sq();
        let s = lat_rad.sin();
        self.semi_major_radius_m / (1.0 - e2 * s * s).sqrt()
    }

    /// Gaussian mean radius √(M·N) at the provided latitude: the azimuthal
    /// average of the radius of curvature over all directions, and the radius
    /// of the sphere best matching the ellipsoid locally.
    pub fn gaussian_radius_m(&self, lat_rad: f64) -> f64 {
        (self.meridional_radius_m(lat_rad) * self.prime_vertical_radius_m(lat_rad)).sqrt()
    }
}

impl fmt::Display for Ellipsoid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        if (self.semi_major_radius_m - self.polar_radius_m).abs() < f64::EPSILON {
            write!(f, "sphere, radius = {} m", self.semi_major_radius_m)
        } else {
            write!(
                f,
                "eq. radius = {} m, polar radius = {} m, f = {:.9}",
                self.semi_major_radius_m,
                self.polar_radius_m,
                self.flattening()
            )
        }
    }
}

/// Curvature model for line-of-sight work: the local Earth radius at the
/// sensor latitude, inflated by the atmospheric refraction factor `k`.
///
/// All sight-line geometry in the sweep uses the resulting effective radius
/// through the drop term `d²/(2·R_eff)`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EarthCurvature {
    r_eff_m: f64,
}

impl EarthCurvature {
    pub fn new(ellipsoid: Ellipsoid, lat_deg: f64, k_factor: f64) -> Result<Self, PreconditionError> {
        ensure!(
            lat_deg.is_finite(),
            NonFiniteSnafu {
                what: "latitude",
                value: lat_deg
            }
        );
        ensure!(
            k_factor.is_finite(),
            NonFiniteSnafu {
                what: "refraction k factor",
                value: k_factor
            }
        );
        ensure!(
            k_factor > 0.0,
            NegativeSnafu {
                what: "refraction k factor",
                value: k_factor
            }
        );
        let r_local = ellipsoid.gaussian_radius_m(lat_deg.to_radians());
        Ok(Self {
            r_eff_m: k_factor * r_local,
        })
    }

    pub fn effective_radius_m(&self) -> f64 {
        self.r_eff_m
    }

    /// Geometric drop below the tangent plane at distance `dist_m`.
    pub fn drop_m(&self, dist_m: f64) -> f64 {
        dist_m * dist_m / (2.0 * self.r_eff_m)
    }

    /// Mutual horizon distance between an observer at `observer_msl_m` and a
    /// target at `target_msl_m`: the range beyond which the Earth itself
    /// occludes the sight line, terrain aside.
    pub fn horizon_distance_m(
        &self,
        observer_msl_m: f64,
        target_msl_m: f64,
    ) -> Result<f64, PreconditionError> {
        for (what, value) in [
            ("observer height", observer_msl_m),
            ("target altitude", target_msl_m),
        ] {
            ensure!(value.is_finite(), NonFiniteSnafu { what, value });
            ensure!(value >= 0.0, NegativeSnafu { what, value });
        }
        Ok((2.0 * self.r_eff_m * observer_msl_m).sqrt()
            + (2.0 * self.r_eff_m * target_msl_m).sqrt())
    }
}
