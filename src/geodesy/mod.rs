/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Sensor-centred azimuthal equidistant (AEQD) projection and the WGS84 →
//! AEQD raster resampler.
//!
//! The projection is spherical, on the Gaussian mean radius at the sensor
//! latitude: radial distances from the centre are then exact by construction,
//! which is the property the radial sweep relies on. Azimuthal distortion far
//! from the centre only affects where DEM samples are read, and stays well
//! below the DEM cell size for the ranges this toolkit targets.

use rayon::prelude::*;
use snafu::ensure;

use crate::errors::{LatitudeRangeSnafu, LongitudeRangeSnafu, NonFiniteSnafu, PreconditionError};
use crate::math::earth::Ellipsoid;
use crate::math::PlaneVec;
use crate::raster::{AeqdRaster, GeoBoundingBox, GeoRaster, GridSpec};

#[derive(Copy, Clone, Debug)]
pub struct AeqdProjection {
    lat0_rad: f64,
    lon0_rad: f64,
    sin_lat0: f64,
    cos_lat0: f64,
    radius_m: f64,
}

impl AeqdProjection {
    pub fn new(
        ellipsoid: Ellipsoid,
        lat_deg: f64,
        lon_deg: f64,
    ) -> Result<Self, PreconditionError> {
        ensure!(
            lat_deg.is_finite(),
            NonFiniteSnafu {
                what: "projection latitude",
                value: lat_deg
            }
        );
        ensure!(
            lon_deg.is_finite(),
            NonFiniteSnafu {
                what: "projection longitude",
                value: lon_deg
            }
        );
        ensure!(lat_deg.abs() <= 90.0, LatitudeRangeSnafu { lat_deg });
        ensure!(lon_deg.abs() <= 180.0, LongitudeRangeSnafu { lon_deg });
        let lat0_rad = lat_deg.to_radians();
        Ok(Self {
            lat0_rad,
            lon0_rad: lon_deg.to_radians(),
            sin_lat0: lat0_rad.sin(),
            cos_lat0: lat0_rad.cos(),
            radius_m: ellipsoid.gaussian_radius_m(lat0_rad),
        })
    }

    /// Radius of the projection sphere, in meters.
    pub fn sphere_radius_m(&self) -> f64 {
        self.radius_m
    }

    /// A proj-style definition string, persisted with cache artifacts.
    pub fn definition(&self) -> String {
        format!(
            "+proj=aeqd +lat_0={:.7} +lon_0={:.7} +R={:.3} +units=m +no_defs",
            self.lat0_rad.to_degrees(),
            self.lon0_rad.to_degrees(),
            self.radius_m
        )
    }

    /// Geographic → projected plane (x east, y north, meters).
    pub fn forward(&self, lat_deg: f64, lon_deg: f64) -> PlaneVec {
        let lat = lat_deg.to_radians();
        let dlon = lon_deg.to_radians() - self.lon0_rad;
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_dlon, cos_dlon) = dlon.sin_cos();
        let cos_c = (self.sin_lat0 * sin_lat + self.cos_lat0 * cos_lat * cos_dlon).clamp(-1.0, 1.0);
        let c = cos_c.acos();
        // c/sin(c) → 1 as c → 0.
        let kp = if c.abs() < 1e-12 { 1.0 } else { c / c.sin() };
        PlaneVec::new(
            self.radius_m * kp * cos_lat * sin_dlon,
            self.radius_m * kp * (self.cos_lat0 * sin_lat - self.sin_lat0 * cos_lat * cos_dlon),
        )
    }

    /// Projected plane → geographic, the exact inverse of [Self::forward].
    pub fn inverse(&self, xy: PlaneVec) -> (f64, f64) {
        let rho = xy.norm();
        if rho < 1e-9 {
            return (self.lat0_rad.to_degrees(), self.lon0_rad.to_degrees());
        }
        let c = rho / self.radius_m;
        let (sin_c, cos_c) = c.sin_cos();
        let lat = (cos_c * self.sin_lat0 + xy.y * sin_c * self.cos_lat0 / rho)
            .clamp(-1.0, 1.0)
            .asin();
        let lon = self.lon0_rad
            + (xy.x * sin_c).atan2(rho * cos_c * self.cos_lat0 - xy.y * sin_c * self.sin_lat0);
        (
            lat.to_degrees(),
            crate::math::angles::between_pm_180(lon.to_degrees()),
        )
    }

    /// Geographic bounding box of the disc of `radius_m` around the centre,
    /// with a small margin so edge pixels always have DEM support.
    pub fn wgs84_bbox(&self, radius_m: f64) -> GeoBoundingBox {
        let margin = 1.05 * radius_m + 1_000.0;
        let dlat = (margin / self.radius_m).to_degrees();
        let lat0_deg = self.lat0_rad.to_degrees();
        let south = (lat0_deg - dlat).max(-90.0);
        let north = (lat0_deg + dlat).min(90.0);
        // Widest parallel of the disc governs the longitude span.
        let cos_far = south
            .abs()
            .max(north.abs())
            .to_radians()
            .cos()
            .max(1e-6);
        let dlon = (margin / (self.radius_m * cos_far)).to_degrees();
        if dlon >= 180.0 || north == 90.0 || south == -90.0 {
            return GeoBoundingBox {
                west_deg: -180.0,
                south_deg: south,
                east_deg: 180.0,
                north_deg: north,
            };
        }
        let lon0_deg = self.lon0_rad.to_degrees();
        GeoBoundingBox {
            west_deg: lon0_deg - dlon,
            south_deg: south,
            east_deg: lon0_deg + dlon,
            north_deg: north,
        }
    }
}

/// Fills the target grid by bilinear sampling of the geographic raster at the
/// inverse-projected position of every pixel centre. Out-of-DEM pixels come
/// back as no-data.
pub fn resample_to_aeqd(src: &GeoRaster, proj: &AeqdProjection, grid: GridSpec) -> AeqdRaster {
    let mut out = AeqdRaster::filled(grid, crate::raster::NO_DATA);
    out.data
        .par_chunks_mut(grid.width)
        .enumerate()
        .for_each(|(row, line)| {
            for (col, value) in line.iter_mut().enumerate() {
                let (lat_deg, lon_deg) = proj.inverse(grid.xy_of(col, row));
                *value = src.bilinear(lat_deg, lon_deg);
            }
        });
    out
}

#[cfg(test)]
mod ut_aeqd {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use rstest::rstest;

    fn proj(lat: f64, lon: f64) -> AeqdProjection {
        AeqdProjection::new(Ellipsoid::WGS84, lat, lon).unwrap()
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(47.5, -122.3)]
    #[case(-33.9, 18.4)]
    #[case(69.6, 18.9)]
    fn forward_inverse_round_trip(#[case] lat0: f64, #[case] lon0: f64) {
        let p = proj(lat0, lon0);
        for (dlat, dlon) in [(0.0, 0.0), (0.5, 0.25), (-1.2, 0.8), (2.0, -3.0)] {
            let (lat, lon) = (lat0 + dlat, lon0 + dlon);
            let xy = p.forward(lat, lon);
            let (lat2, lon2) = p.inverse(xy);
            assert_abs_diff_eq!(lat, lat2, epsilon = 1e-9);
            assert_abs_diff_eq!(lon, lon2, epsilon = 1e-9);
        }
    }

    #[test]
    fn radial_distances_are_preserved() {
        let p = proj(45.0, 7.0);
        // One degree of latitude northward ≈ one meridional arc minute * 60.
        let xy = p.forward(46.0, 7.0);
        assert_abs_diff_eq!(xy.x, 0.0, epsilon = 1e-6);
        let arc = p.sphere_radius_m() * 1f64.to_radians();
        assert_relative_eq!(xy.y, arc, max_relative = 1e-12);
        // And the planar norm is the geodesic distance on the sphere, by construction.
        let diag = p.forward(45.7, 8.1);
        let (lat, lon) = p.inverse(diag);
        assert_abs_diff_eq!(lat, 45.7, epsilon = 1e-9);
        assert_abs_diff_eq!(lon, 8.1, epsilon = 1e-9);
    }

    #[test]
    fn rejects_bad_centres() {
        assert!(AeqdProjection::new(Ellipsoid::WGS84, 91.0, 0.0).is_err());
        assert!(AeqdProjection::new(Ellipsoid::WGS84, 0.0, 200.0).is_err());
        assert!(AeqdProjection::new(Ellipsoid::WGS84, f64::NAN, 0.0).is_err());
    }

    #[test]
    fn bbox_covers_the_disc() {
        let p = proj(47.0, 8.0);
        let bbox = p.wgs84_bbox(100_000.0);
        // 100 km is a hair under a degree of latitude.
        assert!(bbox.north_deg - 47.0 > 0.9);
        assert!(47.0 - bbox.south_deg > 0.9);
        // Every boundary point of the disc must fall inside.
        for az_deg in (0..360).step_by(15) {
            let az = f64::from(az_deg).to_radians();
            let xy = PlaneVec::new(100_000.0 * az.sin(), 100_000.0 * az.cos());
            let (lat, lon) = p.inverse(xy);
            assert!(bbox.contains(lat, lon), "az {az_deg}: ({lat}, {lon})");
        }
    }

    #[test]
    fn polar_bbox_wraps_longitude() {
        let p = proj(89.5, 0.0);
        let bbox = p.wgs84_bbox(200_000.0);
        assert_eq!(bbox.west_deg, -180.0);
        assert_eq!(bbox.east_deg, 180.0);
        assert_eq!(bbox.north_deg, 90.0);
    }

    #[test]
    fn resampling_carries_elevation_across() {
        // A constant-elevation geographic raster resamples to a constant
        // projected raster wherever there is DEM support.
        let p = proj(10.0, 10.0);
        let src = GeoRaster::filled(9.0, 11.0, 0.01, 0.01, 200, 200, 123.0);
        let grid = GridSpec::centered(20_000.0, 500.0);
        let out = resample_to_aeqd(&src, &p, grid);
        let (c, r) = grid.origin_pixel();
        assert_eq!(out.get(c, r), 123.0);
        assert_eq!(out.get(0, 0), 123.0);
    }
}
