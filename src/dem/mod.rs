/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Digital elevation model providers.
//!
//! The engine consumes elevation through the [DemProvider] seam and never
//! cares where samples come from. Two providers ship with the toolkit: a
//! closure-backed synthetic field for tests and demos, and a local-directory
//! NASADEM/SRTM `.hgt` tile reader. Network discovery, authentication, and
//! mosaicking belong to external providers implementing the same trait.

pub mod hgt;
pub mod synthetic;

use core::fmt;

use snafu::prelude::*;

use crate::raster::{GeoBoundingBox, GeoRaster};

pub use hgt::HgtDem;
pub use synthetic::SyntheticDem;

/// Vertical datum of a provider's samples. Surfaced so consumers can decide
/// whether a geoid offset must be applied before comparing against MSL
/// altitudes; this toolkit never guesses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VerticalDatum {
    /// Heights above the EGM96 geoid (NASADEM, SRTM).
    Egm96,
    /// Heights above the WGS84 ellipsoid.
    Wgs84Ellipsoid,
    Unspecified,
}

impl fmt::Display for VerticalDatum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Egm96 => write!(f, "EGM96 geoid"),
            Self::Wgs84Ellipsoid => write!(f, "WGS84 ellipsoid"),
            Self::Unspecified => write!(f, "unspecified"),
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DemError {
    #[snafu(display("provider {provider} requires authentication"))]
    NotAuthenticated { provider: String },
    #[snafu(display("fetching {uri} failed: {reason}"))]
    Network { uri: String, reason: String },
    #[snafu(display("tile {tile} is not available"))]
    TileUnavailable { tile: String },
    #[snafu(display("tile {tile} is corrupt: {reason}"))]
    CorruptTile { tile: String, reason: String },
    #[snafu(display("reading {path} failed: {kind:?}"))]
    TileIo {
        path: String,
        kind: std::io::ErrorKind,
    },
}

/// Source of elevation samples over WGS84 coordinates. Implementations must
/// be shareable across worker threads.
pub trait DemProvider: Send + Sync {
    /// Download or otherwise prepare everything needed to answer samples over
    /// the bounding box. May be a no-op for local providers.
    fn ensure_coverage(&self, bbox: &GeoBoundingBox) -> Result<(), DemError>;

    /// Returns an elevation raster covering the bounding box at approximately
    /// the requested resolution. No-data cells carry the NaN sentinel.
    fn sample_bbox(&self, bbox: &GeoBoundingBox, resolution_m: f64) -> Result<GeoRaster, DemError>;

    /// Elevation at a single point, bilinearly interpolated.
    fn sample_point(&self, lat_deg: f64, lon_deg: f64) -> Result<f32, DemError>;

    fn vertical_datum(&self) -> VerticalDatum {
        VerticalDatum::Unspecified
    }
}

/// Grid steps, in degrees, matching a metric resolution at a latitude.
/// One degree of latitude is ~111.32 km; longitude shrinks with cos(lat).
pub(crate) fn steps_for_resolution(resolution_m: f64, mid_lat_deg: f64) -> (f64, f64) {
    const M_PER_DEG: f64 = 111_320.0;
    let lat_step = resolution_m / M_PER_DEG;
    let cos_lat = mid_lat_deg.to_radians().cos().max(0.01);
    (lat_step, resolution_m / (M_PER_DEG * cos_lat))
}

/// Builds the output grid every provider uses for [DemProvider::sample_bbox]:
/// top-left sample centred on the bbox's northwest corner.
pub(crate) fn bbox_grid(bbox: &GeoBoundingBox, resolution_m: f64) -> GeoRaster {
    let mid_lat = 0.5 * (bbox.north_deg + bbox.south_deg);
    let (lat_step, lon_step) = steps_for_resolution(resolution_m, mid_lat);
    let height = (bbox.height_deg() / lat_step).ceil() as usize + 1;
    let width = (bbox.width_deg() / lon_step).ceil() as usize + 1;
    GeoRaster::filled(
        bbox.west_deg,
        bbox.north_deg,
        lon_step,
        lat_step,
        width,
        height,
        crate::raster::NO_DATA,
    )
}
