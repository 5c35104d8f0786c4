/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! From MVA surfaces to polygons: thresholding, vectorisation, clipping,
//! simplification, and multi-sensor unions.

pub mod extract;
pub mod trace;
pub mod union;

use snafu::prelude::*;

pub use extract::{AltitudeThreshold, MaskExtractor};
pub use union::UnionBuilder;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum GeometryError {
    #[snafu(display("vectoriser produced an unclosable ring ({vertices} vertices)"))]
    OpenRing { vertices: usize },
    #[snafu(display("geometry repair failed: {reason}"))]
    RepairFailed { reason: String },
}

/// A circle approximated finely enough that the chord error stays below a
/// few metres at the ranges this toolkit sweeps.
pub(crate) fn disc(radius_m: f64, segments: usize) -> geo::Polygon<f64> {
    let ring: Vec<geo::Coord<f64>> = (0..=segments)
        .map(|i| {
            let az = core::f64::consts::TAU * i as f64 / segments as f64;
            geo::Coord {
                x: radius_m * az.sin(),
                y: radius_m * az.cos(),
            }
        })
        .collect();
    geo::Polygon::new(geo::LineString::from(ring), vec![])
}
