/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::dem::{bbox_grid, DemError, DemProvider, VerticalDatum};
use crate::raster::{GeoBoundingBox, GeoRaster};

type ElevationFn = dyn Fn(f64, f64) -> f32 + Send + Sync;

/// A closure-backed elevation field. Used by tests, demos, and benches; also
/// handy to sanity-check a configuration without any DEM on disk.
pub struct SyntheticDem {
    field: Box<ElevationFn>,
    datum: VerticalDatum,
}

impl SyntheticDem {
    /// Terrain from an arbitrary `f(lat_deg, lon_deg) -> elevation_m` field.
    pub fn from_fn<F>(field: F) -> Self
    where
        F: Fn(f64, f64) -> f32 + Send + Sync + 'static,
    {
        Self {
            field: Box::new(field),
            datum: VerticalDatum::Unspecified,
        }
    }

    /// A perfectly flat world at the given elevation.
    pub fn flat(elevation_m: f32) -> Self {
        Self::from_fn(move |_, _| elevation_m)
    }

    pub fn with_datum(mut self, datum: VerticalDatum) -> Self {
        self.datum = datum;
        self
    }
}

impl DemProvider for SyntheticDem {
    fn ensure_coverage(&self, _bbox: &GeoBoundingBox) -> Result<(), DemError> {
        Ok(())
    }

    fn sample_bbox(&self, bbox: &GeoBoundingBox, resolution_m: f64) -> Result<GeoRaster, DemError> {
        let mut out = bbox_grid(bbox, resolution_m);
        for row in 0..out.height {
            let lat = out.north_deg - row as f64 * out.lat_step_deg;
            for col in 0..out.width {
                let lon = out.west_deg + col as f64 * out.lon_step_deg;
                out.set(col, row, (self.field)(lat, lon));
            }
        }
        Ok(out)
    }

    fn sample_point(&self, lat_deg: f64, lon_deg: f64) -> Result<f32, DemError> {
        Ok((self.field)(lat_deg, lon_deg))
    }

    fn vertical_datum(&self) -> VerticalDatum {
        self.datum
    }
}

#[cfg(test)]
mod ut_synthetic {
    use super::*;

    #[test]
    fn flat_world_is_flat_everywhere() {
        let dem = SyntheticDem::flat(42.0);
        assert_eq!(dem.sample_point(12.0, 34.0).unwrap(), 42.0);
        let bbox = GeoBoundingBox {
            west_deg: 0.0,
            south_deg: 0.0,
            east_deg: 0.5,
            north_deg: 0.5,
        };
        let raster = dem.sample_bbox(&bbox, 1000.0).unwrap();
        assert!(raster.data.iter().all(|&v| v == 42.0));
    }

    #[test]
    fn field_sees_coordinates() {
        let dem = SyntheticDem::from_fn(|lat, lon| (lat * 10.0 + lon) as f32);
        assert_eq!(dem.sample_point(2.0, 3.0).unwrap(), 23.0);
    }
}
