/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Thresholds MVA zone stacks into visibility polygons.
//!
//! Zones carry grids of differing resolutions, so stitching happens in
//! polygon space: each zone is vectorised on its own grid and the pieces are
//! unioned. The seam mismatch is bounded by one coarse pixel, which is
//! accepted.

use geo::{BooleanOps, MultiPolygon, Simplify};
use log::{debug, warn};

use crate::geodesy::AeqdProjection;
use crate::sweep::zones::{ZoneStack, ZoneSurface};
use crate::vector::{disc, trace, GeometryError};

/// How a target altitude relates to the vertical datum.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum AltitudeThreshold {
    /// Metres above mean sea level: one number for the whole area.
    Msl(f64),
    /// Metres above ground level: each cell compares against its own ground.
    Agl(f64),
}

impl AltitudeThreshold {
    pub fn value_m(&self) -> f64 {
        match self {
            Self::Msl(v) | Self::Agl(v) => *v,
        }
    }

    pub fn reference(&self) -> &'static str {
        match self {
            Self::Msl(_) => "MSL",
            Self::Agl(_) => "AGL",
        }
    }
}

pub struct MaskExtractor {
    pub simplify_tolerance_m: f64,
    /// Slivers below this are dropped, shells and holes alike.
    pub min_area_m2: f64,
}

impl Default for MaskExtractor {
    fn default() -> Self {
        Self {
            simplify_tolerance_m: 60.0,
            min_area_m2: 10_000.0,
        }
    }
}

impl MaskExtractor {
    /// Produces the WGS84 visibility polygons of one sensor at one target
    /// altitude, clipped to `clip_radius_m` around the sensor.
    pub fn extract(
        &self,
        stack: &ZoneStack,
        threshold: AltitudeThreshold,
        clip_radius_m: f64,
        proj: &AeqdProjection,
    ) -> Result<MultiPolygon<f64>, GeometryError> {
        // Vectorise per zone, then stitch in polygon space.
        let mut merged = MultiPolygon::<f64>::new(vec![]);
        for surface in &stack.zones {
            let piece = zone_polygons(surface, threshold);
            if piece.0.is_empty() {
                continue;
            }
            merged = if merged.0.is_empty() {
                piece
            } else {
                merged.union(&piece)
            };
        }
        if merged.0.is_empty() {
            debug!(
                "sensor {}: nothing visible at {} m {}",
                stack.sensor_id,
                threshold.value_m(),
                threshold.reference()
            );
            return Ok(merged);
        }

        // Horizon ring, then simplification, then the validity pass.
        let clipped = merged.intersection(&MultiPolygon::new(vec![disc(clip_radius_m, 720)]));
        let simplified = clipped.simplify(&self.simplify_tolerance_m);
        let repaired = self.repair(simplified, &stack.sensor_id)?;

        // Emission happens in geographic coordinates.
        Ok(to_wgs84(&repaired, proj))
    }

    /// Drops degenerate slivers and rebuilds topology through the boolean
    /// kernel (the zero-width-buffer trick, in boolean-ops form).
    fn repair(
        &self,
        polygons: MultiPolygon<f64>,
        sensor_id: &str,
    ) -> Result<MultiPolygon<f64>, GeometryError> {
        use geo::Area;
        let kept: Vec<geo::Polygon<f64>> = polygons
            .0
            .into_iter()
            .filter(|p| p.exterior().0.len() >= 4)
            .filter(|p| p.unsigned_area() >= self.min_area_m2)
            .map(|p| {
                let (exterior, interiors) = p.into_inner();
                let survivors = interiors
                    .into_iter()
                    .filter(|ring| {
                        let hole = geo::Polygon::new(ring.clone(), vec![]);
                        hole.unsigned_area() >= self.min_area_m2
                    })
                    .collect();
                geo::Polygon::new(exterior, survivors)
            })
            .collect();
        if kept.is_empty() {
            warn!("sensor {sensor_id}: every polygon fell below the sliver threshold");
            return Ok(MultiPolygon::new(vec![]));
        }
        let rebuilt = MultiPolygon::new(kept);
        // Self-union; a no-op on clean input, a repair on self-touching rings.
        Ok(rebuilt.union(&MultiPolygon::new(vec![])))
    }
}

/// Thresholds one zone and vectorises its mask on its own grid.
fn zone_polygons(surface: &ZoneSurface, threshold: AltitudeThreshold) -> MultiPolygon<f64> {
    let grid = surface.mva.grid;
    let mask: Vec<bool> = match threshold {
        AltitudeThreshold::Msl(a) => surface
            .mva
            .data
            .iter()
            .map(|&mva| mva.is_finite() && f64::from(mva) <= a)
            .collect(),
        AltitudeThreshold::Agl(a) => surface
            .mva
            .data
            .iter()
            .zip(surface.ground.data.iter())
            .map(|(&mva, &ground)| {
                mva.is_finite() && !ground.is_nan() && f64::from(mva - ground) <= a
            })
            .collect(),
    };
    trace::polygonize(&mask, &grid)
}

/// Projected metres → geographic degrees, vertex by vertex.
fn to_wgs84(polygons: &MultiPolygon<f64>, proj: &AeqdProjection) -> MultiPolygon<f64> {
    use geo::MapCoords;
    polygons.map_coords(|c| {
        let (lat, lon) = proj.inverse(crate::math::PlaneVec::new(c.x, c.y));
        geo::Coord { x: lon, y: lat }
    })
}

#[cfg(test)]
mod ut_extract {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::math::earth::{EarthCurvature, Ellipsoid};
    use crate::raster::{AeqdRaster, GridSpec};
    use crate::sweep::zones::Zone;
    use crate::sweep::MvaEngine;
    use geo::Contains;

    /// A stack with one zone swept over the provided DEM.
    fn stack_over(dem: &AeqdRaster, observer_msl_m: f64, r_max_m: f64) -> (ZoneStack, AeqdProjection) {
        let curvature = EarthCurvature::new(Ellipsoid::WGS84, 0.0, 1.333).unwrap();
        let engine = MvaEngine::new(curvature, observer_msl_m).unwrap();
        let sweep = engine.sweep(dem, 0.0, r_max_m, None, &CancelToken::new()).unwrap();
        let surface = ZoneSurface {
            zone: Zone { index: 0, r_min_m: 0.0, r_max_m, pixel_size_m: dem.grid.pixel_size_m },
            mva: sweep.mva,
            ground: dem.clone(),
            outer_radius_m: r_max_m,
            boundary_horizon: sweep.boundary_horizon,
            from_cache: false,
        };
        let proj = AeqdProjection::new(Ellipsoid::WGS84, 0.0, 0.0).unwrap();
        (
            ZoneStack { sensor_id: "t".to_string(), zones: vec![surface] },
            proj,
        )
    }

    #[test]
    fn flat_world_yields_a_disc_bounded_by_the_horizon() {
        let grid = GridSpec::centered(20_000.0, 200.0);
        let dem = AeqdRaster::filled(grid, 0.0);
        let (stack, proj) = stack_over(&dem, 10.0, 20_000.0);
        let extractor = MaskExtractor { simplify_tolerance_m: 100.0, min_area_m2: 10_000.0 };
        // Clip to the sea-level mutual horizon (~13 km).
        let polys = extractor
            .extract(&stack, AltitudeThreshold::Msl(0.0), 13_000.0, &proj)
            .unwrap();
        assert_eq!(polys.0.len(), 1);
        // Compare areas in the projected frame: π·13²  km², within a pixel's slack.
        let disc_km2 = core::f64::consts::PI * 13.0 * 13.0;
        let area_km2 = super::trace_area_km2_for_tests(&polys, &proj);
        assert!(
            (area_km2 - disc_km2).abs() / disc_km2 < 0.05,
            "area {area_km2} km² vs disc {disc_km2} km²"
        );
    }

    #[test]
    fn threshold_matches_mva_cell_by_cell() {
        // A wall north of the sensor: cells behind it are visible at 200 m
        // MSL but not at 20 m.
        let grid = GridSpec::centered(10_000.0, 100.0);
        let mut dem = AeqdRaster::filled(grid, 0.0);
        for col in 0..grid.width {
            for row in 0..grid.height {
                let xy = grid.xy_of(col, row);
                if xy.y > 2_900.0 && xy.y < 3_100.0 {
                    dem.set(col, row, 120.0);
                }
            }
        }
        let (stack, proj) = stack_over(&dem, 10.0, 10_000.0);
        let extractor = MaskExtractor { simplify_tolerance_m: 10.0, min_area_m2: 1_000.0 };

        let low = extractor.extract(&stack, AltitudeThreshold::Msl(20.0), 10_000.0, &proj).unwrap();
        let high = extractor.extract(&stack, AltitudeThreshold::Msl(200.0), 10_000.0, &proj).unwrap();

        // 4 km north, geographic: ~0.036 deg.
        let shadowed = geo::Point::new(0.0, 0.036);
        assert!(!low.contains(&shadowed), "low altitude must be shadowed");
        assert!(high.contains(&shadowed), "200 m MSL clears the wall at 4 km");
        // South stays visible either way.
        let open = geo::Point::new(0.0, -0.036);
        assert!(low.contains(&open));
        assert!(high.contains(&open));
    }

    #[test]
    fn agl_threshold_follows_the_terrain() {
        // A 500 m plateau: at 50 m AGL the plateau is reachable even though
        // 50 m MSL is under the plateau surface.
        let grid = GridSpec::centered(8_000.0, 100.0);
        let mut dem = AeqdRaster::filled(grid, 0.0);
        for col in 0..grid.width {
            for row in 0..grid.height {
                if grid.xy_of(col, row).x > 3_000.0 {
                    dem.set(col, row, 500.0);
                }
            }
        }
        let (stack, proj) = stack_over(&dem, 600.0, 8_000.0);
        let extractor = MaskExtractor { simplify_tolerance_m: 10.0, min_area_m2: 1_000.0 };
        let agl = extractor.extract(&stack, AltitudeThreshold::Agl(50.0), 8_000.0, &proj).unwrap();
        // 5 km east on the plateau: ~0.045 deg of longitude.
        let on_plateau = geo::Point::new(0.045, 0.0);
        assert!(agl.contains(&on_plateau), "plateau visible at 50 m AGL from a high mast");
    }

    #[test]
    fn empty_result_is_not_an_error() {
        let grid = GridSpec::centered(5_000.0, 100.0);
        let dem = AeqdRaster::filled(grid, 0.0);
        let (stack, proj) = stack_over(&dem, 10.0, 5_000.0);
        let extractor = MaskExtractor::default();
        // Nothing is visible 100 m below the plain.
        let polys = extractor
            .extract(&stack, AltitudeThreshold::Msl(-100.0), 5_000.0, &proj)
            .unwrap();
        assert!(polys.0.is_empty());
    }
}

/// Test helper: area of WGS84 polygons measured back in the projected frame.
#[cfg(test)]
pub(crate) fn trace_area_km2_for_tests(
    polygons: &geo::MultiPolygon<f64>,
    proj: &AeqdProjection,
) -> f64 {
    use geo::{Area, MapCoords};
    let back = polygons.map_coords(|c| {
        let xy = proj.forward(c.y, c.x);
        geo::Coord { x: xy.x, y: xy.y }
    });
    back.unsigned_area() / 1.0e6
}
