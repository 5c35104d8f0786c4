/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Merges per-sensor polygon sets at a common target altitude into one set,
//! interior shadows preserved.

use geo::{BooleanOps, MultiPolygon, Simplify};
use log::debug;

/// One sensor's contribution to a union, in WGS84 degrees.
pub struct SensorPolygons {
    pub sensor_id: String,
    pub polygons: MultiPolygon<f64>,
}

pub struct UnionBuilder {
    /// Post-union simplification tolerance, metres (converted to degrees at
    /// the union stage, where coordinates are geographic).
    pub simplify_tolerance_m: f64,
}

/// Metres per degree of latitude, for tolerance conversion at union time.
const M_PER_DEG: f64 = 111_320.0;

impl UnionBuilder {
    /// Unions the inputs and re-simplifies. Returns the merged set and the
    /// ids of every sensor that contributed a non-empty piece, in input
    /// order.
    pub fn union(&self, inputs: &[SensorPolygons]) -> (MultiPolygon<f64>, Vec<String>) {
        let mut merged = MultiPolygon::<f64>::new(vec![]);
        let mut contributors = Vec::new();
        for input in inputs {
            if input.polygons.0.is_empty() {
                debug!("union: sensor {} contributes nothing", input.sensor_id);
                continue;
            }
            contributors.push(input.sensor_id.clone());
            merged = if merged.0.is_empty() {
                input.polygons.clone()
            } else {
                merged.union(&input.polygons)
            };
        }
        if merged.0.is_empty() {
            return (merged, contributors);
        }
        let tolerance_deg = self.simplify_tolerance_m / M_PER_DEG;
        (merged.simplify(&tolerance_deg), contributors)
    }
}

#[cfg(test)]
mod ut_union {
    use super::*;
    use geo::{Area, Contains, Coord, LineString, Polygon};

    fn square(cx: f64, cy: f64, half: f64) -> MultiPolygon<f64> {
        let ring = vec![
            Coord { x: cx - half, y: cy - half },
            Coord { x: cx + half, y: cy - half },
            Coord { x: cx + half, y: cy + half },
            Coord { x: cx - half, y: cy + half },
            Coord { x: cx - half, y: cy - half },
        ];
        MultiPolygon::new(vec![Polygon::new(LineString::from(ring), vec![])])
    }

    fn square_with_hole(cx: f64, cy: f64, half: f64, hole_half: f64) -> MultiPolygon<f64> {
        let outer = square(cx, cy, half).0[0].exterior().clone();
        let hole = square(cx, cy, hole_half).0[0].exterior().clone();
        MultiPolygon::new(vec![Polygon::new(outer, vec![hole])])
    }

    #[test]
    fn overlapping_squares_obey_inclusion_exclusion() {
        let builder = UnionBuilder { simplify_tolerance_m: 0.0 };
        let a = square(0.0, 0.0, 1.0);
        let b = square(1.0, 0.0, 1.0);
        let (merged, ids) = builder.union(&[
            SensorPolygons { sensor_id: "a".to_string(), polygons: a.clone() },
            SensorPolygons { sensor_id: "b".to_string(), polygons: b.clone() },
        ]);
        assert_eq!(ids, vec!["a", "b"]);
        let lens = a.intersection(&b).unsigned_area();
        let expect = a.unsigned_area() + b.unsigned_area() - lens;
        assert!((merged.unsigned_area() - expect).abs() < 1e-9);
    }

    #[test]
    fn shared_hole_survives_the_union() {
        let builder = UnionBuilder { simplify_tolerance_m: 0.0 };
        // Two coincident squares sharing the same courtyard.
        let (merged, _) = builder.union(&[
            SensorPolygons {
                sensor_id: "a".to_string(),
                polygons: square_with_hole(0.0, 0.0, 2.0, 0.5),
            },
            SensorPolygons {
                sensor_id: "b".to_string(),
                polygons: square_with_hole(0.0, 0.0, 2.0, 0.5),
            },
        ]);
        assert!(!merged.contains(&geo::Point::new(0.0, 0.0)), "hole must survive");
        assert!(merged.contains(&geo::Point::new(1.0, 1.0)));
        let expect = 16.0 - 1.0;
        assert!((merged.unsigned_area() - expect).abs() < 1e-9);
    }

    #[test]
    fn hole_covered_by_the_other_sensor_closes() {
        let builder = UnionBuilder { simplify_tolerance_m: 0.0 };
        let (merged, _) = builder.union(&[
            SensorPolygons {
                sensor_id: "a".to_string(),
                polygons: square_with_hole(0.0, 0.0, 2.0, 0.5),
            },
            SensorPolygons { sensor_id: "b".to_string(), polygons: square(0.0, 0.0, 1.0) },
        ]);
        assert!(merged.contains(&geo::Point::new(0.0, 0.0)), "b sees into a's shadow");
        assert!((merged.unsigned_area() - 16.0).abs() < 1e-9);
    }

    #[test]
    fn empty_contributions_are_skipped() {
        let builder = UnionBuilder { simplify_tolerance_m: 0.0 };
        let (merged, ids) = builder.union(&[
            SensorPolygons { sensor_id: "a".to_string(), polygons: MultiPolygon::new(vec![]) },
            SensorPolygons { sensor_id: "b".to_string(), polygons: square(0.0, 0.0, 1.0) },
        ]);
        assert_eq!(ids, vec!["b"]);
        assert!((merged.unsigned_area() - 4.0).abs() < 1e-9);
    }
}
