/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Multiscale zoning: the sweep radius splits into up to three concentric
//! annuli processed at coarsening pixel sizes, each cached independently.
//! Horizon state flows outward across zone seams so near terrain masks the
//! far field correctly.

use log::{debug, info, warn};
use serde_derive::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::cache::{fingerprint::sensor_fingerprint, ViewshedArtifact, ViewshedCache};
use crate::cancel::CancelToken;
use crate::constants::MIN_PIXELS_PER_RADIUS;
use crate::dem::DemProvider;
use crate::errors::{
    CacheSnafu, DemSnafu, InvalidConfigSnafu, PreconditionError, PreconditionSnafu, RunPhase,
    VantageError, VantageResult,
};
use crate::geodesy::{resample_to_aeqd, AeqdProjection};
use crate::math::earth::{EarthCurvature, Ellipsoid};
use crate::raster::GridSpec;
use crate::sensor::Sensor;
use crate::sweep::{azimuth_count, horizon_to_boundary, MvaEngine, SweepError};

/// One concentric annulus of the sweep.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub index: usize,
    pub r_min_m: f64,
    pub r_max_m: f64,
    pub pixel_size_m: f64,
}

impl Zone {
    pub fn n_azimuths(&self) -> usize {
        azimuth_count(self.r_max_m, self.pixel_size_m)
    }

    pub fn radial_steps(&self) -> usize {
        ((self.r_max_m - self.r_min_m) / self.pixel_size_m).ceil() as usize
    }

    /// The full square Cartesian grid the zone rasterises onto.
    pub fn grid(&self) -> GridSpec {
        GridSpec::centered(self.r_max_m, self.pixel_size_m)
    }

    /// Peak transient footprint of computing this zone: the reprojected DEM,
    /// the MVA plane, and the polar working surface.
    pub fn memory_bytes(&self) -> u64 {
        let cartesian = self.grid().len() as u64 * 4 * 2;
        let polar = (self.n_azimuths() * self.radial_steps()) as u64 * 4;
        cartesian + polar
    }
}

/// Multiscale configuration, straight from the `[multiscale]` config table.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiscaleConfig {
    pub enable: bool,
    pub near_m: f64,
    pub mid_m: f64,
    pub res_near_m: f64,
    pub res_mid_m: f64,
    pub res_far_m: f64,
}

impl Default for MultiscaleConfig {
    fn default() -> Self {
        Self {
            enable: true,
            near_m: 40_000.0,
            mid_m: 120_000.0,
            res_near_m: 30.0,
            res_mid_m: 60.0,
            res_far_m: 120.0,
        }
    }
}

/// Splits `[0, required_radius_m]` into ordered, non-overlapping zones.
///
/// With multiscale disabled this is a single zone at `base_pixel_m`. Either
/// way each zone's pixel size is capped so the zone keeps at least
/// [MIN_PIXELS_PER_RADIUS] pixels of radial extent.
pub fn plan_zones(
    required_radius_m: f64,
    base_pixel_m: f64,
    cfg: &MultiscaleConfig,
) -> Result<Vec<Zone>, PreconditionError> {
    ensure!(
        required_radius_m.is_finite() && required_radius_m > 0.0,
        InvalidConfigSnafu {
            what: "max range",
            why: format!("{required_radius_m} m is not a usable radius"),
        }
    );
    ensure!(
        base_pixel_m.is_finite() && base_pixel_m > 0.0,
        InvalidConfigSnafu {
            what: "pixel size",
            why: format!("{base_pixel_m} m is not a usable pixel size"),
        }
    );
    if cfg.enable {
        ensure!(
            cfg.near_m > 0.0 && cfg.mid_m > cfg.near_m,
            InvalidConfigSnafu {
                what: "multiscale breakpoints",
                why: format!("need 0 < near ({}) < mid ({})", cfg.near_m, cfg.mid_m),
            }
        );
        ensure!(
            cfg.res_near_m > 0.0 && cfg.res_mid_m > 0.0 && cfg.res_far_m > 0.0,
            InvalidConfigSnafu {
                what: "multiscale resolutions",
                why: "zone resolutions must be positive".to_string(),
            }
        );
    }

    let spans: Vec<(f64, f64, f64)> = if !cfg.enable {
        vec![(0.0, required_radius_m, base_pixel_m)]
    } else {
        vec![
            (0.0, required_radius_m.min(cfg.near_m), cfg.res_near_m),
            (cfg.near_m, required_radius_m.min(cfg.mid_m), cfg.res_mid_m),
            (cfg.mid_m, required_radius_m, cfg.res_far_m),
        ]
    };

    let mut zones = Vec::new();
    for (r_min_m, r_max_m, wanted_pixel) in spans {
        if r_max_m <= r_min_m {
            continue; // range too short to reach this annulus
        }
        let cap = r_max_m / MIN_PIXELS_PER_RADIUS;
        let pixel_size_m = if wanted_pixel > cap {
            debug!(
                "zone [{r_min_m:.0}, {r_max_m:.0}] m: pixel {wanted_pixel} m capped to {cap:.1} m"
            );
            cap
        } else {
            wanted_pixel
        };
        zones.push(Zone {
            index: zones.len(),
            r_min_m,
            r_max_m,
            pixel_size_m,
        });
    }
    Ok(zones)
}

/// One zone's MVA surface, in memory, after a compute or a cache hit.
pub struct ZoneSurface {
    pub zone: Zone,
    pub mva: crate::raster::AeqdRaster,
    pub ground: crate::raster::AeqdRaster,
    pub outer_radius_m: f64,
    pub boundary_horizon: Vec<f32>,
    pub from_cache: bool,
}

impl ZoneSurface {
    fn from_artifact(artifact: &ViewshedArtifact, from_cache: bool) -> Self {
        Self {
            zone: artifact.zone,
            mva: artifact.mva_raster(),
            ground: artifact.ground_raster(),
            outer_radius_m: artifact.outer_radius_m,
            boundary_horizon: artifact.boundary_horizon.clone(),
            from_cache,
        }
    }
}

/// All zones of one sensor, ordered inner to outer.
pub struct ZoneStack {
    pub sensor_id: String,
    pub zones: Vec<ZoneSurface>,
}

impl ZoneStack {
    pub fn outer_radius_m(&self) -> f64 {
        self.zones.last().map_or(0.0, |z| z.outer_radius_m)
    }

    pub fn cache_hits(&self) -> usize {
        self.zones.iter().filter(|z| z.from_cache).count()
    }
}

/// Walks a sensor's zone plan: cache lookups first, DEM → reprojection →
/// sweep on misses, horizon state chained across seams, artifacts stored as
/// they are produced.
pub struct ZoneOrchestrator<'a> {
    pub dem: &'a dyn DemProvider,
    pub cache: &'a ViewshedCache,
    pub ellipsoid: Ellipsoid,
    pub geoid_offset_m: f64,
    pub memory_budget_mb: u64,
}

impl ZoneOrchestrator<'_> {
    pub fn mva_stack(
        &self,
        sensor: &Sensor,
        zones: &[Zone],
        cancel: &CancelToken,
    ) -> VantageResult<ZoneStack> {
        let mut surfaces: Vec<ZoneSurface> = Vec::with_capacity(zones.len());
        for zone in zones {
            if cancel.is_cancelled() {
                return Err(VantageError::CancelRequested);
            }
            let fp = sensor_fingerprint(sensor, zone, "WGS84");
            if let Some(artifact) = self
                .cache
                .lookup(&fp, zone.index)
                .context(CacheSnafu {
                    sensor: &sensor.id,
                    zone: zone.index,
                    phase: RunPhase::CacheRead,
                })?
            {
                info!(
                    "sensor {}: zone {} served from cache ({:.0} m outer radius)",
                    sensor.id, zone.index, artifact.outer_radius_m
                );
                surfaces.push(ZoneSurface::from_artifact(&artifact, true));
                continue;
            }

            let needed_mb = zone.memory_bytes() / (1024 * 1024);
            if needed_mb > self.memory_budget_mb {
                return Err(VantageError::ResourceExhausted {
                    sensor: sensor.id.clone(),
                    zone: zone.index,
                    needed_mb,
                    budget_mb: self.memory_budget_mb,
                });
            }

            let artifact = self.compute_zone(sensor, zone, &fp, surfaces.last(), cancel)?;
            let path = self.cache.store(&artifact).context(CacheSnafu {
                sensor: &sensor.id,
                zone: zone.index,
                phase: RunPhase::CacheWrite,
            })?;
            debug!("sensor {}: zone {} stored at {}", sensor.id, zone.index, path.display());
            surfaces.push(ZoneSurface::from_artifact(&artifact, false));
        }
        Ok(ZoneStack {
            sensor_id: sensor.id.clone(),
            zones: surfaces,
        })
    }

    fn compute_zone(
        &self,
        sensor: &Sensor,
        zone: &Zone,
        fp: &str,
        inner: Option<&ZoneSurface>,
        cancel: &CancelToken,
    ) -> VantageResult<ViewshedArtifact> {
        let proj = AeqdProjection::new(self.ellipsoid, sensor.latitude_deg, sensor.longitude_deg)
            .context(PreconditionSnafu)?;
        let bbox = proj.wgs84_bbox(zone.r_max_m);

        self.dem.ensure_coverage(&bbox).context(DemSnafu {
            sensor: &sensor.id,
            zone: zone.index,
            phase: RunPhase::DemFetch,
        })?;
        if cancel.is_cancelled() {
            return Err(VantageError::CancelRequested);
        }
        let src = self
            .dem
            .sample_bbox(&bbox, zone.pixel_size_m)
            .context(DemSnafu {
                sensor: &sensor.id,
                zone: zone.index,
                phase: RunPhase::DemFetch,
            })?;

        let grid = zone.grid();
        let mut ground = resample_to_aeqd(&src, &proj, grid);
        ground.apply_offset(self.geoid_offset_m as f32);

        let curvature = EarthCurvature::new(self.ellipsoid, sensor.latitude_deg, sensor.refraction_k)
            .context(PreconditionSnafu)?;
        let engine = MvaEngine::new(curvature, sensor.effective_height_msl_m()).map_err(|e| {
            VantageError::Sweep {
                sensor: sensor.id.clone(),
                zone: zone.index,
                source: e,
            }
        })?;

        // An inner zone's rim state seeds this zone's rays.
        let starting = inner.map(|s| horizon_to_boundary(&s.boundary_horizon, zone.n_azimuths()));
        if inner.is_none() && zone.r_min_m > 0.0 {
            warn!(
                "sensor {}: zone {} starts at {:.0} m with no inner horizon state; terrain closer in will not mask it",
                sensor.id, zone.index, zone.r_min_m
            );
        }

        let sweep = engine
            .sweep(&ground, zone.r_min_m, zone.r_max_m, starting.as_deref(), cancel)
            .map_err(|e| match e {
                SweepError::SweepCancelled => VantageError::CancelRequested,
                other => VantageError::Sweep {
                    sensor: sensor.id.clone(),
                    zone: zone.index,
                    source: other,
                },
            })?;

        Ok(ViewshedArtifact::from_sweep(fp, *zone, &proj, &sweep, &ground))
    }
}

#[cfg(test)]
mod ut_zones {
    use super::*;

    #[test]
    fn single_zone_when_multiscale_off() {
        let cfg = MultiscaleConfig {
            enable: false,
            ..Default::default()
        };
        let zones = plan_zones(75_000.0, 30.0, &cfg).unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].r_min_m, 0.0);
        assert_eq!(zones[0].r_max_m, 75_000.0);
        assert_eq!(zones[0].pixel_size_m, 30.0);
    }

    #[test]
    fn three_zones_cover_a_long_range() {
        let zones = plan_zones(300_000.0, 30.0, &MultiscaleConfig::default()).unwrap();
        assert_eq!(zones.len(), 3);
        assert_eq!(zones[0].r_max_m, 40_000.0);
        assert_eq!(zones[1].r_min_m, 40_000.0);
        assert_eq!(zones[1].r_max_m, 120_000.0);
        assert_eq!(zones[2].r_max_m, 300_000.0);
        // Contiguous and ordered.
        for pair in zones.windows(2) {
            assert_eq!(pair[0].r_max_m, pair[1].r_min_m);
            assert!(pair[0].index < pair[1].index);
        }
    }

    #[test]
    fn short_range_drops_outer_zones() {
        let zones = plan_zones(25_000.0, 30.0, &MultiscaleConfig::default()).unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].r_max_m, 25_000.0);

        let two = plan_zones(90_000.0, 30.0, &MultiscaleConfig::default()).unwrap();
        assert_eq!(two.len(), 2);
        assert_eq!(two[1].r_max_m, 90_000.0);
    }

    #[test]
    fn tiny_zone_refines_its_pixels() {
        let cfg = MultiscaleConfig {
            enable: false,
            ..Default::default()
        };
        let zones = plan_zones(1_000.0, 30.0, &cfg).unwrap();
        // 1 km / 64 < 30 m, so the pixel size shrinks to keep sampling sane.
        assert!(zones[0].pixel_size_m <= 1_000.0 / MIN_PIXELS_PER_RADIUS);
    }

    #[test]
    fn nonsense_configs_are_rejected() {
        assert!(plan_zones(0.0, 30.0, &MultiscaleConfig::default()).is_err());
        assert!(plan_zones(10_000.0, -5.0, &MultiscaleConfig::default()).is_err());
        let bad = MultiscaleConfig {
            near_m: 100_000.0,
            mid_m: 50_000.0,
            ..Default::default()
        };
        assert!(plan_zones(200_000.0, 30.0, &bad).is_err());
    }

    #[test]
    fn memory_estimate_tracks_zone_size() {
        let small = Zone { index: 0, r_min_m: 0.0, r_max_m: 10_000.0, pixel_size_m: 100.0 };
        let large = Zone { index: 0, r_min_m: 0.0, r_max_m: 100_000.0, pixel_size_m: 100.0 };
        assert!(large.memory_bytes() > 50 * small.memory_bytes());
    }
}
