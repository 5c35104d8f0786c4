/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! The run pipeline: configuration, the worker pool, per-sensor processing,
//! and union assembly.
//!
//! Sensors are independent units scheduled on a bounded rayon pool; zones
//! within a sensor run in radial order (horizon state flows outward), rays
//! within a zone in parallel. One sensor failing (a missing tile, an
//! unauthenticated provider) marks that sensor and leaves the rest of the
//! run alone.

pub mod output;
pub mod report;

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use log::{info, warn};
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::cache::{fingerprint, ViewshedCache};
use crate::cancel::CancelToken;
use crate::dem::DemProvider;
use crate::errors::{InvalidConfigSnafu, PreconditionError, VantageError, VantageResult};
use crate::geodesy::AeqdProjection;
use crate::math::earth::{EarthCurvature, Ellipsoid};
use crate::sensor::{AltitudeMode, Sensor, SensorRecord};
use crate::sweep::zones::{plan_zones, MultiscaleConfig, ZoneOrchestrator};
use crate::vector::{AltitudeThreshold, MaskExtractor, UnionBuilder};

pub use output::OutputFormat;
pub use report::{OutputDisposition, OutputRecord, RunReport, SensorReport, SensorStatus};

/// The single supported Earth model; present so configurations state it
/// explicitly and the cache key can carry it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EarthModel {
    #[default]
    #[serde(rename = "WGS84")]
    Wgs84,
}

impl EarthModel {
    pub fn name(&self) -> &'static str {
        "WGS84"
    }

    pub fn ellipsoid(&self) -> Ellipsoid {
        Ellipsoid::WGS84
    }
}

/// Whether target altitudes are metres above sea level or above each cell's
/// own terrain.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AltitudeReference {
    #[default]
    #[serde(rename = "MSL")]
    Msl,
    #[serde(rename = "AGL")]
    Agl,
}

impl AltitudeReference {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Msl => "MSL",
            Self::Agl => "AGL",
        }
    }
}

/// Output styling, KML-flavoured: colors are bbggrr hex, opacity folds into
/// the fill alpha.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    pub line_color: String,
    pub fill_color: String,
    pub line_width: f64,
    pub fill_opacity: f64,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            line_color: "ff0000ff".to_string(),
            fill_color: "0000ff".to_string(),
            line_width: 2.0,
            fill_opacity: 0.35,
        }
    }
}

impl StyleConfig {
    pub fn fingerprint(&self) -> String {
        fingerprint::hex_digest(&format!(
            "line={};fill={};width={:.2};opacity={:.3}",
            self.line_color, self.fill_color, self.line_width, self.fill_opacity
        ))
    }
}

/// Everything a run needs beyond the sensors and target altitudes. A plain
/// value, deserialisable from a TOML file, passed through calls rather than
/// held process-global.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Worker pool size; unset means min(cores − reserve, 80% of cores).
    pub max_workers: Option<usize>,
    pub reserve_cpus: usize,
    /// Pixel size used when multiscale is disabled.
    pub pixel_size_m: f64,
    pub max_range_km: f64,
    pub atmospheric_k_factor: f64,
    pub earth_model: EarthModel,
    pub target_altitude_reference: AltitudeReference,
    pub simplify_tolerance_m: f64,
    pub min_area_m2: f64,
    pub memory_budget_mb: u64,
    /// Uniform vertical shift applied to every DEM sample; see the provider's
    /// vertical datum.
    pub geoid_offset_m: f64,
    /// Mast height assumed for records that do not carry one.
    pub default_sensor_height_m: f64,
    pub union_outputs: bool,
    pub output_format: OutputFormat,
    pub multiscale: MultiscaleConfig,
    pub style: StyleConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("vantage_cache"),
            output_dir: PathBuf::from("output"),
            max_workers: None,
            reserve_cpus: 1,
            pixel_size_m: 30.0,
            max_range_km: 200.0,
            atmospheric_k_factor: crate::constants::DEFAULT_K_FACTOR,
            earth_model: EarthModel::Wgs84,
            target_altitude_reference: AltitudeReference::Msl,
            simplify_tolerance_m: 60.0,
            min_area_m2: 10_000.0,
            memory_budget_mb: crate::constants::DEFAULT_MEMORY_BUDGET_MB,
            geoid_offset_m: 0.0,
            default_sensor_height_m: 10.0,
            union_outputs: false,
            output_format: OutputFormat::default(),
            multiscale: MultiscaleConfig::default(),
            style: StyleConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn from_toml_path(path: &std::path::Path) -> Result<Self, PreconditionError> {
        let text = fs::read_to_string(path).map_err(|e| PreconditionError::InvalidConfig {
            what: "configuration file",
            why: format!("{}: {e}", path.display()),
        })?;
        toml::from_str(&text).map_err(|e| PreconditionError::InvalidConfig {
            what: "configuration file",
            why: format!("{}: {e}", path.display()),
        })
    }

    pub fn max_range_m(&self) -> f64 {
        self.max_range_km * 1_000.0
    }

    /// Pool size: explicit, or min(cores − reserve, 80% of cores), at least 1.
    pub fn effective_workers(&self) -> usize {
        if let Some(n) = self.max_workers {
            return n.max(1);
        }
        let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
        let reserved = cores.saturating_sub(self.reserve_cpus);
        let fraction = (cores as f64 * 0.8) as usize;
        reserved.min(fraction).max(1)
    }

    fn validate(&self) -> Result<(), PreconditionError> {
        for (what, value) in [
            ("pixel_size_m", self.pixel_size_m),
            ("max_range_km", self.max_range_km),
            ("atmospheric_k_factor", self.atmospheric_k_factor),
            ("simplify_tolerance_m", self.simplify_tolerance_m),
        ] {
            ensure!(
                value.is_finite() && value > 0.0,
                InvalidConfigSnafu {
                    what,
                    why: format!("{value} must be positive"),
                }
            );
        }
        Ok(())
    }
}

/// One sensor's outcome, carried from the worker pool to union assembly.
struct SensorOutcome {
    report: SensorReport,
    /// Per target altitude, this sensor's WGS84 polygons.
    polygons: Vec<geo::MultiPolygon<f64>>,
    /// Tier-1 fingerprints of every zone, for output fingerprinting.
    zone_fingerprints: Vec<String>,
}

/// Runs the full pipeline for a set of sensors and target altitudes.
///
/// Cancellation is cooperative: already-finished sensors keep their cache
/// artifacts and outputs, the report marks the rest.
pub fn run(
    config: &RunConfig,
    dem: &dyn DemProvider,
    records: &[SensorRecord],
    target_altitudes_m: &[f64],
    cancel: &CancelToken,
) -> VantageResult<RunReport> {
    let started = Instant::now();
    config.validate().context(crate::errors::PreconditionSnafu)?;
    ensure!(
        !target_altitudes_m.is_empty(),
        crate::errors::GenericSnafu {
            err: "no target altitudes requested".to_string(),
        }
    );
    for &alt in target_altitudes_m {
        ensure!(
            alt.is_finite(),
            crate::errors::GenericSnafu {
                err: format!("target altitude {alt} is not finite"),
            }
        );
    }
    let mut altitudes = target_altitudes_m.to_vec();
    altitudes.sort_by(f64::total_cmp);
    altitudes.dedup();

    let cache = ViewshedCache::new(&config.cache_dir).map_err(|e| VantageError::GenericError {
        err: format!("opening cache: {e}"),
    })?;
    let swept = cache.cleanup_temps();
    if swept > 0 {
        info!("swept {swept} leftover temp artifact(s)");
    }
    fs::create_dir_all(&config.output_dir).map_err(|e| VantageError::GenericError {
        err: format!("creating {}: {e}", config.output_dir.display()),
    })?;

    info!(
        "processing {} sensor(s) × {} altitude(s) on {} worker(s)",
        records.len(),
        altitudes.len(),
        config.effective_workers()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.effective_workers())
        .build()
        .map_err(|e| VantageError::GenericError {
            err: format!("building worker pool: {e}"),
        })?;

    let outcomes: Vec<SensorOutcome> = pool.install(|| {
        records
            .par_iter()
            .map(|record| process_sensor(config, dem, &cache, record, &altitudes, cancel))
            .collect()
    });

    let mut report = RunReport {
        cancelled: cancel.is_cancelled()
            || outcomes.iter().any(|o| o.report.status == SensorStatus::Cancelled),
        ..Default::default()
    };

    if config.union_outputs && !cancel.is_cancelled() {
        report.union_outputs = write_unions(config, &outcomes, &altitudes);
    }

    report.sensors = outcomes.into_iter().map(|o| o.report).collect();

    // Final sweep keeps the cache free of temporaries even after failures.
    cache.cleanup_temps();
    report.elapsed = started.elapsed();
    Ok(report)
}

/// Everything for one sensor: resolve, zone, sweep or load, extract, write.
fn process_sensor(
    config: &RunConfig,
    dem: &dyn DemProvider,
    cache: &ViewshedCache,
    record: &SensorRecord,
    altitudes: &[f64],
    cancel: &CancelToken,
) -> SensorOutcome {
    let started = Instant::now();
    let fail = |phase: &str, message: String| SensorOutcome {
        report: SensorReport {
            sensor_id: record.name.clone(),
            status: SensorStatus::Failed {
                phase: phase.to_string(),
                message,
            },
            zones_computed: 0,
            zones_cached: 0,
            outputs: vec![],
            elapsed: started.elapsed(),
        },
        polygons: vec![],
        zone_fingerprints: vec![],
    };
    let cancelled = |zones_cached: usize, zones_computed: usize| SensorOutcome {
        report: SensorReport {
            sensor_id: record.name.clone(),
            status: SensorStatus::Cancelled,
            zones_computed,
            zones_cached,
            outputs: vec![],
            elapsed: started.elapsed(),
        },
        polygons: vec![],
        zone_fingerprints: vec![],
    };

    if cancel.is_cancelled() {
        return cancelled(0, 0);
    }

    // Resolve the record against the DEM.
    let mut ground = match dem.sample_point(record.lat, record.lon) {
        Ok(v) => f64::from(v),
        Err(e) => return fail("DEM fetch", e.to_string()),
    };
    if !ground.is_finite() {
        warn!("sensor {}: no DEM data at its own position, assuming sea level", record.name);
        ground = 0.0;
    }
    ground += config.geoid_offset_m;

    let sensor = match Sensor::try_new(
        record.name.clone(),
        record.lat,
        record.lon,
        record.height_m.unwrap_or(config.default_sensor_height_m),
        ground,
        record.altitude_mode.unwrap_or(AltitudeMode::RelativeToGround),
        config.atmospheric_k_factor,
    ) {
        Ok(s) => s,
        Err(e) => return fail("precondition", e.to_string()),
    };
    info!("{sensor}");

    let ellipsoid = config.earth_model.ellipsoid();
    let curvature = match EarthCurvature::new(ellipsoid, sensor.latitude_deg, sensor.refraction_k) {
        Ok(c) => c,
        Err(e) => return fail("precondition", e.to_string()),
    };
    let h_obs = sensor.effective_height_msl_m();

    // The sweep needs to reach the farthest horizon any requested altitude
    // can see, bounded by the configured range.
    let highest = altitudes.iter().copied().fold(f64::MIN, f64::max);
    let reach = horizon_for(config, &curvature, &sensor, h_obs, highest);
    let required_radius_m = reach.min(config.max_range_m());

    let zones = match plan_zones(required_radius_m, config.pixel_size_m, &config.multiscale) {
        Ok(z) => z,
        Err(e) => return fail("precondition", e.to_string()),
    };

    let orchestrator = ZoneOrchestrator {
        dem,
        cache,
        ellipsoid,
        geoid_offset_m: config.geoid_offset_m,
        memory_budget_mb: config.memory_budget_mb,
    };
    let stack = match orchestrator.mva_stack(&sensor, &zones, cancel) {
        Ok(stack) => stack,
        Err(VantageError::CancelRequested) => return cancelled(0, 0),
        Err(e) => return fail(&phase_of(&e), e.to_string()),
    };
    let zones_cached = stack.cache_hits();
    let zones_computed = stack.zones.len() - zones_cached;

    let zone_fingerprints: Vec<String> = zones
        .iter()
        .map(|z| fingerprint::sensor_fingerprint(&sensor, z, config.earth_model.name()))
        .collect();

    let proj = match AeqdProjection::new(ellipsoid, sensor.latitude_deg, sensor.longitude_deg) {
        Ok(p) => p,
        Err(e) => return fail("precondition", e.to_string()),
    };
    let extractor = MaskExtractor {
        simplify_tolerance_m: config.simplify_tolerance_m,
        min_area_m2: config.min_area_m2,
    };

    let mut outputs = Vec::new();
    let mut polygons_per_altitude = Vec::with_capacity(altitudes.len());
    for (idx, &alt) in altitudes.iter().enumerate() {
        let threshold = match config.target_altitude_reference {
            AltitudeReference::Msl => AltitudeThreshold::Msl(alt),
            AltitudeReference::Agl => AltitudeThreshold::Agl(alt),
        };
        let clip_radius_m = horizon_for(config, &curvature, &sensor, h_obs, alt)
            .min(config.max_range_m());
        let polygons = match extractor.extract(&stack, threshold, clip_radius_m, &proj) {
            Ok(p) => p,
            Err(e) => {
                warn!("sensor {}: extraction at {alt} m failed: {e}", sensor.id);
                polygons_per_altitude.push(geo::MultiPolygon::new(vec![]));
                outputs.push(OutputRecord {
                    path: config.output_dir.clone(),
                    disposition: OutputDisposition::Failed(e.to_string()),
                });
                continue;
            }
        };

        let meta = output_metadata(
            config,
            &zone_fingerprints,
            alt,
            clip_radius_m,
            std::slice::from_ref(&sensor.id),
        );
        let file_name = output::output_file_name(
            (altitudes.len() > 1).then_some(idx + 1),
            &sensor.id,
            alt,
            config.target_altitude_reference.name(),
            config.max_range_km,
            record
                .height_m
                .filter(|&h| h != config.default_sensor_height_m),
            config.output_format,
        );
        let disposition = match output::write_or_skip(
            &config.output_dir,
            &file_name,
            &polygons,
            &meta,
            &config.style,
            config.output_format,
        ) {
            Ok((path, true)) => OutputRecord { path, disposition: OutputDisposition::Written },
            Ok((path, false)) => OutputRecord {
                path,
                disposition: OutputDisposition::SkippedUpToDate,
            },
            Err(e) => OutputRecord {
                path: config.output_dir.join(&file_name),
                disposition: OutputDisposition::Failed(e.to_string()),
            },
        };
        outputs.push(disposition);
        polygons_per_altitude.push(polygons);
    }

    SensorOutcome {
        report: SensorReport {
            sensor_id: sensor.id.clone(),
            status: SensorStatus::Completed,
            zones_computed,
            zones_cached,
            outputs,
            elapsed: started.elapsed(),
        },
        polygons: polygons_per_altitude,
        zone_fingerprints,
    }
}

/// Mutual-horizon reach for one target altitude, with the AGL reference
/// anchored at the sensor's own terrain.
fn horizon_for(
    config: &RunConfig,
    curvature: &EarthCurvature,
    sensor: &Sensor,
    h_obs: f64,
    target_altitude_m: f64,
) -> f64 {
    let h_t = match config.target_altitude_reference {
        AltitudeReference::Msl => target_altitude_m,
        AltitudeReference::Agl => target_altitude_m + sensor.ground_elev_msl_m,
    };
    curvature
        .horizon_distance_m(h_obs.max(0.0), h_t.max(0.0))
        .unwrap_or(config.max_range_m())
}

fn output_metadata(
    config: &RunConfig,
    zone_fingerprints: &[String],
    target_altitude_m: f64,
    range_m: f64,
    sensor_ids: &[String],
) -> output::OutputMetadata {
    let style_fp = config.style.fingerprint();
    let fingerprint = fingerprint::output_fingerprint(
        zone_fingerprints,
        target_altitude_m,
        config.target_altitude_reference.name(),
        config.max_range_m(),
        &style_fp,
    );
    output::OutputMetadata {
        fingerprint,
        pairs: vec![
            ("sensors".to_string(), sensor_ids.join(",")),
            (
                "target_altitude_m".to_string(),
                format!("{target_altitude_m:.1}"),
            ),
            (
                "altitude_reference".to_string(),
                config.target_altitude_reference.name().to_string(),
            ),
            ("range_m".to_string(), format!("{range_m:.0}")),
            ("max_range_km".to_string(), format!("{:.1}", config.max_range_km)),
            ("earth_model".to_string(), config.earth_model.name().to_string()),
            (
                "refraction_k".to_string(),
                format!("{:.4}", config.atmospheric_k_factor),
            ),
            ("style".to_string(), fingerprint::short_fp(&style_fp).to_string()),
        ],
    }
}

/// Union assembly across sensors, one output per altitude.
fn write_unions(
    config: &RunConfig,
    outcomes: &[SensorOutcome],
    altitudes: &[f64],
) -> Vec<OutputRecord> {
    let builder = UnionBuilder {
        simplify_tolerance_m: config.simplify_tolerance_m,
    };
    let mut records = Vec::new();
    for (idx, &alt) in altitudes.iter().enumerate() {
        let inputs: Vec<crate::vector::union::SensorPolygons> = outcomes
            .iter()
            .filter(|o| o.report.status == SensorStatus::Completed)
            .filter_map(|o| {
                o.polygons
                    .get(idx)
                    .map(|p| crate::vector::union::SensorPolygons {
                        sensor_id: o.report.sensor_id.clone(),
                        polygons: p.clone(),
                    })
            })
            .collect();
        if inputs.is_empty() {
            continue;
        }
        let (merged, contributors) = builder.union(&inputs);
        if merged.0.is_empty() {
            continue;
        }
        let all_zone_fps: Vec<String> = outcomes
            .iter()
            .filter(|o| contributors.contains(&o.report.sensor_id))
            .flat_map(|o| o.zone_fingerprints.iter().cloned())
            .collect();
        let meta = output_metadata(config, &all_zone_fps, alt, config.max_range_m(), &contributors);
        let file_name = output::output_file_name(
            (altitudes.len() > 1).then_some(idx + 1),
            "union",
            alt,
            config.target_altitude_reference.name(),
            config.max_range_km,
            None,
            config.output_format,
        );
        let record = match output::write_or_skip(
            &config.output_dir,
            &file_name,
            &merged,
            &meta,
            &config.style,
            config.output_format,
        ) {
            Ok((path, true)) => OutputRecord { path, disposition: OutputDisposition::Written },
            Ok((path, false)) => OutputRecord {
                path,
                disposition: OutputDisposition::SkippedUpToDate,
            },
            Err(e) => OutputRecord {
                path: config.output_dir.join(&file_name),
                disposition: OutputDisposition::Failed(e.to_string()),
            },
        };
        records.push(record);
    }
    records
}

fn phase_of(error: &VantageError) -> String {
    match error {
        VantageError::Dem { phase, .. } | VantageError::Cache { phase, .. } => phase.to_string(),
        VantageError::Sweep { .. } => "radial sweep".to_string(),
        VantageError::Geometry { .. } => "mask extraction".to_string(),
        VantageError::Output { .. } => "output".to_string(),
        VantageError::ResourceExhausted { .. } => "memory budget".to_string(),
        VantageError::Precondition { .. } => "precondition".to_string(),
        VantageError::CancelRequested => "cancelled".to_string(),
        VantageError::GenericError { .. } => "run".to_string(),
    }
}

#[cfg(test)]
mod ut_pipeline {
    use super::*;

    #[test]
    fn config_defaults_are_sane() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_range_m(), 200_000.0);
        assert!(config.effective_workers() >= 1);
        assert_eq!(config.atmospheric_k_factor, 1.333);
    }

    #[test]
    fn config_parses_the_documented_surface() {
        let text = r#"
            cache_dir = "/tmp/vcache"
            max_workers = 3
            pixel_size_m = 60.0
            max_range_km = 150.0
            atmospheric_k_factor = 1.2
            earth_model = "WGS84"
            target_altitude_reference = "AGL"
            simplify_tolerance_m = 30.0
            union_outputs = true
            output_format = "geojson"

            [multiscale]
            enable = true
            near_m = 30000.0
            mid_m = 90000.0
            res_near_m = 30.0
            res_mid_m = 60.0
            res_far_m = 120.0

            [style]
            line_color = "ff00ff00"
            fill_color = "00ff00"
            line_width = 1.5
            fill_opacity = 0.5
        "#;
        let config: RunConfig = toml::from_str(text).unwrap();
        assert_eq!(config.max_workers, Some(3));
        assert_eq!(config.target_altitude_reference, AltitudeReference::Agl);
        assert_eq!(config.output_format, OutputFormat::Geojson);
        assert_eq!(config.multiscale.near_m, 30_000.0);
        assert_eq!(config.style.fill_opacity, 0.5);
        assert!(config.union_outputs);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = RunConfig {
            pixel_size_m: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn style_fingerprint_tracks_every_field() {
        let base = StyleConfig::default();
        let mut changed = base.clone();
        changed.fill_opacity = 0.5;
        assert_ne!(base.fingerprint(), changed.fingerprint());
        assert_eq!(base.fingerprint(), StyleConfig::default().fingerprint());
    }

    #[test]
    fn explicit_worker_count_wins() {
        let config = RunConfig {
            max_workers: Some(2),
            ..Default::default()
        };
        assert_eq!(config.effective_workers(), 2);
        let zero = RunConfig {
            max_workers: Some(0),
            ..Default::default()
        };
        assert_eq!(zero.effective_workers(), 1);
    }
}
