/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

extern crate pretty_env_logger;

use std::env::{set_var, var};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};
use snafu::prelude::*;
use tabled::settings::Style as TableStyle;
use tabled::Table;

use vantage::cache::{CacheError, ViewshedCache};
use vantage::dem::{DemProvider, HgtDem, SyntheticDem};
use vantage::errors::VantageError;
use vantage::pipeline::{run, RunConfig};
use vantage::prelude::CancelToken;
use vantage::sensor::{load_sensor_records, SensorSourceError};

mod args;
use args::{Actions, Args};

const LOG_VAR: &str = "VANTAGE_LOG";

#[derive(Debug, Snafu)]
pub enum CliError {
    #[snafu(display("{source}"))]
    CliSensors { source: SensorSourceError },
    #[snafu(display("{source}"))]
    CliRun { source: VantageError },
    #[snafu(display("{source}"))]
    CliCache { source: CacheError },
    #[snafu(display("{message}"))]
    CliArgument { message: String },
}

fn main() -> ExitCode {
    if var(LOG_VAR).is_err() {
        set_var(LOG_VAR, "INFO");
    }
    if pretty_env_logger::try_init_custom_env(LOG_VAR).is_err() {
        println!("could not init logger");
    }

    let cancel = CancelToken::new();
    install_signal_handler(&cancel);

    match dispatch(Args::parse(), &cancel) {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Args, cancel: &CancelToken) -> Result<ExitCode, CliError> {
    match cli.action {
        Actions::Run {
            sensors,
            altitudes,
            config,
            dem_dir,
            flat_dem,
            missing_tiles_are_sea,
            max_range_km,
            output_dir,
            format,
            union,
        } => {
            let mut config = match config {
                Some(path) => RunConfig::from_toml_path(&path).map_err(|e| CliError::CliArgument {
                    message: e.to_string(),
                })?,
                None => RunConfig::default(),
            };
            if let Some(km) = max_range_km {
                config.max_range_km = km;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(f) = format {
                config.output_format = f;
            }
            config.union_outputs |= union;

            let dem: Box<dyn DemProvider> = match (dem_dir, flat_dem) {
                (Some(dir), _) => {
                    let provider = HgtDem::new(dir);
                    if missing_tiles_are_sea {
                        Box::new(provider.missing_tiles_are_sea())
                    } else {
                        Box::new(provider)
                    }
                }
                (None, Some(elev)) => {
                    warn!("running against a synthetic flat DEM at {elev} m");
                    Box::new(SyntheticDem::flat(elev as f32))
                }
                (None, None) => {
                    return Err(CliError::CliArgument {
                        message: "either --dem-dir or --flat-dem is required".to_string(),
                    })
                }
            };

            let records = load_sensor_records(&sensors).context(CliSensorsSnafu)?;
            info!("loaded {} sensor(s) from {}", records.len(), sensors.display());

            let report = run(&config, dem.as_ref(), &records, &altitudes, cancel)
                .context(CliRunSnafu)?;

            let table = Table::new(report.table_rows())
                .with(TableStyle::sharp())
                .to_string();
            println!("{table}");
            println!(
                "{} output(s) written, {} up to date, {:.1} s total",
                report.outputs_written(),
                report.outputs_skipped(),
                report.elapsed.as_secs_f64()
            );
            if report.cancelled {
                warn!("run cancelled; completed sensors keep their cache entries");
            }
            Ok(exit_code_from(report.exit_code()))
        }
        Actions::InspectCache { cache_dir } => {
            let cache = open_cache(cache_dir)?;
            let entries = cache.entries().context(CliCacheSnafu)?;
            if entries.is_empty() {
                println!("cache at {} is empty", cache.dir().display());
                return Ok(ExitCode::SUCCESS);
            }
            let rows: Vec<CacheRow> = entries
                .iter()
                .map(|e| CacheRow {
                    fingerprint: e.sensor_fingerprint[..16.min(e.sensor_fingerprint.len())]
                        .to_string(),
                    zone: e.zone_index,
                    radius_km: format!("{:.0}", e.outer_radius_m / 1_000.0),
                    pixel_m: format!("{:.0}", e.pixel_size_m),
                    size: format!("{}x{}", e.width, e.height),
                    created: e.created_utc.format("%Y-%m-%d %H:%M:%S").to_string(),
                })
                .collect();
            let table = Table::new(rows).with(TableStyle::sharp()).to_string();
            println!("{table}");
            Ok(ExitCode::SUCCESS)
        }
        Actions::CleanCache {
            cache_dir,
            temps_only,
        } => {
            let cache = open_cache(cache_dir)?;
            let swept = cache.cleanup_temps();
            if temps_only {
                info!("swept {swept} temp file(s)");
            } else {
                let removed = cache.clear().context(CliCacheSnafu)?;
                info!("removed {removed} cache file(s) (plus {swept} temps)");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn open_cache(cache_dir: Option<PathBuf>) -> Result<ViewshedCache, CliError> {
    let dir = cache_dir.unwrap_or_else(|| RunConfig::default().cache_dir);
    ViewshedCache::new(dir).context(CliCacheSnafu)
}

#[derive(tabled::Tabled)]
struct CacheRow {
    #[tabled(rename = "fingerprint")]
    fingerprint: String,
    #[tabled(rename = "zone")]
    zone: usize,
    #[tabled(rename = "radius [km]")]
    radius_km: String,
    #[tabled(rename = "pixel [m]")]
    pixel_m: String,
    #[tabled(rename = "grid")]
    size: String,
    #[tabled(rename = "created (UTC)")]
    created: String,
}

fn exit_code_from(code: i32) -> ExitCode {
    match code {
        0 => ExitCode::SUCCESS,
        n => ExitCode::from((n & 0xFF) as u8),
    }
}

/// First SIGINT flips the cooperative flag so the current units finish and
/// the cache stays coherent; a second one exits on the spot.
#[cfg(unix)]
fn install_signal_handler(cancel: &CancelToken) {
    use std::sync::OnceLock;
    static TOKEN: OnceLock<CancelToken> = OnceLock::new();
    let _ = TOKEN.set(cancel.clone());

    unsafe extern "C" fn on_sigint(_: libc::c_int) {
        if let Some(token) = TOKEN.get() {
            if token.cancel() {
                // Second signal: stop immediately.
                unsafe { libc::_exit(130) };
            }
        }
    }
    unsafe {
        libc::signal(libc::SIGINT, on_sigint as usize);
    }
}

#[cfg(not(unix))]
fn install_signal_handler(_cancel: &CancelToken) {}
