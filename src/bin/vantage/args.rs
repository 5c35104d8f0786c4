/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vantage::pipeline::OutputFormat;

#[derive(Parser, Debug)]
#[clap(name = "VANTAGE", author = "The VANTAGE contributors", version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub action: Actions,
}

#[derive(Debug, Subcommand)]
pub enum Actions {
    /// Compute viewsheds for every sensor in a placemark file
    Run {
        /// CSV placemark file: name,lat,lon[,height_m[,altitude_mode]]
        #[clap(long)]
        sensors: PathBuf,
        /// Target altitudes, metres; repeat for multiple surfaces
        #[clap(long = "altitude", required = true)]
        altitudes: Vec<f64>,
        /// TOML configuration file; defaults apply when omitted
        #[clap(long)]
        config: Option<PathBuf>,
        /// Directory of NASADEM/SRTM .hgt tiles
        #[clap(long, conflicts_with = "flat_dem")]
        dem_dir: Option<PathBuf>,
        /// Synthetic flat terrain at this elevation (no DEM needed)
        #[clap(long)]
        flat_dem: Option<f64>,
        /// Treat missing .hgt tiles as sea level instead of failing
        #[clap(long)]
        missing_tiles_are_sea: bool,
        /// Override the configured maximum range
        #[clap(long)]
        max_range_km: Option<f64>,
        /// Override the configured output directory
        #[clap(long)]
        output_dir: Option<PathBuf>,
        /// Override the configured output format (kml or geojson)
        #[clap(long)]
        format: Option<OutputFormat>,
        /// Also write one merged polygon set per altitude
        #[clap(long)]
        union: bool,
    },
    /// List cached MVA artifacts
    InspectCache {
        /// Cache directory (the configured default when omitted)
        #[clap(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Remove cached MVA artifacts
    CleanCache {
        /// Cache directory (the configured default when omitted)
        #[clap(long)]
        cache_dir: Option<PathBuf>,
        /// Only sweep leftover temporary files
        #[clap(long)]
        temps_only: bool,
    },
}
