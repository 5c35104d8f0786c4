#![doc = include_str!("../README.md")]
/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

extern crate log;

pub mod cache;
pub mod cancel;
pub mod constants;
pub mod dem;
pub mod errors;
pub mod geodesy;
pub mod math;
pub mod pipeline;
pub mod raster;
pub mod sensor;
pub mod sweep;
pub mod vector;

pub mod prelude {
    pub use crate::cache::ViewshedCache;
    pub use crate::cancel::CancelToken;
    pub use crate::dem::{DemProvider, HgtDem, SyntheticDem};
    pub use crate::errors::{InputOutputError, VantageError, VantageResult};
    pub use crate::math::earth::{EarthCurvature, Ellipsoid};
    pub use crate::pipeline::{run, OutputFormat, RunConfig, RunReport};
    pub use crate::sensor::{load_sensor_records, AltitudeMode, Sensor, SensorRecord};
    pub use crate::sweep::zones::{plan_zones, MultiscaleConfig, Zone};
    pub use crate::sweep::MvaEngine;
    pub use std::fs::File;
}
