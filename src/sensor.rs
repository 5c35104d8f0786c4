/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Sensor placement: position, antenna height, altitude semantics, and the
//! CSV placemark source.

use core::fmt;
use core::str::FromStr;
use std::path::Path;

use serde_derive::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::errors::{
    LatitudeRangeSnafu, LongitudeRangeSnafu, NonFiniteSnafu, PreconditionError,
};

/// How a sensor's height field relates to the terrain, mirroring the altitude
/// semantics of common placemark formats.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AltitudeMode {
    /// Height field ignored for the mast base; antenna sits on the ground.
    #[default]
    ClampToGround,
    /// Height field is metres above the terrain (a mast).
    RelativeToGround,
    /// Height field is metres above mean sea level (a tower on a summit, an
    /// aerostat); terrain below is sampled but does not move the sensor.
    Absolute,
}

impl FromStr for AltitudeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clamp" | "clamptoground" | "clamp_to_ground" => Ok(Self::ClampToGround),
            "relative" | "relativetoground" | "relative_to_ground" => Ok(Self::RelativeToGround),
            "absolute" | "msl" => Ok(Self::Absolute),
            other => Err(format!("unknown altitude mode `{other}`")),
        }
    }
}

impl fmt::Display for AltitudeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClampToGround => write!(f, "clamp_to_ground"),
            Self::RelativeToGround => write!(f, "relative_to_ground"),
            Self::Absolute => write!(f, "absolute"),
        }
    }
}

/// A fully resolved sensor: the DEM has been sampled at its position and all
/// heights are reconciled. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct Sensor {
    pub id: String,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    /// Antenna height above ground (or above MSL for [AltitudeMode::Absolute]).
    pub height_m: f64,
    /// Terrain elevation at the sensor position, metres MSL.
    pub ground_elev_msl_m: f64,
    pub altitude_mode: AltitudeMode,
    pub refraction_k: f64,
}

impl Sensor {
    pub fn try_new(
        id: impl Into<String>,
        latitude_deg: f64,
        longitude_deg: f64,
        height_m: f64,
        ground_elev_msl_m: f64,
        altitude_mode: AltitudeMode,
        refraction_k: f64,
    ) -> Result<Self, PreconditionError> {
        for (what, value) in [
            ("sensor latitude", latitude_deg),
            ("sensor longitude", longitude_deg),
            ("sensor height", height_m),
            ("sensor ground elevation", ground_elev_msl_m),
            ("sensor refraction k", refraction_k),
        ] {
            ensure!(value.is_finite(), NonFiniteSnafu { what, value });
        }
        ensure!(
            latitude_deg.abs() <= 90.0,
            LatitudeRangeSnafu {
                lat_deg: latitude_deg
            }
        );
        ensure!(
            longitude_deg.abs() <= 180.0,
            LongitudeRangeSnafu {
                lon_deg: longitude_deg
            }
        );
        Ok(Self {
            id: id.into(),
            latitude_deg,
            longitude_deg,
            height_m,
            ground_elev_msl_m,
            altitude_mode,
            refraction_k,
        })
    }

    /// Antenna phase-centre altitude, metres MSL: the observer height every
    /// sight line is computed from.
    pub fn effective_height_msl_m(&self) -> f64 {
        match self.altitude_mode {
            AltitudeMode::ClampToGround | AltitudeMode::RelativeToGround => {
                self.ground_elev_msl_m + self.height_m
            }
            AltitudeMode::Absolute => self.height_m,
        }
    }

    /// Antenna height above the local terrain.
    pub fn height_agl_m(&self) -> f64 {
        self.effective_height_msl_m() - self.ground_elev_msl_m
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at ({:.6}, {:.6}), antenna {:.1} m MSL ({} above ground)",
            self.id,
            self.latitude_deg,
            self.longitude_deg,
            self.effective_height_msl_m(),
            self.height_agl_m()
        )
    }
}

/// One row of a sensor placemark file, before DEM resolution.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SensorRecord {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub height_m: Option<f64>,
    #[serde(default, deserialize_with = "de_altitude_mode")]
    pub altitude_mode: Option<AltitudeMode>,
}

fn de_altitude_mode<'de, D>(deserializer: D) -> Result<Option<AltitudeMode>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = serde::Deserialize::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SensorSourceError {
    #[snafu(display("reading {path} failed: {source}"))]
    SensorFileRead { path: String, source: csv::Error },
    #[snafu(display("{path} row {row}: {source}"))]
    SensorRowParse {
        path: String,
        row: usize,
        source: csv::Error,
    },
    #[snafu(display("{path} contains no sensors"))]
    NoSensors { path: String },
}

/// Loads sensor placemarks from a CSV file with a `name,lat,lon` header and
/// optional `height_m` and `altitude_mode` columns.
pub fn load_sensor_records(path: impl AsRef<Path>) -> Result<Vec<SensorRecord>, SensorSourceError> {
    let path_str = path.as_ref().display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path.as_ref())
        .context(SensorFileReadSnafu { path: &path_str })?;
    let mut records = Vec::new();
    for (row, result) in reader.deserialize().enumerate() {
        let record: SensorRecord = result.context(SensorRowParseSnafu {
            path: &path_str,
            // Header occupies the first line.
            row: row + 2,
        })?;
        records.push(record);
    }
    ensure!(!records.is_empty(), NoSensorsSnafu { path: &path_str });
    Ok(records)
}

#[cfg(test)]
mod ut_sensor {
    use super::*;
    use std::io::Write;

    #[test]
    fn effective_height_follows_mode() {
        let base = Sensor::try_new("s", 45.0, 7.0, 25.0, 1200.0, AltitudeMode::RelativeToGround, 1.333).unwrap();
        assert_eq!(base.effective_height_msl_m(), 1225.0);
        assert_eq!(base.height_agl_m(), 25.0);

        let absolute = Sensor {
            altitude_mode: AltitudeMode::Absolute,
            height_m: 3000.0,
            ..base.clone()
        };
        assert_eq!(absolute.effective_height_msl_m(), 3000.0);
        assert_eq!(absolute.height_agl_m(), 1800.0);

        let clamped = Sensor {
            altitude_mode: AltitudeMode::ClampToGround,
            height_m: 25.0,
            ..base
        };
        assert_eq!(clamped.effective_height_msl_m(), 1225.0);
    }

    #[test]
    fn rejects_silly_positions() {
        assert!(Sensor::try_new("s", 97.0, 0.0, 10.0, 0.0, AltitudeMode::default(), 1.333).is_err());
        assert!(Sensor::try_new("s", 0.0, 0.0, f64::NAN, 0.0, AltitudeMode::default(), 1.333).is_err());
    }

    #[test]
    fn altitude_mode_parses_aliases() {
        assert_eq!("Relative".parse::<AltitudeMode>().unwrap(), AltitudeMode::RelativeToGround);
        assert_eq!("clampToGround".parse::<AltitudeMode>().unwrap(), AltitudeMode::ClampToGround);
        assert_eq!("MSL".parse::<AltitudeMode>().unwrap(), AltitudeMode::Absolute);
        assert!("floaty".parse::<AltitudeMode>().is_err());
    }

    #[test]
    fn csv_round_trip_with_optional_columns() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "name,lat,lon,height_m,altitude_mode").unwrap();
        writeln!(f, "alpha,47.1,8.2,30,relative").unwrap();
        writeln!(f, "bravo,46.9,7.9,,").unwrap();
        f.flush().unwrap();

        let records = load_sensor_records(f.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].altitude_mode, Some(AltitudeMode::RelativeToGround));
        assert_eq!(records[0].height_m, Some(30.0));
        assert_eq!(records[1].height_m, None);
        assert_eq!(records[1].altitude_mode, None);
    }

    #[test]
    fn empty_file_is_an_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "name,lat,lon").unwrap();
        f.flush().unwrap();
        assert!(matches!(
            load_sensor_records(f.path()),
            Err(SensorSourceError::NoSensors { .. })
        ));
    }
}
