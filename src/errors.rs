/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use core::fmt;
use snafu::prelude::*;
use std::io::ErrorKind as IOErrorKind;

use crate::cache::CacheError;
use crate::dem::DemError;
use crate::sweep::SweepError;
use crate::vector::GeometryError;

/// The phase of the pipeline in which an error was raised. Carried by every
/// aggregated error so per-sensor failures are attributable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunPhase {
    DemFetch,
    Reprojection,
    RadialSweep,
    CacheRead,
    CacheWrite,
    Extraction,
    Union,
    Output,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            Self::DemFetch => "DEM fetch",
            Self::Reprojection => "reprojection",
            Self::RadialSweep => "radial sweep",
            Self::CacheRead => "cache read",
            Self::CacheWrite => "cache write",
            Self::Extraction => "mask extraction",
            Self::Union => "union",
            Self::Output => "output",
        };
        write!(f, "{phase}")
    }
}

/// Raised before any work begins: the request itself is unusable.
#[derive(Clone, Debug, Snafu, PartialEq)]
#[snafu(visibility(pub))]
pub enum PreconditionError {
    #[snafu(display("{what} must be finite, got {value}"))]
    NonFinite { what: &'static str, value: f64 },
    #[snafu(display("{what} must be non-negative, got {value}"))]
    Negative { what: &'static str, value: f64 },
    #[snafu(display("latitude {lat_deg} deg is outside [-90, 90]"))]
    LatitudeRange { lat_deg: f64 },
    #[snafu(display("longitude {lon_deg} deg is outside [-180, 180]"))]
    LongitudeRange { lon_deg: f64 },
    #[snafu(display("{what}: {why}"))]
    InvalidConfig { what: &'static str, why: String },
}

/// I/O trouble on the files this toolkit owns: cache artifacts and emitted
/// viewshed outputs. DEM tiles carry their own error type in the `dem`
/// module.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum InputOutputError {
    /// The filesystem refused a read or write of an artifact or output file.
    #[snafu(display("artifact I/O failed: {kind:?}"))]
    ArtifactIo { kind: IOErrorKind },
    /// The bytes could not be produced or consumed: serialisation, mapping,
    /// or encoding trouble rather than the filesystem itself.
    #[snafu(display("artifact encoding failed"))]
    ArtifactEncoding,
}

/// Top-level error of a viewshed run. Every variant names the sensor and,
/// where meaningful, the zone and phase that failed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum VantageError {
    #[snafu(display("invalid request: {source}"))]
    Precondition { source: PreconditionError },
    #[snafu(display("sensor {sensor}, zone {zone}: {phase} failed: {source}"))]
    Dem {
        sensor: String,
        zone: usize,
        phase: RunPhase,
        source: DemError,
    },
    #[snafu(display("sensor {sensor}, zone {zone}: radial sweep failed: {source}"))]
    Sweep {
        sensor: String,
        zone: usize,
        source: SweepError,
    },
    #[snafu(display("sensor {sensor}, zone {zone}: {phase} failed: {source}"))]
    Cache {
        sensor: String,
        zone: usize,
        phase: RunPhase,
        source: CacheError,
    },
    #[snafu(display("sensor {sensor}: extracting polygons at {altitude_m} m failed: {source}"))]
    Geometry {
        sensor: String,
        altitude_m: f64,
        source: GeometryError,
    },
    #[snafu(display("writing {path} failed: {source}"))]
    Output {
        path: String,
        source: InputOutputError,
    },
    #[snafu(display(
        "sensor {sensor}, zone {zone} needs {needed_mb} MB but the budget is {budget_mb} MB; raise pixel_size_m or lower max_range_km"
    ))]
    ResourceExhausted {
        sensor: String,
        zone: usize,
        needed_mb: u64,
        budget_mb: u64,
    },
    /// Cooperative shutdown was requested; the cache is coherent.
    #[snafu(display("cancellation requested"))]
    CancelRequested,
    #[snafu(display("{err}"))]
    GenericError { err: String },
}

pub type VantageResult<T> = Result<T, VantageError>;
