/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Per-sensor accounting of a run, rendered by the CLI.

use std::path::PathBuf;
use std::time::Duration;

use tabled::Tabled;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputDisposition {
    Written,
    /// The existing file already carries the same output fingerprint.
    SkippedUpToDate,
    Failed(String),
}

impl core::fmt::Display for OutputDisposition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Written => write!(f, "written"),
            Self::SkippedUpToDate => write!(f, "skipped (up to date)"),
            Self::Failed(why) => write!(f, "failed: {why}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct OutputRecord {
    pub path: PathBuf,
    pub disposition: OutputDisposition,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SensorStatus {
    Completed,
    Failed { phase: String, message: String },
    Cancelled,
}

impl core::fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed { phase, .. } => write!(f, "failed ({phase})"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SensorReport {
    pub sensor_id: String,
    pub status: SensorStatus,
    pub zones_computed: usize,
    pub zones_cached: usize,
    pub outputs: Vec<OutputRecord>,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub sensors: Vec<SensorReport>,
    pub union_outputs: Vec<OutputRecord>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn all_completed(&self) -> bool {
        self.sensors
            .iter()
            .all(|s| s.status == SensorStatus::Completed)
    }

    pub fn outputs_written(&self) -> usize {
        self.sensors
            .iter()
            .flat_map(|s| s.outputs.iter())
            .chain(self.union_outputs.iter())
            .filter(|o| o.disposition == OutputDisposition::Written)
            .count()
    }

    pub fn outputs_skipped(&self) -> usize {
        self.sensors
            .iter()
            .flat_map(|s| s.outputs.iter())
            .chain(self.union_outputs.iter())
            .filter(|o| o.disposition == OutputDisposition::SkippedUpToDate)
            .count()
    }

    /// Process exit code: 130 on cancellation, 2 on any failed sensor,
    /// 0 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.cancelled {
            130
        } else if self.all_completed() {
            0
        } else {
            2
        }
    }

    /// Flattens into rows the CLI can hand to its table renderer.
    pub fn table_rows(&self) -> Vec<SensorRow> {
        self.sensors
            .iter()
            .map(|s| SensorRow {
                sensor: s.sensor_id.clone(),
                status: s.status.to_string(),
                zones_cached: s.zones_cached,
                zones_computed: s.zones_computed,
                outputs: s
                    .outputs
                    .iter()
                    .filter(|o| o.disposition == OutputDisposition::Written)
                    .count(),
                skipped: s
                    .outputs
                    .iter()
                    .filter(|o| o.disposition == OutputDisposition::SkippedUpToDate)
                    .count(),
                seconds: format!("{:.1}", s.elapsed.as_secs_f64()),
            })
            .collect()
    }
}

#[derive(Tabled)]
pub struct SensorRow {
    #[tabled(rename = "sensor")]
    pub sensor: String,
    #[tabled(rename = "status")]
    pub status: String,
    #[tabled(rename = "zones cached")]
    pub zones_cached: usize,
    #[tabled(rename = "zones computed")]
    pub zones_computed: usize,
    #[tabled(rename = "outputs written")]
    pub outputs: usize,
    #[tabled(rename = "outputs skipped")]
    pub skipped: usize,
    #[tabled(rename = "time [s]")]
    pub seconds: String,
}
