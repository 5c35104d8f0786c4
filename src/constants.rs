/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// WGS84 semi-major (equatorial) axis, in meters.
pub const WGS84_SEMI_MAJOR_M: f64 = 6_378_137.0;

/// WGS84 polar axis, in meters.
pub const WGS84_POLAR_RADIUS_M: f64 = 6_356_752.314_245;

/// Standard atmospheric refraction factor applied to the Earth radius ("4/3 Earth").
pub const DEFAULT_K_FACTOR: f64 = 1.333;

/// Number of azimuth bins in a persisted boundary horizon (0.025 degree resolution).
pub const N_BOUNDARY_AZ: usize = 14_400;

/// Upper bound on the number of rays swept in a single zone.
pub const MAX_SWEEP_AZIMUTHS: usize = 14_400;

/// A zone must span at least this many pixels along its radius, otherwise the
/// far field would be under-sampled and ridgelines would alias away.
pub const MIN_PIXELS_PER_RADIUS: f64 = 64.0;

/// Sentinel for "never visible at any altitude within numeric range".
pub const MVA_NEVER_VISIBLE: f32 = f32::INFINITY;

/// Quantisation step of persisted minimum-visible-altitude planes, in meters.
pub const MVA_QUANT_SCALE_M: f64 = 0.5;

/// Largest altitude representable by the quantised planes, in meters.
pub const MVA_QUANT_MAX_M: f64 = 32_767.0;

/// Quantised no-data / never-visible marker.
pub const MVA_QUANT_NODATA: u16 = u16::MAX;

/// Bumping this invalidates every Tier-1 artifact (it participates in the key).
pub const CACHE_SCHEMA_VERSION: u32 = 2;

/// Participates in every Tier-2 output fingerprint.
pub const OUTPUT_SCHEMA_VERSION: u32 = 1;

/// Fraction of a zone at which no-data DEM samples stop being a curiosity and
/// become a logged warning.
pub const NO_DATA_WARN_FRACTION: f64 = 0.05;

/// Default in-process memory budget for a single zone computation.
pub const DEFAULT_MEMORY_BUDGET_MB: u64 = 4_096;

/// Name under the cache directory where MVA artifacts live.
pub const VIEWSHED_CACHE_SUBDIR: &str = "viewsheds";

/// Infix marking a partially-written artifact; swept on startup and shutdown.
pub const TEMP_INFIX: &str = ".tmp.";
