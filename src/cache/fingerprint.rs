/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Content fingerprints for both cache tiers.
//!
//! Tier 1 keys an MVA artifact by everything that shapes the surface and
//! nothing else. Target altitude, style, and output settings deliberately
//! stay out so one artifact serves every extraction. Parameters are rounded
//! before hashing so that noise below physical significance (a millionth of
//! a degree, a centimetre of mast) cannot split the cache.

use sha2::{Digest, Sha256};

use crate::constants::{CACHE_SCHEMA_VERSION, OUTPUT_SCHEMA_VERSION};
use crate::sensor::Sensor;
use crate::sweep::zones::Zone;

/// Tier-1 key: sensor-intrinsic parameters plus the zone geometry.
pub fn sensor_fingerprint(sensor: &Sensor, zone: &Zone, earth_model: &str) -> String {
    let canonical = format!(
        "lat={:.6};lon={:.6};ground={:.1};height={:.2};k={:.4};zr0={:.1};zr1={:.1};zpx={:.2};earth={};schema={}",
        sensor.latitude_deg,
        sensor.longitude_deg,
        sensor.ground_elev_msl_m,
        sensor.effective_height_msl_m() - sensor.ground_elev_msl_m,
        sensor.refraction_k,
        zone.r_min_m,
        zone.r_max_m,
        zone.pixel_size_m,
        earth_model,
        CACHE_SCHEMA_VERSION,
    );
    hex_digest(&canonical)
}

/// Tier-2 key: everything that shapes one emitted artifact.
pub fn output_fingerprint(
    sensor_fingerprints: &[String],
    target_altitude_m: f64,
    altitude_reference: &str,
    max_range_m: f64,
    style_fingerprint: &str,
) -> String {
    let mut sorted = sensor_fingerprints.to_vec();
    sorted.sort();
    let canonical = format!(
        "sensors={};alt={:.2};ref={};range={:.1};style={};schema={}",
        sorted.join(","),
        target_altitude_m,
        altitude_reference,
        max_range_m,
        style_fingerprint,
        OUTPUT_SCHEMA_VERSION,
    );
    hex_digest(&canonical)
}

/// Shortened key used in file names; the sidecar keeps the full digest.
pub fn short_fp(fp: &str) -> &str {
    &fp[..16.min(fp.len())]
}

pub(crate) fn hex_digest(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}
