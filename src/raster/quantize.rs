/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Lossy u16 packing of altitude planes for persistence: 0.5 m steps over
//! 0 to 32 767 m, with 65535 reserved for no-data / never-visible. Values below
//! zero clamp to zero; the quantisation error is at most a quarter metre,
//! well under DEM accuracy.

use crate::constants::{MVA_QUANT_MAX_M, MVA_QUANT_NODATA, MVA_QUANT_SCALE_M};
use crate::raster::is_no_data;

/// Packs one altitude sample. Non-finite values (no-data and the +∞
/// never-visible sentinel alike) map to the no-data code.
#[inline]
pub fn quantize(value_m: f32) -> u16 {
    if !value_m.is_finite() {
        return MVA_QUANT_NODATA;
    }
    let clamped = (value_m as f64).clamp(0.0, MVA_QUANT_MAX_M);
    let code = (clamped / MVA_QUANT_SCALE_M).round() as u32;
    // 32767 / 0.5 = 65534 < the no-data code.
    code.min(u32::from(MVA_QUANT_NODATA) - 1) as u16
}

/// Unpacks one sample, restoring `no_data_as` for the reserved code.
#[inline]
pub fn dequantize(code: u16, no_data_as: f32) -> f32 {
    if code == MVA_QUANT_NODATA {
        no_data_as
    } else {
        (f64::from(code) * MVA_QUANT_SCALE_M) as f32
    }
}

pub fn quantize_plane(plane: &[f32]) -> Vec<u16> {
    plane.iter().copied().map(quantize).collect()
}

pub fn dequantize_plane(codes: &[u16], no_data_as: f32) -> Vec<f32> {
    codes.iter().map(|&c| dequantize(c, no_data_as)).collect()
}
