/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Local-directory NASADEM / SRTM `.hgt` tile provider.
//!
//! Each tile is a 1°×1° square of big-endian `i16` samples, row 0 at the
//! northern edge, named after its southwest corner (`N47W123.hgt`). The
//! sample count per axis is 3601 (1 arc-second) or 1201 (3 arc-second) and is
//! recovered from the file size. Voids (−32768) map to the no-data sentinel.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use byteorder::{BigEndian, ByteOrder};
use log::{debug, warn};
use memmap2::Mmap;
use snafu::prelude::*;

use crate::dem::{bbox_grid, CorruptTileSnafu, DemError, DemProvider, VerticalDatum};
use crate::raster::{GeoBoundingBox, GeoRaster, NO_DATA};

const HGT_VOID: i16 = -32768;

/// One loaded tile; samples stay memory-mapped.
struct Tile {
    sw_lat: i32,
    sw_lon: i32,
    samples_per_axis: usize,
    map: Mmap,
}

impl Tile {
    fn open(path: &Path, sw_lat: i32, sw_lon: i32) -> Result<Self, DemError> {
        let tile_name = tile_name(sw_lat, sw_lon);
        let file = File::open(path).map_err(|e| DemError::TileIo {
            path: path.display().to_string(),
            kind: e.kind(),
        })?;
        let map = unsafe { Mmap::map(&file) }.map_err(|e| DemError::TileIo {
            path: path.display().to_string(),
            kind: e.kind(),
        })?;
        let samples_per_axis = match map.len() {
            l if l == 3601 * 3601 * 2 => 3601,
            l if l == 1201 * 1201 * 2 => 1201,
            l => {
                return CorruptTileSnafu {
                    tile: tile_name,
                    reason: format!("unexpected size {l} bytes"),
                }
                .fail()
            }
        };
        debug!("loaded {tile_name} ({samples_per_axis}x{samples_per_axis})");
        Ok(Self {
            sw_lat,
            sw_lon,
            samples_per_axis,
            map,
        })
    }

    #[inline]
    fn raw(&self, col: usize, row: usize) -> f32 {
        let idx = (row * self.samples_per_axis + col) * 2;
        let v = BigEndian::read_i16(&self.map[idx..idx + 2]);
        if v == HGT_VOID {
            NO_DATA
        } else {
            f32::from(v)
        }
    }

    /// Bilinear sample; the caller guarantees the point is inside this tile.
    fn bilinear(&self, lat_deg: f64, lon_deg: f64) -> f32 {
        let n = (self.samples_per_axis - 1) as f64;
        let fx = (lon_deg - f64::from(self.sw_lon)) * n;
        // Row 0 is the northern edge.
        let fy = (f64::from(self.sw_lat) + 1.0 - lat_deg) * n;
        let x0 = (fx.max(0.0).floor() as usize).min(self.samples_per_axis - 2);
        let y0 = (fy.max(0.0).floor() as usize).min(self.samples_per_axis - 2);
        // Exact east/south edges land on the last sample pair.
        let tx = ((fx - x0 as f64) as f32).clamp(0.0, 1.0);
        let ty = ((fy - y0 as f64) as f32).clamp(0.0, 1.0);
        let v00 = self.raw(x0, y0);
        let v10 = self.raw(x0 + 1, y0);
        let v01 = self.raw(x0, y0 + 1);
        let v11 = self.raw(x0 + 1, y0 + 1);
        if v00.is_nan() || v10.is_nan() || v01.is_nan() || v11.is_nan() {
            return NO_DATA;
        }
        let top = v00 + (v10 - v00) * tx;
        let bottom = v01 + (v11 - v01) * tx;
        top + (bottom - top) * ty
    }
}

/// `N47W123` style stem for a southwest corner.
fn tile_name(sw_lat: i32, sw_lon: i32) -> String {
    format!(
        "{}{:02}{}{:03}",
        if sw_lat < 0 { 'S' } else { 'N' },
        sw_lat.abs(),
        if sw_lon < 0 { 'W' } else { 'E' },
        sw_lon.abs()
    )
}

/// DEM provider over a directory of `.hgt` tiles. Tiles load lazily and stay
/// mapped for the lifetime of the provider; a missing tile is an error (this
/// provider never downloads), a sea-level tile simply absent from most DEM
/// distributions is reported the same way.
pub struct HgtDem {
    dir: PathBuf,
    /// Loaded tiles by SW corner; None caches a confirmed miss.
    tiles: RwLock<HashMap<(i32, i32), Option<Arc<Tile>>>>,
    treat_missing_as_sea: bool,
}

impl HgtDem {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tiles: RwLock::new(HashMap::new()),
            treat_missing_as_sea: false,
        }
    }

    /// Ocean-spanning runs: absent tiles answer 0 m instead of failing.
    pub fn missing_tiles_are_sea(mut self) -> Self {
        self.treat_missing_as_sea = true;
        self
    }

    fn tile_for(&self, lat_deg: f64, lon_deg: f64) -> Result<Option<Arc<Tile>>, DemError> {
        let sw_lat = lat_deg.floor() as i32;
        let sw_lon = lon_deg.floor() as i32;
        if let Some(cached) = self.tiles.read().unwrap().get(&(sw_lat, sw_lon)) {
            return Ok(cached.clone());
        }
        let stem = tile_name(sw_lat, sw_lon);
        let path = self.dir.join(format!("{stem}.hgt"));
        let loaded = if path.exists() {
            Some(Arc::new(Tile::open(&path, sw_lat, sw_lon)?))
        } else if self.treat_missing_as_sea {
            warn!("tile {stem} absent under {}, assuming sea level", self.dir.display());
            None
        } else {
            return Err(DemError::TileUnavailable { tile: stem });
        };
        self.tiles
            .write()
            .unwrap()
            .insert((sw_lat, sw_lon), loaded.clone());
        Ok(loaded)
    }
}

impl DemProvider for HgtDem {
    fn ensure_coverage(&self, bbox: &GeoBoundingBox) -> Result<(), DemError> {
        let (south, north) = (bbox.south_deg.floor() as i32, bbox.north_deg.floor() as i32);
        let (west, east) = (bbox.west_deg.floor() as i32, bbox.east_deg.floor() as i32);
        for sw_lat in south..=north {
            for sw_lon in west..=east {
                self.tile_for(f64::from(sw_lat) + 0.5, f64::from(sw_lon) + 0.5)?;
            }
        }
        Ok(())
    }

    fn sample_bbox(&self, bbox: &GeoBoundingBox, resolution_m: f64) -> Result<GeoRaster, DemError> {
        let mut out = bbox_grid(bbox, resolution_m);
        for row in 0..out.height {
            let lat = out.north_deg - row as f64 * out.lat_step_deg;
            for col in 0..out.width {
                let lon = out.west_deg + col as f64 * out.lon_step_deg;
                let v = match self.tile_for(lat, lon)? {
                    Some(tile) => tile.bilinear(lat, lon),
                    None => 0.0,
                };
                out.set(col, row, v);
            }
        }
        Ok(out)
    }

    fn sample_point(&self, lat_deg: f64, lon_deg: f64) -> Result<f32, DemError> {
        match self.tile_for(lat_deg, lon_deg)? {
            Some(tile) => Ok(tile.bilinear(lat_deg, lon_deg)),
            None => Ok(0.0),
        }
    }

    fn vertical_datum(&self) -> VerticalDatum {
        VerticalDatum::Egm96
    }
}
