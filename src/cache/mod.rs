/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Tier-1 viewshed cache: a content-addressed store of MVA artifacts under
//! `<cache_dir>/viewsheds/`.
//!
//! One artifact per sensor-and-zone, keyed by the sensor fingerprint. The
//! on-disk format is a small header (magic, schema version, CRC32 of the
//! compressed payload) followed by a gzipped bincode body. Integrity is
//! checked on every load; any failure (bad magic, old schema, CRC mismatch,
//! truncation) is treated as a cache miss and recomputed, never surfaced as
//! an error. Writes go through a temp file, fsync, and an atomic rename, so
//! concurrent readers only ever see whole artifacts; on identical keys the
//! last writer wins.

pub mod fingerprint;

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info, warn};
use serde_derive::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::constants::{
    CACHE_SCHEMA_VERSION, MVA_NEVER_VISIBLE, TEMP_INFIX, VIEWSHED_CACHE_SUBDIR,
};
use crate::errors::InputOutputError;
use crate::geodesy::AeqdProjection;
use crate::raster::quantize::{dequantize_plane, quantize_plane};
use crate::raster::{AeqdRaster, GridSpec, NO_DATA};
use crate::sweep::zones::Zone;
use crate::sweep::SweepOutput;

const MAGIC: &[u8; 4] = b"VSHD";
const HEADER_LEN: usize = 12;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CacheError {
    #[snafu(display("cache I/O on {path}: {kind:?}"))]
    CacheIo {
        path: String,
        kind: std::io::ErrorKind,
    },
    #[snafu(display("artifact {path} is corrupt: {reason}"))]
    CorruptArtifact { path: String, reason: String },
    #[snafu(display("encoding artifact failed: {reason}"))]
    EncodeArtifact { reason: String },
}

fn io_ctx(path: &Path) -> impl Fn(std::io::Error) -> CacheError + '_ {
    move |e| CacheError::CacheIo {
        path: path.display().to_string(),
        kind: e.kind(),
    }
}

/// Maps an artifact file and copies it onto the heap before decoding.
/// Artifacts are a few megabytes compressed, and writers only ever replace
/// the path by rename, never the mapped inode, so the copy is coherent even
/// next to a concurrent store.
fn artifact_bytes(path: &Path) -> Result<Bytes, InputOutputError> {
    let file = File::open(path).map_err(|e| InputOutputError::ArtifactIo { kind: e.kind() })?;
    let map = unsafe { memmap2::MmapOptions::new().map(&file) }
        .map_err(|_| InputOutputError::ArtifactEncoding)?;
    Ok(Bytes::copy_from_slice(&map))
}

/// A persisted MVA surface for one sensor and zone, plus the rim horizon
/// state that would let the surface be extended outward later.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewshedArtifact {
    pub schema_version: u32,
    pub sensor_fingerprint: String,
    pub zone: Zone,
    /// GDAL-style pixel affine of the grid both planes live on.
    pub affine: [f64; 6],
    /// Projection definition of the sensor-centred frame.
    pub crs: String,
    pub width: usize,
    pub height: usize,
    pub outer_radius_m: f64,
    /// Minimum visible altitude, quantised; no-data = never visible.
    pub mva_q: Vec<u16>,
    /// Ground elevation, quantised; kept so above-ground-level thresholds
    /// never need the DEM again.
    pub ground_q: Vec<u16>,
    /// Rim horizon angles at the fixed persisted resolution, radians.
    pub boundary_horizon: Vec<f32>,
    /// Ray count the boundary was computed with; below the persisted
    /// resolution, neighbouring bins repeat a ray.
    pub boundary_native_azimuths: u32,
}

impl ViewshedArtifact {
    pub fn from_sweep(
        sensor_fingerprint: &str,
        zone: Zone,
        proj: &AeqdProjection,
        sweep: &SweepOutput,
        ground: &AeqdRaster,
    ) -> Self {
        let grid = sweep.mva.grid;
        Self {
            schema_version: CACHE_SCHEMA_VERSION,
            sensor_fingerprint: sensor_fingerprint.to_string(),
            zone,
            affine: grid.affine(),
            crs: proj.definition(),
            width: grid.width,
            height: grid.height,
            outer_radius_m: zone.r_max_m,
            mva_q: quantize_plane(&sweep.mva.data),
            ground_q: quantize_plane(&ground.data),
            boundary_horizon: sweep.boundary_horizon.clone(),
            boundary_native_azimuths: sweep.n_azimuths as u32,
        }
    }

    pub fn grid(&self) -> GridSpec {
        GridSpec::from_affine(self.affine, self.width, self.height)
    }

    pub fn mva_raster(&self) -> AeqdRaster {
        AeqdRaster {
            grid: self.grid(),
            data: dequantize_plane(&self.mva_q, MVA_NEVER_VISIBLE),
        }
    }

    pub fn ground_raster(&self) -> AeqdRaster {
        AeqdRaster {
            grid: self.grid(),
            data: dequantize_plane(&self.ground_q, NO_DATA),
        }
    }

    /// Serialises to the on-disk format.
    pub fn encode(&self) -> Result<Vec<u8>, CacheError> {
        let body = bincode::serialize(self).map_err(|e| CacheError::EncodeArtifact {
            reason: e.to_string(),
        })?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&body)
            .and_then(|()| encoder.finish())
            .map(|compressed| {
                let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
                out.extend_from_slice(MAGIC);
                out.extend_from_slice(&CACHE_SCHEMA_VERSION.to_le_bytes());
                out.extend_from_slice(&crc32fast::hash(&compressed).to_le_bytes());
                out.extend_from_slice(&compressed);
                out
            })
            .map_err(|e| CacheError::EncodeArtifact {
                reason: e.to_string(),
            })
    }

    /// Parses and integrity-checks the on-disk format.
    pub fn decode(bytes: &[u8], path: &Path) -> Result<Self, CacheError> {
        let corrupt = |reason: String| CacheError::CorruptArtifact {
            path: path.display().to_string(),
            reason,
        };
        ensure!(
            bytes.len() > HEADER_LEN,
            CorruptArtifactSnafu {
                path: path.display().to_string(),
                reason: format!("{} bytes is too short", bytes.len()),
            }
        );
        ensure!(
            &bytes[..4] == MAGIC,
            CorruptArtifactSnafu {
                path: path.display().to_string(),
                reason: "bad magic".to_string(),
            }
        );
        let schema = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        ensure!(
            schema == CACHE_SCHEMA_VERSION,
            CorruptArtifactSnafu {
                path: path.display().to_string(),
                reason: format!("schema {schema}, expected {CACHE_SCHEMA_VERSION}"),
            }
        );
        let expected_crc = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let payload = &bytes[HEADER_LEN..];
        let computed = crc32fast::hash(payload);
        ensure!(
            computed == expected_crc,
            CorruptArtifactSnafu {
                path: path.display().to_string(),
                reason: format!("CRC32 {computed:#010x}, expected {expected_crc:#010x}"),
            }
        );
        let mut body = Vec::new();
        GzDecoder::new(payload)
            .read_to_end(&mut body)
            .map_err(|e| corrupt(format!("decompression failed: {e}")))?;
        bincode::deserialize(&body).map_err(|e| corrupt(format!("deserialisation failed: {e}")))
    }
}

/// Human-readable sidecar written next to every artifact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactSidecar {
    pub schema_version: u32,
    pub sensor_fingerprint: String,
    pub zone_index: usize,
    pub r_min_m: f64,
    pub r_max_m: f64,
    pub pixel_size_m: f64,
    pub outer_radius_m: f64,
    pub width: usize,
    pub height: usize,
    pub created_utc: DateTime<Utc>,
}

impl ArtifactSidecar {
    fn of(artifact: &ViewshedArtifact) -> Self {
        Self {
            schema_version: artifact.schema_version,
            sensor_fingerprint: artifact.sensor_fingerprint.clone(),
            zone_index: artifact.zone.index,
            r_min_m: artifact.zone.r_min_m,
            r_max_m: artifact.zone.r_max_m,
            pixel_size_m: artifact.zone.pixel_size_m,
            outer_radius_m: artifact.outer_radius_m,
            width: artifact.width,
            height: artifact.height,
            created_utc: Utc::now(),
        }
    }
}

/// The Tier-1 store.
pub struct ViewshedCache {
    dir: PathBuf,
}

impl ViewshedCache {
    /// Opens (and creates if needed) the viewshed store under `cache_dir`.
    pub fn new(cache_dir: impl AsRef<Path>) -> Result<Self, CacheError> {
        let dir = cache_dir.as_ref().join(VIEWSHED_CACHE_SUBDIR);
        fs::create_dir_all(&dir).map_err(io_ctx(&dir))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn artifact_path(&self, fp: &str, zone_index: usize) -> PathBuf {
        self.dir
            .join(format!("{}_{zone_index}.vshd", fingerprint::short_fp(fp)))
    }

    fn sidecar_path(&self, fp: &str, zone_index: usize) -> PathBuf {
        self.dir
            .join(format!("{}_{zone_index}.json", fingerprint::short_fp(fp)))
    }

    /// Fetches an artifact by key. Corruption of any kind logs a warning and
    /// reads as a miss; this tier never fails a run over a bad cache file.
    pub fn lookup(&self, fp: &str, zone_index: usize) -> Result<Option<ViewshedArtifact>, CacheError> {
        let path = self.artifact_path(fp, zone_index);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = match artifact_bytes(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("unreadable artifact {} ({e}); recomputing", path.display());
                return Ok(None);
            }
        };
        match ViewshedArtifact::decode(&bytes, &path) {
            Ok(artifact) if artifact.sensor_fingerprint == fp => Ok(Some(artifact)),
            Ok(_) => {
                warn!(
                    "artifact {} belongs to a different fingerprint (short-key collision); recomputing",
                    path.display()
                );
                Ok(None)
            }
            Err(e) => {
                warn!("{e}; recomputing");
                Ok(None)
            }
        }
    }

    /// Persists an artifact atomically: temp file, fsync, rename. An
    /// existing entry is only replaced when the new outer radius is at least
    /// as large.
    pub fn store(&self, artifact: &ViewshedArtifact) -> Result<PathBuf, CacheError> {
        let fp = &artifact.sensor_fingerprint;
        let path = self.artifact_path(fp, artifact.zone.index);
        if let Some(existing) = self.read_sidecar(fp, artifact.zone.index) {
            if existing.outer_radius_m > artifact.outer_radius_m {
                debug!(
                    "keeping {} ({:.0} m outer radius >= {:.0} m)",
                    path.display(),
                    existing.outer_radius_m,
                    artifact.outer_radius_m
                );
                return Ok(path);
            }
        }

        let bytes = artifact.encode()?;
        write_atomic(&path, &bytes)?;
        let sidecar = serde_json::to_vec_pretty(&ArtifactSidecar::of(artifact)).map_err(|e| {
            CacheError::EncodeArtifact {
                reason: e.to_string(),
            }
        })?;
        write_atomic(&self.sidecar_path(fp, artifact.zone.index), &sidecar)?;
        info!(
            "cached zone {} for {} ({} bytes)",
            artifact.zone.index,
            fingerprint::short_fp(fp),
            bytes.len()
        );
        Ok(path)
    }

    fn read_sidecar(&self, fp: &str, zone_index: usize) -> Option<ArtifactSidecar> {
        let bytes = fs::read(self.sidecar_path(fp, zone_index)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Lists every sidecar in the store, for inspection tooling.
    pub fn entries(&self) -> Result<Vec<ArtifactSidecar>, CacheError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_ctx(&self.dir))? {
            let entry = entry.map_err(io_ctx(&self.dir))?;
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Ok(bytes) = fs::read(&path) {
                    if let Ok(sidecar) = serde_json::from_slice::<ArtifactSidecar>(&bytes) {
                        out.push(sidecar);
                    }
                }
            }
        }
        out.sort_by(|a, b| {
            (&a.sensor_fingerprint, a.zone_index).cmp(&(&b.sensor_fingerprint, b.zone_index))
        });
        Ok(out)
    }

    /// Removes leftover temp files from interrupted writes. Returns how many
    /// were swept.
    pub fn cleanup_temps(&self) -> usize {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return 0;
        };
        let mut swept = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().contains(TEMP_INFIX) {
                if fs::remove_file(entry.path()).is_ok() {
                    debug!("swept {}", entry.path().display());
                    swept += 1;
                }
            }
        }
        swept
    }

    /// Deletes every artifact and sidecar. Returns how many files went away.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir).map_err(io_ctx(&self.dir))? {
            let entry = entry.map_err(io_ctx(&self.dir))?;
            fs::remove_file(entry.path()).map_err(io_ctx(&entry.path()))?;
            removed += 1;
        }
        Ok(removed)
    }
}

/// Temp file, fsync, rename: readers never observe a partial artifact.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let tmp = path.with_file_name(format!(
        "{}{}{}",
        path.file_name().unwrap_or_default().to_string_lossy(),
        TEMP_INFIX,
        std::process::id()
    ));
    let mut file = File::create(&tmp).map_err(io_ctx(&tmp))?;
    file.write_all(bytes).map_err(io_ctx(&tmp))?;
    file.sync_all().map_err(io_ctx(&tmp))?;
    drop(file);
    fs::rename(&tmp, path).map_err(io_ctx(path))?;
    Ok(())
}
