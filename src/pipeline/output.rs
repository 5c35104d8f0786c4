/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Output sinks: KML and GeoJSON writers that embed the Tier-2 output
//! fingerprint, plus the documented file naming pattern and the skip check.
//!
//! The fingerprint is embedded in the same write as the polygons, never a
//! sidecar, so an artifact and its skip marker cannot drift apart.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use geo::MultiPolygon;
use kml::types::{
    Coord as KmlCoord, Element, LineStyle, LinearRing, MultiGeometry, Placemark, PolyStyle,
    Polygon as KmlPolygon, Style,
};
use kml::{Kml, KmlDocument, KmlWriter};
use log::{debug, warn};
use serde_derive::{Deserialize, Serialize};

use crate::errors::{InputOutputError, VantageError};
use crate::pipeline::StyleConfig;

/// Key under which GeoJSON outputs carry their metadata block.
const GEOJSON_META_KEY: &str = "vantage_meta";
/// `<Data>` name under which KML outputs carry the raw hash.
const FINGERPRINT_KEY: &str = "output_fingerprint";

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Kml,
    Geojson,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Kml => "kml",
            Self::Geojson => "geojson",
        }
    }
}

impl core::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kml" => Ok(Self::Kml),
            "geojson" | "json" => Ok(Self::Geojson),
            other => Err(format!("unknown output format `{other}`")),
        }
    }
}

/// Everything embedded alongside the polygons: the raw hash plus the
/// human-readable parameters it was derived from.
#[derive(Clone, Debug)]
pub struct OutputMetadata {
    pub fingerprint: String,
    pub pairs: Vec<(String, String)>,
}

/// Builds the documented output file name:
/// `[NN_]viewshed-<scope>-tgt_alt_<m>_<ref>-det_rng_<km>[-sh_<m>].<ext>`.
pub fn output_file_name(
    sort_prefix: Option<usize>,
    scope: &str,
    target_altitude_m: f64,
    reference: &str,
    range_km: f64,
    sensor_height_m: Option<f64>,
    format: OutputFormat,
) -> String {
    let mut name = String::new();
    if let Some(n) = sort_prefix {
        name.push_str(&format!("{n:02}_"));
    }
    name.push_str(&format!(
        "viewshed-{}-tgt_alt_{}_{reference}-det_rng_{}",
        sanitize(scope),
        trim_float(target_altitude_m),
        trim_float(range_km),
    ));
    if let Some(h) = sensor_height_m {
        name.push_str(&format!("-sh_{}", trim_float(h)));
    }
    name.push('.');
    name.push_str(format.extension());
    name
}

fn sanitize(scope: &str) -> String {
    scope
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// `100` not `100.0`, but `12.5` stays `12.5`.
fn trim_float(v: f64) -> String {
    if (v - v.round()).abs() < 1e-9 {
        format!("{}", v.round() as i64)
    } else {
        format!("{v:.1}")
    }
}

/// Writes polygons with embedded metadata, atomically.
pub fn write_output(
    path: &Path,
    polygons: &MultiPolygon<f64>,
    meta: &OutputMetadata,
    style: &StyleConfig,
    format: OutputFormat,
) -> Result<(), VantageError> {
    let body = match format {
        OutputFormat::Geojson => geojson_body(polygons, meta),
        OutputFormat::Kml => kml_body(polygons, meta, style),
    }
    .map_err(|e| VantageError::Output {
        path: path.display().to_string(),
        source: e,
    })?;

    let tmp = path.with_file_name(format!(
        "{}{}{}",
        path.file_name().unwrap_or_default().to_string_lossy(),
        crate::constants::TEMP_INFIX,
        std::process::id()
    ));
    let io_err = |e: std::io::Error| VantageError::Output {
        path: path.display().to_string(),
        source: InputOutputError::ArtifactIo { kind: e.kind() },
    };
    fs::write(&tmp, body.as_bytes()).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;
    debug!("wrote {}", path.display());
    Ok(())
}

/// The Tier-2 skip check: does the file at `path` already carry this
/// fingerprint? Missing, unreadable, or stale answers are all "no".
pub fn existing_output_matches(path: &Path, expected_fingerprint: &str) -> bool {
    if !path.exists() {
        return false;
    }
    match embedded_fingerprint(path) {
        Some(found) if found == expected_fingerprint => true,
        Some(_) => {
            debug!("{} exists but is stale", path.display());
            false
        }
        None => {
            warn!(
                "{} exists but carries no readable fingerprint; regenerating",
                path.display()
            );
            false
        }
    }
}

/// Extracts the embedded fingerprint from an output artifact, if any.
pub fn embedded_fingerprint(path: &Path) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    match path.extension()?.to_str()? {
        "geojson" | "json" => {
            let gj: geojson::GeoJson = text.parse().ok()?;
            let geojson::GeoJson::FeatureCollection(fc) = gj else {
                return None;
            };
            let meta = fc.foreign_members?.get(GEOJSON_META_KEY)?.clone();
            meta.get(FINGERPRINT_KEY)?.as_str().map(str::to_string)
        }
        "kml" => {
            let parsed: Kml<f64> = text.parse().ok()?;
            fingerprint_in_kml(&parsed)
        }
        _ => None,
    }
}

fn geojson_body(
    polygons: &MultiPolygon<f64>,
    meta: &OutputMetadata,
) -> Result<String, InputOutputError> {
    let geometry = geojson::Geometry::new(geojson::Value::from(polygons));
    let mut properties = serde_json::Map::new();
    for (k, v) in &meta.pairs {
        properties.insert(k.clone(), serde_json::Value::String(v.clone()));
    }
    let feature = geojson::Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    };
    let mut meta_obj = serde_json::Map::new();
    for (k, v) in &meta.pairs {
        meta_obj.insert(k.clone(), serde_json::Value::String(v.clone()));
    }
    meta_obj.insert(
        FINGERPRINT_KEY.to_string(),
        serde_json::Value::String(meta.fingerprint.clone()),
    );
    let mut foreign = serde_json::Map::new();
    foreign.insert(GEOJSON_META_KEY.to_string(), serde_json::Value::Object(meta_obj));
    let collection = geojson::FeatureCollection {
        bbox: None,
        features: vec![feature],
        foreign_members: Some(foreign),
    };
    serde_json::to_string_pretty(&geojson::GeoJson::from(collection))
        .map_err(|_| InputOutputError::ArtifactEncoding)
}

fn kml_body(
    polygons: &MultiPolygon<f64>,
    meta: &OutputMetadata,
    style: &StyleConfig,
) -> Result<String, InputOutputError> {
    let geometries: Vec<kml::types::Geometry> = polygons
        .0
        .iter()
        .map(|poly| {
            let outer = ring_to_kml(poly.exterior());
            let inner = poly.interiors().iter().map(ring_to_kml).collect();
            kml::types::Geometry::Polygon(KmlPolygon::new(outer, inner))
        })
        .collect();

    let placemark = Placemark {
        name: Some("viewshed".to_string()),
        description: None,
        geometry: Some(kml::types::Geometry::MultiGeometry(MultiGeometry {
            geometries,
            ..Default::default()
        })),
        children: vec![Element {
            name: "styleUrl".to_string(),
            content: Some("#viewshed".to_string()),
            ..Default::default()
        }],
        ..Default::default()
    };

    let style_element = Style {
        id: Some("viewshed".to_string()),
        line: Some(LineStyle {
            color: style.line_color.clone(),
            width: style.line_width,
            ..Default::default()
        }),
        poly: Some(PolyStyle {
            color: kml_fill_color(&style.fill_color, style.fill_opacity),
            fill: true,
            outline: true,
            ..Default::default()
        }),
        ..Default::default()
    };

    let document = Kml::Document {
        attrs: HashMap::new(),
        elements: vec![
            Kml::Style(style_element),
            Kml::Element(extended_data(meta)),
            Kml::Placemark(placemark),
        ],
    };
    let kml = Kml::KmlDocument(KmlDocument {
        elements: vec![document],
        ..Default::default()
    });

    let mut buf = Vec::new();
    let mut writer = KmlWriter::<_, f64>::from_writer(&mut buf);
    writer.write(&kml).map_err(|_| InputOutputError::ArtifactEncoding)?;
    String::from_utf8(buf).map_err(|_| InputOutputError::ArtifactEncoding)
}

fn ring_to_kml(ring: &geo::LineString<f64>) -> LinearRing<f64> {
    LinearRing {
        coords: ring
            .0
            .iter()
            .map(|c| KmlCoord { x: c.x, y: c.y, z: None })
            .collect(),
        ..Default::default()
    }
}

/// KML colors are aabbggrr; the configured fill is bbggrr with the opacity
/// folded into the alpha byte.
fn kml_fill_color(fill_bbggrr: &str, opacity: f64) -> String {
    let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
    format!("{alpha:02x}{fill_bbggrr}")
}

/// `<ExtendedData>` block carrying every fingerprint parameter plus the hash.
fn extended_data(meta: &OutputMetadata) -> Element {
    let mut children: Vec<Element> = meta
        .pairs
        .iter()
        .map(|(k, v)| data_element(k, v))
        .collect();
    children.push(data_element(FINGERPRINT_KEY, &meta.fingerprint));
    Element {
        name: "ExtendedData".to_string(),
        children,
        ..Default::default()
    }
}

fn data_element(key: &str, value: &str) -> Element {
    Element {
        name: "Data".to_string(),
        attrs: HashMap::from([("name".to_string(), key.to_string())]),
        children: vec![Element {
            name: "value".to_string(),
            content: Some(value.to_string()),
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn fingerprint_in_kml(kml: &Kml<f64>) -> Option<String> {
    match kml {
        Kml::KmlDocument(doc) => doc.elements.iter().find_map(fingerprint_in_kml),
        Kml::Document { elements, .. } => elements.iter().find_map(fingerprint_in_kml),
        Kml::Folder(folder) => folder.elements.iter().find_map(fingerprint_in_kml),
        Kml::Placemark(p) => p.children.iter().find_map(fingerprint_in_element),
        Kml::Element(e) => fingerprint_in_element(e),
        _ => None,
    }
}

fn fingerprint_in_element(element: &Element) -> Option<String> {
    if element.name == "Data"
        && element.attrs.get("name").map(String::as_str) == Some(FINGERPRINT_KEY)
    {
        return element
            .children
            .iter()
            .find(|c| c.name == "value")
            .and_then(|c| c.content.clone());
    }
    element.children.iter().find_map(fingerprint_in_element)
}

/// Convenience wrapper used by the pipeline: skip when up to date, write
/// otherwise.
pub fn write_or_skip(
    out_dir: &Path,
    file_name: &str,
    polygons: &MultiPolygon<f64>,
    meta: &OutputMetadata,
    style: &StyleConfig,
    format: OutputFormat,
) -> Result<(PathBuf, bool), VantageError> {
    let path = out_dir.join(file_name);
    if existing_output_matches(&path, &meta.fingerprint) {
        log::info!("{} is up to date, skipping", path.display());
        return Ok((path, false));
    }
    write_output(&path, polygons, meta, style, format)?;
    Ok((path, true))
}
