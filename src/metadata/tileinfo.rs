//! Sinergise `tileInfo.json`

use chrono::{DateTime, Utc};
use geo::Polygon;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::parse_datetime;
use crate::error::MetadataError;
use crate::geometry::Geometry;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TileInfoJson {
    timestamp: String,
    #[serde(default)]
    product_name: Option<String>,
    #[serde(default)]
    product_path: Option<String>,
    #[serde(default)]
    tile_data_geometry: Option<Value>,
}

/// Tile data geometry in the tile's projected CRS
#[derive(Debug, Clone, PartialEq)]
pub struct TileDataGeometry {
    pub polygon: Polygon<f64>,
    /// EPSG code from the geometry's `crs` member, if it has one
    pub epsg: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileInfo {
    pub href: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub product_name: Option<String>,
    pub product_path: Option<String>,
    /// `None` when the tile carries no data footprint
    pub data_geometry: Option<TileDataGeometry>,
}

impl TileInfo {
    pub fn from_file(path: &Path) -> Result<Self, MetadataError> {
        let json = fs::read_to_string(path)?;
        Self::parse(&json, path)
    }

    pub fn parse(json: &str, href: &Path) -> Result<Self, MetadataError> {
        let raw: TileInfoJson = serde_json::from_str(json)?;

        let data_geometry = match raw.tile_data_geometry {
            Some(value) if has_coordinates(&value) => Some(data_geometry(value)?),
            _ => {
                debug!("{:?} has no tile data geometry", href);
                None
            }
        };

        Ok(TileInfo {
            href: href.to_path_buf(),
            timestamp: parse_datetime(&raw.timestamp)?,
            product_name: raw.product_name,
            product_path: raw.product_path,
            data_geometry,
        })
    }

    /// Product type derived from the product name
    pub fn product_type(&self) -> Option<&'static str> {
        let name = self.product_name.as_deref()?;
        if name.contains("_MSIL2A_") {
            Some("S2MSI2A")
        } else if name.contains("_MSIL1C_") {
            Some("S2MSI1C")
        } else {
            None
        }
    }

    pub fn properties(&self) -> BTreeMap<String, Value> {
        let mut props = BTreeMap::new();
        if let Some(product_type) = self.product_type() {
            props.insert("s2:product_type".to_string(), json!(product_type));
        }
        props
    }
}

/// True when `coordinates` is a non-empty array of non-empty rings
fn has_coordinates(geometry: &Value) -> bool {
    match geometry.get("coordinates").and_then(Value::as_array) {
        Some(rings) => {
            !rings.is_empty()
                && rings
                    .iter()
                    .all(|r| r.as_array().map(|a| !a.is_empty()).unwrap_or(false))
        }
        None => false,
    }
}

fn data_geometry(value: Value) -> Result<TileDataGeometry, MetadataError> {
    let epsg = value
        .pointer("/crs/properties/name")
        .and_then(Value::as_str)
        .and_then(extract_epsg_from_crs);

    let geojson: geojson::Geometry = serde_json::from_value(value)?;
    let polygon = Geometry::from_geojson(&geojson)?
        .into_polygons()
        .into_iter()
        .next()
        .ok_or(MetadataError::MissingField("tileDataGeometry"))?;

    Ok(TileDataGeometry { polygon, epsg })
}

/// Extract an EPSG code from a CRS name such as
/// `urn:ogc:def:crs:EPSG:8.8.1:32601` or `EPSG:32601`
pub fn extract_epsg_from_crs(crs: &str) -> Option<u32> {
    let patterns = [
        r"urn:ogc:def:crs:EPSG:[\d.]*:(\d+)",
        r#"AUTHORITY\["EPSG","(\d+)"\]"#,
        r#"EPSG[",:\s]+(\d+)"#,
    ];

    for pattern in &patterns {
        if let Ok(re) = regex::Regex::new(pattern) {
            if let Some(caps) = re.captures(crs) {
                if let Some(code) = caps.get(1) {
                    return code.as_str().parse().ok();
                }
            }
        }
    }

    None
}
