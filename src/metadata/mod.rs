//! Readers for Sentinel-2 scene metadata
//!
//! Two on-disk layouts are supported:
//!
//! - **SAFE**: a `*.SAFE` directory with `MTD_MSIL1C.xml`/`MTD_MSIL2A.xml` at
//!   its root and one granule under `GRANULE/<id>/MTD_TL.xml`. The footprint
//!   is the product's geographic `EXT_POS_LIST`.
//! - **Sinergise**: a tile directory holding `metadata.xml`, `tileInfo.json`
//!   and optionally `product_metadata.xml`. The footprint is the tile data
//!   geometry in the tile's UTM zone.

pub mod granule;
pub mod product;
pub mod tileinfo;
pub mod xml;

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

pub use granule::{GranuleMetadata, ViewingAngle};
pub use product::ProductMetadata;
pub use tileinfo::TileInfo;

use crate::error::MetadataError;
use crate::geometry::pipeline::FootprintSource;
use crate::geometry::round_to;

pub const PRODUCT_METADATA_ASSET_KEY: &str = "product_metadata";
pub const GRANULE_METADATA_ASSET_KEY: &str = "granule_metadata";
pub const TILEINFO_METADATA_ASSET_KEY: &str = "tileinfo_metadata";
pub const SAFE_MANIFEST_ASSET_KEY: &str = "safe_manifest";
pub const INSPIRE_METADATA_ASSET_KEY: &str = "inspire_metadata";
pub const DATASTRIP_METADATA_ASSET_KEY: &str = "datastrip_metadata";

const XML_MEDIA_TYPE: &str = "application/xml";
const JSON_MEDIA_TYPE: &str = "application/json";

/// Band name for a zero-based Sentinel-2 band index (`8` is `B8A`)
pub fn band_name(index: usize) -> Option<String> {
    match index {
        0..=7 => Some(format!("B0{}", index + 1)),
        8 => Some("B8A".to_string()),
        9..=12 => Some(format!("B{:02}", index)),
        _ => None,
    }
}

pub(crate) fn parse_number<T: FromStr>(text: &str) -> Result<T, MetadataError> {
    text.trim()
        .parse()
        .map_err(|_| MetadataError::Parse(format!("invalid number {:?}", text)))
}

pub(crate) fn parse_datetime(text: &str) -> Result<DateTime<Utc>, MetadataError> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MetadataError::Parse(format!("invalid timestamp {:?}: {}", text, e)))
}

/// A metadata sidecar file exposed as an item asset
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataAsset {
    pub href: PathBuf,
    pub media_type: &'static str,
}

impl MetadataAsset {
    fn xml(href: PathBuf) -> Self {
        MetadataAsset {
            href,
            media_type: XML_MEDIA_TYPE,
        }
    }
}

/// Everything the item assembler needs from one scene
#[derive(Debug, Clone, PartialEq)]
pub struct SceneMetadata {
    pub href: PathBuf,
    pub scene_id: String,
    pub datetime: DateTime<Utc>,
    pub platform: Option<String>,
    pub footprint: FootprintSource,
    pub epsg: Option<u32>,
    pub proj_bbox: Option<[f64; 4]>,
    /// (rows, cols) of the 10 m grid
    pub proj_shape: Option<(u32, u32)>,
    pub orbit_state: Option<String>,
    pub relative_orbit: Option<u32>,
    pub cloud_cover: Option<f64>,
    pub snow_cover: Option<f64>,
    pub sun_azimuth: Option<f64>,
    pub sun_zenith: Option<f64>,
    pub viewing_angles: BTreeMap<String, ViewingAngle>,
    /// Product baseline, or the one in the tile id when there is no product
    pub processing_baseline: Option<String>,
    /// `s2:*` properties
    pub properties: BTreeMap<String, Value>,
    pub assets: BTreeMap<String, MetadataAsset>,
}

impl SceneMetadata {
    /// Read a scene, choosing the layout from the path.
    pub fn from_path(path: &Path, allow_fallback_geometry: bool) -> Result<Self, MetadataError> {
        if is_safe(path) {
            Self::from_safe(path)
        } else if path.join("metadata.xml").is_file() {
            Self::from_sinergise(path, allow_fallback_geometry)
        } else {
            Err(MetadataError::UnsupportedLayout(format!(
                "{} is neither a .SAFE product nor a tile directory with metadata.xml",
                path.display()
            )))
        }
    }

    pub fn from_safe(dir: &Path) -> Result<Self, MetadataError> {
        info!("Reading SAFE product {:?}", dir);

        let product_href = find_product_metadata(dir)?;
        let granule_href = find_granule_metadata(dir)?;
        let product = ProductMetadata::from_file(&product_href)?;
        let granule = GranuleMetadata::from_file(&granule_href)?;

        if product.footprint_tokens.is_empty() {
            return Err(MetadataError::NoGeometry(dir.display().to_string()));
        }

        let mut assets = BTreeMap::new();
        assets.insert(
            PRODUCT_METADATA_ASSET_KEY.to_string(),
            MetadataAsset::xml(product_href),
        );
        assets.insert(
            GRANULE_METADATA_ASSET_KEY.to_string(),
            MetadataAsset::xml(granule_href),
        );
        for (key, href) in [
            (SAFE_MANIFEST_ASSET_KEY, Some(dir.join("manifest.safe"))),
            (INSPIRE_METADATA_ASSET_KEY, Some(dir.join("INSPIRE.xml"))),
            (DATASTRIP_METADATA_ASSET_KEY, find_datastrip_metadata(dir)?),
        ] {
            if let Some(href) = href.filter(|h| h.is_file()) {
                assets.insert(key.to_string(), MetadataAsset::xml(href));
            }
        }

        let mut properties = product.properties();
        properties.extend(granule.properties());

        Ok(SceneMetadata {
            href: dir.to_path_buf(),
            scene_id: product.scene_id()?,
            datetime: product.start_time,
            platform: product.platform(),
            footprint: FootprintSource::Tokens(product.footprint_tokens.clone()),
            epsg: granule.epsg,
            proj_bbox: rounded_proj_bbox(&granule),
            proj_shape: granule.shape(),
            orbit_state: product.orbit_direction.clone(),
            relative_orbit: product.relative_orbit,
            cloud_cover: granule.cloudy_pixel_percentage,
            snow_cover: granule.snow_ice_percentage,
            sun_azimuth: granule.sun_azimuth,
            sun_zenith: granule.sun_zenith,
            viewing_angles: granule.viewing_angles.clone(),
            processing_baseline: product
                .processing_baseline
                .clone()
                .or_else(|| granule.processing_baseline()),
            properties,
            assets,
        })
    }

    /// Read a Sinergise tile directory.
    ///
    /// Without tile data geometry the product footprint is used when
    /// `allow_fallback_geometry` is set and `product_metadata.xml` exists;
    /// otherwise the scene has no footprint and is rejected.
    pub fn from_sinergise(dir: &Path, allow_fallback_geometry: bool) -> Result<Self, MetadataError> {
        info!("Reading Sinergise tile {:?}", dir);

        let granule_href = dir.join("metadata.xml");
        let tileinfo_href = dir.join("tileInfo.json");
        let product_href = dir.join("product_metadata.xml");

        let granule = GranuleMetadata::from_file(&granule_href)?;
        let tileinfo = TileInfo::from_file(&tileinfo_href)?;
        let product = if product_href.is_file() {
            Some(ProductMetadata::from_file(&product_href)?)
        } else {
            None
        };

        let footprint = match (&tileinfo.data_geometry, &product) {
            (Some(data), _) => {
                let epsg = data
                    .epsg
                    .or(granule.epsg)
                    .ok_or(MetadataError::MissingField("HORIZONTAL_CS_CODE"))?;
                debug!("Using tile data geometry in EPSG:{}", epsg);
                FootprintSource::Projected {
                    polygon: data.polygon.clone(),
                    epsg,
                }
            }
            (None, Some(p)) if allow_fallback_geometry && !p.footprint_tokens.is_empty() => {
                warn!(
                    "{:?} has no tile data geometry, falling back to the product footprint",
                    dir
                );
                FootprintSource::Tokens(p.footprint_tokens.clone())
            }
            _ => return Err(MetadataError::NoGeometry(dir.display().to_string())),
        };

        let mut assets = BTreeMap::new();
        assets.insert(
            GRANULE_METADATA_ASSET_KEY.to_string(),
            MetadataAsset::xml(granule_href),
        );
        assets.insert(
            TILEINFO_METADATA_ASSET_KEY.to_string(),
            MetadataAsset {
                href: tileinfo_href,
                media_type: JSON_MEDIA_TYPE,
            },
        );

        let mut properties = granule.properties();
        properties.extend(tileinfo.properties());

        let scene_id = match &product {
            Some(p) => {
                properties.extend(p.properties());
                assets.insert(
                    PRODUCT_METADATA_ASSET_KEY.to_string(),
                    MetadataAsset::xml(product_href),
                );
                p.scene_id()?
            }
            None => granule.scene_id(),
        };

        Ok(SceneMetadata {
            href: dir.to_path_buf(),
            scene_id,
            datetime: tileinfo.timestamp,
            platform: granule.platform().map(str::to_string),
            footprint,
            epsg: granule.epsg,
            proj_bbox: rounded_proj_bbox(&granule),
            proj_shape: granule.shape(),
            orbit_state: product.as_ref().and_then(|p| p.orbit_direction.clone()),
            relative_orbit: product.as_ref().and_then(|p| p.relative_orbit),
            cloud_cover: granule.cloudy_pixel_percentage,
            snow_cover: granule.snow_ice_percentage,
            sun_azimuth: granule.sun_azimuth,
            sun_zenith: granule.sun_zenith,
            viewing_angles: granule.viewing_angles.clone(),
            processing_baseline: product
                .and_then(|p| p.processing_baseline)
                .or_else(|| granule.processing_baseline()),
            properties,
            assets,
        })
    }
}

fn is_safe(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase().ends_with(".safe"))
        .unwrap_or(false)
}

fn rounded_proj_bbox(granule: &GranuleMetadata) -> Option<[f64; 4]> {
    granule
        .proj_bbox()
        .ok()
        .map(|b| b.map(|v| round_to(v, crate::config::DEFAULT_COORD_PRECISION)))
}

/// Sorted entries of `dir` whose file name satisfies `pred`
fn entries_matching(dir: &Path, pred: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>, MetadataError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path
            .file_name()
            .map(|n| pred(&n.to_string_lossy()))
            .unwrap_or(false)
        {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn find_product_metadata(dir: &Path) -> Result<PathBuf, MetadataError> {
    entries_matching(dir, |n| n.starts_with("MTD_MSIL") && n.ends_with(".xml"))?
        .into_iter()
        .next()
        .ok_or(MetadataError::MissingField("MTD_MSIL*.xml"))
}

fn find_granule_metadata(dir: &Path) -> Result<PathBuf, MetadataError> {
    entries_matching(&dir.join("GRANULE"), |_| true)?
        .into_iter()
        .map(|g| g.join("MTD_TL.xml"))
        .find(|p| p.is_file())
        .ok_or(MetadataError::MissingField("GRANULE/*/MTD_TL.xml"))
}

fn find_datastrip_metadata(dir: &Path) -> Result<Option<PathBuf>, MetadataError> {
    Ok(entries_matching(&dir.join("DATASTRIP"), |_| true)?
        .into_iter()
        .map(|d| d.join("MTD_DS.xml"))
        .find(|p| p.is_file()))
}
