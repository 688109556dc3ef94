//! STAC Item data structures and assembly from scene metadata

use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::geometry::pipeline::FootprintOutput;
use crate::geometry::Geometry;
use crate::metadata::{MetadataAsset, SceneMetadata};

pub const STAC_VERSION: &str = "1.1.0";

pub const EO_EXTENSION: &str = "https://stac-extensions.github.io/eo/v2.0.0/schema.json";
pub const PROJECTION_EXTENSION: &str =
    "https://stac-extensions.github.io/projection/v2.0.0/schema.json";
pub const SAT_EXTENSION: &str = "https://stac-extensions.github.io/sat/v1.0.0/schema.json";
pub const VIEW_EXTENSION: &str = "https://stac-extensions.github.io/view/v1.0.0/schema.json";
pub const MGRS_EXTENSION: &str = "https://stac-extensions.github.io/mgrs/v1.0.0/schema.json";
pub const GRID_EXTENSION: &str = "https://stac-extensions.github.io/grid/v1.1.0/schema.json";
pub const SENTINEL2_EXTENSION: &str =
    "https://stac-extensions.github.io/sentinel-2/v1.0.0/schema.json";

pub const SENTINEL_CONSTELLATION: &str = "sentinel-2";
pub const SENTINEL_INSTRUMENTS: &[&str] = &["msi"];
pub const SENTINEL_LICENSE: &str =
    "https://sentinel.esa.int/documents/247904/690755/Sentinel_Data_Legal_Notice";

/// STAC Item (Feature)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StacItem {
    #[serde(rename = "type")]
    pub type_: String,
    pub stac_version: String,
    #[serde(default)]
    pub stac_extensions: Vec<String>,
    pub id: String,
    pub geometry: Option<Value>,
    pub bbox: Option<Vec<f64>>,
    pub properties: BTreeMap<String, Value>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub assets: BTreeMap<String, Asset>,
}

/// STAC Provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Provider {
    pub fn esa() -> Self {
        Provider {
            name: "ESA".to_string(),
            roles: vec![
                "producer".to_string(),
                "processor".to_string(),
                "licensor".to_string(),
            ],
            url: Some("https://earth.esa.int/web/guest/home".to_string()),
        }
    }
}

/// STAC Link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// STAC Asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub href: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Options applied to every item of a run
#[derive(Debug, Clone, Default)]
pub struct ItemOptions {
    /// Providers listed after ESA
    pub additional_providers: Vec<Provider>,
    /// Replaces the scene directory in asset hrefs
    pub asset_href_prefix: Option<String>,
}

/// MGRS grid designation of a tile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mgrs {
    pub utm_zone: u32,
    pub latitude_band: String,
    pub grid_square: String,
}

impl Mgrs {
    /// Parse the `_T<zone><band><square>` token of a scene id.
    pub fn from_scene_id(scene_id: &str) -> Option<Mgrs> {
        let re = Regex::new(
            r"_T(\d{1,2})([CDEFGHJKLMNPQRSTUVWX])([ABCDEFGHJKLMNPQRSTUVWXYZ][ABCDEFGHJKLMNPQRSTUV])",
        )
        .ok()?;
        let caps = re.captures(scene_id)?;
        Some(Mgrs {
            utm_zone: caps[1].parse().ok()?,
            latitude_band: caps[2].to_string(),
            grid_square: caps[3].to_string(),
        })
    }

    pub fn grid_code(&self) -> String {
        format!(
            "MGRS-{:02}{}{}",
            self.utm_zone, self.latitude_band, self.grid_square
        )
    }
}

/// Load additional providers from a JSON array file
pub fn load_providers(path: &Path) -> Result<Vec<Provider>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read providers file {:?}", path))?;
    let providers: Vec<Provider> = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse providers file {:?}", path))?;
    info!("Loaded {} additional provider(s)", providers.len());
    Ok(providers)
}

/// Mean of `values` when there is at least one and all are finite
fn finite_mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn asset_href(scene: &SceneMetadata, asset: &MetadataAsset, prefix: Option<&str>) -> String {
    match (prefix, asset.href.strip_prefix(&scene.href)) {
        (Some(prefix), Ok(relative)) => format!(
            "{}/{}",
            prefix.trim_end_matches('/'),
            relative.to_string_lossy().replace('\\', "/")
        ),
        _ => asset.href.to_string_lossy().into_owned(),
    }
}

/// Assemble a STAC Item from scene metadata and its processed footprint.
pub fn create_item(
    scene: &SceneMetadata,
    footprint: &FootprintOutput,
    options: &ItemOptions,
) -> Result<StacItem> {
    let epsg = match scene.epsg {
        Some(epsg) => epsg,
        None => bail!("Could not determine EPSG code for {:?}, which is required", scene.href),
    };

    let mut extensions = vec![EO_EXTENSION, PROJECTION_EXTENSION];
    let mut props: BTreeMap<String, Value> = BTreeMap::new();

    // Common metadata
    props.insert(
        "datetime".into(),
        json!(scene.datetime.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
    );
    props.insert(
        "created".into(),
        json!(Utc::now().to_rfc3339_opts(SecondsFormat::AutoSi, true)),
    );
    if let Some(platform) = &scene.platform {
        props.insert("platform".into(), json!(platform.to_lowercase()));
    }
    props.insert("constellation".into(), json!(SENTINEL_CONSTELLATION));
    props.insert("instruments".into(), json!(SENTINEL_INSTRUMENTS));

    let mut providers = vec![Provider::esa()];
    providers.extend(options.additional_providers.iter().cloned());
    props.insert("providers".into(), serde_json::to_value(&providers)?);

    // eo
    if let Some(cloud) = scene.cloud_cover {
        props.insert("eo:cloud_cover".into(), json!(cloud));
    }
    if let Some(snow) = scene.snow_cover {
        props.insert("eo:snow_cover".into(), json!(snow));
    }

    // sat
    if scene.orbit_state.is_some() || scene.relative_orbit.is_some() {
        extensions.push(SAT_EXTENSION);
        if let Some(state) = &scene.orbit_state {
            props.insert("sat:orbit_state".into(), json!(state.to_lowercase()));
        }
        if let Some(orbit) = scene.relative_orbit {
            props.insert("sat:relative_orbit".into(), json!(orbit));
        }
    }

    // proj
    props.insert("proj:code".into(), json!(format!("EPSG:{}", epsg)));
    if let Some(bbox) = scene.proj_bbox {
        props.insert("proj:bbox".into(), json!(bbox));
    }
    if let Some((rows, cols)) = scene.proj_shape {
        props.insert("proj:shape".into(), json!([rows, cols]));
    }
    props.insert("proj:centroid".into(), serde_json::to_value(&footprint.centroid)?);

    // mgrs + grid
    match Mgrs::from_scene_id(&scene.scene_id) {
        Some(mgrs) => {
            extensions.push(MGRS_EXTENSION);
            extensions.push(GRID_EXTENSION);
            props.insert("mgrs:utm_zone".into(), json!(mgrs.utm_zone));
            props.insert("mgrs:latitude_band".into(), json!(mgrs.latitude_band));
            props.insert("mgrs:grid_square".into(), json!(mgrs.grid_square));
            props.insert("grid:code".into(), json!(mgrs.grid_code()));
        }
        None => error!(
            "Error populating MGRS and Grid Extensions fields from ID: {}",
            scene.scene_id
        ),
    }

    // view
    let azimuths: Vec<f64> = scene.viewing_angles.values().map(|v| v.azimuth).collect();
    let zeniths: Vec<f64> = scene.viewing_angles.values().map(|v| v.zenith).collect();
    let view = [
        ("view:azimuth", finite_mean(&azimuths)),
        ("view:incidence_angle", finite_mean(&zeniths)),
        ("view:sun_azimuth", scene.sun_azimuth.filter(|v| v.is_finite())),
        (
            "view:sun_elevation",
            scene.sun_zenith.filter(|v| v.is_finite()).map(|z| 90.0 - z),
        ),
    ];
    if view.iter().any(|(_, v)| v.is_some()) {
        extensions.push(VIEW_EXTENSION);
    }
    for (key, value) in view {
        if let Some(v) = value {
            props.insert(key.into(), json!(v));
        }
    }

    // sentinel-2
    extensions.push(SENTINEL2_EXTENSION);
    if let Some(baseline) = &scene.processing_baseline {
        props.insert("s2:processing_baseline".into(), json!(baseline));
    }
    props.extend(scene.properties.clone());

    let assets = scene
        .assets
        .iter()
        .map(|(key, asset)| {
            (
                key.clone(),
                Asset {
                    href: asset_href(scene, asset, options.asset_href_prefix.as_deref()),
                    type_: Some(asset.media_type.to_string()),
                    title: None,
                    roles: vec!["metadata".to_string()],
                },
            )
        })
        .collect();

    debug!(
        "Assembled item {} with {} properties",
        scene.scene_id,
        props.len()
    );

    Ok(StacItem {
        type_: "Feature".to_string(),
        stac_version: STAC_VERSION.to_string(),
        stac_extensions: extensions.into_iter().map(str::to_string).collect(),
        id: scene.scene_id.clone(),
        geometry: Some(serde_json::to_value(footprint.geometry.to_geojson())?),
        bbox: Some(footprint.bbox.to_vec()),
        properties: props,
        links: vec![Link {
            rel: "license".to_string(),
            href: SENTINEL_LICENSE.to_string(),
            type_: None,
            title: None,
        }],
        assets,
    })
}

impl StacItem {
    pub fn from_file(path: &Path) -> Result<Self> {
        let json =
            fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        serde_json::from_str(&json).with_context(|| format!("Failed to parse item {:?}", path))
    }

    /// Write the item as `<dir>/<id>.json`, returning the written path.
    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
        let path = dir.join(format!("{}.json", self.id));
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {:?}", path))?;
        Ok(path)
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Validation issue
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub item_id: String,
    pub severity: String,
    pub message: String,
}

impl ValidationIssue {
    fn error(item_id: &str, message: impl Into<String>) -> Self {
        ValidationIssue {
            item_id: item_id.to_string(),
            severity: "error".to_string(),
            message: message.into(),
        }
    }

    fn warning(item_id: &str, message: impl Into<String>) -> Self {
        ValidationIssue {
            item_id: item_id.to_string(),
            severity: "warning".to_string(),
            message: message.into(),
        }
    }
}

/// Structural checks on one written item
pub fn validate_item(item: &Value, max_area: f64) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let item_id = item.get("id").and_then(|i| i.as_str()).unwrap_or("unknown");

    if item.get("stac_version").and_then(|v| v.as_str()) != Some(STAC_VERSION) {
        issues.push(ValidationIssue::warning(
            item_id,
            format!("STAC version is not {}", STAC_VERSION),
        ));
    }

    match item.get("bbox").and_then(|b| b.as_array()) {
        Some(bbox) if bbox.len() == 4 => {}
        Some(bbox) => issues.push(ValidationIssue::error(
            item_id,
            format!("bbox has {} values, expected 4", bbox.len()),
        )),
        None => issues.push(ValidationIssue::error(item_id, "Missing bbox")),
    }

    match item.get("geometry").filter(|g| !g.is_null()) {
        None => issues.push(ValidationIssue::error(item_id, "Missing geometry")),
        Some(g) => match serde_json::from_value::<geojson::Geometry>(g.clone()) {
            Err(e) => issues.push(ValidationIssue::error(
                item_id,
                format!("Invalid geometry: {}", e),
            )),
            Ok(g) => match Geometry::from_geojson(&g) {
                Err(e) => issues.push(ValidationIssue::error(
                    item_id,
                    format!("Invalid geometry: {}", e),
                )),
                Ok(geometry) if geometry.area() > max_area => {
                    issues.push(ValidationIssue::error(
                        item_id,
                        format!(
                            "Geometry area {:.3} exceeds {} square degrees",
                            geometry.area(),
                            max_area
                        ),
                    ))
                }
                Ok(_) => {}
            },
        },
    }

    if item
        .get("assets")
        .and_then(|a| a.as_object())
        .map(|a| a.is_empty())
        .unwrap_or(true)
    {
        issues.push(ValidationIssue::warning(item_id, "No assets"));
    }

    issues
}

/// Validate every `*.json` item in `dir`
pub fn validate_item_dir(dir: &Path, max_area: f64) -> Result<(usize, Vec<ValidationIssue>)> {
    let mut issues = Vec::new();
    let mut count = 0;

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read {:?}", dir))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
        .collect();
    paths.sort();

    for path in paths {
        count += 1;
        let name = path.display().to_string();
        let value = fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|s| serde_json::from_str::<Value>(&s).map_err(anyhow::Error::from));
        match value {
            Ok(item) => issues.extend(validate_item(&item, max_area)),
            Err(e) => issues.push(ValidationIssue::error(&name, format!("Unreadable item: {}", e))),
        }
    }

    Ok((count, issues))
}
