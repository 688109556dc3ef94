//! SAFE product metadata (`MTD_MSIL1C.xml` / `MTD_MSIL2A.xml`)

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::xml::XmlDocument;
use super::{parse_datetime, parse_number};
use crate::error::MetadataError;

const PRODUCT_INFO: &str = "n1:General_Info/Product_Info";
const REFLECTANCE_U: &str = "n1:General_Info/Product_Image_Characteristics/Reflectance_Conversion/U";
const FOOTPRINT: &str =
    "n1:Geometric_Info/Product_Footprint/Product_Footprint/Global_Footprint/EXT_POS_LIST";

/// Product level metadata for one SAFE product
#[derive(Debug, Clone, PartialEq)]
pub struct ProductMetadata {
    pub href: PathBuf,
    pub product_uri: String,
    pub start_time: DateTime<Utc>,
    pub generation_time: Option<String>,
    pub processing_baseline: Option<String>,
    pub product_type: Option<String>,
    pub spacecraft_name: Option<String>,
    pub relative_orbit: Option<u32>,
    pub orbit_direction: Option<String>,
    pub datatake_id: Option<String>,
    pub datatake_type: Option<String>,
    pub datastrip_id: Option<String>,
    pub granule_id: Option<String>,
    pub image_format: Option<String>,
    pub image_files: Vec<String>,
    pub reflectance_conversion_factor: Option<f64>,
    /// Raw `EXT_POS_LIST` tokens, latitude first
    pub footprint_tokens: Vec<String>,
}

impl ProductMetadata {
    pub fn from_file(path: &Path) -> Result<Self, MetadataError> {
        let doc = XmlDocument::from_file(path)?;
        Self::from_document(&doc, path)
    }

    pub fn from_document(doc: &XmlDocument, href: &Path) -> Result<Self, MetadataError> {
        let info = doc
            .find(PRODUCT_INFO)
            .ok_or(MetadataError::MissingField("Product_Info"))?;
        let datatake = info
            .find("Datatake")
            .ok_or(MetadataError::MissingField("Datatake"))?;
        let granule = info
            .find("Product_Organisation/Granule_List/Granule")
            .ok_or(MetadataError::MissingField("Granule"))?;

        let product_uri = info
            .find_text("PRODUCT_URI")
            .ok_or(MetadataError::MissingField("PRODUCT_URI"))?
            .to_string();
        let start_time = parse_datetime(
            info.find_text("PRODUCT_START_TIME")
                .ok_or(MetadataError::MissingField("PRODUCT_START_TIME"))?,
        )?;

        let footprint_tokens = doc
            .find_text(FOOTPRINT)
            .map(|t| t.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let text = |path: &str| info.find_text(path).map(str::to_string);

        Ok(ProductMetadata {
            href: href.to_path_buf(),
            product_uri,
            start_time,
            generation_time: text("GENERATION_TIME"),
            processing_baseline: text("PROCESSING_BASELINE"),
            product_type: text("PRODUCT_TYPE"),
            spacecraft_name: datatake.find_text("SPACECRAFT_NAME").map(str::to_string),
            relative_orbit: datatake
                .find_text("SENSING_ORBIT_NUMBER")
                .map(parse_number)
                .transpose()?,
            orbit_direction: datatake.find_text("SENSING_ORBIT_DIRECTION").map(str::to_string),
            datatake_id: datatake.attr("datatakeIdentifier").map(str::to_string),
            datatake_type: datatake.find_text("DATATAKE_TYPE").map(str::to_string),
            datastrip_id: granule.attr("datastripIdentifier").map(str::to_string),
            granule_id: granule.attr("granuleIdentifier").map(str::to_string),
            image_format: granule.attr("imageFormat").map(str::to_string),
            image_files: granule
                .find_all("IMAGE_FILE")
                .iter()
                .map(|e| e.text().to_string())
                .collect(),
            reflectance_conversion_factor: doc.find_text(REFLECTANCE_U).map(parse_number).transpose()?,
            footprint_tokens,
        })
    }

    /// Item id `{sensor}_T{tile}_{datastrip sensing time}_{level}`.
    ///
    /// Drops the processing baseline and the `.SAFE` suffix from the product
    /// URI so reprocessed products map onto the same id.
    pub fn scene_id(&self) -> Result<String, MetadataError> {
        let stem = self.product_uri.strip_suffix(".SAFE").ok_or_else(|| {
            MetadataError::Parse(format!(
                "PRODUCT_URI {} does not follow the Sentinel-2 naming convention",
                self.product_uri
            ))
        })?;
        let parts: Vec<&str> = stem.split('_').collect();
        let (sensor, tile) = match parts.as_slice() {
            [sensor, _, _, _, _, tile, ..] => (*sensor, tile.trim_start_matches('T')),
            _ => {
                return Err(MetadataError::Parse(format!(
                    "PRODUCT_URI {} has too few parts",
                    self.product_uri
                )))
            }
        };

        let datastrip = self
            .datastrip_id
            .as_deref()
            .ok_or(MetadataError::MissingField("datastripIdentifier"))?;
        let ds: Vec<&str> = datastrip.split('_').collect();
        if ds.len() < 5 {
            return Err(MetadataError::Parse(format!(
                "datastrip id {} has too few parts",
                datastrip
            )));
        }
        let sensing = ds[ds.len() - 2].trim_start_matches('S');
        let level = ds[3];

        Ok(format!("{}_T{}_{}_{}", sensor, tile, sensing, level))
    }

    /// Lowercased spacecraft name, e.g. `sentinel-2b`
    pub fn platform(&self) -> Option<String> {
        self.spacecraft_name.as_ref().map(|s| s.to_lowercase())
    }

    /// Media type of the band images referenced by the product
    pub fn image_media_type(&self) -> &'static str {
        match self.image_format.as_deref() {
            Some("GeoTIFF") => "image/tiff; application=geotiff; profile=cloud-optimized",
            _ => "image/jp2",
        }
    }

    /// `s2:*` properties contributed by the product metadata
    pub fn properties(&self) -> BTreeMap<String, Value> {
        let mut props = BTreeMap::new();
        props.insert("s2:product_uri".to_string(), json!(self.product_uri));

        let optional = [
            ("s2:generation_time", self.generation_time.as_ref()),
            ("s2:product_type", self.product_type.as_ref()),
            ("s2:datatake_id", self.datatake_id.as_ref()),
            ("s2:datatake_type", self.datatake_type.as_ref()),
            ("s2:datastrip_id", self.datastrip_id.as_ref()),
            ("s2:tile_id", self.granule_id.as_ref()),
        ];
        for (key, value) in optional {
            if let Some(v) = value {
                props.insert(key.to_string(), json!(v));
            }
        }
        if let Some(u) = self.reflectance_conversion_factor {
            props.insert("s2:reflectance_conversion_factor".to_string(), json!(u));
        }
        props
    }
}
