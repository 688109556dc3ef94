//! Tile (granule) metadata: SAFE `MTD_TL.xml` or Sinergise `metadata.xml`

use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::xml::{XmlDocument, XmlElement};
use super::{band_name, parse_number};
use crate::error::MetadataError;

/// Image content indicators copied to `s2:*` properties, by element name
const QUALITY_INDICATORS: &[(&str, &str)] = &[
    ("DEGRADED_MSI_DATA_PERCENTAGE", "s2:degraded_msi_data_percentage"),
    ("NODATA_PIXEL_PERCENTAGE", "s2:nodata_pixel_percentage"),
    ("SATURATED_DEFECTIVE_PIXEL_PERCENTAGE", "s2:saturated_defective_pixel_percentage"),
    ("DARK_FEATURES_PERCENTAGE", "s2:dark_features_percentage"),
    ("CLOUD_SHADOW_PERCENTAGE", "s2:cloud_shadow_percentage"),
    ("VEGETATION_PERCENTAGE", "s2:vegetation_percentage"),
    ("NOT_VEGETATED_PERCENTAGE", "s2:not_vegetated_percentage"),
    ("WATER_PERCENTAGE", "s2:water_percentage"),
    ("UNCLASSIFIED_PERCENTAGE", "s2:unclassified_percentage"),
    ("MEDIUM_PROBA_CLOUDS_PERCENTAGE", "s2:medium_proba_clouds_percentage"),
    ("HIGH_PROBA_CLOUDS_PERCENTAGE", "s2:high_proba_clouds_percentage"),
    ("THIN_CIRRUS_PERCENTAGE", "s2:thin_cirrus_percentage"),
    ("SNOW_ICE_PERCENTAGE", "s2:snow_ice_percentage"),
];

/// Mean viewing angles for one band, in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewingAngle {
    pub azimuth: f64,
    pub zenith: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GranuleMetadata {
    pub href: PathBuf,
    pub tile_id: String,
    pub epsg: Option<u32>,
    /// (rows, cols) keyed by resolution in metres
    pub resolution_to_shape: BTreeMap<u32, (u32, u32)>,
    pub upper_left: Option<(f64, f64)>,
    pub sun_zenith: Option<f64>,
    pub sun_azimuth: Option<f64>,
    pub viewing_angles: BTreeMap<String, ViewingAngle>,
    pub cloudy_pixel_percentage: Option<f64>,
    pub snow_ice_percentage: Option<f64>,
    /// `s2:*` quality percentages present in the document
    pub quality: BTreeMap<String, f64>,
    pub pvi_filename: Option<String>,
}

impl GranuleMetadata {
    pub fn from_file(path: &Path) -> Result<Self, MetadataError> {
        let doc = XmlDocument::from_file(path)?;
        Self::from_document(&doc, path)
    }

    pub fn from_document(doc: &XmlDocument, href: &Path) -> Result<Self, MetadataError> {
        let tile_id = doc
            .find_text("n1:General_Info/TILE_ID")
            .ok_or(MetadataError::MissingField("TILE_ID"))?
            .to_string();
        let geocoding = doc
            .find("n1:Geometric_Info/Tile_Geocoding")
            .ok_or(MetadataError::MissingField("Tile_Geocoding"))?;
        let angles = doc
            .find("n1:Geometric_Info/Tile_Angles")
            .ok_or(MetadataError::MissingField("Tile_Angles"))?;

        let epsg = geocoding
            .find_text("HORIZONTAL_CS_CODE")
            .map(|code| {
                code.rsplit(':')
                    .next()
                    .and_then(|n| n.trim().parse::<u32>().ok())
                    .ok_or_else(|| MetadataError::Parse(format!("invalid HORIZONTAL_CS_CODE {}", code)))
            })
            .transpose()?;

        let mut resolution_to_shape = BTreeMap::new();
        for size in geocoding.find_all("Size") {
            let resolution: u32 = parse_number(
                size.attr("resolution")
                    .ok_or(MetadataError::MissingField("Size@resolution"))?,
            )?;
            let rows = parse_number(size.find_text("NROWS").ok_or(MetadataError::MissingField("NROWS"))?)?;
            let cols = parse_number(size.find_text("NCOLS").ok_or(MetadataError::MissingField("NCOLS"))?)?;
            resolution_to_shape.insert(resolution, (rows, cols));
        }

        let upper_left = match geocoding.find("Geoposition") {
            Some(pos) => match (pos.find_text("ULX"), pos.find_text("ULY")) {
                (Some(x), Some(y)) => Some((parse_number(x)?, parse_number(y)?)),
                _ => None,
            },
            None => None,
        };

        let content = doc.find("n1:Quality_Indicators_Info/Image_Content_QI");
        let percentage = |name: &str| -> Result<Option<f64>, MetadataError> {
            content
                .and_then(|c| c.find_text(name))
                .map(parse_number)
                .transpose()
        };

        let mut quality = BTreeMap::new();
        for &(element, key) in QUALITY_INDICATORS {
            if let Some(value) = percentage(element)? {
                quality.insert(key.to_string(), value);
            }
        }

        Ok(GranuleMetadata {
            href: href.to_path_buf(),
            epsg,
            resolution_to_shape,
            upper_left,
            sun_zenith: angles.find_text("Mean_Sun_Angle/ZENITH_ANGLE").map(parse_number).transpose()?,
            sun_azimuth: angles.find_text("Mean_Sun_Angle/AZIMUTH_ANGLE").map(parse_number).transpose()?,
            viewing_angles: viewing_angles(&angles)?,
            cloudy_pixel_percentage: percentage("CLOUDY_PIXEL_PERCENTAGE")?,
            snow_ice_percentage: percentage("SNOW_ICE_PERCENTAGE")?,
            quality,
            pvi_filename: doc
                .find_text("n1:Quality_Indicators_Info/PVI_FILENAME")
                .map(str::to_string),
            tile_id,
        })
    }

    /// Shape of the 10 m bands as (rows, cols)
    pub fn shape(&self) -> Option<(u32, u32)> {
        self.resolution_to_shape.get(&10).copied()
    }

    /// Extent of the 10 m grid in the tile CRS: `[minx, miny, maxx, maxy]`
    pub fn proj_bbox(&self) -> Result<[f64; 4], MetadataError> {
        let (rows, cols) = self.shape().ok_or(MetadataError::MissingField("Size@10"))?;
        let (ulx, uly) = self.upper_left.ok_or(MetadataError::MissingField("Geoposition"))?;
        Ok([
            ulx,
            uly - 10.0 * rows as f64,
            ulx + 10.0 * cols as f64,
            uly,
        ])
    }

    /// Tile id without the processing baseline part
    pub fn scene_id(&self) -> String {
        self.tile_id
            .split('_')
            .filter(|part| !part.starts_with('N'))
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn platform(&self) -> Option<&'static str> {
        if self.tile_id.starts_with("S2A") {
            Some("sentinel-2a")
        } else if self.tile_id.starts_with("S2B") {
            Some("sentinel-2b")
        } else {
            None
        }
    }

    pub fn processing_baseline(&self) -> Option<String> {
        let re = Regex::new(r"_N(\d\d\.\d\d)").ok()?;
        re.captures(&self.tile_id).map(|c| c[1].to_string())
    }

    /// `s2:*` properties contributed by the tile metadata
    pub fn properties(&self) -> BTreeMap<String, Value> {
        let mut props: BTreeMap<String, Value> = self
            .quality
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();
        props.insert("s2:tile_id".to_string(), json!(self.tile_id));
        props
    }
}

fn viewing_angles(angles: &XmlElement<'_>) -> Result<BTreeMap<String, ViewingAngle>, MetadataError> {
    let mut out = BTreeMap::new();
    for node in angles.find_all("Mean_Viewing_Incidence_Angle_List/Mean_Viewing_Incidence_Angle") {
        let band = node
            .attr("bandId")
            .and_then(|id| id.parse::<usize>().ok())
            .and_then(band_name)
            .ok_or_else(|| MetadataError::Parse("invalid viewing angle bandId".into()))?;
        let zenith = parse_number(
            node.find_text("ZENITH_ANGLE")
                .ok_or(MetadataError::MissingField("ZENITH_ANGLE"))?,
        )?;
        let azimuth = parse_number(
            node.find_text("AZIMUTH_ANGLE")
                .ok_or(MetadataError::MissingField("AZIMUTH_ANGLE"))?,
        )?;
        out.insert(band, ViewingAngle { azimuth, zenith });
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const GRANULE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<n1:Level-2A_Tile_ID xmlns:n1="https://psd-14.sentinel2.eo.esa.int/PSD/S2_PDI_Level-2A_Tile_Metadata.xsd">
  <n1:General_Info>
    <TILE_ID>S2B_OPER_MSI_L2A_TL_2BPS_20230123T001557_A030716_T01UBT_N05.09</TILE_ID>
  </n1:General_Info>
  <n1:Geometric_Info>
    <Tile_Geocoding>
      <HORIZONTAL_CS_NAME>WGS84 / UTM zone 1N</HORIZONTAL_CS_NAME>
      <HORIZONTAL_CS_CODE>EPSG:32601</HORIZONTAL_CS_CODE>
      <Size resolution="10">
        <NROWS>10980</NROWS>
        <NCOLS>10980</NCOLS>
      </Size>
      <Size resolution="20">
        <NROWS>5490</NROWS>
        <NCOLS>5490</NCOLS>
      </Size>
      <Geoposition resolution="10">
        <ULX>199980</ULX>
        <ULY>5700000</ULY>
      </Geoposition>
    </Tile_Geocoding>
    <Tile_Angles>
      <Mean_Sun_Angle>
        <ZENITH_ANGLE unit="deg">66.25</ZENITH_ANGLE>
        <AZIMUTH_ANGLE unit="deg">161.5</AZIMUTH_ANGLE>
      </Mean_Sun_Angle>
      <Mean_Viewing_Incidence_Angle_List>
        <Mean_Viewing_Incidence_Angle bandId="0">
          <ZENITH_ANGLE unit="deg">4.0</ZENITH_ANGLE>
          <AZIMUTH_ANGLE unit="deg">100.0</AZIMUTH_ANGLE>
        </Mean_Viewing_Incidence_Angle>
        <Mean_Viewing_Incidence_Angle bandId="8">
          <ZENITH_ANGLE unit="deg">6.0</ZENITH_ANGLE>
          <AZIMUTH_ANGLE unit="deg">110.0</AZIMUTH_ANGLE>
        </Mean_Viewing_Incidence_Angle>
        <Mean_Viewing_Incidence_Angle bandId="10">
          <ZENITH_ANGLE unit="deg">5.0</ZENITH_ANGLE>
          <AZIMUTH_ANGLE unit="deg">105.0</AZIMUTH_ANGLE>
        </Mean_Viewing_Incidence_Angle>
      </Mean_Viewing_Incidence_Angle_List>
    </Tile_Angles>
  </n1:Geometric_Info>
  <n1:Quality_Indicators_Info>
    <Image_Content_QI>
      <NODATA_PIXEL_PERCENTAGE>12.5</NODATA_PIXEL_PERCENTAGE>
      <CLOUDY_PIXEL_PERCENTAGE>40.25</CLOUDY_PIXEL_PERCENTAGE>
      <WATER_PERCENTAGE>30.0</WATER_PERCENTAGE>
      <SNOW_ICE_PERCENTAGE>0.0</SNOW_ICE_PERCENTAGE>
    </Image_Content_QI>
    <PVI_FILENAME>T01UBT_20230122T231849_PVI.jp2</PVI_FILENAME>
  </n1:Quality_Indicators_Info>
</n1:Level-2A_Tile_ID>"#;

    fn granule() -> GranuleMetadata {
        let doc = XmlDocument::parse_str(GRANULE_XML).unwrap();
        GranuleMetadata::from_document(&doc, Path::new("MTD_TL.xml")).unwrap()
    }

    #[test]
    fn test_geocoding() {
        let g = granule();
        assert_eq!(g.epsg, Some(32601));
        assert_eq!(g.shape(), Some((10980, 10980)));
        assert_eq!(g.resolution_to_shape.get(&20), Some(&(5490, 5490)));
        assert_eq!(
            g.proj_bbox().unwrap(),
            [199980.0, 5590200.0, 309780.0, 5700000.0]
        );
    }

    #[test]
    fn test_angles() {
        let g = granule();
        assert_eq!(g.sun_zenith, Some(66.25));
        assert_eq!(g.sun_azimuth, Some(161.5));
        let bands: Vec<&str> = g.viewing_angles.keys().map(String::as_str).collect();
        assert_eq!(bands, vec!["B01", "B10", "B8A"]);
        assert_eq!(
            g.viewing_angles["B8A"],
            ViewingAngle {
                azimuth: 110.0,
                zenith: 6.0
            }
        );
    }

    #[test]
    fn test_identifiers() {
        let g = granule();
        assert_eq!(
            g.scene_id(),
            "S2B_OPER_MSI_L2A_TL_2BPS_20230123T001557_A030716_T01UBT"
        );
        assert_eq!(g.platform(), Some("sentinel-2b"));
        assert_eq!(g.processing_baseline().as_deref(), Some("05.09"));
        assert_eq!(g.pvi_filename.as_deref(), Some("T01UBT_20230122T231849_PVI.jp2"));
    }

    #[test]
    fn test_quality_percentages() {
        let g = granule();
        assert_eq!(g.cloudy_pixel_percentage, Some(40.25));
        assert_eq!(g.snow_ice_percentage, Some(0.0));
        let props = g.properties();
        assert_eq!(props["s2:nodata_pixel_percentage"], json!(12.5));
        assert_eq!(props["s2:water_percentage"], json!(30.0));
        assert!(!props.contains_key("s2:vegetation_percentage"));
        assert_eq!(
            props["s2:tile_id"],
            json!("S2B_OPER_MSI_L2A_TL_2BPS_20230123T001557_A030716_T01UBT_N05.09")
        );
    }

    #[test]
    fn test_missing_quality_block_is_tolerated() {
        let xml = GRANULE_XML.replace("Image_Content_QI", "Other_QI");
        let doc = XmlDocument::parse_str(&xml).unwrap();
        let g = GranuleMetadata::from_document(&doc, Path::new("MTD_TL.xml")).unwrap();
        assert_eq!(g.cloudy_pixel_percentage, None);
        assert!(g.quality.is_empty());
    }

    #[test]
    fn test_bad_number_is_reported() {
        let xml = GRANULE_XML.replace("<NROWS>10980</NROWS>", "<NROWS>lots</NROWS>");
        let doc = XmlDocument::parse_str(&xml).unwrap();
        let err = GranuleMetadata::from_document(&doc, Path::new("MTD_TL.xml")).unwrap_err();
        assert!(matches!(err, MetadataError::Parse(_)));
    }
}
