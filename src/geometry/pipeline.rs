//! End-to-end footprint processing for one scene

use geo::{Polygon, Simplify};
use tracing::{debug, info};

use super::antimeridian::{centroid, crosses_antimeridian, fix_antimeridian};
use super::footprint::extract_polygon;
use super::guard::check_area;
use super::repair::make_valid;
use super::reproject::{default_transform, reproject_to_wgs84, CoordinateTransform};
use super::{BoundingBox, Centroid, Geometry};
use crate::config::GeometryConfig;
use crate::error::GeometryError;

/// Decimal places kept for `proj:centroid`
pub const CENTROID_PRECISION: u32 = 5;

/// Where a scene footprint comes from
#[derive(Debug, Clone, PartialEq)]
pub enum FootprintSource {
    /// Tile data geometry in the tile's projected CRS
    Projected { polygon: Polygon<f64>, epsg: u32 },
    /// Geometry already in geographic lon/lat
    Geographic(Geometry),
    /// Raw `lat lon` footprint tokens in geographic coordinates
    Tokens(Vec<String>),
}

/// Final footprint with the values derived from it
#[derive(Debug, Clone, PartialEq)]
pub struct FootprintOutput {
    pub geometry: Geometry,
    pub bbox: BoundingBox,
    pub centroid: Centroid,
    /// Planar area in square decimal degrees
    pub area: f64,
}

/// Runs the footprint stages with one configuration and transform.
///
/// Holds no mutable state; one pipeline can serve any number of scenes,
/// including from several threads.
pub struct FootprintPipeline<'a> {
    config: GeometryConfig,
    transform: &'a dyn CoordinateTransform,
}

impl FootprintPipeline<'static> {
    pub fn new(config: GeometryConfig) -> Self {
        FootprintPipeline {
            config,
            transform: default_transform(),
        }
    }
}

impl<'a> FootprintPipeline<'a> {
    pub fn with_transform(config: GeometryConfig, transform: &'a dyn CoordinateTransform) -> Self {
        FootprintPipeline { config, transform }
    }

    pub fn config(&self) -> &GeometryConfig {
        &self.config
    }

    pub fn run(&self, source: &FootprintSource) -> Result<FootprintOutput, GeometryError> {
        match source {
            FootprintSource::Projected { polygon, epsg } => self.from_projected(polygon, *epsg),
            FootprintSource::Geographic(geometry) => self.from_geographic(geometry),
            FootprintSource::Tokens(tokens) => self.from_tokens(tokens),
        }
    }

    /// Footprint from raw `lat lon` tokens in geographic coordinates.
    pub fn from_tokens<S: AsRef<str>>(&self, tokens: &[S]) -> Result<FootprintOutput, GeometryError> {
        let polygon = extract_polygon(tokens)?;
        self.from_geographic(&Geometry::Polygon(polygon))
    }

    /// Footprint from a polygon in a projected CRS: reprojected to WGS84,
    /// rounded and simplified before the shared stages run.
    pub fn from_projected(
        &self,
        polygon: &Polygon<f64>,
        epsg: u32,
    ) -> Result<FootprintOutput, GeometryError> {
        let mut geographic = reproject_to_wgs84(
            polygon,
            epsg,
            self.transform,
            self.config.coordinate_precision,
        )?;

        if self.config.simplify_tolerance > 0.0 {
            geographic = geographic.simplify(&self.config.simplify_tolerance);
            debug!(
                "Simplified reprojected footprint to {} vertices",
                geographic.exterior().0.len()
            );
        }

        self.process(Geometry::Polygon(geographic))
    }

    /// Footprint from a geometry that is already geographic.
    pub fn from_geographic(&self, geometry: &Geometry) -> Result<FootprintOutput, GeometryError> {
        self.process(geometry.rounded(self.config.coordinate_precision))
    }

    fn process(&self, geometry: Geometry) -> Result<FootprintOutput, GeometryError> {
        let precision = self.config.coordinate_precision;

        let valid = make_valid(&geometry)?;
        let crossed = crosses_antimeridian(&valid);
        let fixed = fix_antimeridian(&valid, self.config.antimeridian_strategy)?;
        if crossed {
            info!(
                "Footprint crosses the antimeridian, applied {} strategy",
                self.config.antimeridian_strategy
            );
        }

        let fixed = fixed.rounded(precision).without_repeated_points()?;
        let area = check_area(&fixed, self.config.max_area)?;

        let bbox = fixed
            .bounding_box()
            .ok_or(GeometryError::EmptyGeometry)?
            .rounded(precision);
        let centroid = centroid(&fixed)
            .ok_or(GeometryError::EmptyGeometry)?
            .rounded(CENTROID_PRECISION);

        debug!(
            "Footprint {} with {} part(s), area {:.4}",
            fixed.type_name(),
            fixed.polygons().count(),
            area
        );

        Ok(FootprintOutput {
            geometry: fixed,
            bbox,
            centroid,
            area,
        })
    }
}
