//! Scene footprint geometry: types shared by every pipeline stage
//!
//! Stages, in data-flow order:
//!
//! 1. [`footprint`]: raw coordinate tokens → clean 2D ring
//! 2. [`reproject`]: projected CRS → geographic lon/lat
//! 3. [`repair`]: duplicate/spike removal and validity repair
//! 4. [`antimeridian`]: split or normalize footprints crossing ±180°
//! 5. [`guard`]: reject implausibly large results
//!
//! [`pipeline`] wires them together. All values are immutable once built;
//! each stage returns a new [`Geometry`].

pub mod antimeridian;
pub mod footprint;
pub mod guard;
pub mod pipeline;
pub mod repair;
pub mod reproject;

use geo::{Area, Coord, LineString, MapCoords, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// Two coordinates closer than this on both axes are treated as the same point
pub(crate) const COORD_TOLERANCE: f64 = 1e-9;

/// A scene footprint: one polygon, or the parts of an antimeridian split
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl Geometry {
    /// Wrap a list of polygons, collapsing a single part into a `Polygon`.
    pub fn from_polygons(mut polygons: Vec<Polygon<f64>>) -> Option<Geometry> {
        match polygons.len() {
            0 => None,
            1 => polygons.pop().map(Geometry::Polygon),
            _ => Some(Geometry::MultiPolygon(MultiPolygon::new(polygons))),
        }
    }

    pub fn polygons(&self) -> std::slice::Iter<'_, Polygon<f64>> {
        match self {
            Geometry::Polygon(p) => std::slice::from_ref(p).iter(),
            Geometry::MultiPolygon(mp) => mp.0.iter(),
        }
    }

    pub fn into_polygons(self) -> Vec<Polygon<f64>> {
        match self {
            Geometry::Polygon(p) => vec![p],
            Geometry::MultiPolygon(mp) => mp.0,
        }
    }

    /// GeoJSON type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// Total planar area in square decimal degrees
    pub fn area(&self) -> f64 {
        self.polygons().map(|p| p.unsigned_area()).sum()
    }

    pub fn interior_count(&self) -> usize {
        self.polygons().map(|p| p.interiors().len()).sum()
    }

    /// Naive longitude extent `(min, max)` over every ring
    pub fn lon_range(&self) -> Option<(f64, f64)> {
        self.bounding_box().map(|b| (b.min_lon, b.max_lon))
    }

    /// Envelope over all parts; `None` for a geometry without coordinates.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let mut coords = self.polygons().flat_map(|p| {
            p.exterior()
                .coords()
                .chain(p.interiors().iter().flat_map(|r| r.coords()))
        });

        let first = coords.next()?;
        let mut bbox = BoundingBox {
            min_lon: first.x,
            min_lat: first.y,
            max_lon: first.x,
            max_lat: first.y,
        };
        for c in coords {
            bbox.min_lon = bbox.min_lon.min(c.x);
            bbox.min_lat = bbox.min_lat.min(c.y);
            bbox.max_lon = bbox.max_lon.max(c.x);
            bbox.max_lat = bbox.max_lat.max(c.y);
        }
        Some(bbox)
    }

    /// Round every coordinate to `precision` decimal places.
    pub fn rounded(&self, precision: u32) -> Geometry {
        match self {
            Geometry::Polygon(p) => Geometry::Polygon(p.map_coords(|c| round_coord(c, precision))),
            Geometry::MultiPolygon(mp) => {
                Geometry::MultiPolygon(mp.map_coords(|c| round_coord(c, precision)))
            }
        }
    }

    /// Drop consecutive repeated points from every ring, discarding rings
    /// (and polygons) that collapse below three distinct points or to zero
    /// area.
    pub fn without_repeated_points(&self) -> Result<Geometry, GeometryError> {
        let polygons: Vec<Polygon<f64>> = self
            .polygons()
            .filter_map(|p| {
                let exterior = closed_ring(&remove_repeated_points(&open_ring(p.exterior())))?;
                if Polygon::new(exterior.clone(), vec![]).unsigned_area() == 0.0 {
                    return None;
                }
                let interiors = p
                    .interiors()
                    .iter()
                    .filter_map(|r| closed_ring(&remove_repeated_points(&open_ring(r))))
                    .collect();
                Some(Polygon::new(exterior, interiors))
            })
            .collect();

        Geometry::from_polygons(polygons).ok_or(GeometryError::EmptyGeometry)
    }

    /// GeoJSON representation
    pub fn to_geojson(&self) -> geojson::Geometry {
        let value = match self {
            Geometry::Polygon(p) => geojson::Value::Polygon(polygon_positions(p)),
            Geometry::MultiPolygon(mp) => {
                geojson::Value::MultiPolygon(mp.0.iter().map(polygon_positions).collect())
            }
        };
        geojson::Geometry::new(value)
    }

    /// Accept a GeoJSON Polygon or MultiPolygon; anything else has no
    /// polygonal content and is rejected.
    pub fn from_geojson(geometry: &geojson::Geometry) -> Result<Geometry, GeometryError> {
        match &geometry.value {
            geojson::Value::Polygon(rings) => {
                polygon_from_positions(rings).map(Geometry::Polygon)
            }
            geojson::Value::MultiPolygon(polygons) => {
                let polygons = polygons
                    .iter()
                    .map(|rings| polygon_from_positions(rings))
                    .collect::<Result<Vec<_>, _>>()?;
                Geometry::from_polygons(polygons).ok_or(GeometryError::EmptyGeometry)
            }
            _ => Err(GeometryError::EmptyGeometry),
        }
    }
}

/// Axis-aligned envelope `[min_lon, min_lat, max_lon, max_lat]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }

    pub fn rounded(&self, precision: u32) -> BoundingBox {
        BoundingBox {
            min_lon: round_to(self.min_lon, precision),
            min_lat: round_to(self.min_lat, precision),
            max_lon: round_to(self.max_lon, precision),
            max_lat: round_to(self.max_lat, precision),
        }
    }

    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }
}

/// Footprint center in geographic coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub lat: f64,
    pub lon: f64,
}

impl Centroid {
    pub fn rounded(&self, precision: u32) -> Centroid {
        Centroid {
            lat: round_to(self.lat, precision),
            lon: round_to(self.lon, precision),
        }
    }
}

pub(crate) fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

pub(crate) fn round_coord(c: Coord<f64>, precision: u32) -> Coord<f64> {
    Coord {
        x: round_to(c.x, precision),
        y: round_to(c.y, precision),
    }
}

pub(crate) fn same_point(a: Coord<f64>, b: Coord<f64>) -> bool {
    (a.x - b.x).abs() <= COORD_TOLERANCE && (a.y - b.y).abs() <= COORD_TOLERANCE
}

/// Collapse runs of identical consecutive points, keeping the first of each run.
pub(crate) fn remove_repeated_points(coords: &[Coord<f64>]) -> Vec<Coord<f64>> {
    let mut out: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for &c in coords {
        if out.last().map_or(true, |&last| !same_point(last, c)) {
            out.push(c);
        }
    }
    out
}

/// Ring vertices without the closing repeat of the first point
pub(crate) fn open_ring(ring: &LineString<f64>) -> Vec<Coord<f64>> {
    let mut coords = ring.0.clone();
    while coords.len() > 1 && same_point(coords[0], coords[coords.len() - 1]) {
        coords.pop();
    }
    coords
}

/// Close an open vertex list; `None` when fewer than three distinct points remain
pub(crate) fn closed_ring(open: &[Coord<f64>]) -> Option<LineString<f64>> {
    let mut coords = open.to_vec();
    while coords.len() > 1 && same_point(coords[0], coords[coords.len() - 1]) {
        coords.pop();
    }
    if coords.len() < 3 {
        return None;
    }
    coords.push(coords[0]);
    Some(LineString::new(coords))
}

fn ring_positions(ring: &LineString<f64>) -> Vec<Vec<f64>> {
    ring.coords().map(|c| vec![c.x, c.y]).collect()
}

fn polygon_positions(p: &Polygon<f64>) -> Vec<Vec<Vec<f64>>> {
    std::iter::once(ring_positions(p.exterior()))
        .chain(p.interiors().iter().map(ring_positions))
        .collect()
}

fn ring_from_positions(positions: &[Vec<f64>]) -> Result<LineString<f64>, GeometryError> {
    positions
        .iter()
        .enumerate()
        .map(|(i, pos)| match pos.as_slice() {
            [x, y, ..] if x.is_finite() && y.is_finite() => Ok(Coord { x: *x, y: *y }),
            _ => Err(GeometryError::MalformedFootprint {
                token: format!("{:?}", pos),
                position: i,
            }),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::new)
}

fn polygon_from_positions(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>, GeometryError> {
    let (exterior, interiors) = rings.split_first().ok_or(GeometryError::EmptyGeometry)?;
    let exterior = ring_from_positions(exterior)?;
    let interiors = interiors
        .iter()
        .map(|r| ring_from_positions(r))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}
