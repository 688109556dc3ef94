//! Reprojection of footprints from a projected CRS to geographic WGS84
//!
//! Sentinel-2 tiles are always delivered in a WGS84 / UTM zone, so the
//! default [`UtmTransform`] covers EPSG:326xx and EPSG:327xx with the
//! Snyder (USGS Prof. Paper 1395) series. Building with the `gdal` feature
//! adds [`GdalTransform`] for arbitrary EPSG pairs.
//!
//! Longitudes are NOT wrapped into [-180, 180]: a zone 1 tile that extends
//! past the antimeridian yields longitudes below -180, which the
//! antimeridian stage detects and repairs.

use geo::{Coord, MapCoords, Polygon};
use tracing::debug;

use super::round_coord;
use crate::error::GeometryError;

pub const WGS84_EPSG: u32 = 4326;

/// Transforms a single coordinate between two EPSG codes.
///
/// Implementations return a message on failure; the caller wraps it into a
/// [`GeometryError::Reprojection`].
pub trait CoordinateTransform: Send + Sync {
    fn transform(
        &self,
        source_epsg: u32,
        target_epsg: u32,
        coord: Coord<f64>,
    ) -> Result<Coord<f64>, String>;
}

impl<F> CoordinateTransform for F
where
    F: Fn(u32, u32, Coord<f64>) -> Result<Coord<f64>, String> + Send + Sync,
{
    fn transform(
        &self,
        source_epsg: u32,
        target_epsg: u32,
        coord: Coord<f64>,
    ) -> Result<Coord<f64>, String> {
        self(source_epsg, target_epsg, coord)
    }
}

// WGS84 ellipsoid
const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const E2: f64 = 2.0 * F - F * F;
const E_PRIME2: f64 = E2 / (1.0 - E2);
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Pure Rust WGS84 ↔ UTM transform
#[derive(Debug, Clone, Copy, Default)]
pub struct UtmTransform;

/// Zone and hemisphere of a WGS84 / UTM EPSG code: `Some((zone, is_north))`.
pub fn parse_utm_epsg(epsg: u32) -> Option<(u32, bool)> {
    if (32601..=32660).contains(&epsg) {
        Some((epsg - 32600, true))
    } else if (32701..=32760).contains(&epsg) {
        Some((epsg - 32700, false))
    } else {
        None
    }
}

fn central_meridian(zone: u32) -> f64 {
    (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0
}

impl CoordinateTransform for UtmTransform {
    fn transform(
        &self,
        source_epsg: u32,
        target_epsg: u32,
        coord: Coord<f64>,
    ) -> Result<Coord<f64>, String> {
        if source_epsg == target_epsg {
            return Ok(coord);
        }
        match (parse_utm_epsg(source_epsg), parse_utm_epsg(target_epsg)) {
            (Some((zone, north)), None) if target_epsg == WGS84_EPSG => {
                let (lon, lat) = utm_to_wgs84(coord.x, coord.y, zone, north);
                Ok(Coord { x: lon, y: lat })
            }
            (None, Some((zone, north))) if source_epsg == WGS84_EPSG => {
                let (x, y) = wgs84_to_utm(coord.x, coord.y, zone, north);
                Ok(Coord { x, y })
            }
            _ => Err(format!(
                "no built-in transform for EPSG:{} -> EPSG:{}",
                source_epsg, target_epsg
            )),
        }
    }
}

/// UTM (easting, northing) in metres to (longitude, latitude) in degrees.
///
/// The longitude is relative to the zone's central meridian and is not
/// wrapped.
fn utm_to_wgs84(easting: f64, northing: f64, zone: u32, north: bool) -> (f64, f64) {
    let x = easting - FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - FALSE_NORTHING_SOUTH
    };

    let e4 = E2 * E2;
    let e6 = e4 * E2;
    let m = y / K0;
    let mu = m / (A * (1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    let sqrt_1_e2 = (1.0 - E2).sqrt();
    let e1 = (1.0 - sqrt_1_e2) / (1.0 + sqrt_1_e2);
    let e1_2 = e1 * e1;
    let e1_3 = e1_2 * e1;
    let e1_4 = e1_3 * e1;

    // Footpoint latitude (Snyder eq. 3-26)
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1_3 / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1_2 / 16.0 - 55.0 * e1_4 / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1_3 / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1_4 / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let c1 = E_PRIME2 * cos_phi1 * cos_phi1;
    let t1 = tan_phi1 * tan_phi1;
    let denom = 1.0 - E2 * sin_phi1 * sin_phi1;
    let n1 = A / denom.sqrt();
    let r1 = A * (1.0 - E2) / denom.powf(1.5);
    let d = x / (n1 * K0);

    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d3 * d;
    let d5 = d4 * d;
    let d6 = d5 * d;

    // Snyder eq. 8-17 and 8-18
    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d2 / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * E_PRIME2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                    - 252.0 * E_PRIME2
                    - 3.0 * c1 * c1)
                    * d6
                    / 720.0);

    let dlon = (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
        + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * E_PRIME2 + 24.0 * t1 * t1) * d5
            / 120.0)
        / cos_phi1;

    (central_meridian(zone) + dlon.to_degrees(), lat.to_degrees())
}

/// (longitude, latitude) in degrees to UTM (easting, northing) in metres.
fn wgs84_to_utm(lon_deg: f64, lat_deg: f64, zone: u32, north: bool) -> (f64, f64) {
    let lat = lat_deg.to_radians();

    // Longitude offset from the central meridian, taken the short way round
    let mut dlon = lon_deg - central_meridian(zone);
    if dlon > 180.0 {
        dlon -= 360.0;
    } else if dlon < -180.0 {
        dlon += 360.0;
    }

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let tan_lat = lat.tan();

    let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = E_PRIME2 * cos_lat * cos_lat;
    let a = cos_lat * dlon.to_radians();

    let m = meridional_arc(lat);

    let a2 = a * a;
    let a4 = a2 * a2;
    let a6 = a4 * a2;

    let easting = K0
        * n
        * (a + (1.0 - t + c) * a2 * a / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a4 * a / 120.0)
        + FALSE_EASTING;

    let northing = K0
        * (m + n
            * tan_lat
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));

    let northing = if north {
        northing
    } else {
        northing + FALSE_NORTHING_SOUTH
    };

    (easting, northing)
}

/// Meridional arc from the equator to `lat` (radians), Snyder eq. 3-21
fn meridional_arc(lat: f64) -> f64 {
    let e4 = E2 * E2;
    let e6 = e4 * E2;

    A * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}

/// GDAL/PROJ backed transform for any EPSG pair
#[cfg(feature = "gdal")]
#[derive(Debug, Clone, Copy, Default)]
pub struct GdalTransform;

#[cfg(feature = "gdal")]
impl CoordinateTransform for GdalTransform {
    fn transform(
        &self,
        source_epsg: u32,
        target_epsg: u32,
        coord: Coord<f64>,
    ) -> Result<Coord<f64>, String> {
        use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};

        let source_srs = SpatialRef::from_epsg(source_epsg).map_err(|e| e.to_string())?;
        let target_srs = SpatialRef::from_epsg(target_epsg).map_err(|e| e.to_string())?;
        // x = longitude, y = latitude regardless of the EPSG axis order
        source_srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
        target_srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

        let transform =
            CoordTransform::new(&source_srs, &target_srs).map_err(|e| e.to_string())?;

        let mut xs = [coord.x];
        let mut ys = [coord.y];
        let mut zs = [0.0];
        transform
            .transform_coords(&mut xs, &mut ys, &mut zs)
            .map_err(|e| e.to_string())?;

        Ok(Coord { x: xs[0], y: ys[0] })
    }
}

/// The transform used when the caller does not supply one
pub fn default_transform() -> &'static dyn CoordinateTransform {
    #[cfg(feature = "gdal")]
    {
        &GdalTransform
    }
    #[cfg(not(feature = "gdal"))]
    {
        &UtmTransform
    }
}

/// Transform every vertex of `polygon` from `source_epsg` to `target_epsg`
/// and round to `precision` decimals.
///
/// Point count and ring structure are unchanged. Any failed or non-finite
/// vertex aborts the whole geometry.
pub fn reproject(
    polygon: &Polygon<f64>,
    source_epsg: u32,
    target_epsg: u32,
    transform: &dyn CoordinateTransform,
    precision: u32,
) -> Result<Polygon<f64>, GeometryError> {
    let fail = |message: String| GeometryError::Reprojection {
        source_epsg,
        target_epsg,
        message,
    };

    if source_epsg == target_epsg {
        return Ok(polygon.map_coords(|c| round_coord(c, precision)));
    }

    debug!(
        "Reprojecting {} vertices from EPSG:{} to EPSG:{}",
        polygon.exterior().0.len(),
        source_epsg,
        target_epsg
    );

    polygon.try_map_coords(|c| {
        let out = transform
            .transform(source_epsg, target_epsg, c)
            .map_err(fail)?;
        if !out.x.is_finite() || !out.y.is_finite() {
            return Err(fail(format!("non-finite result for ({}, {})", c.x, c.y)));
        }
        Ok(round_coord(out, precision))
    })
}

/// [`reproject`] to geographic WGS84
pub fn reproject_to_wgs84(
    polygon: &Polygon<f64>,
    source_epsg: u32,
    transform: &dyn CoordinateTransform,
    precision: u32,
) -> Result<Polygon<f64>, GeometryError> {
    reproject(polygon, source_epsg, WGS84_EPSG, transform, precision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use geo::polygon;

    #[test]
    fn test_parse_utm_epsg() {
        assert_eq!(parse_utm_epsg(32601), Some((1, true)));
        assert_eq!(parse_utm_epsg(32760), Some((60, false)));
        assert_eq!(parse_utm_epsg(4326), None);
        assert_eq!(parse_utm_epsg(32661), None);
    }

    #[test]
    fn test_central_meridian_maps_to_false_easting() {
        let c = UtmTransform
            .transform(32631, WGS84_EPSG, Coord { x: 500_000.0, y: 0.0 })
            .unwrap();
        assert_abs_diff_eq!(c.x, 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(c.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_inverse_matches_forward() {
        for &(lon, lat, epsg) in &[
            (-3.7038, 40.4168, 32630),
            (-58.3816, -34.6037, 32721),
            (178.7, 51.3, 32660),
            (7.2, 46.3, 32632),
        ] {
            let projected = UtmTransform
                .transform(WGS84_EPSG, epsg, Coord { x: lon, y: lat })
                .unwrap();
            let back = UtmTransform
                .transform(epsg, WGS84_EPSG, projected)
                .unwrap();
            assert_abs_diff_eq!(back.x, lon, epsilon = 1e-7);
            assert_abs_diff_eq!(back.y, lat, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_zone_one_does_not_wrap() {
        // 300 km west of the zone 1 central meridian is past the antimeridian
        let c = UtmTransform
            .transform(32601, WGS84_EPSG, Coord { x: 199_980.0, y: 5_700_000.0 })
            .unwrap();
        assert!(c.x < -180.0, "expected unwrapped longitude, got {}", c.x);
        assert!(c.y > 51.0 && c.y < 52.0);
    }

    #[test]
    fn test_unsupported_epsg() {
        let err = reproject_to_wgs84(
            &polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)],
            2056,
            &UtmTransform,
            6,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            GeometryError::Reprojection {
                source_epsg: 2056,
                target_epsg: 4326,
                ..
            }
        ));
    }

    #[test]
    fn test_reproject_rounds_and_keeps_ring_closed() {
        let tile = polygon![
            (x: 600_000.0, y: 5_100_000.0),
            (x: 709_800.0, y: 5_100_000.0),
            (x: 709_800.0, y: 5_209_800.0),
            (x: 600_000.0, y: 5_209_800.0),
        ];
        let out = reproject_to_wgs84(&tile, 32632, &UtmTransform, 6).unwrap();
        let ring = &out.exterior().0;
        assert_eq!(ring.first(), ring.last());
        for c in ring {
            assert_eq!(c.x, round_to_6(c.x));
            assert!(c.x > 10.0 && c.x < 12.0);
            assert!(c.y > 46.0 && c.y < 47.1);
        }
    }

    #[test]
    fn test_closure_transform() {
        let shift = |_: u32, _: u32, c: Coord<f64>| -> Result<Coord<f64>, String> {
            Ok(Coord { x: c.x / 1000.0, y: c.y / 1000.0 })
        };
        let square = geo::polygon![
            (x: 1000.0, y: 2000.0),
            (x: 2000.0, y: 2000.0),
            (x: 2000.0, y: 3000.0),
        ];
        let out = reproject_to_wgs84(&square, 2056, &shift, 6).unwrap();
        assert_eq!(out.exterior().0[0], Coord { x: 1.0, y: 2.0 });

        let failing = |_: u32, _: u32, _: Coord<f64>| -> Result<Coord<f64>, String> {
            Err("no grid".to_string())
        };
        let err = reproject_to_wgs84(&square, 2056, &failing, 6).unwrap_err();
        assert_eq!(err.kind(), "ReprojectionError");
    }

    fn round_to_6(v: f64) -> f64 {
        (v * 1e6).round() / 1e6
    }
}
