//! Footprint extraction from the whitespace-separated `EXT_POS_LIST` text

use geo::{Coord, LineString, Polygon};
use tracing::debug;

use super::{closed_ring, remove_repeated_points, same_point};
use crate::error::GeometryError;

/// Parse a flat list of coordinate tokens into 2D points.
///
/// The list is stored latitude first; returned points are `(lon, lat)`.
/// When the value count is a multiple of three and every third value is
/// zero the list carries a zero altitude, which is stripped. Blank tokens
/// are ignored.
pub fn parse_coordinates<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<Coord<f64>>, GeometryError> {
    let values = tokens
        .iter()
        .map(AsRef::as_ref)
        .filter(|t| !t.trim().is_empty())
        .enumerate()
        .map(|(position, token)| {
            token
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| GeometryError::MalformedFootprint {
                    token: token.to_string(),
                    position,
                })
        })
        .collect::<Result<Vec<f64>, _>>()?;

    let values = if has_zero_altitude(&values) {
        debug!("Stripping zero altitude from {} footprint values", values.len());
        values
            .chunks_exact(3)
            .flat_map(|c| [c[0], c[1]])
            .collect::<Vec<_>>()
    } else {
        values
    };

    if values.len() % 2 != 0 {
        return Err(GeometryError::MalformedFootprint {
            token: values.last().map(|v| v.to_string()).unwrap_or_default(),
            position: values.len() - 1,
        });
    }

    Ok(values
        .chunks_exact(2)
        .map(|pair| Coord { x: pair[1], y: pair[0] })
        .collect())
}

fn has_zero_altitude(values: &[f64]) -> bool {
    !values.is_empty()
        && values.len() % 3 == 0
        && values.chunks_exact(3).all(|c| c[2] == 0.0)
}

/// Parse a footprint and close it into a ring.
///
/// Consecutive duplicates are dropped before the distinct-point count is
/// checked; fewer than three distinct points is a degenerate footprint.
pub fn extract_ring<S: AsRef<str>>(tokens: &[S]) -> Result<LineString<f64>, GeometryError> {
    let coords = parse_coordinates(tokens)?;
    let open = remove_repeated_points(&coords);

    closed_ring(&open).ok_or_else(|| GeometryError::DegenerateGeometry {
        distinct: distinct_count(&open),
    })
}

/// Parse a footprint into an exterior-only polygon.
pub fn extract_polygon<S: AsRef<str>>(tokens: &[S]) -> Result<Polygon<f64>, GeometryError> {
    extract_ring(tokens).map(|ring| Polygon::new(ring, vec![]))
}

/// Convenience wrapper splitting the raw element text on whitespace.
pub fn extract_polygon_from_text(text: &str) -> Result<Polygon<f64>, GeometryError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    extract_polygon(&tokens)
}

fn distinct_count(coords: &[Coord<f64>]) -> usize {
    let mut seen: Vec<Coord<f64>> = Vec::new();
    for &c in coords {
        if !seen.iter().any(|&s| same_point(s, c)) {
            seen.push(c);
        }
    }
    seen.len()
}
