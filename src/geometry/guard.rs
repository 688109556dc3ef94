//! Plausibility check on the final footprint area

use tracing::error;

use super::Geometry;
use crate::error::GeometryError;

/// Reject a footprint whose planar area, in square decimal degrees, is above
/// `max_area`.
///
/// A Sentinel-2 tile covers a few square degrees at most. A footprint that
/// ends up covering the inverse of the scene (most of the globe) after a
/// bad antimeridian or pole reconstruction lands in the tens of thousands.
pub fn check_area(geometry: &Geometry, max_area: f64) -> Result<f64, GeometryError> {
    let area = geometry.area();
    if area > max_area {
        error!(
            "Footprint area {:.3} exceeds the {} square degree threshold",
            area, max_area
        );
        return Err(GeometryError::AreaTooLarge {
            area,
            threshold: max_area,
        });
    }
    Ok(area)
}
