//! Antimeridian and pole handling for geographic footprints
//!
//! A footprint reprojected from a UTM zone next to ±180° comes out with
//! vertices on both sides of the cut, so read naively it wraps around the
//! whole globe. The ring is cut into segments at every ±180° crossing and
//! the segments are stitched back together, either as separate polygons on
//! each side ([`AntimeridianStrategy::Split`]) or as one polygon with
//! longitudes shifted to a single sign convention
//! ([`AntimeridianStrategy::Normalize`]).
//!
//! A ring that crosses an odd number of times encloses a pole. It is closed
//! explicitly along the ±180° meridians up to the pole, and for `Split` it is
//! halved at the prime meridian so every part stays within one hemisphere.

use geo::orient::{Direction, Orient};
use geo::{Area, Centroid as _, Coord, LineString, MultiPolygon, Polygon};
use tracing::{debug, info};

use super::repair::repair_polygon;
use super::{closed_ring, open_ring, remove_repeated_points, Centroid, Geometry};
use crate::config::AntimeridianStrategy;
use crate::error::GeometryError;

type Segment = Vec<Coord<f64>>;

/// Wrap a longitude into [-180, 180], keeping both ends of the range.
pub fn wrap_longitude(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        lon
    } else {
        let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
        if wrapped == -180.0 && lon > 0.0 {
            180.0
        } else {
            wrapped
        }
    }
}

/// True when the geometry spans more than half the globe in naive longitude
/// or has longitudes outside [-180, 180].
pub fn crosses_antimeridian(geometry: &Geometry) -> bool {
    geometry.polygons().any(polygon_needs_fix)
}

fn polygon_needs_fix(polygon: &Polygon<f64>) -> bool {
    let xs = || polygon.exterior().coords().map(|c| c.x);
    let min = xs().fold(f64::INFINITY, f64::min);
    let max = xs().fold(f64::NEG_INFINITY, f64::max);
    max - min > 180.0 || min < -180.0 || max > 180.0
}

/// Re-express every part of `geometry` so that none wraps across ±180°.
///
/// Parts that do not cross are passed through with their longitudes
/// wrapped into range. Fails with
/// [`GeometryError::TopologyInvariantViolation`] when a crossing part has
/// interior rings.
pub fn fix_antimeridian(
    geometry: &Geometry,
    strategy: AntimeridianStrategy,
) -> Result<Geometry, GeometryError> {
    let mut polygons = Vec::new();
    for polygon in geometry.polygons() {
        polygons.extend(fix_polygon(polygon, strategy)?);
    }
    Geometry::from_polygons(polygons).ok_or(GeometryError::EmptyGeometry)
}

fn wrap_ring(ring: &LineString<f64>) -> LineString<f64> {
    ring.coords()
        .map(|c| Coord {
            x: wrap_longitude(c.x),
            y: c.y,
        })
        .collect()
}

fn fix_polygon(
    polygon: &Polygon<f64>,
    strategy: AntimeridianStrategy,
) -> Result<Vec<Polygon<f64>>, GeometryError> {
    if !polygon_needs_fix(polygon) {
        return Ok(vec![polygon.clone()]);
    }

    let exterior = wrap_ring(polygon.exterior());
    let interiors: Vec<LineString<f64>> = polygon.interiors().iter().map(wrap_ring).collect();
    let wrapped = Polygon::new(exterior, interiors);

    let ring = counter_clockwise_unwrapped(wrapped.exterior());
    let segments = segment_ring(&ring);

    if segments.is_empty() {
        debug!("Footprint spans more than 180° but never jumps across it");
        return Ok(vec![wrapped]);
    }

    if !polygon.interiors().is_empty() {
        return Err(GeometryError::TopologyInvariantViolation {
            interiors: polygon.interiors().len(),
        });
    }

    debug!("Footprint crosses the antimeridian {} time(s)", segments.len());

    if segments.len() % 2 == 1 {
        let cap = close_over_pole(&segments)?;
        return match strategy {
            AntimeridianStrategy::Split => split_at_prime_meridian(&cap),
            AntimeridianStrategy::Normalize => Ok(vec![cap]),
        };
    }

    let parts = build_polygons(segments.clone())?;
    if parts.is_empty() {
        return Err(GeometryError::EmptyGeometry);
    }
    match strategy {
        AntimeridianStrategy::Split => Ok(parts),
        AntimeridianStrategy::Normalize => Ok(vec![normalize(&segments, &parts)?]),
    }
}

/// Closed ring oriented counter-clockwise when read with negative
/// longitudes shifted by +360°.
fn counter_clockwise_unwrapped(ring: &LineString<f64>) -> Vec<Coord<f64>> {
    let unwrapped: LineString<f64> = ring
        .coords()
        .map(|c| Coord {
            x: if c.x < 0.0 { c.x + 360.0 } else { c.x },
            y: c.y,
        })
        .collect();
    let area = Polygon::new(unwrapped, vec![]).signed_area();

    let mut coords = ring.0.clone();
    if area < 0.0 {
        coords.reverse();
    }
    coords
}

/// Latitude where the segment `start -> end` meets the ±180° meridian.
///
/// An edge running from one side of the cut exactly onto the other (180 to
/// -180 or back) meets it at `start`.
fn crossing_latitude(start: Coord<f64>, end: Coord<f64>, to_east: bool) -> f64 {
    let (boundary, end_x) = if to_east {
        (180.0, end.x + 360.0)
    } else {
        (-180.0, end.x - 360.0)
    };
    let span = end_x - start.x;
    let t = if span == 0.0 {
        0.0
    } else {
        ((boundary - start.x) / span).clamp(0.0, 1.0)
    };
    start.y + t * (end.y - start.y)
}

/// Edge along a pole, as closed by [`close_over_pole`]
fn runs_along_pole(start: Coord<f64>, end: Coord<f64>) -> bool {
    start.y.abs() == 90.0 && start.y == end.y
}

/// Cut a closed ring at every ±180° jump. Each segment begins and ends on
/// the meridian except that the piece before the first crossing is joined
/// onto the piece after the last one.
fn segment_ring(coords: &[Coord<f64>]) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut current: Segment = Vec::new();

    for pair in coords.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        current.push(start);

        let delta = end.x - start.x;
        if runs_along_pole(start, end) {
            continue;
        }
        if delta > 180.0 {
            // westward across -180
            let lat = crossing_latitude(start, end, false);
            current.push(Coord { x: -180.0, y: lat });
            segments.push(std::mem::take(&mut current));
            current.push(Coord { x: 180.0, y: lat });
        } else if -delta > 180.0 {
            // eastward across 180
            let lat = crossing_latitude(start, end, true);
            current.push(Coord { x: 180.0, y: lat });
            segments.push(std::mem::take(&mut current));
            current.push(Coord { x: -180.0, y: lat });
        }
    }

    if segments.is_empty() {
        return segments;
    }

    match coords.last() {
        Some(&last) if segments[0].first() == Some(&last) => {
            current.extend(segments[0].drain(..));
            segments[0] = current;
        }
        Some(&last) => {
            current.push(last);
            segments.push(current);
        }
        None => {}
    }
    segments
}

fn ends_on_east(segment: &Segment) -> bool {
    segment.last().map_or(false, |c| c.x == 180.0)
}

fn is_self_closing(segment: &Segment) -> bool {
    let (Some(first), Some(last)) = (segment.first(), segment.last()) else {
        return false;
    };
    let east = last.x == 180.0;
    first.x == last.x && ((east && first.y > last.y) || (!east && first.y < last.y))
}

/// Stitch meridian-bounded segments into closed polygons, always joining
/// the nearest segment that continues along the same side of the cut.
///
/// Rings that enclose no area, such as a footprint edge lying on the
/// meridian itself, are dropped.
fn build_polygons(mut segments: Vec<Segment>) -> Result<Vec<Polygon<f64>>, GeometryError> {
    let mut polygons = Vec::new();

    while let Some(mut segment) = segments.pop() {
        loop {
            let (Some(&first), Some(&last)) = (segment.first(), segment.last()) else {
                break;
            };
            let east = ends_on_east(&segment);

            let mut candidates: Vec<(Option<usize>, f64)> = Vec::new();
            if is_self_closing(&segment) {
                candidates.push((None, first.y));
            }
            for (i, s) in segments.iter().enumerate() {
                let (Some(s_first), Some(s_last)) = (s.first(), s.last()) else {
                    continue;
                };
                if s_first.x != last.x {
                    continue;
                }
                let closer = if east {
                    s_first.y > last.y && (!is_self_closing(s) || s_last.y < first.y)
                } else {
                    s_first.y < last.y && (!is_self_closing(s) || s_last.y > first.y)
                };
                if closer {
                    candidates.push((Some(i), s_first.y));
                }
            }

            candidates.sort_by(|a, b| {
                if east {
                    a.1.total_cmp(&b.1)
                } else {
                    b.1.total_cmp(&a.1)
                }
            });

            match candidates.first() {
                Some(&(Some(index), _)) => {
                    let next = segments.remove(index);
                    segment.extend(next);
                }
                _ => {
                    let mut ring = Vec::with_capacity(segment.len() + 1);
                    ring.push(last);
                    ring.extend(segment.drain(..));
                    let polygon = Polygon::new(LineString::new(remove_repeated_points(&ring)), vec![]);
                    match repair_polygon(&polygon) {
                        Ok(repaired) => polygons.extend(repaired.into_polygons()),
                        Err(GeometryError::EmptyGeometry) => {
                            debug!("Dropping zero-area ring on the antimeridian");
                        }
                        Err(e) => return Err(e),
                    }
                    break;
                }
            }
        }
    }

    Ok(polygons)
}

/// Join all segments into one ring with longitudes shifted toward the side
/// holding most of the split area.
fn normalize(segments: &[Segment], parts: &[Polygon<f64>]) -> Result<Polygon<f64>, GeometryError> {
    let (mut east_area, mut west_area) = (0.0, 0.0);
    for part in parts {
        let mean_x = part.exterior().coords().map(|c| c.x).sum::<f64>()
            / part.exterior().0.len().max(1) as f64;
        if mean_x < 0.0 {
            west_area += part.unsigned_area();
        } else {
            east_area += part.unsigned_area();
        }
    }
    let positive = east_area >= west_area;
    debug!(
        "Normalizing footprint to {} longitudes",
        if positive { "non-negative" } else { "non-positive" }
    );

    let shift = |c: &Coord<f64>| Coord {
        x: match (positive, c.x) {
            (true, x) if x < 0.0 => x + 360.0,
            (false, x) if x > 0.0 => x - 360.0,
            (_, x) => x,
        },
        y: c.y,
    };

    let order = segments.len().checked_sub(1).into_iter().chain(0..segments.len().saturating_sub(1));
    let coords: Vec<Coord<f64>> = order
        .flat_map(|i| segments[i].iter().map(shift))
        .collect();

    closed_ring(&remove_repeated_points(&coords))
        .map(|ring| Polygon::new(ring, vec![]))
        .ok_or(GeometryError::EmptyGeometry)
}

/// Close a ring that crosses ±180° an odd number of times by running along
/// the meridian to the pole on the side of its mean latitude.
fn close_over_pole(segments: &[Segment]) -> Result<Polygon<f64>, GeometryError> {
    let coords: Vec<Coord<f64>> = segments.iter().flatten().copied().collect();
    let mean_lat = coords.iter().map(|c| c.y).sum::<f64>() / coords.len().max(1) as f64;
    let pole = if mean_lat >= 0.0 { 90.0 } else { -90.0 };
    info!(
        "Footprint encloses the {} pole",
        if pole > 0.0 { "north" } else { "south" }
    );

    let (Some(&first), Some(&last)) = (coords.first(), coords.last()) else {
        return Err(GeometryError::EmptyGeometry);
    };

    let mut ring = coords;
    ring.push(Coord { x: last.x, y: pole });
    ring.push(Coord { x: first.x, y: pole });

    closed_ring(&remove_repeated_points(&ring))
        .map(|ring| Polygon::new(ring, vec![]).orient(Direction::Default))
        .ok_or(GeometryError::EmptyGeometry)
}

/// Halve a polar cap at lon 0 so each part keeps to one hemisphere.
fn split_at_prime_meridian(cap: &Polygon<f64>) -> Result<Vec<Polygon<f64>>, GeometryError> {
    let ring = open_ring(cap.exterior());
    let mut parts = Vec::new();

    for west in [true, false] {
        let clipped = clip_half_plane(&ring, west);
        let Some(closed) = closed_ring(&remove_repeated_points(&clipped)) else {
            continue;
        };
        match repair_polygon(&Polygon::new(closed, vec![])) {
            Ok(repaired) => parts.extend(repaired.into_polygons()),
            Err(GeometryError::EmptyGeometry) => {}
            Err(e) => return Err(e),
        }
    }

    if parts.is_empty() {
        return Err(GeometryError::EmptyGeometry);
    }
    Ok(parts)
}

/// Sutherland-Hodgman clip of an open ring against `x <= 0` or `x >= 0`.
fn clip_half_plane(ring: &[Coord<f64>], west: bool) -> Vec<Coord<f64>> {
    let inside = |c: &Coord<f64>| if west { c.x <= 0.0 } else { c.x >= 0.0 };
    let cut = |p: Coord<f64>, q: Coord<f64>| {
        let t = -p.x / (q.x - p.x);
        Coord {
            x: 0.0,
            y: p.y + t * (q.y - p.y),
        }
    };

    let n = ring.len();
    let mut out = Vec::with_capacity(n + 2);
    for i in 0..n {
        let p = ring[i];
        let q = ring[(i + 1) % n];
        match (inside(&p), inside(&q)) {
            (true, true) => out.push(q),
            (true, false) => out.push(cut(p, q)),
            (false, true) => {
                out.push(cut(p, q));
                out.push(q);
            }
            (false, false) => {}
        }
    }
    out
}

/// Area-weighted centroid that stays on the correct side of the date line.
///
/// When a multipolygon's parts span more than 180° the western parts are
/// shifted by +360° before averaging. The result is wrapped into
/// (-180, 180].
pub fn centroid(geometry: &Geometry) -> Option<Centroid> {
    let point = match geometry {
        Geometry::Polygon(p) => p.centroid()?,
        Geometry::MultiPolygon(mp) => {
            let wide = geometry.bounding_box().map_or(false, |b| b.width() > 180.0);
            if wide {
                let shifted: MultiPolygon<f64> = mp
                    .iter()
                    .map(|part| {
                        let west = part.exterior().coords().all(|c| c.x <= 0.0);
                        if west {
                            shift_polygon(part, 360.0)
                        } else {
                            part.clone()
                        }
                    })
                    .collect();
                shifted.centroid()?
            } else {
                mp.centroid()?
            }
        }
    };

    let mut lon = point.x();
    if lon > 180.0 {
        lon -= 360.0;
    } else if lon <= -180.0 {
        lon += 360.0;
    }
    Some(Centroid { lat: point.y(), lon })
}

fn shift_polygon(polygon: &Polygon<f64>, dx: f64) -> Polygon<f64> {
    let shift = |ring: &LineString<f64>| -> LineString<f64> {
        ring.coords().map(|c| Coord { x: c.x + dx, y: c.y }).collect()
    };
    Polygon::new(
        shift(polygon.exterior()),
        polygon.interiors().iter().map(shift).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use geo::polygon;

    fn southern_tile() -> Geometry {
        Geometry::Polygon(polygon![
            (x: 179.5, y: -17.25),
            (x: -179.5, y: -17.25),
            (x: -179.5, y: -16.26),
            (x: 179.5, y: -16.26),
        ])
    }

    fn ring(p: &Polygon<f64>) -> Vec<(f64, f64)> {
        p.exterior().coords().map(|c| (c.x, c.y)).collect()
    }

    #[test]
    fn test_wrap_longitude() {
        assert_eq!(wrap_longitude(181.5), -178.5);
        assert_eq!(wrap_longitude(-181.25), 178.75);
        assert_eq!(wrap_longitude(180.0), 180.0);
        assert_eq!(wrap_longitude(-180.0), -180.0);
        assert_eq!(wrap_longitude(540.0), 180.0);
        assert_eq!(wrap_longitude(12.0), 12.0);
    }

    #[test]
    fn test_non_crossing_polygon_is_untouched() {
        let g = Geometry::Polygon(polygon![(x: 10.0, y: 45.0), (x: 11.0, y: 45.0), (x: 11.0, y: 46.0)]);
        assert!(!crosses_antimeridian(&g));
        assert_eq!(fix_antimeridian(&g, AntimeridianStrategy::Split).unwrap(), g);
        assert_eq!(fix_antimeridian(&g, AntimeridianStrategy::Normalize).unwrap(), g);
    }

    #[test]
    fn test_split_southern_tile() {
        let g = southern_tile();
        assert!(crosses_antimeridian(&g));
        let split = fix_antimeridian(&g, AntimeridianStrategy::Split).unwrap();
        let parts: Vec<&Polygon<f64>> = split.polygons().collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(
            ring(parts[0]),
            vec![(-180.0, -16.26), (-180.0, -17.25), (-179.5, -17.25), (-179.5, -16.26), (-180.0, -16.26)]
        );
        assert_eq!(
            ring(parts[1]),
            vec![(180.0, -17.25), (180.0, -16.26), (179.5, -16.26), (179.5, -17.25), (180.0, -17.25)]
        );
    }

    #[test]
    fn test_split_parts_stay_in_one_hemisphere() {
        let split = fix_antimeridian(&southern_tile(), AntimeridianStrategy::Split).unwrap();
        for part in split.polygons() {
            let xs: Vec<f64> = part.exterior().coords().map(|c| c.x).collect();
            assert!(xs.iter().all(|&x| x <= 0.0) || xs.iter().all(|&x| x >= 0.0));
        }
        assert_abs_diff_eq!(split.area(), 0.99, epsilon = 1e-9);
    }

    #[test]
    fn test_split_is_idempotent() {
        let once = fix_antimeridian(&southern_tile(), AntimeridianStrategy::Split).unwrap();
        let twice = fix_antimeridian(&once, AntimeridianStrategy::Split).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_normalize_southern_tile() {
        let normalized = fix_antimeridian(&southern_tile(), AntimeridianStrategy::Normalize).unwrap();
        let Geometry::Polygon(p) = &normalized else {
            panic!("expected a single polygon, got {:?}", normalized);
        };
        assert!(p.exterior().coords().all(|c| c.x >= 0.0));
        assert_eq!(
            ring(p),
            vec![
                (180.0, -17.25),
                (180.5, -17.25),
                (180.5, -16.26),
                (180.0, -16.26),
                (179.5, -16.26),
                (179.5, -17.25),
                (180.0, -17.25)
            ]
        );
        assert_abs_diff_eq!(normalized.area(), 0.99, epsilon = 1e-9);
    }

    #[test]
    fn test_normalize_prefers_majority_side() {
        // most of the tile lies west of the date line
        let g = Geometry::Polygon(polygon![
            (x: 179.9, y: 10.0),
            (x: -178.0, y: 10.0),
            (x: -178.0, y: 11.0),
            (x: 179.9, y: 11.0),
        ]);
        let normalized = fix_antimeridian(&g, AntimeridianStrategy::Normalize).unwrap();
        let p = normalized.polygons().next().unwrap();
        assert!(p.exterior().coords().all(|c| c.x <= 0.0));
        assert!(p.exterior().coords().any(|c| (c.x + 180.1).abs() < 1e-9));
    }

    #[test]
    fn test_clockwise_input_splits_the_same() {
        let mut reversed = southern_tile().into_polygons().remove(0);
        reversed.exterior_mut(|r| r.0.reverse());
        let split = fix_antimeridian(&Geometry::Polygon(reversed), AntimeridianStrategy::Split).unwrap();
        assert_eq!(split, fix_antimeridian(&southern_tile(), AntimeridianStrategy::Split).unwrap());
    }

    #[test]
    fn test_out_of_range_longitudes_are_wrapped() {
        let g = Geometry::Polygon(polygon![
            (x: 179.5, y: 51.0),
            (x: 180.5, y: 51.0),
            (x: 180.5, y: 52.0),
            (x: 179.5, y: 52.0),
        ]);
        assert!(crosses_antimeridian(&g));
        let split = fix_antimeridian(&g, AntimeridianStrategy::Split).unwrap();
        assert_eq!(split.polygons().count(), 2);
        let bbox = split.bounding_box().unwrap();
        assert_eq!(bbox.to_vec(), vec![-180.0, 51.0, 180.0, 52.0]);
    }

    #[test]
    fn test_interiors_on_crossing_polygon_are_fatal() {
        let g = Geometry::Polygon(polygon!(
            exterior: [(x: 170.0, y: 0.0), (x: -170.0, y: 0.0), (x: -170.0, y: 10.0), (x: 170.0, y: 10.0)],
            interiors: [[(x: 175.0, y: 2.0), (x: 175.0, y: 4.0), (x: 177.0, y: 4.0), (x: 177.0, y: 2.0)]],
        ));
        assert_eq!(
            fix_antimeridian(&g, AntimeridianStrategy::Split),
            Err(GeometryError::TopologyInvariantViolation { interiors: 1 })
        );
    }

    #[test]
    fn test_polar_cap_split_into_two_closed_rings() {
        // ring around the north pole at ~80°N crossing the date line once
        let g = Geometry::Polygon(polygon![
            (x: 0.0, y: 80.0),
            (x: 90.0, y: 80.0),
            (x: 179.0, y: 80.0),
            (x: -179.0, y: 80.0),
            (x: -90.0, y: 80.0),
        ]);
        let split = fix_antimeridian(&g, AntimeridianStrategy::Split).unwrap();
        let parts: Vec<&Polygon<f64>> = split.polygons().collect();
        assert_eq!(parts.len(), 2);
        for part in &parts {
            let r = part.exterior();
            assert_eq!(r.0.first(), r.0.last());
            assert!(r.coords().any(|c| c.y == 90.0));
            let xs: Vec<f64> = r.coords().map(|c| c.x).collect();
            assert!(xs.iter().all(|&x| x <= 0.0) || xs.iter().all(|&x| x >= 0.0));
        }
        assert_abs_diff_eq!(split.area(), 360.0 * 10.0, epsilon = 1e-6);

        let cap = fix_antimeridian(&g, AntimeridianStrategy::Normalize).unwrap();
        assert_eq!(cap.type_name(), "Polygon");
        assert_abs_diff_eq!(cap.area(), 360.0 * 10.0, epsilon = 1e-6);
        // the closing edge along the pole is not another crossing
        assert_eq!(fix_antimeridian(&cap, AntimeridianStrategy::Normalize).unwrap(), cap);
    }

    #[test]
    fn test_vertices_on_the_meridian_leave_no_sliver() {
        let g = Geometry::Polygon(polygon![
            (x: 179.0, y: 0.0),
            (x: -180.0, y: 0.0),
            (x: -180.0, y: 0.5),
            (x: -180.0, y: 1.0),
            (x: 179.0, y: 1.0),
        ]);
        let split = fix_antimeridian(&g, AntimeridianStrategy::Split).unwrap();
        let Geometry::Polygon(p) = &split else {
            panic!("expected a single polygon, got {:?}", split);
        };
        assert_eq!(
            ring(p),
            vec![(180.0, 0.0), (180.0, 1.0), (179.0, 1.0), (179.0, 0.0), (180.0, 0.0)]
        );

        let normalized = fix_antimeridian(&g, AntimeridianStrategy::Normalize).unwrap();
        assert_eq!(normalized.type_name(), "Polygon");
        assert_abs_diff_eq!(normalized.area(), 1.0, epsilon = 1e-9);
        assert!(normalized
            .polygons()
            .flat_map(|p| p.exterior().coords())
            .all(|c| (179.0..=180.0).contains(&c.x)));
    }

    #[test]
    fn test_edge_from_180_to_minus_180_is_a_crossing() {
        let g = Geometry::Polygon(polygon![
            (x: 179.0, y: 0.0),
            (x: 180.0, y: 0.0),
            (x: -180.0, y: 1.0),
            (x: 179.0, y: 1.0),
        ]);
        let split = fix_antimeridian(&g, AntimeridianStrategy::Split).unwrap();
        assert_eq!(split.type_name(), "Polygon");
        assert_abs_diff_eq!(split.area(), 1.0, epsilon = 1e-9);
        assert!(split
            .polygons()
            .flat_map(|p| p.exterior().coords())
            .all(|c| c.y.abs() <= 1.0));
    }

    #[test]
    fn test_centroid_of_split_footprint_is_west_when_mass_is_west() {
        let g = Geometry::Polygon(polygon![
            (x: 179.9, y: -17.25),
            (x: -179.0, y: -17.25),
            (x: -179.0, y: -16.25),
            (x: 179.9, y: -16.25),
        ]);
        let split = fix_antimeridian(&g, AntimeridianStrategy::Split).unwrap();
        let c = centroid(&split).unwrap();
        assert!(c.lon > -180.0 && c.lon < 0.0, "centroid lon {}", c.lon);
        assert_abs_diff_eq!(c.lon, -179.55, epsilon = 1e-9);
        assert_abs_diff_eq!(c.lat, -16.75, epsilon = 1e-9);
    }

    #[test]
    fn test_centroid_beyond_180_is_wrapped() {
        let g = Geometry::Polygon(polygon![
            (x: 180.2, y: 51.0),
            (x: 180.8, y: 51.0),
            (x: 180.8, y: 52.0),
            (x: 180.2, y: 52.0),
        ]);
        let c = centroid(&g).unwrap();
        assert_abs_diff_eq!(c.lon, -179.5, epsilon = 1e-9);
        assert_abs_diff_eq!(c.lat, 51.5, epsilon = 1e-9);
    }
}
