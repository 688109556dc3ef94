//! Geometry validity repair
//!
//! Rings coming out of extraction or reprojection may carry repeated
//! points, zero-width spikes or self-intersections. Repair cleans each ring,
//! nodes it at its self-intersections and splits it into simple loops.
//! Loops with no area are dropped, nested loops become holes, and the
//! surviving polygons are returned as a Polygon or MultiPolygon. Parts of a
//! MultiPolygon that share area are merged into one.
//!
//! A ring that is already simple is returned untouched (apart from
//! duplicate and spike removal), so repairing a valid footprint never moves
//! or reorders its vertices.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::orient::{Direction, Orient};
use geo::{
    Area, BooleanOps, Contains, Coord, InteriorPoint, Intersects, Line, LineString, MultiPolygon,
    Polygon,
};
use tracing::{debug, warn};

use super::{closed_ring, open_ring, remove_repeated_points, same_point, Geometry};
use crate::error::GeometryError;

/// Loops with less signed area than this are treated as collapsed
const MIN_LOOP_AREA: f64 = 1e-14;

/// Sine of the turn angle below which three points count as collinear
const COLLINEAR_TOLERANCE: f64 = 1e-10;

/// Repair every part of `geometry`, keeping only polygonal results.
///
/// Overlapping parts are unioned so no area is counted twice.
pub fn make_valid(geometry: &Geometry) -> Result<Geometry, GeometryError> {
    let mut polygons = Vec::new();
    for polygon in geometry.polygons() {
        match repair_polygon(polygon) {
            Ok(repaired) => polygons.extend(repaired.into_polygons()),
            Err(GeometryError::EmptyGeometry) => {
                debug!("Dropping part that collapsed during repair");
            }
            Err(e) => return Err(e),
        }
    }

    let repaired =
        Geometry::from_polygons(merge_overlapping(polygons)).ok_or(GeometryError::EmptyGeometry)?;
    let interiors = repaired.interior_count();
    if interiors > 0 {
        warn!("Repaired geometry still has {} interior ring(s)", interiors);
    }
    Ok(repaired)
}

fn overlaps(a: &Polygon<f64>, b: &Polygon<f64>) -> bool {
    a.intersects(b) && a.intersection(b).unsigned_area() >= MIN_LOOP_AREA
}

/// Union the parts when any two of them share area. Parts that are disjoint
/// or only touch are returned as they are.
fn merge_overlapping(polygons: Vec<Polygon<f64>>) -> Vec<Polygon<f64>> {
    let overlapping = polygons
        .iter()
        .enumerate()
        .any(|(i, a)| polygons[i + 1..].iter().any(|b| overlaps(a, b)));
    if !overlapping {
        return polygons;
    }

    debug!("Merging {} overlapping footprint parts", polygons.len());
    let mut parts = polygons.into_iter();
    let Some(first) = parts.next() else {
        return Vec::new();
    };
    let merged = parts.fold(MultiPolygon::new(vec![first]), |acc, part| {
        acc.union(&MultiPolygon::new(vec![part]))
    });
    merged
        .0
        .into_iter()
        .map(|p| p.orient(Direction::Default))
        .collect()
}

/// Repair a single polygon.
///
/// Fails with [`GeometryError::EmptyGeometry`] when nothing with area is
/// left.
pub fn repair_polygon(polygon: &Polygon<f64>) -> Result<Geometry, GeometryError> {
    let exterior = clean_ring(polygon.exterior());
    let interiors: Vec<Vec<Coord<f64>>> = polygon
        .interiors()
        .iter()
        .map(clean_ring)
        .filter(|r| r.len() >= 3)
        .collect();

    if exterior.len() < 3 {
        return Err(GeometryError::EmptyGeometry);
    }

    if is_valid_polygon(&exterior, &interiors) {
        let exterior = closed_ring(&exterior).ok_or(GeometryError::EmptyGeometry)?;
        let interiors = interiors.iter().filter_map(|r| closed_ring(r)).collect();
        return Ok(Geometry::Polygon(Polygon::new(exterior, interiors)));
    }

    debug!(
        "Footprint ring with {} vertices is invalid, rebuilding from simple loops",
        exterior.len()
    );

    let loops: Vec<Vec<Coord<f64>>> = std::iter::once(&exterior)
        .chain(interiors.iter())
        .flat_map(|ring| split_into_loops(&node_ring(ring)))
        .collect();

    let polygons = assemble_polygons(loops);
    Geometry::from_polygons(polygons).ok_or(GeometryError::EmptyGeometry)
}

/// Open vertex list with repeated points and spikes removed
fn clean_ring(ring: &LineString<f64>) -> Vec<Coord<f64>> {
    remove_spikes(remove_repeated_points(&open_ring(ring)))
}

/// Repeatedly drop vertices that duplicate their predecessor or where the
/// ring doubles back on itself.
fn remove_spikes(mut pts: Vec<Coord<f64>>) -> Vec<Coord<f64>> {
    loop {
        let n = pts.len();
        if n < 3 {
            return pts;
        }
        let found = (0..n).find(|&i| {
            let a = pts[(i + n - 1) % n];
            let b = pts[i];
            let c = pts[(i + 1) % n];
            same_point(a, b) || is_spike(a, b, c)
        });
        match found {
            Some(i) => {
                pts.remove(i);
            }
            None => return pts,
        }
    }
}

fn is_spike(a: Coord<f64>, b: Coord<f64>, c: Coord<f64>) -> bool {
    let ab = b - a;
    let bc = c - b;
    let cross = ab.x * bc.y - ab.y * bc.x;
    let dot = ab.x * bc.x + ab.y * bc.y;
    let scale = ab.x.hypot(ab.y) * bc.x.hypot(bc.y);
    cross.abs() <= COLLINEAR_TOLERANCE * scale && dot < 0.0
}

fn segment(pts: &[Coord<f64>], i: usize) -> Line<f64> {
    Line::new(pts[i], pts[(i + 1) % pts.len()])
}

fn signed_ring_area(pts: &[Coord<f64>]) -> f64 {
    let n = pts.len();
    (0..n)
        .map(|i| {
            let a = pts[i];
            let b = pts[(i + 1) % n];
            a.x * b.y - b.x * a.y
        })
        .sum::<f64>()
        / 2.0
}

/// No segment touches a non-adjacent one and the ring encloses some area
fn is_simple_ring(pts: &[Coord<f64>]) -> bool {
    let n = pts.len();
    if n < 3 || signed_ring_area(pts).abs() < MIN_LOOP_AREA {
        return false;
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(segment(pts, i), segment(pts, j)) {
                None => {}
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(_) => return false,
            }
        }
    }
    true
}

fn rings_touch(a: &[Coord<f64>], b: &[Coord<f64>]) -> bool {
    (0..a.len()).any(|i| {
        (0..b.len()).any(|j| line_intersection(segment(a, i), segment(b, j)).is_some())
    })
}

fn is_valid_polygon(exterior: &[Coord<f64>], interiors: &[Vec<Coord<f64>>]) -> bool {
    if !is_simple_ring(exterior) {
        return false;
    }
    if interiors.is_empty() {
        return true;
    }

    let shell = Polygon::new(LineString::new(exterior.to_vec()), vec![]);
    interiors.iter().enumerate().all(|(i, hole)| {
        is_simple_ring(hole)
            && !rings_touch(exterior, hole)
            && interior_point(hole).map_or(false, |p| shell.contains(&p))
            && interiors[i + 1..].iter().all(|other| {
                !rings_touch(hole, other)
                    && !interior_point(other).map_or(false, |p| ring_polygon(hole).contains(&p))
                    && !interior_point(hole).map_or(false, |p| ring_polygon(other).contains(&p))
            })
    })
}

fn ring_polygon(pts: &[Coord<f64>]) -> Polygon<f64> {
    Polygon::new(LineString::new(pts.to_vec()), vec![])
}

fn interior_point(pts: &[Coord<f64>]) -> Option<geo::Point<f64>> {
    ring_polygon(pts).interior_point()
}

/// Insert every self-intersection point into the ring.
///
/// Each crossing is computed once and the same coordinate is inserted into
/// both segments, so the loop splitter sees identical vertices.
fn node_ring(pts: &[Coord<f64>]) -> Vec<Coord<f64>> {
    let n = pts.len();
    let mut nodes: Vec<Vec<Coord<f64>>> = vec![Vec::new(); n];

    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(segment(pts, i), segment(pts, j)) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    if !adjacent {
                        nodes[i].push(intersection);
                        nodes[j].push(intersection);
                    }
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    for p in [intersection.start, intersection.end] {
                        nodes[i].push(p);
                        nodes[j].push(p);
                    }
                }
                None => {}
            }
        }
    }

    let mut noded = Vec::with_capacity(n);
    for (i, extra) in nodes.into_iter().enumerate() {
        let line = segment(pts, i);
        let start = snap(line.start, &line);
        noded.push(start);

        let mut inner: Vec<(f64, Coord<f64>)> = extra
            .into_iter()
            .map(|p| snap(p, &line))
            .filter(|&p| !same_point(p, line.start) && !same_point(p, line.end))
            .map(|p| (segment_parameter(&line, p), p))
            .collect();
        inner.sort_by(|a, b| a.0.total_cmp(&b.0));
        noded.extend(inner.into_iter().map(|(_, p)| p));
    }

    remove_repeated_points(&noded)
}

fn snap(p: Coord<f64>, line: &Line<f64>) -> Coord<f64> {
    if same_point(p, line.start) {
        line.start
    } else if same_point(p, line.end) {
        line.end
    } else {
        p
    }
}

fn segment_parameter(line: &Line<f64>, p: Coord<f64>) -> f64 {
    let d = line.delta();
    let len2 = d.x * d.x + d.y * d.y;
    if len2 == 0.0 {
        return 0.0;
    }
    ((p.x - line.start.x) * d.x + (p.y - line.start.y) * d.y) / len2
}

/// Walk a noded ring and cut it into loops at every revisited vertex.
fn split_into_loops(noded: &[Coord<f64>]) -> Vec<Vec<Coord<f64>>> {
    let mut loops = Vec::new();
    let mut path: Vec<Coord<f64>> = Vec::with_capacity(noded.len());

    for &v in noded {
        match path.iter().position(|&p| same_point(p, v)) {
            Some(idx) => {
                let mut closed = path.split_off(idx + 1);
                closed.insert(0, path[idx]);
                loops.push(closed);
            }
            None => path.push(v),
        }
    }
    loops.push(path);

    loops
        .into_iter()
        .map(remove_spikes)
        .filter(|l| l.len() >= 3 && signed_ring_area(l).abs() >= MIN_LOOP_AREA)
        .collect()
}

/// Nest loops by containment: even depth loops are shells, odd depth loops
/// are holes of their innermost enclosing shell.
fn assemble_polygons(loops: Vec<Vec<Coord<f64>>>) -> Vec<Polygon<f64>> {
    let rings: Vec<Polygon<f64>> = loops.iter().map(|l| ring_polygon(l)).collect();
    let probes: Vec<Option<geo::Point<f64>>> = rings.iter().map(|r| r.interior_point()).collect();

    let parents: Vec<Vec<usize>> = (0..rings.len())
        .map(|i| {
            (0..rings.len())
                .filter(|&j| j != i)
                .filter(|&j| probes[i].map_or(false, |p| rings[j].contains(&p)))
                .collect()
        })
        .collect();

    let mut shells: Vec<(usize, Vec<LineString<f64>>)> = Vec::new();
    let mut holes: Vec<(usize, usize)> = Vec::new();

    for (i, enclosing) in parents.iter().enumerate() {
        if enclosing.len() % 2 == 0 {
            shells.push((i, Vec::new()));
        } else if let Some(&parent) = enclosing
            .iter()
            .max_by_key(|&&j| parents[j].len())
        {
            holes.push((i, parent));
        }
    }

    for (hole, parent) in holes {
        if let Some((_, interiors)) = shells.iter_mut().find(|(s, _)| *s == parent) {
            if let Some(ring) = closed_ring(&loops[hole]) {
                interiors.push(ring);
            }
        }
    }

    shells
        .into_iter()
        .filter_map(|(i, interiors)| {
            closed_ring(&loops[i]).map(|exterior| {
                Polygon::new(exterior, interiors).orient(Direction::Default)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use geo::polygon;

    #[test]
    fn test_valid_polygon_is_unchanged() {
        // clockwise on purpose: orientation of valid input is preserved
        let p = polygon![
            (x: 178.6971513, y: 51.284135),
            (x: -179.96284, y: 51.3244249),
            (x: -179.79091, y: 52.3174983),
            (x: 178.602311, y: 52.2685335),
        ];
        let repaired = repair_polygon(&p).unwrap();
        assert_eq!(repaired, Geometry::Polygon(p));
    }

    #[test]
    fn test_repeated_points_removed() {
        let p = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        let repaired = repair_polygon(&p).unwrap();
        let expected = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)];
        assert_eq!(repaired, Geometry::Polygon(expected));
    }

    #[test]
    fn test_repeated_vertex_matches_deduplicated_ring() {
        let with_repeat = polygon![
            (x: -70.0, y: 6.0),
            (x: -74.0, y: 6.0),
            (x: -74.0, y: 6.5),
            (x: -74.0, y: 6.5),
            (x: -74.0, y: 7.0),
            (x: -70.0, y: 7.0),
            (x: -70.0, y: 6.0),
        ];
        let deduplicated = polygon![
            (x: -70.0, y: 6.0),
            (x: -74.0, y: 6.0),
            (x: -74.0, y: 6.5),
            (x: -74.0, y: 7.0),
            (x: -70.0, y: 7.0),
            (x: -70.0, y: 6.0),
        ];
        assert_eq!(repair_polygon(&with_repeat), repair_polygon(&deduplicated));
        let repaired = repair_polygon(&with_repeat).unwrap();
        let ring = repaired.polygons().next().unwrap().exterior();
        assert_eq!(ring.0.first(), ring.0.last());
    }

    #[test]
    fn test_spike_removed() {
        let p = polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 3.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 0.0, y: 2.0),
        ];
        let repaired = repair_polygon(&p).unwrap();
        assert_eq!(repaired.area(), 4.0);
        assert_eq!(repaired.polygons().next().unwrap().exterior().0.len(), 5);
    }

    #[test]
    fn test_bowtie_becomes_two_triangles() {
        let bowtie = polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 2.0), (x: 2.0, y: 0.0), (x: 0.0, y: 2.0)];
        let repaired = repair_polygon(&bowtie).unwrap();
        assert_eq!(repaired.type_name(), "MultiPolygon");
        assert_eq!(repaired.polygons().count(), 2);
        assert!((repaired.area() - 2.0).abs() < 1e-12);
        for part in repaired.polygons() {
            assert!(part.signed_area() > 0.0, "shells are counter-clockwise");
            assert!(part
                .exterior()
                .0
                .iter()
                .any(|c| same_point(*c, Coord { x: 1.0, y: 1.0 })));
        }
    }

    #[test]
    fn test_collinear_ring_is_empty() {
        let p = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 2.0, y: 0.0)];
        assert_eq!(repair_polygon(&p), Err(GeometryError::EmptyGeometry));
        let g = Geometry::Polygon(p);
        assert_eq!(make_valid(&g), Err(GeometryError::EmptyGeometry));
    }

    #[test]
    fn test_pinched_ring_splits_at_shared_vertex() {
        // two squares joined at (1, 1)
        let p = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 2.0, y: 1.0),
            (x: 2.0, y: 2.0),
            (x: 1.0, y: 2.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
        ];
        let repaired = repair_polygon(&p).unwrap();
        assert_eq!(repaired.polygons().count(), 2);
        assert!((repaired.area() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_nested_loop_becomes_hole() {
        let p = polygon!(
            exterior: [(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)],
            interiors: [[(x: 2.0, y: 2.0), (x: 2.0, y: 4.0), (x: 4.0, y: 4.0), (x: 4.0, y: 2.0)]],
        );
        let repaired = repair_polygon(&p).unwrap();
        assert_eq!(repaired.interior_count(), 1);
        assert!((repaired.area() - 96.0).abs() < 1e-12);
    }

    #[test]
    fn test_hole_outside_shell_becomes_separate_part() {
        let p = polygon!(
            exterior: [(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)],
            interiors: [[(x: 5.0, y: 5.0), (x: 5.0, y: 6.0), (x: 6.0, y: 6.0), (x: 6.0, y: 5.0)]],
        );
        let repaired = repair_polygon(&p).unwrap();
        assert_eq!(repaired.polygons().count(), 2);
        assert_eq!(repaired.interior_count(), 0);
    }

    #[test]
    fn test_overlapping_parts_are_merged() {
        let a = polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 2.0), (x: 0.0, y: 2.0)];
        let b = polygon![(x: 1.0, y: 1.0), (x: 3.0, y: 1.0), (x: 3.0, y: 3.0), (x: 1.0, y: 3.0)];
        let g = Geometry::MultiPolygon(MultiPolygon::new(vec![a, b]));

        let repaired = make_valid(&g).unwrap();
        assert_eq!(repaired.type_name(), "Polygon");
        assert_abs_diff_eq!(repaired.area(), 7.0, epsilon = 1e-9);
        assert_eq!(make_valid(&repaired).unwrap().area(), repaired.area());
    }

    #[test]
    fn test_disjoint_and_touching_parts_stay_apart() {
        let a = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)];
        let b = polygon![(x: 1.0, y: 1.0), (x: 2.0, y: 1.0), (x: 2.0, y: 2.0), (x: 1.0, y: 2.0)];
        let c = polygon![(x: 5.0, y: 5.0), (x: 6.0, y: 5.0), (x: 6.0, y: 6.0), (x: 5.0, y: 6.0)];
        let g = Geometry::MultiPolygon(MultiPolygon::new(vec![a, b, c]));
        assert_eq!(make_valid(&g).unwrap(), g);
    }

    #[test]
    fn test_repair_is_idempotent() {
        let bowtie = polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 2.0), (x: 2.0, y: 0.0), (x: 0.0, y: 2.0)];
        let once = make_valid(&Geometry::Polygon(bowtie)).unwrap();
        let twice = make_valid(&once).unwrap();
        assert_eq!(once, twice);
    }
}
