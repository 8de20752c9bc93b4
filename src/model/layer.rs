//! Layer stack types produced by slicing

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Distance below which two contour points are treated as the same point
pub const POINT_TOLERANCE: f64 = 1e-6;

/// Polyline boundary at one Z height
///
/// A closed contour repeats its first point as its last point. An open
/// contour (from non-manifold geometry) has distinct endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    points: Vec<Point3<f64>>,
}

impl Contour {
    /// Wrap a chain of points
    pub fn new(points: Vec<Point3<f64>>) -> Self {
        Self { points }
    }

    /// Points in chain-walk order
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    /// First point ≈ last point, with at least three distinct corners
    pub fn is_closed(&self) -> bool {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) if self.points.len() >= 4 => {
                nalgebra::distance(first, last) <= POINT_TOLERANCE
            }
            _ => false,
        }
    }

    /// Number of distinct corners (the closing point is not counted)
    pub fn vertex_count(&self) -> usize {
        if self.is_closed() {
            self.points.len() - 1
        } else {
            self.points.len()
        }
    }

    /// Consecutive point pairs
    pub fn edges(&self) -> impl Iterator<Item = (&Point3<f64>, &Point3<f64>)> + '_ {
        self.points.windows(2).map(|w| (&w[0], &w[1]))
    }

    /// Total polyline length
    pub fn length(&self) -> f64 {
        self.edges().map(|(a, b)| nalgebra::distance(a, b)).sum()
    }
}

/// Straight line segment (infill and support paths)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Start point
    pub start: Point3<f64>,
    /// End point
    pub end: Point3<f64>,
}

impl Segment {
    /// Create a segment
    pub fn new(start: Point3<f64>, end: Point3<f64>) -> Self {
        Self { start, end }
    }

    /// Euclidean length
    pub fn length(&self) -> f64 {
        nalgebra::distance(&self.start, &self.end)
    }
}

/// Geometry at one Z height
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// Height of the slicing plane
    pub z_height: f64,
    /// 0-based position in the stack, ascending with Z
    pub layer_index: usize,
    /// Boundary contours in insertion order
    pub contours: Vec<Contour>,
    /// Infill segments, each at `z_height`
    pub infill: Vec<Segment>,
    /// Support segments (never generated, kept for the export schema)
    pub supports: Vec<Segment>,
}

impl Layer {
    /// Layer with contours and no fill
    pub fn new(layer_index: usize, z_height: f64, contours: Vec<Contour>) -> Self {
        Self {
            z_height,
            layer_index,
            contours,
            infill: Vec::new(),
            supports: Vec::new(),
        }
    }

    /// Contours that close on themselves
    pub fn closed_contours(&self) -> impl Iterator<Item = &Contour> + '_ {
        self.contours.iter().filter(|c| c.is_closed())
    }

    /// Count of contours whose endpoints do not meet
    pub fn open_contour_count(&self) -> usize {
        self.contours.iter().filter(|c| !c.is_closed()).count()
    }

    /// Contour plus infill path length
    pub fn path_length(&self) -> f64 {
        let perimeter: f64 = self.contours.iter().map(Contour::length).sum();
        let fill: f64 = self.infill.iter().map(Segment::length).sum();
        perimeter + fill
    }
}

/// Serializable view of one layer with plain numeric arrays
///
/// Used both for single-layer preview queries and for the `layers` array of
/// the JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerPreview {
    /// Height of the slicing plane
    pub z_height: f64,
    /// 0-based layer position
    pub layer_index: usize,
    /// One point list per contour
    pub contours: Vec<Vec<[f64; 3]>>,
    /// Infill segments as `[start, end]`
    pub infill: Vec<[[f64; 3]; 2]>,
    /// Support segments as `[start, end]`
    pub supports: Vec<[[f64; 3]; 2]>,
}

fn point_array(p: &Point3<f64>) -> [f64; 3] {
    [p.x, p.y, p.z]
}

fn segment_array(s: &Segment) -> [[f64; 3]; 2] {
    [point_array(&s.start), point_array(&s.end)]
}

impl From<&Layer> for LayerPreview {
    fn from(layer: &Layer) -> Self {
        Self {
            z_height: layer.z_height,
            layer_index: layer.layer_index,
            contours: layer
                .contours
                .iter()
                .map(|c| c.points().iter().map(point_array).collect())
                .collect(),
            infill: layer.infill.iter().map(segment_array).collect(),
            supports: layer.supports.iter().map(segment_array).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(closed: bool) -> Contour {
        let mut points = vec![
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(2.0, 0.0, 1.0),
            Point3::new(2.0, 2.0, 1.0),
            Point3::new(0.0, 2.0, 1.0),
        ];
        if closed {
            points.push(points[0]);
        }
        Contour::new(points)
    }

    #[test]
    fn test_contour_closure() {
        let closed = square(true);
        assert!(closed.is_closed());
        assert_eq!(closed.vertex_count(), 4);
        assert!((closed.length() - 8.0).abs() < 1e-12);

        let open = square(false);
        assert!(!open.is_closed());
        assert_eq!(open.vertex_count(), 4);
        assert!((open.length() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_contour_is_open() {
        let p = Point3::new(1.0, 1.0, 0.0);
        assert!(!Contour::new(vec![p, p]).is_closed());
        assert!(!Contour::new(Vec::new()).is_closed());
    }

    #[test]
    fn test_layer_counts() {
        let mut layer = Layer::new(3, 1.0, vec![square(true), square(false)]);
        layer.infill.push(Segment::new(
            Point3::new(0.5, 0.0, 1.0),
            Point3::new(0.5, 2.0, 1.0),
        ));
        assert_eq!(layer.closed_contours().count(), 1);
        assert_eq!(layer.open_contour_count(), 1);
        assert!((layer.path_length() - 16.0).abs() < 1e-12);
    }

    #[test]
    fn test_preview_from_layer() {
        let mut layer = Layer::new(0, 1.0, vec![square(true)]);
        layer.infill.push(Segment::new(
            Point3::new(0.5, 0.0, 1.0),
            Point3::new(0.5, 2.0, 1.0),
        ));
        let preview = LayerPreview::from(&layer);
        assert_eq!(preview.layer_index, 0);
        assert_eq!(preview.contours[0].len(), 5);
        assert_eq!(preview.contours[0][1], [2.0, 0.0, 1.0]);
        assert_eq!(preview.infill, vec![[[0.5, 0.0, 1.0], [0.5, 2.0, 1.0]]]);
        assert!(preview.supports.is_empty());
    }
}
