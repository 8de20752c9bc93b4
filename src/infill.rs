//! Infill generation
//!
//! Grid infill places axis-aligned lines every `nozzle_diameter /
//! fill_density` millimetres across the layer's contour bounding box. In
//! [`InfillMode::Clipped`] each line is cut against the closed contours using
//! the even-odd rule, so nested contours alternate between solid and hole.
//! [`InfillMode::BoundingBox`] is the degraded fallback that keeps every line
//! at full bounding-box width.

use nalgebra::Point3;
use tracing::debug;

use crate::model::{
    BoundingBox, Contour, FillPattern, InfillMode, Layer, POINT_TOLERANCE, Segment, SlicerConfig,
};

/// Scan direction of a family of grid lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    /// Lines of constant X, running along Y
    X,
    /// Lines of constant Y, running along X
    Y,
}

impl Axis {
    /// Coordinate held constant along the line
    fn fixed(self, p: &Point3<f64>) -> f64 {
        match self {
            Axis::X => p.x,
            Axis::Y => p.y,
        }
    }

    /// Coordinate varying along the line
    fn along(self, p: &Point3<f64>) -> f64 {
        match self {
            Axis::X => p.y,
            Axis::Y => p.x,
        }
    }

    fn point(self, fixed: f64, along: f64, z: f64) -> Point3<f64> {
        match self {
            Axis::X => Point3::new(fixed, along, z),
            Axis::Y => Point3::new(along, fixed, z),
        }
    }

    fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
        }
    }
}

/// Append infill segments to `layer`
///
/// No-op when the layer has no contours or `fill_density` is 0. Existing
/// infill is kept; callers fill each layer once.
pub fn fill(layer: &mut Layer, config: &SlicerConfig) {
    let Some(spacing) = config.infill_spacing() else {
        return;
    };
    if layer.contours.is_empty() || !(spacing.is_finite() && spacing > 0.0) {
        return;
    }

    let segments = match config.fill_pattern {
        FillPattern::Grid => grid(layer, spacing, config.infill_mode),
    };

    debug!(
        layer = layer.layer_index,
        segments = segments.len(),
        spacing,
        mode = %config.infill_mode,
        "Generated infill"
    );
    layer.infill.extend(segments);
}

/// Fill every layer of a stack
pub fn fill_layers(layers: &mut [Layer], config: &SlicerConfig) {
    for layer in layers {
        fill(layer, config);
    }
}

fn grid(layer: &Layer, spacing: f64, mode: InfillMode) -> Vec<Segment> {
    let points = layer.contours.iter().flat_map(|c| c.points().iter().copied());
    let Some(bbox) = BoundingBox::from_points(points) else {
        return Vec::new();
    };

    let z = layer.z_height;
    let mut segments = Vec::new();

    match mode {
        InfillMode::BoundingBox => {
            for axis in [Axis::X, Axis::Y] {
                let (lo, hi) = span(&bbox, other(axis));
                for c in line_positions(&bbox, axis, spacing, 0) {
                    segments.push(Segment::new(axis.point(c, lo, z), axis.point(c, hi, z)));
                }
            }
        }
        InfillMode::Clipped => {
            let closed: Vec<&Contour> = layer.closed_contours().collect();
            if closed.is_empty() {
                return segments;
            }
            // Interior lines only; a line on the box edge would trace the perimeter
            for axis in [Axis::X, Axis::Y] {
                for c in line_positions(&bbox, axis, spacing, 1) {
                    for (a, b) in clip_line(&closed, axis, c) {
                        segments.push(Segment::new(axis.point(c, a, z), axis.point(c, b, z)));
                    }
                }
            }
        }
    }

    segments
}

fn other(axis: Axis) -> Axis {
    match axis {
        Axis::X => Axis::Y,
        Axis::Y => Axis::X,
    }
}

fn span(bbox: &BoundingBox, axis: Axis) -> (f64, f64) {
    (bbox.min[axis.index()], bbox.max[axis.index()])
}

/// `min + k * spacing` for `k >= first_k`, strictly below the box maximum
///
/// Positions are computed from `k` directly, so doubling the density yields
/// a superset of the previous positions.
fn line_positions(
    bbox: &BoundingBox,
    axis: Axis,
    spacing: f64,
    first_k: usize,
) -> impl Iterator<Item = f64> {
    let (min, max) = span(bbox, axis);
    (first_k..)
        .map(move |k| (k as f64).mul_add(spacing, min))
        .take_while(move |&c| c < max)
}

/// Inside intervals of the line `axis == c`, even-odd over all contours
fn clip_line(contours: &[&Contour], axis: Axis, c: f64) -> Vec<(f64, f64)> {
    let mut crossings: Vec<f64> = Vec::new();
    for contour in contours {
        for (a, b) in contour.edges() {
            let (fa, fb) = (axis.fixed(a), axis.fixed(b));
            // Half-open rule: a vertex exactly on the line is counted once
            if (fa <= c) != (fb <= c) {
                let t = (c - fa) / (fb - fa);
                let (aa, ab) = (axis.along(a), axis.along(b));
                crossings.push(aa + t * (ab - aa));
            }
        }
    }
    crossings.sort_by(f64::total_cmp);

    crossings
        .chunks_exact(2)
        .map(|pair| (pair[0], pair[1]))
        .filter(|(a, b)| b - a > POINT_TOLERANCE)
        .collect()
}
