//! Layer slicing
//!
//! Intersects a mesh with horizontal planes and chains the resulting
//! segments into contours. Each layer depends only on the mesh and its own Z,
//! so layers can be computed on a rayon pool; results are always stored in
//! ascending `layer_index` order.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use nalgebra::Point3;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{BoxError, SliceError};
use crate::model::{Contour, Layer, Mesh, POINT_TOLERANCE, SlicerConfig};

/// Slack below the mesh top when deciding whether one more layer fits
pub const Z_TOLERANCE: f64 = 1e-9;

/// Largest sine of the turn angle at which a contour point counts as collinear
const COLLINEAR_TOLERANCE: f64 = 1e-9;

type ProgressFn<'a> = Box<dyn FnMut(usize, usize) -> Result<(), BoxError> + 'a>;

/// Runtime options for one slicing run
///
/// None of these change the produced layers; they only control reporting,
/// cancellation and threading.
///
/// # Example
///
/// ```
/// use meshslice::SliceOptions;
/// use std::sync::atomic::AtomicBool;
///
/// let cancel = AtomicBool::new(false);
/// let options = SliceOptions::new()
///     .with_progress(|done, total| {
///         println!("{done}/{total}");
///         Ok(())
///     })
///     .with_cancel_flag(&cancel)
///     .with_parallel(true);
/// # drop(options);
/// ```
#[derive(Default)]
pub struct SliceOptions<'a> {
    progress: Option<ProgressFn<'a>>,
    cancel: Option<&'a AtomicBool>,
    parallel: bool,
}

impl<'a> SliceOptions<'a> {
    /// Sequential slicing with no callback and no cancellation
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `progress(layers_completed, layers_total_estimate)` after every layer
    ///
    /// Returning an error aborts slicing with [`SliceError::ProgressAborted`].
    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: FnMut(usize, usize) -> Result<(), BoxError> + 'a,
    {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Stop with [`SliceError::Cancelled`] once `flag` is set
    ///
    /// The flag is checked between layers (between batches when parallel).
    pub fn with_cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Compute layers on the rayon thread pool
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn report(&mut self, completed: usize, total: usize) -> Result<(), SliceError> {
        if let Some(progress) = self.progress.as_mut() {
            progress(completed, total)
                .map_err(|source| SliceError::ProgressAborted { completed, source })?;
        }
        Ok(())
    }
}

impl fmt::Debug for SliceOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceOptions")
            .field("progress", &self.progress.is_some())
            .field("cancel", &self.cancel.is_some())
            .field("parallel", &self.parallel)
            .finish()
    }
}

/// Layer count estimate used for progress reporting
///
/// `floor((height - first_layer_height) / layer_height) + 1`, or 0 when the
/// mesh is thinner than the first layer.
pub fn estimated_layer_count(height: f64, config: &SlicerConfig) -> usize {
    let first = config.effective_first_layer_height();
    if !(height >= first) || !(config.layer_height > 0.0) {
        return 0;
    }
    ((height - first) / config.layer_height).floor() as usize + 1
}

/// Plane heights for a mesh spanning `z_min..z_max`
///
/// The first plane sits `first_layer_height` above `z_min`, later planes
/// step by `layer_height`, and a plane is only kept while it is below
/// `z_max`. Each height is computed from its index so rounding does not
/// accumulate.
pub fn layer_heights(z_min: f64, z_max: f64, config: &SlicerConfig) -> Vec<f64> {
    let first = config.effective_first_layer_height();
    let step = config.layer_height;
    if !(step.is_finite() && step > 0.0 && first.is_finite() && first > 0.0) {
        return Vec::new();
    }

    let base = z_min + first;
    let limit = z_max - Z_TOLERANCE;
    let mut heights = Vec::new();
    let mut index = 0usize;
    loop {
        let z = (index as f64).mul_add(step, base);
        if z >= limit {
            break;
        }
        heights.push(z);
        index += 1;
    }
    heights
}

/// Slice a mesh into contour layers
///
/// `mesh` and `config` are expected to have passed [`Mesh::validate`] and
/// [`SlicerConfig::validate`]. The returned layers carry contours only;
/// infill is added separately by [`crate::infill::fill`].
pub fn slice_mesh(
    mesh: &Mesh,
    config: &SlicerConfig,
    options: &mut SliceOptions<'_>,
) -> Result<Vec<Layer>, SliceError> {
    let Some(bbox) = mesh.bounding_box() else {
        return Ok(Vec::new());
    };

    let heights = layer_heights(bbox.min[2], bbox.max[2], config);
    let total = estimated_layer_count(bbox.height(), config).max(heights.len());

    info!(
        total_height = bbox.height(),
        layer_height = config.layer_height,
        first_layer_height = config.effective_first_layer_height(),
        layers = total,
        parallel = options.parallel,
        "Starting mesh slicing"
    );

    let batch_size = if options.parallel {
        rayon::current_num_threads().max(1)
    } else {
        1
    };

    let mut layers: Vec<Layer> = Vec::with_capacity(heights.len());
    for (batch, chunk) in heights.chunks(batch_size).enumerate() {
        if options.is_cancelled() {
            warn!(completed = layers.len(), "Slicing cancelled");
            return Err(SliceError::Cancelled {
                completed: layers.len(),
            });
        }

        let first_index = batch * batch_size;
        let computed: Vec<Layer> = if options.parallel {
            chunk
                .par_iter()
                .enumerate()
                .map(|(offset, &z)| slice_layer(mesh, first_index + offset, z))
                .collect()
        } else {
            chunk
                .iter()
                .enumerate()
                .map(|(offset, &z)| slice_layer(mesh, first_index + offset, z))
                .collect()
        };

        for layer in computed {
            layers.push(layer);
            options.report(layers.len(), total)?;
        }
    }

    let open: usize = layers.iter().map(Layer::open_contour_count).sum();
    info!(layers = layers.len(), open_contours = open, "Slicing complete");

    Ok(layers)
}

fn slice_layer(mesh: &Mesh, layer_index: usize, z: f64) -> Layer {
    let contours = slice_at(mesh, z);
    let open = contours.iter().filter(|c| !c.is_closed()).count();
    if open > 0 {
        warn!(
            layer = layer_index,
            z,
            open_contours = open,
            "Layer has open contours (non-manifold boundary)"
        );
    }
    debug!(layer = layer_index, z, contours = contours.len(), "Sliced layer");
    Layer::new(layer_index, z, contours)
}

/// Contours of the cross-section at height `z`
pub fn slice_at(mesh: &Mesh, z: f64) -> Vec<Contour> {
    let segments: Vec<[Point3<f64>; 2]> = mesh
        .triangles
        .iter()
        .filter_map(|t| intersect_triangle(&mesh.triangle_points(t), z))
        .collect();
    chain_segments(&segments)
}

/// Segment where a triangle crosses the plane `z`
///
/// A vertex exactly on the plane counts as above it. Triangles entirely on
/// one side, and crossings that collapse to a point, yield `None`.
fn intersect_triangle(points: &[Point3<f64>; 3], z: f64) -> Option<[Point3<f64>; 2]> {
    let above = [points[0].z >= z, points[1].z >= z, points[2].z >= z];
    let count = above.iter().filter(|&&a| a).count();
    if count == 0 || count == 3 {
        return None;
    }

    let mut crossings = [(0, 1), (1, 2), (2, 0)]
        .into_iter()
        .filter(|&(i, j)| above[i] != above[j])
        .map(|(i, j)| {
            // Always interpolate from the lower to the upper vertex so both
            // triangles sharing an edge produce the identical point
            if above[i] {
                edge_point(&points[j], &points[i], z)
            } else {
                edge_point(&points[i], &points[j], z)
            }
        });

    let (Some(a), Some(b)) = (crossings.next(), crossings.next()) else {
        return None;
    };
    if nalgebra::distance(&a, &b) <= POINT_TOLERANCE {
        return None;
    }
    Some([a, b])
}

/// Point at height `z` on the edge `lo -> hi`, where `lo.z < z <= hi.z`
fn edge_point(lo: &Point3<f64>, hi: &Point3<f64>, z: f64) -> Point3<f64> {
    if hi.z == z {
        return Point3::new(hi.x, hi.y, z);
    }
    let t = (z - lo.z) / (hi.z - lo.z);
    Point3::new(lo.x + t * (hi.x - lo.x), lo.y + t * (hi.y - lo.y), z)
}

/// Spatial hash over segment endpoints, one cell per tolerance step in XY
struct EndpointIndex {
    cells: HashMap<(i64, i64), Vec<(usize, usize)>>,
}

impl EndpointIndex {
    fn new(segments: &[[Point3<f64>; 2]]) -> Self {
        let mut cells: HashMap<(i64, i64), Vec<(usize, usize)>> = HashMap::new();
        for (segment, ends) in segments.iter().enumerate() {
            for (end, point) in ends.iter().enumerate() {
                cells.entry(cell(point)).or_default().push((segment, end));
            }
        }
        Self { cells }
    }

    /// Lowest-numbered unused segment with an endpoint within tolerance of `p`
    fn find(
        &self,
        p: &Point3<f64>,
        segments: &[[Point3<f64>; 2]],
        used: &[bool],
    ) -> Option<(usize, usize)> {
        let (cx, cy) = cell(p);
        let mut best: Option<(usize, usize)> = None;
        for dx in -1..=1 {
            for dy in -1..=1 {
                let Some(entries) = self.cells.get(&(cx + dx, cy + dy)) else {
                    continue;
                };
                for &(segment, end) in entries {
                    if used[segment]
                        || nalgebra::distance(&segments[segment][end], p) > POINT_TOLERANCE
                    {
                        continue;
                    }
                    if best.is_none_or(|b| (segment, end) < b) {
                        best = Some((segment, end));
                    }
                }
            }
        }
        best
    }
}

fn cell(p: &Point3<f64>) -> (i64, i64) {
    (
        (p.x / POINT_TOLERANCE).floor() as i64,
        (p.y / POINT_TOLERANCE).floor() as i64,
    )
}

fn closes(chain: &VecDeque<Point3<f64>>) -> bool {
    match (chain.front(), chain.back()) {
        (Some(head), Some(tail)) if chain.len() >= 4 => {
            nalgebra::distance(head, tail) <= POINT_TOLERANCE
        }
        _ => false,
    }
}

/// Join segments sharing endpoints into contours
///
/// Chains start from the lowest unused segment and grow from the tail, then
/// from the head, until they close or run out of neighbours. Output order is
/// therefore deterministic for a given segment list.
fn chain_segments(segments: &[[Point3<f64>; 2]]) -> Vec<Contour> {
    let index = EndpointIndex::new(segments);
    let mut used = vec![false; segments.len()];
    let mut contours = Vec::new();

    for start in 0..segments.len() {
        if used[start] {
            continue;
        }
        used[start] = true;

        let mut chain = VecDeque::from([segments[start][0], segments[start][1]]);
        let mut closed = false;

        while let Some(tail) = chain.back().copied() {
            let Some((segment, end)) = index.find(&tail, segments, &used) else {
                break;
            };
            used[segment] = true;
            chain.push_back(segments[segment][1 - end]);
            if closes(&chain) {
                closed = true;
                break;
            }
        }

        if !closed {
            while let Some(head) = chain.front().copied() {
                let Some((segment, end)) = index.find(&head, segments, &used) else {
                    break;
                };
                used[segment] = true;
                chain.push_front(segments[segment][1 - end]);
                if closes(&chain) {
                    closed = true;
                    break;
                }
            }
        }

        let mut points: Vec<Point3<f64>> = chain.into();
        if closed {
            let first = points[0];
            if let Some(last) = points.last_mut() {
                *last = first;
            }
        }
        contours.push(Contour::new(simplify(points, closed)));
    }

    contours
}

/// `b` adds nothing between `a` and `c`: a duplicate or a straight continuation
fn is_redundant(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> bool {
    let ab = b - a;
    let bc = c - b;
    let (ab_len, bc_len) = (ab.norm(), bc.norm());
    if ab_len <= POINT_TOLERANCE || bc_len <= POINT_TOLERANCE {
        return true;
    }
    let cross = ab.x * bc.y - ab.y * bc.x;
    cross.abs() <= COLLINEAR_TOLERANCE * ab_len * bc_len && ab.dot(&bc) > 0.0
}

/// Drop interior collinear points; a closed ring keeps at least three corners
fn simplify(points: Vec<Point3<f64>>, closed: bool) -> Vec<Point3<f64>> {
    if !closed {
        let mut out: Vec<Point3<f64>> = Vec::with_capacity(points.len());
        for p in points {
            if matches!(out.as_slice(), [.., a, b] if is_redundant(a, b, &p)) {
                out.pop();
            }
            out.push(p);
        }
        return out;
    }

    // Work on the ring without its repeated closing point
    let mut ring = points;
    ring.pop();

    let mut changed = true;
    while changed && ring.len() > 3 {
        changed = false;
        let mut i = 0;
        while i < ring.len() && ring.len() > 3 {
            let n = ring.len();
            let prev = ring[(i + n - 1) % n];
            let next = ring[(i + 1) % n];
            if is_redundant(&prev, &ring[i], &next) {
                ring.remove(i);
                changed = true;
            } else {
                i += 1;
            }
        }
    }

    let first = ring[0];
    ring.push(first);
    ring
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Triangle, Vertex};

    fn p(x: f64, y: f64) -> Point3<f64> {
        Point3::new(x, y, 0.0)
    }

    fn cube(half: f64) -> Mesh {
        let mut mesh = Mesh::new();
        for &(x, y, z) in &[
            (-1.0, -1.0, -1.0),
            (1.0, -1.0, -1.0),
            (1.0, 1.0, -1.0),
            (-1.0, 1.0, -1.0),
            (-1.0, -1.0, 1.0),
            (1.0, -1.0, 1.0),
            (1.0, 1.0, 1.0),
            (-1.0, 1.0, 1.0),
        ] {
            mesh.vertices.push(Vertex::new(x * half, y * half, z * half));
        }
        for [a, b, c] in [
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 7, 6],
            [3, 6, 2],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ] {
            mesh.triangles.push(Triangle::new(a, b, c));
        }
        mesh
    }

    #[test]
    fn test_layer_heights_unit_cube() {
        let config = SlicerConfig::new().with_layer_height(0.2);
        let heights = layer_heights(-0.5, 0.5, &config);
        let expected = [-0.3, -0.1, 0.1, 0.3];
        assert_eq!(heights.len(), expected.len());
        for (z, e) in heights.iter().zip(expected) {
            assert!((z - e).abs() < 1e-12, "{z} vs {e}");
        }
    }

    #[test]
    fn test_layer_heights_first_layer_override() {
        let config = SlicerConfig::new()
            .with_layer_height(0.5)
            .with_first_layer_height(0.3);
        let heights = layer_heights(0.0, 2.0, &config);
        assert_eq!(heights.len(), 4);
        assert!((heights[0] - 0.3).abs() < 1e-12);
        assert!((heights[3] - 1.8).abs() < 1e-12);
    }

    #[test]
    fn test_layer_heights_thin_mesh() {
        let config = SlicerConfig::new().with_layer_height(0.2);
        assert!(layer_heights(0.0, 0.1, &config).is_empty());
        assert_eq!(estimated_layer_count(0.1, &config), 0);
    }

    #[test]
    fn test_estimated_layer_count() {
        let config = SlicerConfig::new()
            .with_layer_height(0.25)
            .with_first_layer_height(0.5);
        assert_eq!(estimated_layer_count(1.5, &config), 5);
        assert_eq!(estimated_layer_count(0.5, &config), 1);
    }

    #[test]
    fn test_intersect_triangle_crossing() {
        let tri = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 2.0),
            Point3::new(0.0, 2.0, 2.0),
        ];
        let [a, b] = intersect_triangle(&tri, 1.0).unwrap();
        assert_eq!(a, Point3::new(1.0, 0.0, 1.0));
        assert_eq!(b, Point3::new(0.0, 1.0, 1.0));
    }

    #[test]
    fn test_intersect_triangle_misses() {
        let tri = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.5),
            Point3::new(0.0, 1.0, 0.5),
        ];
        assert!(intersect_triangle(&tri, 1.0).is_none());
        assert!(intersect_triangle(&tri, -1.0).is_none());
    }

    #[test]
    fn test_vertex_on_plane_is_dropped() {
        // Only the apex touches the plane: the crossing collapses to a point
        let tri = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 1.0),
        ];
        assert!(intersect_triangle(&tri, 1.0).is_none());
    }

    #[test]
    fn test_edge_on_plane_counts_once() {
        // Edge 1-2 lies on the plane; the triangle below reports it
        let below = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        ];
        let above = [
            Point3::new(1.0, 1.0, 2.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        ];
        let [a, b] = intersect_triangle(&below, 1.0).unwrap();
        assert_eq!(a, Point3::new(1.0, 0.0, 1.0));
        assert_eq!(b, Point3::new(0.0, 1.0, 1.0));
        assert!(intersect_triangle(&above, 1.0).is_none());
    }

    #[test]
    fn test_chain_square_from_shuffled_segments() {
        let segments = [
            [p(1.0, 0.0), p(1.0, 1.0)],
            [p(0.0, 1.0), p(0.0, 0.0)],
            [p(0.0, 0.0), p(1.0, 0.0)],
            [p(0.0, 1.0), p(1.0, 1.0)],
        ];
        let contours = chain_segments(&segments);
        assert_eq!(contours.len(), 1);
        let contour = &contours[0];
        assert!(contour.is_closed());
        assert_eq!(contour.vertex_count(), 4);
        assert_eq!(contour.points().first(), contour.points().last());
    }

    #[test]
    fn test_chain_open_polyline() {
        let segments = [[p(1.0, 0.0), p(2.0, 1.0)], [p(0.0, 0.0), p(1.0, 0.0)]];
        let contours = chain_segments(&segments);
        assert_eq!(contours.len(), 1);
        assert!(!contours[0].is_closed());
        assert_eq!(
            contours[0].points(),
            &[p(0.0, 0.0), p(1.0, 0.0), p(2.0, 1.0)]
        );
    }

    #[test]
    fn test_chain_tolerates_tiny_gaps() {
        let gap = POINT_TOLERANCE / 4.0;
        let segments = [
            [p(0.0, 0.0), p(1.0, 0.0)],
            [p(1.0 + gap, 0.0), p(1.0, 1.0)],
            [p(1.0, 1.0 - gap), p(0.0, 0.0)],
        ];
        let contours = chain_segments(&segments);
        assert_eq!(contours.len(), 1);
        assert!(contours[0].is_closed());
        assert_eq!(contours[0].vertex_count(), 3);
    }

    #[test]
    fn test_simplify_removes_collinear_points() {
        let ring = vec![
            p(0.0, 0.0),
            p(0.5, 0.0),
            p(1.0, 0.0),
            p(1.0, 1.0),
            p(0.0, 1.0),
            p(0.0, 0.5),
            p(0.0, 0.0),
        ];
        let simplified = simplify(ring, true);
        assert_eq!(
            simplified,
            vec![p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0), p(0.0, 1.0), p(0.0, 0.0)]
        );
    }

    #[test]
    fn test_simplify_keeps_spikes() {
        // Reversal is not a straight continuation
        let open = vec![p(0.0, 0.0), p(1.0, 0.0), p(0.5, 0.0)];
        assert_eq!(simplify(open.clone(), false), open);
    }

    #[test]
    fn test_slice_cube_layers() {
        let mesh = cube(0.5);
        let config = SlicerConfig::new().with_layer_height(0.2);
        let layers = slice_mesh(&mesh, &config, &mut SliceOptions::new()).unwrap();

        assert_eq!(layers.len(), 4);
        for (i, layer) in layers.iter().enumerate() {
            assert_eq!(layer.layer_index, i);
            assert_eq!(layer.contours.len(), 1);
            let contour = &layer.contours[0];
            assert!(contour.is_closed());
            assert_eq!(contour.vertex_count(), 4);
            assert!((contour.length() - 4.0).abs() < 1e-9);
            assert!(contour.points().iter().all(|q| q.z == layer.z_height));
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mesh = cube(3.0);
        let config = SlicerConfig::new().with_layer_height(0.3);
        let sequential = slice_mesh(&mesh, &config, &mut SliceOptions::new()).unwrap();
        let parallel =
            slice_mesh(&mesh, &config, &mut SliceOptions::new().with_parallel(true)).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_progress_reports_every_layer() {
        let mesh = cube(0.5);
        let config = SlicerConfig::new().with_layer_height(0.2);
        let mut calls = Vec::new();
        {
            let mut options = SliceOptions::new().with_progress(|done, total| {
                calls.push((done, total));
                Ok(())
            });
            slice_mesh(&mesh, &config, &mut options).unwrap();
        }
        assert_eq!(calls.len(), 4);
        assert_eq!(calls.iter().map(|c| c.0).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert!(calls.iter().all(|&(done, total)| done <= total));
    }

    #[test]
    fn test_progress_error_aborts() {
        let mesh = cube(0.5);
        let config = SlicerConfig::new().with_layer_height(0.2);
        let mut options = SliceOptions::new().with_progress(|done, _| {
            if done == 2 {
                Err("stop".into())
            } else {
                Ok(())
            }
        });
        let err = slice_mesh(&mesh, &config, &mut options).unwrap_err();
        assert!(matches!(err, SliceError::ProgressAborted { completed: 2, .. }));
    }

    #[test]
    fn test_cancel_flag() {
        let mesh = cube(0.5);
        let config = SlicerConfig::new().with_layer_height(0.2);
        let cancel = AtomicBool::new(false);
        let mut options = SliceOptions::new()
            .with_cancel_flag(&cancel)
            .with_progress(|done, _| {
                if done == 1 {
                    cancel.store(true, Ordering::Relaxed);
                }
                Ok(())
            });
        let err = slice_mesh(&mesh, &config, &mut options).unwrap_err();
        assert!(matches!(err, SliceError::Cancelled { completed: 1 }));
    }

    #[test]
    fn test_empty_mesh_has_no_layers() {
        let layers =
            slice_mesh(&Mesh::new(), &SlicerConfig::new(), &mut SliceOptions::new()).unwrap();
        assert!(layers.is_empty());
    }
}
