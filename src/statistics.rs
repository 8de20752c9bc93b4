//! Aggregate statistics over a layer stack

use serde::{Deserialize, Serialize};

use crate::mesh_ops;
use crate::model::{BoundingBox, Layer, Mesh, SlicerConfig};

/// Minutes per layer assumed by the print time estimate
pub const MINUTES_PER_LAYER: f64 = 0.5;

/// Summary of a sliced model
///
/// `estimated_time_minutes` is a coarse heuristic (half a minute per layer
/// height step), not a physical print-time model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Stats {
    /// Number of layers in the stack
    pub total_layers: usize,
    /// `first_layer_height + (total_layers - 1) * layer_height`
    pub total_height_mm: f64,
    /// `total_height_mm / layer_height * 0.5`
    pub estimated_time_minutes: f64,
    /// Mesh bounds after centering, once a mesh is loaded
    pub bounding_box: Option<BoundingBox>,
    /// Contours across all layers
    pub contour_count: usize,
    /// Contours whose endpoints do not meet
    pub open_contour_count: usize,
    /// Infill segments across all layers
    pub infill_segment_count: usize,
    /// Summed contour and infill length
    pub extrusion_path_length_mm: f64,
    /// Enclosed mesh volume, when it can be computed
    pub mesh_volume_mm3: Option<f64>,
    /// Divergence-theorem volume; negative when the faces wind inward
    pub mesh_signed_volume_mm3: Option<f64>,
}

/// Compute statistics for a layer stack
///
/// An empty stack yields zeroed layer figures; mesh figures are still
/// reported when `mesh` is given.
pub fn statistics(layers: &[Layer], config: &SlicerConfig, mesh: Option<&Mesh>) -> Stats {
    let mut stats = Stats {
        bounding_box: mesh.and_then(Mesh::bounding_box),
        mesh_volume_mm3: mesh.and_then(mesh_ops::volume),
        mesh_signed_volume_mm3: mesh.map(mesh_ops::signed_volume),
        ..Stats::default()
    };

    if layers.is_empty() {
        return stats;
    }

    stats.total_layers = layers.len();
    stats.total_height_mm = ((layers.len() - 1) as f64)
        .mul_add(config.layer_height, config.effective_first_layer_height());
    stats.estimated_time_minutes = stats.total_height_mm / config.layer_height * MINUTES_PER_LAYER;

    for layer in layers {
        stats.contour_count += layer.contours.len();
        stats.open_contour_count += layer.open_contour_count();
        stats.infill_segment_count += layer.infill.len();
        stats.extrusion_path_length_mm += layer.path_length();
    }

    stats
}
