//! Data structures for meshes, configuration and the layer stack

mod config;
mod core;
mod layer;

pub use config::{FillPattern, InfillMode, SlicerConfig};
pub use core::{BoundingBox, Mesh, Triangle, Vertex};
pub use layer::{Contour, Layer, LayerPreview, POINT_TOLERANCE, Segment};
