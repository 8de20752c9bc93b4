//! # meshslice
//!
//! A planar mesh slicer for additive-manufacturing previews.
//!
//! The crate turns a triangle mesh into a stack of horizontal layers: each
//! layer holds the closed (or, for non-manifold input, open) contours where
//! the mesh crosses the slicing plane, plus grid infill clipped to the
//! enclosed area. Layer stacks export to G-code and to a JSON document.
//!
//! ## Features
//!
//! - Pure Rust implementation with no unsafe code
//! - STL (ASCII and binary), OBJ, PLY and 3MF input, merged into one centered mesh
//! - Deterministic layer schedule with optional first-layer override
//! - Contour chaining with tolerance, collinear point removal
//! - Grid infill clipped with the even-odd rule (holes stay empty)
//! - Progress callback, cooperative cancellation and parallel slicing
//! - Mesh volume via parry3d (`mesh-ops` feature, on by default)
//!
//! ## Example
//!
//! ```no_run
//! use meshslice::{Slicer, SlicerConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SlicerConfig::new()
//!     .with_layer_height(0.2)
//!     .with_fill_density(0.25);
//!
//! let mut slicer = Slicer::new(config)?;
//! slicer.load_mesh("part.stl")?;
//! slicer.slice()?;
//!
//! let stats = slicer.statistics();
//! println!("{} layers, ~{:.1} min", stats.total_layers, stats.estimated_time_minutes);
//!
//! slicer.export_gcode("part.gcode")?;
//! slicer.export_json("part.json")?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod infill;
pub mod loader;
pub mod mesh_ops;
pub mod model;
mod opc;
mod parser;
pub mod slicer;
pub mod statistics;
pub mod writer;

pub use error::{
    BoxError, ConfigError, Error, ExportError, LoadError, Result, SliceError, ThreeMfError,
};
pub use loader::MeshFormat;
pub use model::{
    BoundingBox, Contour, FillPattern, InfillMode, Layer, LayerPreview, Mesh, Segment,
    SlicerConfig, Triangle, Vertex,
};
pub use slicer::SliceOptions;
pub use statistics::Stats;
pub use writer::{GcodeOptions, SliceDocument};

use std::io::Write;
use std::path::Path;

use tracing::info;

/// Owned slicing session: one mesh, one configuration, one layer stack
///
/// The layer stack is replaced as a whole by every successful [`slice`]
/// and cleared whenever a new mesh or configuration is installed. A failed
/// slice leaves the previous stack in place.
///
/// [`slice`]: Slicer::slice
#[derive(Debug, Clone)]
pub struct Slicer {
    mesh: Option<Mesh>,
    config: SlicerConfig,
    layers: Vec<Layer>,
}

impl Slicer {
    /// Create a slicer after validating `config`
    pub fn new(config: SlicerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            mesh: None,
            config,
            layers: Vec::new(),
        })
    }

    /// Replace the configuration, clearing any sliced layers
    pub fn set_config(&mut self, config: SlicerConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.layers.clear();
        Ok(())
    }

    /// Load a mesh file; the format is taken from the extension
    ///
    /// # Example
    ///
    /// ```no_run
    /// use meshslice::{Slicer, SlicerConfig};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut slicer = Slicer::new(SlicerConfig::default())?;
    /// let mesh = slicer.load_mesh("bracket.3mf")?;
    /// println!("{} triangles", mesh.triangle_count());
    /// # Ok(())
    /// # }
    /// ```
    pub fn load_mesh<P: AsRef<Path>>(&mut self, path: P) -> Result<&Mesh> {
        let mesh = loader::load_path(path)?;
        Ok(self.install(mesh))
    }

    /// Load a mesh from memory, sniffing the format when `format` is `None`
    pub fn load_mesh_bytes(&mut self, bytes: &[u8], format: Option<MeshFormat>) -> Result<&Mesh> {
        let mesh = loader::load_bytes(bytes, format)?;
        Ok(self.install(mesh))
    }

    /// Install an already built mesh
    ///
    /// The mesh is validated but not moved; use [`Mesh::from_arrays`] to
    /// center raw arrays first.
    pub fn set_mesh(&mut self, mesh: Mesh) -> Result<()> {
        mesh.validate("<mesh>")?;
        self.install(mesh);
        Ok(())
    }

    fn install(&mut self, mesh: Mesh) -> &Mesh {
        self.layers.clear();
        self.mesh.insert(mesh)
    }

    /// Currently loaded mesh
    pub fn mesh(&self) -> Option<&Mesh> {
        self.mesh.as_ref()
    }

    /// Active configuration
    pub fn config(&self) -> &SlicerConfig {
        &self.config
    }

    /// Bounds of the current mesh, recomputed from its vertices
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.mesh.as_ref().and_then(Mesh::bounding_box)
    }

    /// Slice the loaded mesh and generate infill
    pub fn slice(&mut self) -> Result<&[Layer]> {
        self.slice_with(&mut SliceOptions::new())
    }

    /// Slice with progress reporting, cancellation or parallelism
    ///
    /// # Example
    ///
    /// ```no_run
    /// use meshslice::{SliceOptions, Slicer, SlicerConfig};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut slicer = Slicer::new(SlicerConfig::default())?;
    /// slicer.load_mesh("part.obj")?;
    ///
    /// let mut options = SliceOptions::new()
    ///     .with_parallel(true)
    ///     .with_progress(|done, total| {
    ///         eprintln!("layer {done}/{total}");
    ///         Ok(())
    ///     });
    /// slicer.slice_with(&mut options)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn slice_with(&mut self, options: &mut SliceOptions<'_>) -> Result<&[Layer]> {
        let mesh = self.mesh.as_ref().ok_or(SliceError::NoMesh)?;

        let mut layers = slicer::slice_mesh(mesh, &self.config, options)?;
        infill::fill_layers(&mut layers, &self.config);

        info!(
            layers = layers.len(),
            infill_segments = layers.iter().map(|l| l.infill.len()).sum::<usize>(),
            "Layer stack ready"
        );

        self.layers = layers;
        Ok(&self.layers)
    }

    /// Current layer stack (empty before the first slice)
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Preview record for one layer, `None` when `index` is out of range
    pub fn layer_preview(&self, index: usize) -> Option<LayerPreview> {
        self.layers.get(index).map(LayerPreview::from)
    }

    /// Aggregate statistics for the current state
    pub fn statistics(&self) -> Stats {
        statistics::statistics(&self.layers, &self.config, self.mesh.as_ref())
    }

    /// Full export document for the current state
    pub fn document(&self) -> SliceDocument {
        SliceDocument::new(&self.layers, &self.config, self.mesh.as_ref())
    }

    /// Write G-code to a file
    pub fn export_gcode<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        writer::export_gcode(&self.layers, &self.config, &GcodeOptions::default(), path)?;
        Ok(())
    }

    /// Write G-code to any writer
    pub fn write_gcode<W: Write>(&self, writer: W) -> Result<()> {
        writer::write_gcode(&self.layers, &self.config, &GcodeOptions::default(), writer)?;
        Ok(())
    }

    /// Write the JSON document to a file
    pub fn export_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        writer::export_json(&self.document(), path)?;
        Ok(())
    }

    /// Write the JSON document to any writer
    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        writer::write_json(&self.document(), writer)?;
        Ok(())
    }
}
