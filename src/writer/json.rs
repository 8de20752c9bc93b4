//! JSON exporter
//!
//! The document is serialized in full before anything is written, so a
//! serialization failure never leaves a truncated file behind. Floats use
//! shortest round-trip formatting and re-parse to identical values.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::WRITER_PATH;
use crate::error::ExportError;
use crate::model::{BoundingBox, Layer, LayerPreview, Mesh, SlicerConfig};
use crate::statistics::{Stats, statistics};

/// Complete slice result as exported to JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceDocument {
    /// Configuration used for slicing
    pub config: SlicerConfig,
    /// Mesh bounds after centering
    pub bounding_box: Option<BoundingBox>,
    /// Aggregate statistics
    pub statistics: Stats,
    /// Every layer in ascending order
    pub layers: Vec<LayerPreview>,
}

impl SliceDocument {
    /// Assemble a document from a layer stack
    pub fn new(layers: &[Layer], config: &SlicerConfig, mesh: Option<&Mesh>) -> Self {
        let statistics = statistics(layers, config, mesh);
        Self {
            config: config.clone(),
            bounding_box: statistics.bounding_box,
            statistics,
            layers: layers.iter().map(LayerPreview::from).collect(),
        }
    }

    /// Parse a previously exported document
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

fn emit<W: Write>(bytes: &[u8], writer: &mut W) -> io::Result<()> {
    writer.write_all(bytes)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// Write `document` as pretty-printed JSON to `writer`
pub fn write_json<W: Write>(document: &SliceDocument, mut writer: W) -> Result<(), ExportError> {
    let bytes = serde_json::to_vec_pretty(document)?;
    emit(&bytes, &mut writer).map_err(|e| ExportError::io(WRITER_PATH, e))?;
    info!(layers = document.layers.len(), bytes = bytes.len(), "Wrote JSON document");
    Ok(())
}

/// Write `document` as pretty-printed JSON to a file
pub fn export_json<P: AsRef<Path>>(document: &SliceDocument, path: P) -> Result<(), ExportError> {
    let path = path.as_ref();
    let bytes = serde_json::to_vec_pretty(document)?;
    let file = File::create(path).map_err(|e| ExportError::io(path, e))?;
    emit(&bytes, &mut BufWriter::new(file)).map_err(|e| ExportError::io(path, e))?;
    info!(
        path = %path.display(),
        layers = document.layers.len(),
        bytes = bytes.len(),
        "Exported JSON document"
    );
    Ok(())
}
