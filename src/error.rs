//! Error types for mesh loading, slicing and export
//!
//! Every failure the crate reports is typed. Messages carry an error code for
//! categorization so that API layers can map them without string matching.
//!
//! # Error Codes
//!
//! Error codes follow the pattern: `E<category><number>`
//!
//! Categories:
//! - **E1xxx**: Mesh loading errors
//! - **E2xxx**: Configuration errors
//! - **E3xxx**: Slicing errors
//! - **E4xxx**: Export errors
//!
//! ## Common Error Codes
//!
//! - `E1001`: Mesh source could not be parsed
//! - `E1002`: Mesh has no vertices or no faces
//! - `E1003`: Unsupported mesh format
//! - `E1004`: I/O error reading a mesh file
//! - `E2001`..`E2007`: Invalid slicer configuration
//! - `E3001`: Slice requested before a mesh was loaded
//! - `E3002`: Slicing cancelled
//! - `E3003`: Progress callback aborted slicing
//! - `E4001`: I/O failure while writing an export
//! - `E4002`: JSON serialization failure

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for slicer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by a progress callback to abort slicing
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error wrapping every failure family of the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Mesh loading failed
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Configuration was rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Slicing failed
    #[error(transparent)]
    Slice(#[from] SliceError),

    /// Export failed
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Errors that can occur while reading a mesh into memory
#[derive(Error, Debug)]
pub enum LoadError {
    /// The mesh source could not be parsed
    ///
    /// **Error Code**: E1001
    ///
    /// **Common Causes**:
    /// - Truncated or corrupted file
    /// - Malformed XML inside a 3MF package
    /// - Face indices pointing past the vertex array
    /// - Non-finite vertex coordinates
    #[error("[E1001] Unreadable mesh '{source_name}': {details}")]
    Unreadable {
        /// File path or stream label the mesh came from
        source_name: String,
        /// What went wrong
        details: String,
    },

    /// The mesh has no vertices or no faces
    ///
    /// **Error Code**: E1002
    #[error("[E1002] Empty mesh: {details}")]
    Empty {
        /// What was missing
        details: String,
    },

    /// The file extension or content does not match a supported format
    ///
    /// **Error Code**: E1003
    ///
    /// **Suggestions**:
    /// - Use one of: stl, obj, ply, 3mf
    #[error("[E1003] Unsupported mesh format: {}", extension.as_deref().unwrap_or("<unknown>"))]
    UnsupportedFormat {
        /// The extension that was not recognized, if any
        extension: Option<String>,
    },

    /// The mesh file could not be read from disk
    ///
    /// **Error Code**: E1004
    #[error("[E1004] I/O error reading '{}': {source}", path.display())]
    Io {
        /// Path that failed to open or read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl LoadError {
    /// Create an Unreadable error for a named source
    pub fn unreadable(source_name: impl Into<String>, details: impl Into<String>) -> Self {
        LoadError::Unreadable {
            source_name: source_name.into(),
            details: details.into(),
        }
    }

    /// Create an Empty error
    pub fn empty(details: impl Into<String>) -> Self {
        LoadError::Empty {
            details: details.into(),
        }
    }
}

/// Errors in 3MF package or model XML content
///
/// These stay inside the loader and surface as [`LoadError::Unreadable`].
#[derive(Error, Debug)]
pub enum ThreeMfError {
    /// ZIP archive error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML parsing error
    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// XML attribute error
    #[error("XML attribute error: {0}")]
    XmlAttr(String),

    /// I/O error while reading a package part
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Missing required part in the package
    #[error("Missing required file: {0}")]
    MissingFile(String),

    /// Invalid XML structure
    #[error("Invalid XML structure: {0}")]
    InvalidXml(String),

    /// Invalid model structure (dangling references, cycles)
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Numeric attribute could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<std::num::ParseFloatError> for ThreeMfError {
    fn from(err: std::num::ParseFloatError) -> Self {
        ThreeMfError::ParseError(format!("Failed to parse floating-point number: {}", err))
    }
}

impl From<std::num::ParseIntError> for ThreeMfError {
    fn from(err: std::num::ParseIntError) -> Self {
        ThreeMfError::ParseError(format!("Failed to parse integer: {}", err))
    }
}

impl From<quick_xml::events::attributes::AttrError> for ThreeMfError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        ThreeMfError::XmlAttr(format!("Attribute parsing failed: {}", err))
    }
}

impl ThreeMfError {
    /// Create an InvalidXml error for a missing required attribute
    pub fn missing_attribute(element: &str, attribute: &str) -> Self {
        ThreeMfError::InvalidXml(format!(
            "Element '<{}>' is missing required attribute '{}'",
            element, attribute
        ))
    }

    /// Attach a source label and convert into the public load error
    pub fn into_load_error(self, source_name: &str) -> LoadError {
        LoadError::unreadable(source_name, format!("3MF: {}", self))
    }
}

/// Errors raised when validating a [`SlicerConfig`](crate::SlicerConfig)
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Layer height must be finite and positive
    #[error("[E2001] Invalid layer height {0}: must be a positive number of millimeters")]
    InvalidLayerHeight(f64),

    /// First layer height must be finite and positive when set
    #[error("[E2002] Invalid first layer height {0}: must be a positive number of millimeters")]
    InvalidFirstLayerHeight(f64),

    /// Nozzle diameter must be finite and positive
    #[error("[E2003] Invalid nozzle diameter {0}: must be a positive number of millimeters")]
    InvalidNozzleDiameter(f64),

    /// Fill density must lie in 0..=1
    #[error("[E2004] Invalid fill density {0}: must be between 0 and 1")]
    InvalidFillDensity(f64),

    /// Fill pattern name was not recognized
    #[error("[E2005] Unknown fill pattern '{0}' (supported: grid)")]
    UnknownFillPattern(String),

    /// Infill mode name was not recognized
    #[error("[E2006] Unknown infill mode '{0}' (supported: clipped, bounding_box)")]
    UnknownInfillMode(String),

    /// Configuration document could not be decoded
    #[error("[E2007] Invalid configuration document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while slicing
#[derive(Error, Debug)]
pub enum SliceError {
    /// Slicing was requested before a mesh was loaded
    #[error("[E3001] No mesh loaded")]
    NoMesh,

    /// The cancellation flag was raised between layers
    #[error("[E3002] Slicing cancelled after {completed} layers")]
    Cancelled {
        /// Layers finished before the flag was observed
        completed: usize,
    },

    /// The progress callback returned an error
    #[error("[E3003] Slicing aborted by progress callback after {completed} layers: {source}")]
    ProgressAborted {
        /// Layers finished when the callback failed
        completed: usize,
        /// Error returned by the callback
        #[source]
        source: BoxError,
    },
}

/// Errors that can occur while writing G-code or JSON
#[derive(Error, Debug)]
pub enum ExportError {
    /// Writing to the destination failed
    ///
    /// **Error Code**: E4001
    ///
    /// A partially written file is left in place.
    #[error("[E4001] I/O failure writing '{}': {source}", path.display())]
    IoFailure {
        /// Destination path (`<writer>` for in-memory sinks)
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// JSON serialization failed
    ///
    /// **Error Code**: E4002
    #[error("[E4002] JSON serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ExportError {
    /// Wrap an I/O error raised while writing to `path`
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ExportError::IoFailure {
            path: path.into(),
            source,
        }
    }
}
