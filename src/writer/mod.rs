//! Layer stack exporters
//!
//! G-code for printers and a JSON document for previews. Every exporter can
//! write to an arbitrary [`std::io::Write`] or to a file path; file exports
//! leave a partially written file in place on failure.

mod gcode;
mod json;

pub use gcode::{GcodeCommand, GcodeOptions, export_gcode, gcode_commands, write_gcode};
pub use json::{SliceDocument, export_json, write_json};

/// Path reported in errors from writer-based exports
pub(crate) const WRITER_PATH: &str = "<writer>";
