//! G-code exporter
//!
//! Extrusion uses a fixed `E1.00000` per segment in relative mode (`M83`).
//! This is not proportional to the travelled distance; printers need a real
//! extrusion model before this output is printable.
//!
//! Coordinates are not mapped to the bed. The preamble lifts to
//! `Z=first_layer_height` in machine coordinates, while every layer move uses
//! the mesh frame, which is centered on the origin after loading. The first
//! layer of a centered part therefore sits at a negative Z.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::info;

use super::WRITER_PATH;
use crate::error::ExportError;
use crate::model::{Layer, SlicerConfig};

/// Extrusion delta emitted for every printed segment
pub const EXTRUSION_PER_SEGMENT: f64 = 1.0;

/// Feed rate of the first-layer Z lift, mm/min
const Z_LIFT_FEED_RATE: f64 = 3000.0;

/// One line of G-code
#[derive(Debug, Clone, PartialEq)]
pub enum GcodeCommand {
    /// `; text`
    Comment(String),
    /// `G0`: travel without extrusion
    RapidMove {
        /// Target X
        x: Option<f64>,
        /// Target Y
        y: Option<f64>,
        /// Target Z
        z: Option<f64>,
        /// Feed rate
        f: Option<f64>,
    },
    /// `G1`: linear move, optionally extruding
    LinearMove {
        /// Target X
        x: Option<f64>,
        /// Target Y
        y: Option<f64>,
        /// Target Z
        z: Option<f64>,
        /// Extrusion amount
        e: Option<f64>,
        /// Feed rate
        f: Option<f64>,
    },
    /// `G28`: home all axes
    Home,
    /// `G92 E`: set the extruder position
    ResetExtruder(f64),
    /// `M83`: relative extrusion
    RelativeExtrusion,
}

impl GcodeCommand {
    fn travel(x: f64, y: f64) -> Self {
        GcodeCommand::RapidMove {
            x: Some(x),
            y: Some(y),
            z: None,
            f: None,
        }
    }

    fn extrude(x: f64, y: f64, e: f64) -> Self {
        GcodeCommand::LinearMove {
            x: Some(x),
            y: Some(y),
            z: None,
            e: Some(e),
            f: None,
        }
    }

    fn move_z(z: f64, f: Option<f64>) -> Self {
        GcodeCommand::LinearMove {
            x: None,
            y: None,
            z: Some(z),
            e: None,
            f,
        }
    }
}

fn write_axes(
    f: &mut fmt::Formatter<'_>,
    x: &Option<f64>,
    y: &Option<f64>,
    z: &Option<f64>,
) -> fmt::Result {
    if let Some(v) = x {
        write!(f, " X{:.3}", v)?;
    }
    if let Some(v) = y {
        write!(f, " Y{:.3}", v)?;
    }
    if let Some(v) = z {
        write!(f, " Z{:.3}", v)?;
    }
    Ok(())
}

impl fmt::Display for GcodeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcodeCommand::Comment(text) => write!(f, "; {}", text),
            GcodeCommand::RapidMove { x, y, z, f: feed } => {
                f.write_str("G0")?;
                write_axes(f, x, y, z)?;
                if let Some(v) = feed {
                    write!(f, " F{:.0}", v)?;
                }
                Ok(())
            }
            GcodeCommand::LinearMove {
                x,
                y,
                z,
                e,
                f: feed,
            } => {
                f.write_str("G1")?;
                write_axes(f, x, y, z)?;
                if let Some(v) = e {
                    write!(f, " E{:.5}", v)?;
                }
                if let Some(v) = feed {
                    write!(f, " F{:.0}", v)?;
                }
                Ok(())
            }
            GcodeCommand::Home => f.write_str("G28"),
            GcodeCommand::ResetExtruder(e) => write!(f, "G92 E{}", e),
            GcodeCommand::RelativeExtrusion => f.write_str("M83"),
        }
    }
}

/// G-code output switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcodeOptions {
    /// Emit infill segments after each layer's contours
    pub include_infill: bool,
}

impl Default for GcodeOptions {
    fn default() -> Self {
        Self {
            include_infill: true,
        }
    }
}

impl GcodeOptions {
    /// Default options (infill included)
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle infill output
    pub fn with_infill(mut self, include_infill: bool) -> Self {
        self.include_infill = include_infill;
        self
    }
}

/// Build the full command list for a layer stack
pub fn gcode_commands(
    layers: &[Layer],
    config: &SlicerConfig,
    options: &GcodeOptions,
) -> Vec<GcodeCommand> {
    let comment = GcodeCommand::Comment;
    let mut out = vec![
        comment(format!("Generated by meshslice {}", env!("CARGO_PKG_VERSION"))),
        comment(format!("Layer height: {:.3}", config.layer_height)),
        comment(format!(
            "First layer height: {:.3}",
            config.effective_first_layer_height()
        )),
        comment(format!("Nozzle diameter: {:.3}", config.nozzle_diameter)),
        comment(format!("Fill density: {:.2}", config.fill_density)),
        comment(format!("Fill pattern: {}", config.fill_pattern)),
        comment(format!("Perimeters: {}", config.perimeter_count)),
        comment(format!(
            "Solid layers: top {} bottom {}",
            config.top_solid_layers, config.bottom_solid_layers
        )),
        comment(format!("Layers: {}", layers.len())),
        GcodeCommand::Home,
        GcodeCommand::move_z(
            config.effective_first_layer_height(),
            Some(Z_LIFT_FEED_RATE),
        ),
        GcodeCommand::ResetExtruder(0.0),
        GcodeCommand::RelativeExtrusion,
    ];

    for layer in layers {
        out.push(comment(format!(
            "Layer {}, Z={:.3}",
            layer.layer_index, layer.z_height
        )));
        out.push(GcodeCommand::move_z(layer.z_height, None));

        for contour in &layer.contours {
            let mut points = contour.points().iter();
            let Some(first) = points.next() else {
                continue;
            };
            out.push(GcodeCommand::travel(first.x, first.y));
            for p in points {
                out.push(GcodeCommand::extrude(p.x, p.y, EXTRUSION_PER_SEGMENT));
            }
        }

        if options.include_infill {
            for segment in &layer.infill {
                out.push(GcodeCommand::travel(segment.start.x, segment.start.y));
                out.push(GcodeCommand::extrude(
                    segment.end.x,
                    segment.end.y,
                    EXTRUSION_PER_SEGMENT,
                ));
            }
        }
    }

    out.push(comment("End of G-code".to_string()));
    out
}

fn emit<W: Write>(
    layers: &[Layer],
    config: &SlicerConfig,
    options: &GcodeOptions,
    writer: &mut W,
) -> io::Result<usize> {
    let commands = gcode_commands(layers, config, options);
    for command in &commands {
        writeln!(writer, "{}", command)?;
    }
    writer.flush()?;
    Ok(commands.len())
}

/// Write G-code for `layers` to `writer`
pub fn write_gcode<W: Write>(
    layers: &[Layer],
    config: &SlicerConfig,
    options: &GcodeOptions,
    mut writer: W,
) -> Result<(), ExportError> {
    let lines = emit(layers, config, options, &mut writer)
        .map_err(|e| ExportError::io(WRITER_PATH, e))?;
    info!(layers = layers.len(), lines, "Wrote G-code");
    Ok(())
}

/// Write G-code for `layers` to a file
///
/// A file left partially written by an I/O failure is not removed.
pub fn export_gcode<P: AsRef<Path>>(
    layers: &[Layer],
    config: &SlicerConfig,
    options: &GcodeOptions,
    path: P,
) -> Result<(), ExportError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| ExportError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let lines =
        emit(layers, config, options, &mut writer).map_err(|e| ExportError::io(path, e))?;
    info!(path = %path.display(), layers = layers.len(), lines, "Exported G-code");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Contour, Segment};
    use nalgebra::Point3;

    fn square_layer() -> Layer {
        let z = 0.2;
        let contour = Contour::new(vec![
            Point3::new(0.0, 0.0, z),
            Point3::new(1.0, 0.0, z),
            Point3::new(1.0, 1.0, z),
            Point3::new(0.0, 1.0, z),
            Point3::new(0.0, 0.0, z),
        ]);
        let mut layer = Layer::new(0, z, vec![contour]);
        layer
            .infill
            .push(Segment::new(Point3::new(0.5, 0.0, z), Point3::new(0.5, 1.0, z)));
        layer
    }

    fn render(options: &GcodeOptions) -> String {
        let mut buf = Vec::new();
        write_gcode(&[square_layer()], &SlicerConfig::new(), options, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_command_formatting() {
        assert_eq!(GcodeCommand::travel(1.0, 2.5).to_string(), "G0 X1.000 Y2.500");
        assert_eq!(
            GcodeCommand::extrude(-0.5, 0.25, 1.0).to_string(),
            "G1 X-0.500 Y0.250 E1.00000"
        );
        assert_eq!(
            GcodeCommand::move_z(0.2, Some(3000.0)).to_string(),
            "G1 Z0.200 F3000"
        );
        assert_eq!(GcodeCommand::ResetExtruder(0.0).to_string(), "G92 E0");
        assert_eq!(GcodeCommand::Comment("hi".into()).to_string(), "; hi");
    }

    #[test]
    fn test_preamble_order() {
        let text = render(&GcodeOptions::new());
        let lines: Vec<&str> = text.lines().collect();
        let home = lines.iter().position(|l| *l == "G28").unwrap();
        assert_eq!(lines[home + 1], "G1 Z0.200 F3000");
        assert_eq!(lines[home + 2], "G92 E0");
        assert_eq!(lines[home + 3], "M83");
        assert!(lines[..home].iter().all(|l| l.starts_with(';')));
        assert!(text.contains("; Nozzle diameter: 0.400"));
        assert!(text.contains("; Fill density: 0.20"));
    }

    #[test]
    fn test_layer_moves() {
        let text = render(&GcodeOptions::new());
        assert!(text.contains("; Layer 0, Z=0.200\nG1 Z0.200\nG0 X0.000 Y0.000\n"));
        assert_eq!(text.matches("E1.00000").count(), 5);
        assert!(text.contains("G0 X0.500 Y0.000\nG1 X0.500 Y1.000 E1.00000"));
    }

    #[test]
    fn test_infill_can_be_disabled() {
        let text = render(&GcodeOptions::new().with_infill(false));
        assert_eq!(text.matches("E1.00000").count(), 4);
        assert!(!text.contains("X0.500"));
    }

    #[test]
    fn test_export_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.gcode");
        let err = export_gcode(&[], &SlicerConfig::new(), &GcodeOptions::new(), &path).unwrap_err();
        match err {
            ExportError::IoFailure { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }
    }
}
