//! Mesh file loading and normalization
//!
//! Reads STL (ASCII and binary), OBJ, PLY and 3MF sources into a single
//! [`Mesh`]. Multi-part sources are concatenated with their face indices
//! renumbered. Every successful load is validated and then centered on the
//! origin across all three axes.

use std::fmt;
use std::io::{BufReader, Cursor};
use std::path::Path;

use tracing::{debug, info};

use crate::error::LoadError;
use crate::model::{Mesh, Triangle, Vertex};
use crate::parser;

/// Largest prefix inspected when sniffing text formats
const SNIFF_WINDOW: usize = 4096;

/// Binary STL: 80-byte header plus a little-endian facet count
const STL_BINARY_HEADER: usize = 84;

/// Binary STL facet record size
const STL_BINARY_FACET: usize = 50;

/// Supported surface mesh formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshFormat {
    /// Stereolithography, ASCII or binary
    Stl,
    /// Wavefront OBJ
    Obj,
    /// Stanford polygon format
    Ply,
    /// 3D Manufacturing Format package
    ThreeMf,
}

impl MeshFormat {
    /// Format for a file extension (case-insensitive, without the dot)
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "stl" => Some(MeshFormat::Stl),
            "obj" => Some(MeshFormat::Obj),
            "ply" => Some(MeshFormat::Ply),
            "3mf" => Some(MeshFormat::ThreeMf),
            _ => None,
        }
    }

    /// Guess the format from the leading bytes of a source
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"PK\x03\x04") {
            return Some(MeshFormat::ThreeMf);
        }
        if bytes.starts_with(b"ply") {
            return Some(MeshFormat::Ply);
        }
        if is_binary_stl(bytes) {
            return Some(MeshFormat::Stl);
        }

        let window = &bytes[..bytes.len().min(SNIFF_WINDOW)];
        let text = String::from_utf8_lossy(window);
        let trimmed = text.trim_start();
        if trimmed.starts_with("solid") && trimmed.contains("facet") {
            return Some(MeshFormat::Stl);
        }
        if trimmed.lines().any(|line| line.trim_start().starts_with("v ")) {
            return Some(MeshFormat::Obj);
        }
        None
    }

    /// Lowercase format name
    pub fn as_str(&self) -> &'static str {
        match self {
            MeshFormat::Stl => "stl",
            MeshFormat::Obj => "obj",
            MeshFormat::Ply => "ply",
            MeshFormat::ThreeMf => "3mf",
        }
    }
}

impl fmt::Display for MeshFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_binary_stl(bytes: &[u8]) -> bool {
    if bytes.len() < STL_BINARY_HEADER {
        return false;
    }
    let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as usize;
    count
        .checked_mul(STL_BINARY_FACET)
        .and_then(|body| body.checked_add(STL_BINARY_HEADER))
        == Some(bytes.len())
}

/// Load a mesh file, choosing the reader by extension
///
/// Files without an extension are sniffed by content. An unknown extension
/// fails with [`LoadError::UnsupportedFormat`].
///
/// # Example
///
/// ```no_run
/// let mesh = meshslice::loader::load_path("part.stl")?;
/// println!("{} triangles", mesh.triangle_count());
/// # Ok::<(), meshslice::LoadError>(())
/// ```
pub fn load_path(path: impl AsRef<Path>) -> Result<Mesh, LoadError> {
    let path = path.as_ref();
    let extension = path.extension().and_then(|e| e.to_str());

    let hint = match extension {
        Some(ext) => Some(MeshFormat::from_extension(ext).ok_or_else(|| {
            LoadError::UnsupportedFormat {
                extension: Some(ext.to_string()),
            }
        })?),
        None => None,
    };

    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    debug!(path = %path.display(), bytes = bytes.len(), "Read mesh file");
    load_named(&bytes, hint, &path.display().to_string())
}

/// Load a mesh from an in-memory source
///
/// Without a format hint the format is detected from the content.
pub fn load_bytes(bytes: &[u8], format: Option<MeshFormat>) -> Result<Mesh, LoadError> {
    load_named(bytes, format, "<bytes>")
}

fn load_named(
    bytes: &[u8],
    hint: Option<MeshFormat>,
    source_name: &str,
) -> Result<Mesh, LoadError> {
    let format = hint
        .or_else(|| MeshFormat::detect(bytes))
        .ok_or(LoadError::UnsupportedFormat { extension: None })?;

    let mut mesh = match format {
        MeshFormat::Stl => read_stl(bytes, source_name)?,
        MeshFormat::Obj => read_obj(bytes, source_name)?,
        MeshFormat::Ply => read_ply(bytes, source_name)?,
        MeshFormat::ThreeMf => parser::parse_3mf(Cursor::new(bytes))
            .map_err(|e| e.into_load_error(source_name))?,
    };

    mesh.validate(source_name)?;
    let offset = mesh.center();

    if let Some(bbox) = mesh.bounding_box() {
        info!(
            source = source_name,
            format = %format,
            vertices = mesh.vertex_count(),
            triangles = mesh.triangle_count(),
            size_x = bbox.size[0],
            size_y = bbox.size[1],
            size_z = bbox.size[2],
            "Loaded mesh"
        );
    }
    debug!(
        dx = offset.x,
        dy = offset.y,
        dz = offset.z,
        "Centered mesh on origin"
    );

    Ok(mesh)
}

fn read_stl(bytes: &[u8], source_name: &str) -> Result<Mesh, LoadError> {
    let stl = stl_io::read_stl(&mut Cursor::new(bytes))
        .map_err(|e| LoadError::unreadable(source_name, format!("STL: {}", e)))?;

    let mut mesh = Mesh::with_capacity(stl.vertices.len(), stl.faces.len());

    // stl_io::Vertex is Vector<f32> with .0 being [f32; 3]
    mesh.vertices.extend(
        stl.vertices
            .iter()
            .map(|v| Vertex::new(v.0[0] as f64, v.0[1] as f64, v.0[2] as f64)),
    );
    mesh.triangles.extend(
        stl.faces
            .iter()
            .map(|f| Triangle::new(f.vertices[0], f.vertices[1], f.vertices[2])),
    );

    Ok(mesh)
}

fn read_obj(bytes: &[u8], source_name: &str) -> Result<Mesh, LoadError> {
    let mut reader = BufReader::new(bytes);
    let (models, _materials) = tobj::load_obj_buf(
        &mut reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |_| Ok(Default::default()),
    )
    .map_err(|e| LoadError::unreadable(source_name, format!("OBJ: {}", e)))?;

    // Merge all models into a single mesh
    let mut mesh = Mesh::new();
    for model in &models {
        let obj_mesh = &model.mesh;
        let mut part = Mesh::with_capacity(obj_mesh.positions.len() / 3, obj_mesh.indices.len() / 3);

        part.vertices.extend(
            obj_mesh
                .positions
                .chunks_exact(3)
                .map(|c| Vertex::new(c[0] as f64, c[1] as f64, c[2] as f64)),
        );
        part.triangles.extend(
            obj_mesh
                .indices
                .chunks_exact(3)
                .map(|c| Triangle::new(c[0] as usize, c[1] as usize, c[2] as usize)),
        );

        debug!(
            model = %model.name,
            vertices = part.vertex_count(),
            triangles = part.triangle_count(),
            "OBJ model"
        );
        mesh.append(&part);
    }

    Ok(mesh)
}

fn read_ply(bytes: &[u8], source_name: &str) -> Result<Mesh, LoadError> {
    use ply_rs::parser::Parser;
    use ply_rs::ply::{DefaultElement, Property};

    let mut reader = Cursor::new(bytes);
    let parser = Parser::<DefaultElement>::new();
    let ply = parser
        .read_ply(&mut reader)
        .map_err(|e| LoadError::unreadable(source_name, format!("PLY: {}", e)))?;

    let mut mesh = Mesh::new();

    if let Some(vertices) = ply.payload.get("vertex") {
        for element in vertices {
            let x = ply_float(element.get("x"), "x", source_name)?;
            let y = ply_float(element.get("y"), "y", source_name)?;
            let z = ply_float(element.get("z"), "z", source_name)?;
            mesh.vertices.push(Vertex::new(x, y, z));
        }
    }

    if let Some(faces) = ply.payload.get("face") {
        for element in faces {
            // Face indices can be stored under either name
            let indices: Vec<i64> = match element
                .get("vertex_indices")
                .or_else(|| element.get("vertex_index"))
            {
                Some(Property::ListInt(list)) => list.iter().map(|&i| i as i64).collect(),
                Some(Property::ListUInt(list)) => list.iter().map(|&i| i as i64).collect(),
                Some(Property::ListShort(list)) => list.iter().map(|&i| i as i64).collect(),
                Some(Property::ListUShort(list)) => list.iter().map(|&i| i as i64).collect(),
                Some(Property::ListChar(list)) => list.iter().map(|&i| i as i64).collect(),
                Some(Property::ListUChar(list)) => list.iter().map(|&i| i as i64).collect(),
                _ => {
                    return Err(LoadError::unreadable(
                        source_name,
                        "PLY face without a vertex index list",
                    ));
                }
            };

            if let Some(negative) = indices.iter().find(|&&i| i < 0) {
                return Err(LoadError::unreadable(
                    source_name,
                    format!("PLY face has negative vertex index {}", negative),
                ));
            }

            // Fan triangulation for polygons
            for i in 1..indices.len().saturating_sub(1) {
                mesh.triangles.push(Triangle::new(
                    indices[0] as usize,
                    indices[i] as usize,
                    indices[i + 1] as usize,
                ));
            }
        }
    }

    Ok(mesh)
}

fn ply_float(
    prop: Option<&ply_rs::ply::Property>,
    name: &str,
    source_name: &str,
) -> Result<f64, LoadError> {
    use ply_rs::ply::Property;

    match prop {
        Some(Property::Float(v)) => Ok(*v as f64),
        Some(Property::Double(v)) => Ok(*v),
        Some(Property::Int(v)) => Ok(*v as f64),
        Some(Property::UInt(v)) => Ok(*v as f64),
        Some(Property::Short(v)) => Ok(*v as f64),
        Some(Property::UShort(v)) => Ok(*v as f64),
        Some(Property::Char(v)) => Ok(*v as f64),
        Some(Property::UChar(v)) => Ok(*v as f64),
        _ => Err(LoadError::unreadable(
            source_name,
            format!("Missing or invalid PLY property: {}", name),
        )),
    }
}
