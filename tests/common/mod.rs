//! Shared fixtures for integration tests
//!
//! Every fixture describes the same axis-aligned box in a different file
//! format, so loaders can be compared against each other.

#![allow(dead_code)]

use meshslice::Mesh;
use std::io::{Cursor, Write};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Box corners, indexed like the faces below
pub fn box_vertices(sx: f64, sy: f64, sz: f64) -> Vec<[f64; 3]> {
    let (x, y, z) = (sx / 2.0, sy / 2.0, sz / 2.0);
    vec![
        [-x, -y, -z],
        [x, -y, -z],
        [x, y, -z],
        [-x, y, -z],
        [-x, -y, z],
        [x, -y, z],
        [x, y, z],
        [-x, y, z],
    ]
}

/// Outward-facing triangles of a box
pub const BOX_FACES: [[usize; 3]; 12] = [
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
];

/// Centered box mesh
pub fn box_mesh(sx: f64, sy: f64, sz: f64) -> Mesh {
    Mesh::from_arrays(&box_vertices(sx, sy, sz), &BOX_FACES).unwrap()
}

/// Unit cube with corners at ±0.5
pub fn unit_cube() -> Mesh {
    box_mesh(1.0, 1.0, 1.0)
}

/// ASCII STL for the unit cube
pub fn cube_stl() -> String {
    let vertices = box_vertices(1.0, 1.0, 1.0);
    let mut out = String::from("solid cube\n");
    for face in BOX_FACES {
        out.push_str("facet normal 0 0 0\n  outer loop\n");
        for i in face {
            let [x, y, z] = vertices[i];
            out.push_str(&format!("    vertex {} {} {}\n", x, y, z));
        }
        out.push_str("  endloop\nendfacet\n");
    }
    out.push_str("endsolid cube\n");
    out
}

/// OBJ for the unit cube, shifted by `offset` along X
pub fn cube_obj(name: &str, offset: f64) -> String {
    let mut out = format!("o {}\n", name);
    for [x, y, z] in box_vertices(1.0, 1.0, 1.0) {
        out.push_str(&format!("v {} {} {}\n", x + offset, y, z));
    }
    out
}

/// Face lines for a cube whose vertices start at 1-based index `base`
pub fn cube_obj_faces(base: usize) -> String {
    BOX_FACES
        .iter()
        .map(|[a, b, c]| format!("f {} {} {}\n", a + base, b + base, c + base))
        .collect()
}

/// ASCII PLY for the unit cube, with the six sides as quads
pub fn cube_ply() -> String {
    let mut out = String::from(
        "ply\nformat ascii 1.0\nelement vertex 8\nproperty float x\nproperty float y\n\
         property float z\nelement face 6\nproperty list uchar int vertex_indices\nend_header\n",
    );
    for [x, y, z] in box_vertices(1.0, 1.0, 1.0) {
        out.push_str(&format!("{} {} {}\n", x, y, z));
    }
    for quad in [
        [0, 3, 2, 1],
        [4, 5, 6, 7],
        [0, 1, 5, 4],
        [3, 7, 6, 2],
        [0, 4, 7, 3],
        [1, 2, 6, 5],
    ] {
        out.push_str(&format!("4 {} {} {} {}\n", quad[0], quad[1], quad[2], quad[3]));
    }
    out
}

/// `<object>` element holding the unit cube
pub fn cube_object_xml(id: usize) -> String {
    let mut out = format!("<object id=\"{}\" type=\"model\"><mesh><vertices>", id);
    for [x, y, z] in box_vertices(1.0, 1.0, 1.0) {
        out.push_str(&format!("<vertex x=\"{}\" y=\"{}\" z=\"{}\"/>", x, y, z));
    }
    out.push_str("</vertices><triangles>");
    for [a, b, c] in BOX_FACES {
        out.push_str(&format!("<triangle v1=\"{}\" v2=\"{}\" v3=\"{}\"/>", a, b, c));
    }
    out.push_str("</triangles></mesh></object>");
    out
}

/// Model part with the given resources and build content
pub fn model_xml(resources: &str, build: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<model unit="millimeter" xml:lang="en-US" xmlns="http://schemas.microsoft.com/3dmanufacturing/core/2015/02">
  <resources>{}</resources>
  <build>{}</build>
</model>"#,
        resources, build
    )
}

/// Zip a model part into a 3MF package, stored at `model_path`
pub fn package_3mf(model: &str, model_path: &str) -> Vec<u8> {
    package_3mf_with_target(model, model_path, model_path)
}

/// Like [`package_3mf`] with an explicit relationship target
pub fn package_3mf_with_target(model: &str, model_path: &str, target: &str) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="model" ContentType="application/vnd.ms-package.3dmanufacturing-3dmodel+xml"/>
</Types>"#,
    )
    .unwrap();

    zip.start_file("_rels/.rels", options).unwrap();
    zip.write_all(
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rel0" Target="/{}" Type="http://schemas.microsoft.com/3dmanufacturing/2013/01/3dmodel"/>
</Relationships>"#,
            target
        )
        .as_bytes(),
    )
    .unwrap();

    zip.start_file(model_path, options).unwrap();
    zip.write_all(model.as_bytes()).unwrap();

    zip.finish().unwrap().into_inner()
}

/// 3MF package holding one unit cube build item
pub fn cube_3mf() -> Vec<u8> {
    package_3mf(
        &model_xml(&cube_object_xml(1), r#"<item objectid="1"/>"#),
        "3D/3dmodel.model",
    )
}
