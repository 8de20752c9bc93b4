//! XML parsing for 3MF model files
//!
//! Reads the core mesh subset of the 3MF model part (objects, meshes,
//! components and build items) and flattens the build into one triangle soup.

mod core;

use crate::error::ThreeMfError;
use crate::model::{Mesh, Vertex};
use crate::opc::Package;
use nalgebra::Matrix4;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::io::{Read, Seek};
use tracing::debug;

use core::{parse_build_item, parse_component, parse_object_id, parse_triangle, parse_vertex};

pub(crate) type Result<T> = std::result::Result<T, ThreeMfError>;

/// Size of 3MF transformation matrix (4x3 affine transform)
const TRANSFORM_MATRIX_SIZE: usize = 12;

/// Default buffer capacity for XML parsing (4KB)
const XML_BUFFER_CAPACITY: usize = 4096;

/// Deepest component nesting followed before giving up (also stops cycles)
const MAX_COMPONENT_DEPTH: usize = 32;

/// Most triangles a flattened build may expand to
const MAX_FLATTENED_TRIANGLES: usize = 10_000_000;

/// Most object placements a flattened build may expand to
const MAX_FLATTENED_PLACEMENTS: usize = 1_000_000;

/// Reference from an object to another object
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Component {
    pub objectid: usize,
    pub transform: Matrix4<f64>,
}

/// Object placed on the build plate
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BuildItem {
    pub objectid: usize,
    pub transform: Matrix4<f64>,
}

/// A resource object: its own mesh (possibly empty) plus components
#[derive(Debug, Clone, Default)]
pub(crate) struct Object {
    pub mesh: Mesh,
    pub components: Vec<Component>,
}

/// Parsed model part
#[derive(Debug, Default)]
pub(crate) struct Model {
    pub objects: HashMap<usize, Object>,
    /// Object ids in document order
    pub object_order: Vec<usize>,
    pub build: Vec<BuildItem>,
}

/// Read a 3MF package and return the flattened build as one mesh
pub(crate) fn parse_3mf<R: Read + Seek>(reader: R) -> Result<Mesh> {
    let mut package = Package::open(reader)?;
    let model_xml = package.get_model()?;
    let model = parse_model_xml(&model_xml)?;
    flatten(&model)
}

/// Extract local name from potentially namespaced XML element name
///
/// - `"m:colorgroup"` returns `"colorgroup"`
/// - `"object"` returns `"object"`
fn get_local_name(name_str: &str) -> &str {
    match name_str.rfind(':') {
        Some(pos) => &name_str[pos + 1..],
        None => name_str,
    }
}

/// Parse the 3D model XML content
pub(crate) fn parse_model_xml(xml: &str) -> Result<Model> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut model = Model::default();
    let mut buf = Vec::with_capacity(XML_BUFFER_CAPACITY);
    let mut current: Option<(usize, Object)> = None;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        let is_empty_element = matches!(event, Event::Empty(_));

        match event {
            Event::DocType(_) => {
                return Err(ThreeMfError::InvalidXml(
                    "DTD declarations are not allowed in 3MF files".to_string(),
                ));
            }
            Event::Start(ref e) | Event::Empty(ref e) => {
                let name = e.name();
                let name_str = std::str::from_utf8(name.as_ref())
                    .map_err(|e| ThreeMfError::InvalidXml(e.to_string()))?;

                match get_local_name(name_str) {
                    "object" => {
                        let id = parse_object_id(e)?;
                        if is_empty_element {
                            finish_object(&mut model, id, Object::default())?;
                        } else {
                            current = Some((id, Object::default()));
                        }
                    }
                    "vertex" => {
                        let (_, object) = current.as_mut().ok_or_else(|| {
                            ThreeMfError::InvalidXml("<vertex> outside of an object".to_string())
                        })?;
                        object.mesh.vertices.push(parse_vertex(e)?);
                    }
                    "triangle" => {
                        let (_, object) = current.as_mut().ok_or_else(|| {
                            ThreeMfError::InvalidXml("<triangle> outside of an object".to_string())
                        })?;
                        object.mesh.triangles.push(parse_triangle(e)?);
                    }
                    "component" => {
                        let (_, object) = current.as_mut().ok_or_else(|| {
                            ThreeMfError::InvalidXml(
                                "<component> outside of an object".to_string(),
                            )
                        })?;
                        object.components.push(parse_component(e)?);
                    }
                    "item" => model.build.push(parse_build_item(e)?),
                    _ => {}
                }
            }
            Event::End(ref e) => {
                let name = e.name();
                let name_str = std::str::from_utf8(name.as_ref())
                    .map_err(|e| ThreeMfError::InvalidXml(e.to_string()))?;
                if get_local_name(name_str) == "object" {
                    if let Some((id, object)) = current.take() {
                        finish_object(&mut model, id, object)?;
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    debug!(
        objects = model.objects.len(),
        build_items = model.build.len(),
        "Parsed 3MF model part"
    );

    Ok(model)
}

fn finish_object(model: &mut Model, id: usize, object: Object) -> Result<()> {
    let count = object.mesh.vertices.len();
    if let Some(t) = object
        .mesh
        .triangles
        .iter()
        .find(|t| t.indices().iter().any(|&i| i >= count))
    {
        return Err(ThreeMfError::InvalidModel(format!(
            "Object {} has triangle ({}, {}, {}) outside its {} vertices",
            id, t.v1, t.v2, t.v3, count
        )));
    }

    if model.objects.insert(id, object).is_some() {
        return Err(ThreeMfError::InvalidModel(format!(
            "Duplicate object id {}",
            id
        )));
    }
    model.object_order.push(id);
    Ok(())
}

/// Concatenate every build item into one mesh, applying transforms
///
/// A model without build items contributes each of its objects once with
/// an identity transform. The expanded size is measured before any geometry
/// is copied, so shared components that fan out cannot exhaust memory.
pub(crate) fn flatten(model: &Model) -> Result<Mesh> {
    let roots: Vec<(usize, Matrix4<f64>)> = if model.build.is_empty() {
        model
            .object_order
            .iter()
            .map(|id| (*id, Matrix4::identity()))
            .collect()
    } else {
        model
            .build
            .iter()
            .map(|item| (item.objectid, item.transform))
            .collect()
    };

    let mut sizes = HashMap::new();
    let mut size = Expansion::default();
    for (id, _) in &roots {
        size = size.add(expansion(model, *id, 0, &mut sizes)?);
    }
    if size.triangles > MAX_FLATTENED_TRIANGLES || size.placements > MAX_FLATTENED_PLACEMENTS {
        return Err(ThreeMfError::InvalidModel(format!(
            "Build expands to {} triangles in {} object placements (limits {} and {})",
            size.triangles, size.placements, MAX_FLATTENED_TRIANGLES, MAX_FLATTENED_PLACEMENTS
        )));
    }
    debug!(
        triangles = size.triangles,
        placements = size.placements,
        "Flattening 3MF build"
    );

    let mut out = Mesh::with_capacity(size.vertices, size.triangles);
    for (id, transform) in &roots {
        append_object(model, *id, transform, 0, &mut out)?;
    }

    Ok(out)
}

/// Geometry one object contributes once all of its components are expanded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Expansion {
    vertices: usize,
    triangles: usize,
    placements: usize,
}

impl Expansion {
    fn add(self, other: Expansion) -> Self {
        Self {
            vertices: self.vertices.saturating_add(other.vertices),
            triangles: self.triangles.saturating_add(other.triangles),
            placements: self.placements.saturating_add(other.placements),
        }
    }
}

/// Expanded size of object `id`, memoized per object
fn expansion(
    model: &Model,
    id: usize,
    depth: usize,
    sizes: &mut HashMap<usize, Expansion>,
) -> Result<Expansion> {
    if let Some(size) = sizes.get(&id) {
        return Ok(*size);
    }
    if depth > MAX_COMPONENT_DEPTH {
        return Err(ThreeMfError::InvalidModel(format!(
            "Component nesting deeper than {} levels at object {}",
            MAX_COMPONENT_DEPTH, id
        )));
    }

    let object = model.objects.get(&id).ok_or_else(|| {
        ThreeMfError::InvalidModel(format!("Reference to undefined object {}", id))
    })?;

    let mut size = Expansion {
        vertices: object.mesh.vertices.len(),
        triangles: object.mesh.triangles.len(),
        placements: 1,
    };
    for component in &object.components {
        size = size.add(expansion(model, component.objectid, depth + 1, sizes)?);
    }

    sizes.insert(id, size);
    Ok(size)
}

fn append_object(
    model: &Model,
    id: usize,
    transform: &Matrix4<f64>,
    depth: usize,
    out: &mut Mesh,
) -> Result<()> {
    if depth > MAX_COMPONENT_DEPTH {
        return Err(ThreeMfError::InvalidModel(format!(
            "Component nesting deeper than {} levels at object {}",
            MAX_COMPONENT_DEPTH, id
        )));
    }

    let object = model.objects.get(&id).ok_or_else(|| {
        ThreeMfError::InvalidModel(format!("Reference to undefined object {}", id))
    })?;

    if !object.mesh.vertices.is_empty() {
        let mut placed = Mesh::with_capacity(object.mesh.vertices.len(), 0);
        placed.vertices.extend(
            object
                .mesh
                .vertices
                .iter()
                .map(|v| Vertex::from(transform.transform_point(&v.to_point()))),
        );
        placed.triangles = object.mesh.triangles.clone();
        out.append(&placed);
    }

    for component in &object.components {
        let composed = transform * component.transform;
        append_object(model, component.objectid, &composed, depth + 1, out)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE_OBJECT: &str = r#"<object id="1" type="model">
      <mesh>
        <vertices>
          <vertex x="0" y="0" z="0"/>
          <vertex x="1" y="0" z="0"/>
          <vertex x="0" y="1" z="1"/>
        </vertices>
        <triangles>
          <triangle v1="0" v2="1" v3="2"/>
        </triangles>
      </mesh>
    </object>"#;

    fn model_xml(resources: &str, build: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<model unit="millimeter" xmlns="http://schemas.microsoft.com/3dmanufacturing/core/2015/02">
  <resources>{}</resources>
  <build>{}</build>
</model>"#,
            resources, build
        )
    }

    #[test]
    fn test_single_object() {
        let model = parse_model_xml(&model_xml(TRIANGLE_OBJECT, r#"<item objectid="1"/>"#))
            .unwrap();
        let mesh = flatten(&model).unwrap();
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.triangle_count(), 1);
    }

    #[test]
    fn test_build_item_transform_and_repeat() {
        let build = r#"<item objectid="1"/><item objectid="1" transform="1 0 0 0 1 0 0 0 1 5 0 0"/>"#;
        let model = parse_model_xml(&model_xml(TRIANGLE_OBJECT, build)).unwrap();
        let mesh = flatten(&model).unwrap();
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.triangles[1].indices(), [3, 4, 5]);
        assert_eq!(mesh.vertices[4], Vertex::new(6.0, 0.0, 0.0));
    }

    #[test]
    fn test_components_compose_transforms() {
        let resources = format!(
            r#"{}
    <object id="2" type="model">
      <components>
        <component objectid="1" transform="1 0 0 0 1 0 0 0 1 0 0 10"/>
      </components>
    </object>"#,
            TRIANGLE_OBJECT
        );
        let build = r#"<item objectid="2" transform="2 0 0 0 2 0 0 0 2 0 0 0"/>"#;
        let model = parse_model_xml(&model_xml(&resources, build)).unwrap();
        let mesh = flatten(&model).unwrap();
        assert_eq!(mesh.vertex_count(), 3);
        // scale(translate(p)): z = 2 * (1 + 10)
        assert_eq!(mesh.vertices[2], Vertex::new(0.0, 2.0, 22.0));
    }

    #[test]
    fn test_empty_build_uses_all_objects() {
        let model = parse_model_xml(&model_xml(TRIANGLE_OBJECT, "")).unwrap();
        let mesh = flatten(&model).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
    }

    fn fan_out_chain(levels: usize) -> String {
        let mut resources = TRIANGLE_OBJECT.to_string();
        for id in 2..=levels + 1 {
            resources.push_str(&format!(
                r#"<object id="{id}"><components><component objectid="{prev}"/><component objectid="{prev}" transform="1 0 0 0 1 0 0 0 1 0 0 2"/></components></object>"#,
                id = id,
                prev = id - 1
            ));
        }
        model_xml(&resources, &format!(r#"<item objectid="{}"/>"#, levels + 1))
    }

    #[test]
    fn test_shared_components_expand() {
        let model = parse_model_xml(&fan_out_chain(4)).unwrap();
        let mesh = flatten(&model).unwrap();
        assert_eq!(mesh.triangle_count(), 16);
        assert_eq!(mesh.vertex_count(), 48);
    }

    #[test]
    fn test_fan_out_beyond_triangle_limit_is_rejected() {
        // 2^25 copies of one triangle
        let model = parse_model_xml(&fan_out_chain(25)).unwrap();
        let err = flatten(&model).unwrap_err();
        assert!(matches!(err, ThreeMfError::InvalidModel(_)));
        assert!(err.to_string().contains("expands to 33554432 triangles"), "{err}");
    }

    #[test]
    fn test_component_cycle_is_rejected() {
        let resources = r#"<object id="1"><components><component objectid="2"/></components></object>
    <object id="2"><components><component objectid="1"/></components></object>"#;
        let model = parse_model_xml(&model_xml(resources, r#"<item objectid="1"/>"#)).unwrap();
        let err = flatten(&model).unwrap_err();
        assert!(err.to_string().contains("nesting"));
    }

    #[test]
    fn test_undefined_object() {
        let model =
            parse_model_xml(&model_xml(TRIANGLE_OBJECT, r#"<item objectid="7"/>"#)).unwrap();
        assert!(matches!(
            flatten(&model),
            Err(ThreeMfError::InvalidModel(_))
        ));
    }

    #[test]
    fn test_triangle_index_out_of_object() {
        let resources = r#"<object id="1"><mesh><vertices><vertex x="0" y="0" z="0"/></vertices>
      <triangles><triangle v1="0" v2="1" v3="2"/></triangles></mesh></object>"#;
        assert!(matches!(
            parse_model_xml(&model_xml(resources, "")),
            Err(ThreeMfError::InvalidModel(_))
        ));
    }

    #[test]
    fn test_doctype_rejected() {
        let xml = r#"<?xml version="1.0"?><!DOCTYPE model [<!ENTITY x "y">]><model/>"#;
        assert!(parse_model_xml(xml).is_err());
    }

    #[test]
    fn test_local_name() {
        assert_eq!(get_local_name("m:colorgroup"), "colorgroup");
        assert_eq!(get_local_name("object"), "object");
    }
}
