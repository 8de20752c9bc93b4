//! Core 3MF element parsing
//!
//! Attribute decoding for objects, vertices, triangles, components and build
//! items.

use crate::error::ThreeMfError;
use crate::model::{Triangle, Vertex};
use nalgebra::Matrix4;
use quick_xml::events::BytesStart;

use super::{BuildItem, Component, Result, TRANSFORM_MATRIX_SIZE};

fn attr_str(value: &[u8]) -> Result<&str> {
    std::str::from_utf8(value).map_err(|e| ThreeMfError::InvalidXml(e.to_string()))
}

/// Parse the `id` attribute of an object element
pub(super) fn parse_object_id(e: &BytesStart) -> Result<usize> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"id" {
            return Ok(attr_str(&attr.value)?.trim().parse::<usize>()?);
        }
    }
    Err(ThreeMfError::missing_attribute("object", "id"))
}

/// Parse vertex element attributes
pub(super) fn parse_vertex(e: &BytesStart) -> Result<Vertex> {
    let mut x_opt: Option<f64> = None;
    let mut y_opt: Option<f64> = None;
    let mut z_opt: Option<f64> = None;

    let parse_f64 = |value: &[u8]| -> Result<f64> { Ok(attr_str(value)?.trim().parse::<f64>()?) };

    for attr_result in e.attributes() {
        let attr = attr_result?;
        match attr.key.as_ref() {
            b"x" => x_opt = Some(parse_f64(&attr.value)?),
            b"y" => y_opt = Some(parse_f64(&attr.value)?),
            b"z" => z_opt = Some(parse_f64(&attr.value)?),
            _ => {}
        }
    }

    let x = x_opt.ok_or_else(|| ThreeMfError::missing_attribute("vertex", "x"))?;
    let y = y_opt.ok_or_else(|| ThreeMfError::missing_attribute("vertex", "y"))?;
    let z = z_opt.ok_or_else(|| ThreeMfError::missing_attribute("vertex", "z"))?;

    if !(x.is_finite() && y.is_finite() && z.is_finite()) {
        return Err(ThreeMfError::InvalidXml(format!(
            "Vertex coordinates must be finite (got {}, {}, {})",
            x, y, z
        )));
    }

    Ok(Vertex::new(x, y, z))
}

/// Parse triangle element attributes
///
/// Property attributes (`pid`, `p1`..) carry materials and are ignored.
pub(super) fn parse_triangle(e: &BytesStart) -> Result<Triangle> {
    let mut v1_opt: Option<usize> = None;
    let mut v2_opt: Option<usize> = None;
    let mut v3_opt: Option<usize> = None;

    for attr_result in e.attributes() {
        let attr = attr_result?;
        let slot = match attr.key.as_ref() {
            b"v1" => &mut v1_opt,
            b"v2" => &mut v2_opt,
            b"v3" => &mut v3_opt,
            _ => continue,
        };
        *slot = Some(attr_str(&attr.value)?.trim().parse::<usize>()?);
    }

    let v1 = v1_opt.ok_or_else(|| ThreeMfError::missing_attribute("triangle", "v1"))?;
    let v2 = v2_opt.ok_or_else(|| ThreeMfError::missing_attribute("triangle", "v2"))?;
    let v3 = v3_opt.ok_or_else(|| ThreeMfError::missing_attribute("triangle", "v3"))?;

    Ok(Triangle::new(v1, v2, v3))
}

/// Parse component element attributes
pub(super) fn parse_component(e: &BytesStart) -> Result<Component> {
    let (objectid, transform) = parse_reference(e, "component")?;
    Ok(Component {
        objectid,
        transform,
    })
}

/// Parse build item element attributes
pub(super) fn parse_build_item(e: &BytesStart) -> Result<BuildItem> {
    let (objectid, transform) = parse_reference(e, "item")?;
    Ok(BuildItem {
        objectid,
        transform,
    })
}

/// `objectid` plus optional `transform`, shared by components and build items
fn parse_reference(e: &BytesStart, element: &str) -> Result<(usize, Matrix4<f64>)> {
    let mut objectid = None;
    let mut transform = Matrix4::identity();

    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"objectid" => objectid = Some(attr_str(&attr.value)?.trim().parse::<usize>()?),
            b"transform" => transform = parse_transform(attr_str(&attr.value)?)?,
            _ => {}
        }
    }

    let objectid = objectid.ok_or_else(|| ThreeMfError::missing_attribute(element, "objectid"))?;
    Ok((objectid, transform))
}

/// Parse a 3MF transform attribute into a homogeneous matrix
///
/// The attribute lists `m00 m01 m02 m10 m11 m12 m20 m21 m22 m30 m31 m32`
/// and maps a point as `x' = x*m00 + y*m10 + z*m20 + m30` (likewise for y, z).
pub(super) fn parse_transform(value: &str) -> Result<Matrix4<f64>> {
    let values = value
        .split_whitespace()
        .map(|s| s.parse::<f64>().map_err(ThreeMfError::from))
        .collect::<Result<Vec<f64>>>()?;

    if values.len() != TRANSFORM_MATRIX_SIZE {
        return Err(ThreeMfError::InvalidXml(format!(
            "Transform matrix must have exactly {} values (got {})",
            TRANSFORM_MATRIX_SIZE,
            values.len()
        )));
    }

    if let Some((idx, val)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(ThreeMfError::InvalidXml(format!(
            "Transform matrix value at index {} must be finite (got {})",
            idx, val
        )));
    }

    let m = &values;
    #[rustfmt::skip]
    let matrix = Matrix4::new(
        m[0], m[3], m[6], m[9],
        m[1], m[4], m[7], m[10],
        m[2], m[5], m[8], m[11],
        0.0,  0.0,  0.0,  1.0,
    );
    Ok(matrix)
}
