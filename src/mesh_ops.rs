//! Triangle mesh measurements
//!
//! Signed volume through the divergence theorem, and (with the `mesh-ops`
//! feature) unsigned volume through parry3d mass properties.

use crate::model::Mesh;

/// Compute the signed volume of a mesh using the divergence theorem
///
/// For a watertight mesh with outward winding the result is positive;
/// a negative value indicates inverted triangles.
pub fn signed_volume(mesh: &Mesh) -> f64 {
    let mut volume = 0.0_f64;
    for triangle in &mesh.triangles {
        let [a, b, c] = mesh.triangle_points(triangle);
        volume += a.coords.dot(&b.coords.cross(&c.coords));
    }
    volume / 6.0
}

/// Compute the unsigned volume of a mesh using parry3d
///
/// Returns `None` when parry3d rejects the triangle list (for example a
/// mesh with no triangles).
#[cfg(feature = "mesh-ops")]
pub fn volume(mesh: &Mesh) -> Option<f64> {
    use parry3d::math::Point;
    use parry3d::shape::{Shape, TriMesh as ParryTriMesh};

    if mesh.is_empty() {
        return None;
    }

    let vertices: Vec<Point<f32>> = mesh
        .vertices
        .iter()
        .map(|v| Point::new(v.x as f32, v.y as f32, v.z as f32))
        .collect();

    let indices: Vec<[u32; 3]> = mesh
        .triangles
        .iter()
        .map(|t| [t.v1 as u32, t.v2 as u32, t.v3 as u32])
        .collect();

    let trimesh = ParryTriMesh::new(vertices, indices).ok()?;

    // Volume is the mass when density is 1.0
    Some(trimesh.mass_properties(1.0).mass() as f64)
}

/// Unsigned volume fallback without parry3d
#[cfg(not(feature = "mesh-ops"))]
pub fn volume(_mesh: &Mesh) -> Option<f64> {
    None
}
