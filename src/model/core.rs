//! Core mesh types

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// A vertex in 3D space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Z coordinate
    pub z: f64,
}

impl Vertex {
    /// Create a new vertex
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Position as a nalgebra point
    pub fn to_point(&self) -> Point3<f64> {
        Point3::new(self.x, self.y, self.z)
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<Point3<f64>> for Vertex {
    fn from(p: Point3<f64>) -> Self {
        Self::new(p.x, p.y, p.z)
    }
}

/// A triangle defined by three vertex indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triangle {
    /// Index of first vertex
    pub v1: usize,
    /// Index of second vertex
    pub v2: usize,
    /// Index of third vertex
    pub v3: usize,
}

impl Triangle {
    /// Create a new triangle
    pub fn new(v1: usize, v2: usize, v3: usize) -> Self {
        Self { v1, v2, v3 }
    }

    /// The three indices in winding order
    pub fn indices(&self) -> [usize; 3] {
        [self.v1, self.v2, self.v3]
    }
}

/// Triangle soup: vertex positions plus index triples
///
/// A mesh produced by [`crate::loader`] or [`Mesh::from_arrays`] has already
/// been validated and centered on the origin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    /// List of vertices
    pub vertices: Vec<Vertex>,
    /// List of triangles
    pub triangles: Vec<Triangle>,
}

impl Mesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new mesh with pre-allocated capacity
    pub fn with_capacity(vertices: usize, triangles: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertices),
            triangles: Vec::with_capacity(triangles),
        }
    }

    /// Build a normalized mesh from raw vertex and face arrays
    ///
    /// Indices are validated and the result is centered on the origin, the
    /// same way a file load is finished.
    ///
    /// # Example
    ///
    /// ```
    /// use meshslice::Mesh;
    ///
    /// let mesh = Mesh::from_arrays(
    ///     &[[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 2.0, 2.0]],
    ///     &[[0, 1, 2]],
    /// )?;
    /// let bbox = mesh.bounding_box().unwrap();
    /// assert_eq!(bbox.min, [-1.0, -1.0, -1.0]);
    /// # Ok::<(), meshslice::LoadError>(())
    /// ```
    pub fn from_arrays(vertices: &[[f64; 3]], faces: &[[usize; 3]]) -> Result<Self, LoadError> {
        let mut mesh = Self::with_capacity(vertices.len(), faces.len());
        mesh.vertices
            .extend(vertices.iter().map(|v| Vertex::new(v[0], v[1], v[2])));
        mesh.triangles
            .extend(faces.iter().map(|f| Triangle::new(f[0], f[1], f[2])));
        mesh.validate("<arrays>")?;
        mesh.center();
        Ok(mesh)
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangles
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// True when the mesh has no vertices or no triangles
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.triangles.is_empty()
    }

    /// Axis-aligned bounds of the current vertex positions
    ///
    /// Always computed from the vertices as they are now, so it stays correct
    /// after any transform. Returns `None` for a mesh without vertices.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.vertices.iter().map(Vertex::to_point))
    }

    /// Corner positions of one triangle
    ///
    /// The triangle must index into this mesh; meshes from the loader are
    /// validated so this holds for every stored triangle.
    pub fn triangle_points(&self, triangle: &Triangle) -> [Point3<f64>; 3] {
        [
            self.vertices[triangle.v1].to_point(),
            self.vertices[triangle.v2].to_point(),
            self.vertices[triangle.v3].to_point(),
        ]
    }

    /// Check the invariants every sliceable mesh satisfies
    ///
    /// Fails with [`LoadError::Empty`] when there are no vertices or faces and
    /// with [`LoadError::Unreadable`] on out-of-range indices or non-finite
    /// coordinates.
    pub fn validate(&self, source_name: &str) -> Result<(), LoadError> {
        if self.vertices.is_empty() {
            return Err(LoadError::empty(format!("'{}' has no vertices", source_name)));
        }
        if self.triangles.is_empty() {
            return Err(LoadError::empty(format!("'{}' has no faces", source_name)));
        }

        if let Some(index) = self.vertices.iter().position(|v| !v.is_finite()) {
            return Err(LoadError::unreadable(
                source_name,
                format!("vertex {} has a non-finite coordinate", index),
            ));
        }

        let count = self.vertices.len();
        for (index, triangle) in self.triangles.iter().enumerate() {
            if let Some(&bad) = triangle.indices().iter().find(|&&i| i >= count) {
                return Err(LoadError::unreadable(
                    source_name,
                    format!(
                        "face {} references vertex {} but only {} vertices exist",
                        index, bad, count
                    ),
                ));
            }
        }

        Ok(())
    }

    /// Translate every vertex so the bounding box is centered on the origin
    ///
    /// Returns the translation that was applied.
    pub fn center(&mut self) -> Vector3<f64> {
        let Some(bbox) = self.bounding_box() else {
            return Vector3::zeros();
        };
        let center = bbox.center();
        let offset = Vector3::new(-center[0], -center[1], -center[2]);
        self.translate(&offset);
        offset
    }

    /// Translate every vertex by `offset`
    pub fn translate(&mut self, offset: &Vector3<f64>) {
        for v in &mut self.vertices {
            v.x += offset.x;
            v.y += offset.y;
            v.z += offset.z;
        }
    }

    /// Append another mesh, renumbering its faces past the current vertices
    pub fn append(&mut self, other: &Mesh) {
        let offset = self.vertices.len();
        self.vertices.extend_from_slice(&other.vertices);
        self.triangles.extend(
            other
                .triangles
                .iter()
                .map(|t| Triangle::new(t.v1 + offset, t.v2 + offset, t.v3 + offset)),
        );
    }
}

/// Axis-aligned bounding box
///
/// `size` is stored alongside the corners so that exported documents carry it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum corner
    pub min: [f64; 3],
    /// Maximum corner
    pub max: [f64; 3],
    /// Componentwise `max - min`
    pub size: [f64; 3],
}

impl BoundingBox {
    /// Box spanning two corners
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self {
            min,
            max,
            size: [max[0] - min[0], max[1] - min[1], max[2] - min[2]],
        }
    }

    /// Smallest box holding every point, or `None` for an empty iterator
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Point3<f64>>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut min = [first.x, first.y, first.z];
        let mut max = min;
        for p in iter {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        Some(Self::new(min, max))
    }

    /// Midpoint of the box
    pub fn center(&self) -> [f64; 3] {
        [
            (self.min[0] + self.max[0]) / 2.0,
            (self.min[1] + self.max[1]) / 2.0,
            (self.min[2] + self.max[2]) / 2.0,
        ]
    }

    /// Extent along Z
    pub fn height(&self) -> f64 {
        self.size[2]
    }
}
