// Mesh data as the renderer consumes it
//
// Decoding mesh files happens elsewhere; this is the flat, already-decoded
// form plus the two pre-compiled shaders used to draw it.

use bytemuck::{Pod, Zeroable};
use std::path::{Path, PathBuf};

use crate::error::SceneError;
use crate::geometry::Aabb;
use crate::math::Vector3;

/// Interleaved vertex, matches `layout(location = 0/1)` in the vertex shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex {
    pub const fn new(position: [f32; 3], normal: [f32; 3]) -> Self {
        Self { position, normal }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    vertex_shader: PathBuf,
    fragment_shader: PathBuf,
}

impl Mesh {
    /// Triangle-list mesh. Every index must name an existing vertex.
    pub fn new(
        vertices: Vec<Vertex>,
        indices: Vec<u32>,
        vertex_shader: impl Into<PathBuf>,
        fragment_shader: impl Into<PathBuf>,
    ) -> Result<Self, SceneError> {
        if indices.len() % 3 != 0 {
            return Err(SceneError::IncompleteTriangle(indices.len()));
        }
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(SceneError::IndexOutOfRange {
                index,
                vertex_count: vertices.len(),
            });
        }

        Ok(Self {
            vertices,
            indices,
            vertex_shader: vertex_shader.into(),
            fragment_shader: fragment_shader.into(),
        })
    }

    /// Unit cube centred on the origin, four vertices per face so each face
    /// keeps a flat normal. Faces wind counter-clockwise seen from outside.
    pub fn cube(vertex_shader: impl Into<PathBuf>, fragment_shader: impl Into<PathBuf>) -> Self {
        const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            // normal, u axis, v axis
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        for (normal, u, v) in FACES {
            let (n, u, v) = (Vector3::from(normal), Vector3::from(u), Vector3::from(v));
            let base = vertices.len() as u32;
            for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                let p = n * 0.5 + u * su + v * sv;
                vertices.push(Vertex::new(p.to_array(), normal));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self {
            vertices,
            indices,
            vertex_shader: vertex_shader.into(),
            fragment_shader: fragment_shader.into(),
        }
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_shader(&self) -> &Path {
        &self.vertex_shader
    }

    pub fn fragment_shader(&self) -> &Path {
        &self.fragment_shader
    }

    /// Local-space bounds, `None` for a mesh without vertices.
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.vertices.iter().map(|v| Vector3::from(v.position)))
    }
}
