//! Mesh data consumed by the indexed-indirect draw.

use bytemuck::{Pod, Zeroable};
use frustra_core::Vec3;

/// Vertex with position and normal.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Model-space position.
    pub position: [f32; 3],
    /// Model-space normal.
    pub normal: [f32; 3],
}

/// Sizes the core needs from a loaded mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshInfo {
    /// Number of vertices.
    pub vertex_count: u32,
    /// Number of indices; becomes the indirect record's `index_count`.
    pub index_count: u32,
}

/// Indexed triangle mesh.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    /// Vertex data.
    pub vertices: Vec<Vertex>,
    /// Triangle list indices.
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Unit cube centered at the origin, 24 vertices, CCW faces.
    #[must_use]
    pub fn cube() -> Self {
        // (normal, u, v) with u x v = normal
        const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];
        const CORNERS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        for (face, (n, u, v)) in (0u32..).zip(FACES) {
            let (n, u, v) = (Vec3::from_array(n), Vec3::from_array(u), Vec3::from_array(v));
            let base = face * 4;
            for (su, sv) in CORNERS {
                let p = (n + u * su + v * sv) * 0.5;
                vertices.push(Vertex {
                    position: p.to_array(),
                    normal: n.to_array(),
                });
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self { vertices, indices }
    }

    /// Vertex and index counts.
    #[must_use]
    pub fn info(&self) -> MeshInfo {
        MeshInfo {
            vertex_count: u32::try_from(self.vertices.len()).unwrap_or(u32::MAX),
            index_count: u32::try_from(self.indices.len()).unwrap_or(u32::MAX),
        }
    }

    /// Radius of the smallest origin-centered sphere enclosing the mesh.
    #[must_use]
    pub fn bounding_radius(&self) -> f32 {
        self.vertices
            .iter()
            .map(|v| Vec3::from_array(v.position).length())
            .fold(0.0, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_counts() {
        let cube = Mesh::cube();
        let info = cube.info();
        assert_eq!(info.vertex_count, 24);
        assert_eq!(info.index_count, 36);
        assert!(cube.indices.iter().all(|&i| i < 24));
    }

    #[test]
    fn test_cube_winding_faces_outward() {
        let cube = Mesh::cube();
        for tri in cube.indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| {
                Vec3::from_array(cube.vertices[i as usize].position)
            });
            let face_normal = (b - a).cross(c - a);
            let stored = Vec3::from_array(cube.vertices[tri[0] as usize].normal);
            assert!(face_normal.dot(stored) > 0.0);
        }
    }

    #[test]
    fn test_cube_fits_unit_radius() {
        let r = Mesh::cube().bounding_radius();
        assert!((r - 3.0_f32.sqrt() * 0.5).abs() < 1e-5);
        assert!(r < 1.0);
    }
}
