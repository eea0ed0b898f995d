//! Per-frame-slot uniform blocks.

use crate::culling::Frustum;
use bytemuck::{Pod, Zeroable};
use frustra_core::Mat4;

/// Camera block shared by the cull and draw shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct CameraUniform {
    /// World-to-view matrix.
    pub view: [[f32; 4]; 4],
    /// View-to-clip matrix.
    pub proj: [[f32; 4]; 4],
    /// Frustum planes (6 planes, ABCD each).
    pub planes: [[f32; 4]; 6],
}

impl CameraUniform {
    /// Packs matrices and the frustum extracted from them.
    #[must_use]
    pub fn new(view: &Mat4, proj: &Mat4, frustum: &Frustum) -> Self {
        Self {
            view: view.cols,
            proj: proj.cols,
            planes: frustum.as_arrays(),
        }
    }
}

/// Dispatch-time culling parameters.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct CullParams {
    /// Threads at or past this index do nothing.
    pub instance_count: u32,
    /// Mesh bounding radius in model space.
    pub bounding_radius: f32,
    /// Padding for alignment.
    pub _pad0: u32,
    /// Padding for alignment.
    pub _pad1: u32,
}

impl CullParams {
    /// Creates culling parameters.
    #[must_use]
    pub const fn new(instance_count: u32, bounding_radius: f32) -> Self {
        Self {
            instance_count,
            bounding_radius,
            _pad0: 0,
            _pad1: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_sizes() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 224);
        assert_eq!(std::mem::size_of::<CullParams>(), 16);
    }
}
