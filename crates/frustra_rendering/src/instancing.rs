//! Per-instance transform data.
//!
//! Uploaded once at scene setup; the culling and draw shaders only read it.

use bytemuck::{Pod, Zeroable};
use frustra_core::{Mat4, Vec3};

/// One object's model transform, column-major.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceRecord {
    /// Model matrix columns.
    pub model: [[f32; 4]; 4],
}

impl Default for InstanceRecord {
    fn default() -> Self {
        Self::from_mat4(&Mat4::IDENTITY)
    }
}

impl InstanceRecord {
    /// Creates a record from a transform.
    #[must_use]
    pub const fn from_mat4(model: &Mat4) -> Self {
        Self { model: model.cols }
    }

    /// Translation-only record.
    #[must_use]
    pub const fn at(position: Vec3) -> Self {
        Self::from_mat4(&Mat4::from_translation(position))
    }

    /// The transform as a matrix.
    #[must_use]
    pub const fn transform(&self) -> Mat4 {
        Mat4::from_cols(self.model)
    }

    /// Reference point tested against the frustum.
    #[must_use]
    pub const fn translation(&self) -> Vec3 {
        Vec3::new(self.model[3][0], self.model[3][1], self.model[3][2])
    }

    /// Largest axis scale, used to grow the bounding radius.
    #[must_use]
    pub fn max_axis_scale(&self) -> f32 {
        self.transform().max_axis_scale()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_64_bytes() {
        assert_eq!(std::mem::size_of::<InstanceRecord>(), 64);
    }

    #[test]
    fn test_translation_column() {
        let record = InstanceRecord::from_mat4(
            &(Mat4::from_translation(Vec3::new(4.0, 5.0, 6.0)) * Mat4::from_scale(3.0)),
        );
        assert_eq!(record.translation(), Vec3::new(4.0, 5.0, 6.0));
        assert!((record.max_axis_scale() - 3.0).abs() < 1e-6);
    }
}
