//! View frustum planes.
//!
//! Planes are extracted from the combined view-projection matrix with the
//! row-combination method and normalized so that `distance_to_point` is a
//! true signed distance.

use bytemuck::{Pod, Zeroable};
use frustra_core::{Mat4, Vec3};

/// A plane in 3D space (Ax + By + Cz + D = 0).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Plane {
    /// Normal X component.
    pub a: f32,
    /// Normal Y component.
    pub b: f32,
    /// Normal Z component.
    pub c: f32,
    /// Distance from origin.
    pub d: f32,
}

impl Plane {
    /// Creates a new plane.
    #[must_use]
    pub const fn new(a: f32, b: f32, c: f32, d: f32) -> Self {
        Self { a, b, c, d }
    }

    /// Plane `row3 + sign * row_k` of a column-major matrix.
    fn combine(m: &[[f32; 4]; 4], k: usize, sign: f32) -> Self {
        Self::new(
            m[0][3] + sign * m[0][k],
            m[1][3] + sign * m[1][k],
            m[2][3] + sign * m[2][k],
            m[3][3] + sign * m[3][k],
        )
    }

    /// Normalizes the plane. A zero normal is left untouched.
    #[must_use]
    pub fn normalized(self) -> Self {
        let len = (self.a * self.a + self.b * self.b + self.c * self.c).sqrt();
        if len > 0.0 {
            Self {
                a: self.a / len,
                b: self.b / len,
                c: self.c / len,
                d: self.d / len,
            }
        } else {
            self
        }
    }

    /// Plane normal.
    #[must_use]
    pub const fn normal(&self) -> Vec3 {
        Vec3::new(self.a, self.b, self.c)
    }

    /// Returns the signed distance from a point to the plane.
    #[inline]
    #[must_use]
    pub fn distance_to_point(&self, p: Vec3) -> f32 {
        self.a * p.x + self.b * p.y + self.c * p.z + self.d
    }

    /// Converts to array format.
    #[must_use]
    pub const fn as_array(&self) -> [f32; 4] {
        [self.a, self.b, self.c, self.d]
    }
}

/// View frustum.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far planes.
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Left plane index.
    pub const LEFT: usize = 0;
    /// Right plane index.
    pub const RIGHT: usize = 1;
    /// Bottom plane index.
    pub const BOTTOM: usize = 2;
    /// Top plane index.
    pub const TOP: usize = 3;
    /// Near plane index.
    pub const NEAR: usize = 4;
    /// Far plane index.
    pub const FAR: usize = 5;

    /// Extracts frustum planes from a column-major view-projection matrix.
    #[must_use]
    pub fn from_view_projection(view_proj: &Mat4) -> Self {
        let m = &view_proj.cols;
        Self {
            planes: [
                Plane::combine(m, 0, 1.0).normalized(),
                Plane::combine(m, 0, -1.0).normalized(),
                Plane::combine(m, 1, 1.0).normalized(),
                Plane::combine(m, 1, -1.0).normalized(),
                Plane::combine(m, 2, 1.0).normalized(),
                Plane::combine(m, 2, -1.0).normalized(),
            ],
        }
    }

    /// Index of the first plane that rejects `p` with `slack` allowance.
    #[must_use]
    pub fn first_rejecting_plane(&self, p: Vec3, slack: f32) -> Option<usize> {
        self.planes
            .iter()
            .position(|plane| plane.distance_to_point(p) < -slack)
    }

    /// True if the point is inside all six planes.
    #[must_use]
    pub fn contains_point(&self, p: Vec3) -> bool {
        self.first_rejecting_plane(p, 0.0).is_none()
    }

    /// True if the sphere intersects the frustum.
    #[must_use]
    pub fn contains_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.first_rejecting_plane(center, radius).is_none()
    }

    /// Converts planes to array format for GPU upload.
    #[must_use]
    pub fn as_arrays(&self) -> [[f32; 4]; 6] {
        self.planes.map(|plane| plane.as_array())
    }
}

/// Recomputes the frustum from the camera every frame.
#[derive(Debug, Clone, Default)]
pub struct FrustumExtractor {
    frustum: Frustum,
    extracted: u64,
}

impl FrustumExtractor {
    /// Creates a new extractor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Extracts the planes of `proj * view`.
    pub fn extract(&mut self, view: &Mat4, proj: &Mat4) -> Frustum {
        self.frustum = Frustum::from_view_projection(&(*proj * *view));
        self.extracted += 1;
        self.frustum
    }

    /// Planes from the last extraction.
    #[must_use]
    pub const fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// Number of extractions performed.
    #[must_use]
    pub const fn extractions(&self) -> u64 {
        self.extracted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(eye: Vec3, target: Vec3, fov_deg: f32) -> (Mat4, Mat4) {
        (
            Mat4::look_at_rh(eye, target, Vec3::Y),
            Mat4::perspective_rh(fov_deg.to_radians(), 16.0 / 9.0, 0.1, 100.0),
        )
    }

    #[test]
    fn test_plane_normalization() {
        let plane = Plane::new(3.0, 4.0, 0.0, 10.0);
        let normalized = plane.normalized();

        // 3-4-5 triangle, so length is 5
        assert!((normalized.a - 0.6).abs() < 0.001);
        assert!((normalized.b - 0.8).abs() < 0.001);
        assert!((normalized.d - 2.0).abs() < 0.001);
    }

    #[test]
    fn test_zero_normal_untouched() {
        let plane = Plane::new(0.0, 0.0, 0.0, 7.0);
        assert_eq!(plane.normalized(), plane);
    }

    #[test]
    fn test_planes_are_unit_length() {
        let (view, proj) = camera(Vec3::new(3.0, 2.0, 9.0), Vec3::ZERO, 60.0);
        let frustum = FrustumExtractor::new().extract(&view, &proj);
        for plane in &frustum.planes {
            assert!((plane.normal().length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_eye_is_on_inner_side_of_side_planes() {
        let eyes = [
            (Vec3::ZERO, -Vec3::Z),
            (Vec3::new(0.0, 10.0, 30.0), Vec3::ZERO),
            (Vec3::new(-40.0, 5.0, 12.0), Vec3::new(10.0, 0.0, -3.0)),
        ];
        for (eye, target) in eyes {
            for fov in [10.0, 45.0, 90.0, 120.0] {
                let (view, proj) = camera(eye, target, fov);
                let frustum = Frustum::from_view_projection(&(proj * view));
                for index in [Frustum::LEFT, Frustum::RIGHT, Frustum::BOTTOM, Frustum::TOP] {
                    let d = frustum.planes[index].distance_to_point(eye);
                    assert!(d >= -1e-3, "plane {index} distance {d} at eye {eye:?}");
                }
            }
        }
    }

    #[test]
    fn test_point_classification() {
        let (view, proj) = camera(Vec3::ZERO, -Vec3::Z, 45.0);
        let frustum = Frustum::from_view_projection(&(proj * view));

        assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -5.0)));
        assert_eq!(
            frustum.first_rejecting_plane(Vec3::new(1000.0, 0.0, 0.0), 0.0),
            Some(Frustum::RIGHT)
        );
        assert_eq!(
            frustum.first_rejecting_plane(Vec3::new(0.0, 0.0, -500.0), 0.0),
            Some(Frustum::FAR)
        );
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 5.0)));
        assert!(frustum.contains_sphere(Vec3::new(0.0, 0.0, 0.5), 1.0));
    }
}
