//! Fly / orbit camera.
//!
//! Angles are stored in degrees; matrices come out right-handed with a
//! `[0, 1]` depth range.

use crate::input::{FrameInput, Key, MouseButton};
use crate::math::{Mat4, Vec3};

/// Default yaw in degrees (looking down `-Z`).
pub const DEFAULT_YAW: f32 = -90.0;
/// Default pitch in degrees.
pub const DEFAULT_PITCH: f32 = 0.0;
/// Default movement speed in units per second.
pub const DEFAULT_SPEED: f32 = 2.5;
/// Default mouse sensitivity in degrees per pixel.
pub const DEFAULT_SENSITIVITY: f32 = 0.1;
/// Default vertical field of view in degrees.
pub const DEFAULT_ZOOM: f32 = 45.0;
/// Default near plane distance.
pub const DEFAULT_NEAR: f32 = 0.1;
/// Default far plane distance.
pub const DEFAULT_FAR: f32 = 100.0;

const ZOOM_MIN: f32 = 1.0;
const ZOOM_MAX: f32 = 120.0;
const PITCH_LIMIT: f32 = 89.0;
const ORBIT_MIN_DISTANCE: f32 = 0.5;
const ORBIT_MAX_SCROLL_DISTANCE: f32 = 100.0;

/// Camera control scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraMode {
    /// WASD + mouse free look.
    #[default]
    Free,
    /// Orbits a target point.
    Orbit,
}

/// Keyboard movement directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMovement {
    /// Along the view direction.
    Forward,
    /// Against the view direction.
    Backward,
    /// Strafe left.
    Left,
    /// Strafe right.
    Right,
    /// World up.
    Up,
    /// World down.
    Down,
}

/// Perspective camera.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    front: Vec3,
    up: Vec3,
    right: Vec3,
    world_up: Vec3,
    yaw: f32,
    pitch: f32,
    zoom: f32,
    near: f32,
    far: f32,
    /// Units per second.
    pub movement_speed: f32,
    /// Degrees per pixel of mouse motion.
    pub mouse_sensitivity: f32,
    mode: CameraMode,
    orbit_target: Vec3,
    orbit_distance: f32,
    orbit_yaw: f32,
    orbit_pitch: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 3.0))
    }
}

impl Camera {
    /// Creates a free camera at `position` looking down `-Z`.
    #[must_use]
    pub fn new(position: Vec3) -> Self {
        let mut camera = Self {
            position,
            front: -Vec3::Z,
            up: Vec3::Y,
            right: Vec3::X,
            world_up: Vec3::Y,
            yaw: DEFAULT_YAW,
            pitch: DEFAULT_PITCH,
            zoom: DEFAULT_ZOOM,
            near: DEFAULT_NEAR,
            far: DEFAULT_FAR,
            movement_speed: DEFAULT_SPEED,
            mouse_sensitivity: DEFAULT_SENSITIVITY,
            mode: CameraMode::Free,
            orbit_target: Vec3::ZERO,
            orbit_distance: 5.0,
            orbit_yaw: 0.0,
            orbit_pitch: 30.0,
        };
        camera.update_vectors();
        camera
    }

    /// Position in world space.
    #[must_use]
    pub const fn position(&self) -> Vec3 {
        self.position
    }

    /// Unit view direction.
    #[must_use]
    pub const fn front(&self) -> Vec3 {
        self.front
    }

    /// Vertical field of view in degrees.
    #[must_use]
    pub const fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Near plane distance.
    #[must_use]
    pub const fn near(&self) -> f32 {
        self.near
    }

    /// Far plane distance.
    #[must_use]
    pub const fn far(&self) -> f32 {
        self.far
    }

    /// Active control scheme.
    #[must_use]
    pub const fn mode(&self) -> CameraMode {
        self.mode
    }

    /// Moves the camera.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.update_vectors();
    }

    /// Sets yaw and pitch in degrees. Pitch is clamped to ±89°.
    pub fn set_rotation(&mut self, yaw: f32, pitch: f32) {
        self.yaw = yaw;
        self.pitch = pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.update_vectors();
    }

    /// Sets the field of view in degrees, clamped to `[1, 120]`.
    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom.clamp(ZOOM_MIN, ZOOM_MAX);
    }

    /// Sets the clip distances.
    pub fn set_clip(&mut self, near: f32, far: f32) {
        self.near = near;
        self.far = far;
    }

    /// Switches control scheme. Entering orbit mode derives the orbit
    /// parameters from the current position.
    pub fn set_mode(&mut self, mode: CameraMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;

        if mode == CameraMode::Orbit {
            let offset = self.position - self.orbit_target;
            self.orbit_distance = offset.length();
            if self.orbit_distance < ORBIT_MIN_DISTANCE {
                self.orbit_distance = 3.0;
            }
            let dir = offset.normalize();
            self.orbit_pitch = dir.y.clamp(-1.0, 1.0).asin().to_degrees();
            self.orbit_yaw = dir.x.atan2(dir.z).to_degrees();
        }
        self.update_vectors();
    }

    /// Sets the orbit target.
    pub fn set_orbit_target(&mut self, target: Vec3) {
        self.orbit_target = target;
        self.update_vectors();
    }

    /// Sets the orbit distance, never closer than 0.5.
    pub fn set_orbit_distance(&mut self, distance: f32) {
        self.orbit_distance = distance.max(ORBIT_MIN_DISTANCE);
        self.update_vectors();
    }

    /// Rotates around the orbit target by the given degrees.
    pub fn orbit(&mut self, delta_yaw: f32, delta_pitch: f32) {
        self.orbit_yaw += delta_yaw;
        self.orbit_pitch = (self.orbit_pitch + delta_pitch).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.update_vectors();
    }

    /// Keyboard movement for `dt` seconds.
    pub fn process_keyboard(&mut self, direction: CameraMovement, dt: f32) {
        let velocity = self.movement_speed * dt;

        if self.mode == CameraMode::Orbit {
            match direction {
                CameraMovement::Forward => {
                    self.orbit_distance = (self.orbit_distance - velocity).max(ORBIT_MIN_DISTANCE);
                }
                CameraMovement::Backward => self.orbit_distance += velocity,
                _ => return,
            }
            self.update_vectors();
            return;
        }

        match direction {
            CameraMovement::Forward => self.position += self.front * velocity,
            CameraMovement::Backward => self.position -= self.front * velocity,
            CameraMovement::Left => self.position -= self.right * velocity,
            CameraMovement::Right => self.position += self.right * velocity,
            CameraMovement::Up => self.position += self.world_up * velocity,
            CameraMovement::Down => self.position -= self.world_up * velocity,
        }
    }

    /// Mouse look. Offsets are in pixels, `+y` up.
    pub fn process_mouse_movement(&mut self, dx: f32, dy: f32) {
        let dx = dx * self.mouse_sensitivity;
        let dy = dy * self.mouse_sensitivity;

        if self.mode == CameraMode::Orbit {
            self.orbit(dx, dy);
            return;
        }
        self.set_rotation(self.yaw + dx, self.pitch + dy);
    }

    /// Scroll: zoom in free mode, distance in orbit mode.
    pub fn process_mouse_scroll(&mut self, dy: f32) {
        if self.mode == CameraMode::Orbit {
            self.orbit_distance =
                (self.orbit_distance - dy * 0.5).clamp(ORBIT_MIN_DISTANCE, ORBIT_MAX_SCROLL_DISTANCE);
            self.update_vectors();
            return;
        }
        self.set_zoom(self.zoom - dy);
    }

    /// Applies one frame of input: WASD/Space/Shift movement, right-mouse
    /// look, scroll zoom and `Tab` mode toggle.
    pub fn apply_input(&mut self, input: &FrameInput, dt: f32) {
        const BINDINGS: [(Key, CameraMovement); 6] = [
            (Key::W, CameraMovement::Forward),
            (Key::S, CameraMovement::Backward),
            (Key::A, CameraMovement::Left),
            (Key::D, CameraMovement::Right),
            (Key::Space, CameraMovement::Up),
            (Key::LeftShift, CameraMovement::Down),
        ];

        if input.mouse_down(MouseButton::Right) {
            self.process_mouse_movement(input.mouse_delta.0, input.mouse_delta.1);
        }
        if input.scroll_delta != 0.0 {
            self.process_mouse_scroll(input.scroll_delta);
        }
        for (key, movement) in BINDINGS {
            if input.key_held(key) {
                self.process_keyboard(movement, dt);
            }
        }
        if input.key_pressed(Key::Tab) {
            let next = match self.mode {
                CameraMode::Free => CameraMode::Orbit,
                CameraMode::Orbit => CameraMode::Free,
            };
            self.set_mode(next);
        }
    }

    /// World-to-view transform.
    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        match self.mode {
            CameraMode::Orbit => Mat4::look_at_rh(self.position, self.orbit_target, self.world_up),
            CameraMode::Free => Mat4::look_at_rh(self.position, self.position + self.front, self.up),
        }
    }

    /// View-to-clip transform for the given aspect ratio.
    #[must_use]
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.zoom.to_radians(), aspect, self.near, self.far)
    }

    fn update_vectors(&mut self) {
        if self.mode == CameraMode::Orbit {
            let (yaw, pitch) = (self.orbit_yaw.to_radians(), self.orbit_pitch.to_radians());
            let offset = Vec3::new(
                self.orbit_distance * pitch.cos() * yaw.sin(),
                self.orbit_distance * pitch.sin(),
                self.orbit_distance * pitch.cos() * yaw.cos(),
            );
            self.position = self.orbit_target + offset;
            self.front = (self.orbit_target - self.position).normalize();
        } else {
            let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
            self.front = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos())
                .normalize();
        }
        self.right = self.front.cross(self.world_up).normalize();
        self.up = self.right.cross(self.front).normalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputAccumulator;

    fn close(a: Vec3, b: Vec3) -> bool {
        a.distance(b) < 1e-4
    }

    #[test]
    fn test_default_looks_down_negative_z() {
        let camera = Camera::new(Vec3::ZERO);
        assert!(close(camera.front(), -Vec3::Z));
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = Camera::new(Vec3::ZERO);
        camera.process_mouse_movement(0.0, 10_000.0);
        assert!(camera.front().y < 1.0);
        assert!(camera.front().y > 0.99);
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut camera = Camera::default();
        camera.process_mouse_scroll(500.0);
        assert_eq!(camera.zoom(), 1.0);
        camera.process_mouse_scroll(-500.0);
        assert_eq!(camera.zoom(), 120.0);
    }

    #[test]
    fn test_keyboard_moves_along_front() {
        let mut camera = Camera::new(Vec3::ZERO);
        camera.movement_speed = 10.0;
        camera.process_keyboard(CameraMovement::Forward, 0.5);
        assert!(close(camera.position(), Vec3::new(0.0, 0.0, -5.0)));
        camera.process_keyboard(CameraMovement::Right, 0.1);
        assert!(close(camera.position(), Vec3::new(1.0, 0.0, -5.0)));
    }

    #[test]
    fn test_orbit_keeps_distance() {
        let mut camera = Camera::new(Vec3::new(0.0, 0.0, 10.0));
        camera.set_mode(CameraMode::Orbit);
        camera.orbit(90.0, 0.0);
        assert!((camera.position().length() - 10.0).abs() < 1e-3);
        assert!(close(camera.front(), (-camera.position()).normalize()));
    }

    #[test]
    fn test_apply_input_toggles_mode() {
        let mut acc = InputAccumulator::new();
        acc.key_down(Key::Tab);
        let mut camera = Camera::new(Vec3::new(0.0, 0.0, 4.0));
        camera.apply_input(&acc.end_frame(), 0.016);
        assert_eq!(camera.mode(), CameraMode::Orbit);
    }

    #[test]
    fn test_view_matrix_places_eye_at_origin() {
        let camera = Camera::new(Vec3::new(3.0, 2.0, 1.0));
        let eye = camera.view_matrix().mul_vec4([3.0, 2.0, 1.0, 1.0]);
        assert!(eye[0].abs() < 1e-4 && eye[1].abs() < 1e-4 && eye[2].abs() < 1e-4);
    }
}
