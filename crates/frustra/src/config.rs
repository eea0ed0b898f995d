//! Demo configuration, loaded once at startup from an optional TOML file.
//!
//! ```toml
//! [window]
//! title = "FRUSTRA"
//! width = 1280
//! height = 720
//!
//! [culling]
//! workgroup_size = 64
//! bounding_radius = 1.0
//! frames_in_flight = 2
//!
//! [camera]
//! position = [0.0, 10.0, 30.0]
//! far = 200.0
//!
//! [scene]
//! instance_count = 10000
//! seed = 42
//! ```
//!
//! Every section and field is optional.

use crate::error::ConfigError;
use frustra_core::{Camera, Vec3};
use frustra_rendering::CullingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest number of frames the demo keeps in flight.
pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

/// Largest accepted workgroup size.
pub const MAX_WORKGROUP_SIZE: u32 = 1024;

/// Window settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title.
    pub title: String,
    /// Initial inner width in pixels.
    pub width: u32,
    /// Initial inner height in pixels.
    pub height: u32,
    /// Background color, linear RGB in `[0, 1]`.
    pub clear_color: [f64; 3],
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "FRUSTRA - GPU Instancing Culling".into(),
            width: 1280,
            height: 720,
            clear_color: [0.05, 0.06, 0.08],
        }
    }
}

/// Culling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CullingSection {
    /// Threads per workgroup of the cull dispatch.
    pub workgroup_size: u32,
    /// Mesh bounding radius used as plane-test slack.
    pub bounding_radius: f32,
    /// Frames in flight.
    pub frames_in_flight: usize,
    /// Start with culling frozen.
    pub start_frozen: bool,
}

impl Default for CullingSection {
    fn default() -> Self {
        Self {
            workgroup_size: 64,
            bounding_radius: 1.0,
            frames_in_flight: 2,
            start_frozen: false,
        }
    }
}

/// Camera settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Start position.
    pub position: [f32; 3],
    /// Start yaw in degrees.
    pub yaw: f32,
    /// Start pitch in degrees.
    pub pitch: f32,
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    /// Near plane.
    pub near: f32,
    /// Far plane.
    pub far: f32,
    /// Movement speed in units per second.
    pub movement_speed: f32,
    /// Mouse sensitivity in degrees per pixel.
    pub mouse_sensitivity: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 10.0, 30.0],
            yaw: -90.0,
            pitch: 0.0,
            fov_degrees: 45.0,
            near: 0.1,
            far: 200.0,
            movement_speed: 15.0,
            mouse_sensitivity: 0.1,
        }
    }
}

impl CameraConfig {
    /// Builds a free camera from these settings.
    #[must_use]
    pub fn build(&self) -> Camera {
        let mut camera = Camera::new(Vec3::from_array(self.position));
        camera.set_rotation(self.yaw, self.pitch);
        camera.set_zoom(self.fov_degrees);
        camera.set_clip(self.near, self.far);
        camera.movement_speed = self.movement_speed;
        camera.mouse_sensitivity = self.mouse_sensitivity;
        camera
    }
}

/// Instance field settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Number of instances.
    pub instance_count: u32,
    /// Positions are uniform in `[-extent, extent]` on every axis.
    pub extent: f32,
    /// Smallest uniform scale.
    pub scale_min: f32,
    /// Largest uniform scale.
    pub scale_max: f32,
    /// Seed of the instance generator.
    pub seed: u64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            instance_count: 10_000,
            extent: 50.0,
            scale_min: 0.5,
            scale_max: 1.5,
            seed: 0x00F2_0572,
        }
    }
}

/// Complete demo configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Window settings.
    pub window: WindowConfig,
    /// Culling settings.
    pub culling: CullingSection,
    /// Camera settings.
    pub camera: CameraConfig,
    /// Instance field settings.
    pub scene: SceneConfig,
}

impl DemoConfig {
    /// Reads and validates a config file.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `Parse` for malformed TOML,
    /// `Invalid` if validation fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Loads `path` if given, else returns validated defaults.
    ///
    /// # Errors
    ///
    /// As [`Self::load`].
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// `Parse` for malformed TOML, `Invalid` if validation fails.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// `Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let culling = &self.culling;
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&culling.frames_in_flight) {
            return Err(invalid(format!(
                "culling.frames_in_flight must be in 1..={MAX_FRAMES_IN_FLIGHT}, got {}",
                culling.frames_in_flight
            )));
        }
        if !culling.workgroup_size.is_power_of_two() || culling.workgroup_size > MAX_WORKGROUP_SIZE {
            return Err(invalid(format!(
                "culling.workgroup_size must be a power of two in 1..={MAX_WORKGROUP_SIZE}, got {}",
                culling.workgroup_size
            )));
        }
        if culling.bounding_radius.is_nan() || culling.bounding_radius < 0.0 {
            return Err(invalid(format!(
                "culling.bounding_radius must be non-negative, got {}",
                culling.bounding_radius
            )));
        }

        let camera = &self.camera;
        if camera.near.is_nan() || camera.near <= 0.0 || camera.far.is_nan() || camera.near >= camera.far {
            return Err(invalid(format!(
                "camera clip planes must satisfy 0 < near < far, got near={} far={}",
                camera.near, camera.far
            )));
        }
        if camera.fov_degrees.is_nan() || camera.fov_degrees <= 0.0 || camera.fov_degrees >= 180.0 {
            return Err(invalid(format!(
                "camera.fov_degrees must be in (0, 180), got {}",
                camera.fov_degrees
            )));
        }

        let scene = &self.scene;
        if scene.extent.is_nan() || scene.extent <= 0.0 {
            return Err(invalid(format!("scene.extent must be positive, got {}", scene.extent)));
        }
        if scene.scale_min.is_nan() || scene.scale_min <= 0.0 || scene.scale_max.is_nan() || scene.scale_min > scene.scale_max {
            return Err(invalid(format!(
                "scene scale range must satisfy 0 < scale_min <= scale_max, got {}..{}",
                scene.scale_min, scene.scale_max
            )));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(invalid("window size must be non-zero".into()));
        }
        if !self.window.clear_color.iter().all(|c| (0.0..=1.0).contains(c)) {
            return Err(invalid(format!(
                "window.clear_color components must be in [0, 1], got {:?}",
                self.window.clear_color
            )));
        }
        Ok(())
    }

    /// Culling pipeline settings; capacity is the scene's instance count.
    #[must_use]
    pub fn culling_config(&self) -> CullingConfig {
        CullingConfig {
            workgroup_size: self.culling.workgroup_size,
            bounding_radius: self.culling.bounding_radius,
            capacity: self.scene.instance_count,
        }
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid(message)
}
