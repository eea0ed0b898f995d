//! Scenes and the scene manager.
//!
//! A scene owns its camera and culling pipeline and records one frame at a
//! time into a [`Frame`] handed out by the [`FrameCycle`]. Switching is
//! deferred: [`SceneManager::request_switch`] only records the target, and
//! [`SceneManager::process_pending_switch`] performs it between frames after
//! the device has gone idle.

pub mod instancing;

pub use instancing::{generate_instances, InstancingScene};

use crate::error::{AppError, AppResult};
use frustra_core::{Camera, FrameInput};
use frustra_rendering::{CullingStats, Frame, FrameCycle, FrameTarget, RenderBackend, RenderResult};
use tracing::info;

/// A demo scene driven by a [`RenderBackend`].
pub trait Scene<B: RenderBackend> {
    /// Display name; also the key for switching.
    fn name(&self) -> &str;

    /// Uploads scene resources. Called once before the first frame.
    ///
    /// # Errors
    ///
    /// Setup and capacity errors from the backend.
    fn initialize(&mut self, backend: &mut B, frames_in_flight: usize) -> RenderResult<()>;

    /// Advances simulation and camera by one frame of input.
    fn update(&mut self, input: &FrameInput, dt: f32);

    /// Writes the frame's uniforms and records its commands.
    ///
    /// # Errors
    ///
    /// `NoScene` if not initialized, or backend uniform errors.
    fn record(
        &mut self,
        backend: &mut B,
        frame: &mut Frame<<B as FrameTarget>::Image>,
        aspect: f32,
    ) -> RenderResult<()>;

    /// Frees scene resources. The device is idle when this runs.
    fn cleanup(&mut self, backend: &mut B);

    /// The last recorded frame was dropped without reaching the device.
    fn frame_dropped(&mut self) {}

    /// The scene camera, if it has one.
    fn camera_mut(&mut self) -> Option<&mut Camera> {
        None
    }

    /// Culling counters, if the scene culls.
    fn stats(&self) -> Option<CullingStats> {
        None
    }

    /// True while culling is frozen.
    fn is_frozen(&self) -> bool {
        false
    }
}

/// Owns the registered scenes and the active one.
pub struct SceneManager<B: RenderBackend> {
    scenes: Vec<Box<dyn Scene<B>>>,
    current: Option<usize>,
    pending: Option<usize>,
}

impl<B: RenderBackend> Default for SceneManager<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: RenderBackend> SceneManager<B> {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scenes: Vec::new(),
            current: None,
            pending: None,
        }
    }

    /// Registers a scene. The first one registered becomes the pending
    /// scene.
    pub fn add_scene(&mut self, scene: Box<dyn Scene<B>>) {
        if self.current.is_none() && self.pending.is_none() {
            self.pending = Some(self.scenes.len());
        }
        self.scenes.push(scene);
    }

    /// Names of all registered scenes.
    pub fn scene_names(&self) -> impl Iterator<Item = &str> {
        self.scenes.iter().map(|s| s.name())
    }

    /// Schedules a switch to `name` at the next frame boundary.
    ///
    /// # Errors
    ///
    /// `UnknownScene` if no scene has that name.
    pub fn request_switch(&mut self, name: &str) -> AppResult<()> {
        let index = self
            .scenes
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| AppError::UnknownScene(name.to_owned()))?;
        self.pending = Some(index);
        Ok(())
    }

    /// True if a switch is scheduled.
    #[must_use]
    pub fn has_pending_switch(&self) -> bool {
        self.pending.is_some_and(|p| Some(p) != self.current)
    }

    /// Performs a scheduled switch: waits for the device, cleans up the old
    /// scene and initializes the new one. Returns true if a switch happened.
    ///
    /// # Errors
    ///
    /// Device errors while waiting, or the new scene's setup error. On a
    /// setup error no scene is active.
    pub fn process_pending_switch(&mut self, cycle: &mut FrameCycle<B>) -> AppResult<bool> {
        let Some(next) = self.pending.take() else {
            return Ok(false);
        };
        if Some(next) == self.current {
            return Ok(false);
        }

        cycle.wait_idle()?;
        if let Some(old) = self.current.take() {
            self.scenes[old].cleanup(cycle.target_mut());
        }

        let frames_in_flight = cycle.frames_in_flight();
        let scene = &mut self.scenes[next];
        scene.initialize(cycle.target_mut(), frames_in_flight)?;
        info!("scene switched to {:?}", scene.name());
        self.current = Some(next);
        Ok(true)
    }

    /// The active scene.
    #[must_use]
    pub fn current(&self) -> Option<&dyn Scene<B>> {
        self.current.map(|i| self.scenes[i].as_ref())
    }

    /// The active scene, mutably.
    pub fn current_mut(&mut self) -> Option<&mut (dyn Scene<B> + 'static)> {
        match self.current {
            Some(i) => Some(self.scenes[i].as_mut()),
            None => None,
        }
    }

    /// Updates the active scene.
    pub fn update(&mut self, input: &FrameInput, dt: f32) {
        if let Some(scene) = self.current_mut() {
            scene.update(input, dt);
        }
    }

    /// Records the active scene into `frame`.
    ///
    /// # Errors
    ///
    /// `NoActiveScene`, or the scene's recording error.
    pub fn record(
        &mut self,
        backend: &mut B,
        frame: &mut Frame<<B as FrameTarget>::Image>,
        aspect: f32,
    ) -> AppResult<()> {
        let scene = self.current_mut().ok_or(AppError::NoActiveScene)?;
        scene.record(backend, frame, aspect)?;
        Ok(())
    }

    /// Tells the active scene its last recorded frame was dropped.
    pub fn frame_dropped(&mut self) {
        if let Some(scene) = self.current_mut() {
            scene.frame_dropped();
        }
    }

    /// Waits for the device and cleans up the active scene.
    ///
    /// # Errors
    ///
    /// Device errors while waiting.
    pub fn shutdown(&mut self, cycle: &mut FrameCycle<B>) -> AppResult<()> {
        cycle.wait_idle()?;
        if let Some(current) = self.current.take() {
            self.scenes[current].cleanup(cycle.target_mut());
        }
        self.pending = None;
        Ok(())
    }
}
