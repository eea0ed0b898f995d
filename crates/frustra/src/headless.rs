//! Headless run of the instancing scene on the host device.
//!
//! The camera orbits the field center; every `log_every` frames the visible
//! count of the last completed draw is logged.

use crate::config::DemoConfig;
use crate::error::AppResult;
use crate::scene::{InstancingScene, SceneManager};
use frustra_core::{CameraMode, FrameInput, Vec3};
use frustra_rendering::{CullingStats, FrameCycle, FrameStatus, FrameTarget, HostDevice, HostDeviceConfig};
use tracing::info;

/// Headless run settings.
#[derive(Debug, Clone)]
pub struct HeadlessOptions {
    /// Frames to run.
    pub frames: u32,
    /// Orbit step per frame in degrees.
    pub orbit_degrees_per_frame: f32,
    /// Log interval in frames; 0 disables per-frame logging.
    pub log_every: u32,
    /// Simulated frame time passed to the scene.
    pub frame_time: f32,
    /// Host device settings.
    pub device: HostDeviceConfig,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            frames: 600,
            orbit_degrees_per_frame: 0.6,
            log_every: 60,
            frame_time: 1.0 / 60.0,
            device: HostDeviceConfig::default(),
        }
    }
}

/// One logged sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleSample {
    /// Frame index the sample was taken after.
    pub frame: u32,
    /// Visible instances of the last completed draw.
    pub visible: u32,
}

/// Outcome of a headless run.
#[derive(Debug, Clone)]
pub struct HeadlessReport {
    /// Frames submitted.
    pub frames_submitted: u64,
    /// Frames dropped.
    pub frames_dropped: u64,
    /// Visible count of the final frame.
    pub final_visible: u32,
    /// Periodic samples.
    pub samples: Vec<VisibleSample>,
    /// Culling counters.
    pub stats: CullingStats,
    /// Most submissions outstanding at once.
    pub max_outstanding: usize,
}

/// Runs the instancing scene for `options.frames` frames.
///
/// # Errors
///
/// Device setup, scene setup or submission errors.
pub fn run_headless(config: &DemoConfig, options: &HeadlessOptions) -> AppResult<HeadlessReport> {
    let device = HostDevice::new(options.device.clone())?;
    let mut cycle = FrameCycle::new(device, config.culling.frames_in_flight)?;

    let mut scenes = SceneManager::new();
    scenes.add_scene(Box::new(InstancingScene::new(config)));
    scenes.process_pending_switch(&mut cycle)?;

    if let Some(camera) = scenes.current_mut().and_then(|s| s.camera_mut()) {
        camera.set_orbit_target(Vec3::ZERO);
        camera.set_mode(CameraMode::Orbit);
    }

    let (width, height) = cycle.target().extent();
    let aspect = width as f32 / height.max(1) as f32;
    let input = FrameInput::default();
    let mut samples = Vec::new();

    info!(
        "headless run: {} frames, {} instances, {} frames in flight",
        options.frames, config.scene.instance_count, config.culling.frames_in_flight
    );

    for index in 0..options.frames {
        if let Some(camera) = scenes.current_mut().and_then(|s| s.camera_mut()) {
            camera.orbit(options.orbit_degrees_per_frame, 0.0);
        }
        scenes.update(&input, options.frame_time);

        let Some(mut frame) = cycle.begin_frame()? else {
            continue;
        };
        scenes.record(cycle.target_mut(), &mut frame, aspect)?;
        if cycle.end_frame(frame)? == FrameStatus::Dropped {
            scenes.frame_dropped();
            continue;
        }
        cycle.poll();

        if options.log_every > 0 && (index + 1) % options.log_every == 0 {
            if let Some(draw) = cycle.target().last_draw() {
                info!("frame {:>5}: {} visible", index + 1, draw.instance_count);
                samples.push(VisibleSample {
                    frame: index + 1,
                    visible: draw.instance_count,
                });
            }
        }
    }

    cycle.wait_idle()?;
    let final_visible = cycle
        .target()
        .last_draw()
        .map_or(0, |draw| draw.instance_count);
    let counters = cycle.counters();
    let stats = scenes
        .current()
        .and_then(|s| s.stats())
        .unwrap_or_default()
        .with_cycle(&counters);
    let max_outstanding = cycle.target().max_outstanding();

    scenes.shutdown(&mut cycle)?;

    info!(
        "headless done: {} submitted, {} dropped, {} visible of {} at the end",
        counters.submitted, counters.dropped, final_visible, stats.total_instances
    );

    Ok(HeadlessReport {
        frames_submitted: counters.submitted,
        frames_dropped: counters.dropped,
        final_visible,
        samples,
        stats,
        max_outstanding,
    })
}
