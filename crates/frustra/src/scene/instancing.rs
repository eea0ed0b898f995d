//! # Instancing Scene
//!
//! A field of cubes scattered with random position, Y rotation and uniform
//! scale, culled on the device and drawn with one indexed-indirect draw.
//!
//! Controls: WASD / Space / Shift move, right mouse looks, scroll zooms,
//! `Tab` toggles orbit mode, `F` freezes culling.

use crate::config::{DemoConfig, SceneConfig};
use crate::scene::Scene;
use frustra_core::{Camera, FrameInput, Key, Mat4, Vec3};
use frustra_rendering::{
    CullingConfig, CullingPipeline, CullingStats, Frame, FrameTarget, IndirectDrawAssembly,
    InstanceRecord, Mesh, RenderBackend, RenderError, RenderResult, SceneResources,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

/// Scene name.
pub const INSTANCING_SCENE_NAME: &str = "GPU Instancing Culling";

/// Generates the instance field described by `config`. Deterministic per
/// seed.
#[must_use]
pub fn generate_instances(config: &SceneConfig) -> Vec<InstanceRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let extent = config.extent;
    let scale_range = config.scale_min..=config.scale_max;

    (0..config.instance_count)
        .map(|_| {
            let position = Vec3::new(
                rng.gen_range(-extent..=extent),
                rng.gen_range(-extent..=extent),
                rng.gen_range(-extent..=extent),
            );
            let rotation = rng.gen_range(0.0f32..360.0).to_radians();
            let scale = rng.gen_range(scale_range.clone());

            let model = Mat4::from_translation(position)
                * Mat4::from_rotation_y(rotation)
                * Mat4::from_scale(scale);
            InstanceRecord::from_mat4(&model)
        })
        .collect()
}

/// Device-side state that exists between `initialize` and `cleanup`.
struct Resident {
    pipeline: CullingPipeline,
    assembly: IndirectDrawAssembly,
}

/// The instanced culling demo scene.
pub struct InstancingScene {
    culling: CullingConfig,
    start_frozen: bool,
    camera: Camera,
    mesh: Mesh,
    instances: Vec<InstanceRecord>,
    resident: Option<Resident>,
}

impl InstancingScene {
    /// Creates the scene and generates its instances.
    #[must_use]
    pub fn new(config: &DemoConfig) -> Self {
        let mesh = Mesh::cube();
        let mut culling = config.culling_config();
        // Instances are scaled meshes; the slack must cover the mesh itself.
        culling.bounding_radius = culling.bounding_radius.max(mesh.bounding_radius());

        Self {
            culling,
            start_frozen: config.culling.start_frozen,
            camera: config.camera.build(),
            mesh,
            instances: generate_instances(&config.scene),
            resident: None,
        }
    }

    /// The generated instances.
    #[must_use]
    pub fn instances(&self) -> &[InstanceRecord] {
        &self.instances
    }

    /// The camera.
    #[must_use]
    pub const fn camera(&self) -> &Camera {
        &self.camera
    }

    /// The culling pipeline, once initialized.
    #[must_use]
    pub fn pipeline(&self) -> Option<&CullingPipeline> {
        self.resident.as_ref().map(|r| &r.pipeline)
    }

    /// Freezes or resumes culling.
    pub fn set_frozen(&mut self, frozen: bool) {
        self.start_frozen = frozen;
        if let Some(resident) = &mut self.resident {
            resident.pipeline.set_frozen(frozen);
        }
    }
}

impl<B: RenderBackend> Scene<B> for InstancingScene {
    fn name(&self) -> &str {
        INSTANCING_SCENE_NAME
    }

    fn initialize(&mut self, backend: &mut B, frames_in_flight: usize) -> RenderResult<()> {
        let mut pipeline = CullingPipeline::new(self.culling, &backend.limits())?;
        pipeline.bind_instances(&self.instances)?;
        pipeline.set_frozen(self.start_frozen);

        let assembly = IndirectDrawAssembly::new(&self.mesh.info());
        backend.upload_scene(&SceneResources {
            instances: &self.instances,
            mesh: &self.mesh,
            draw_args: assembly.initial_args(),
            capacity: pipeline.capacity(),
            workgroup_size: pipeline.workgroup_size(),
            frames_in_flight,
        })?;

        info!(
            "{} initialized: {} instances, {} workgroups of {}",
            INSTANCING_SCENE_NAME,
            self.instances.len(),
            pipeline.workgroups(),
            pipeline.workgroup_size()
        );
        self.resident = Some(Resident { pipeline, assembly });
        Ok(())
    }

    fn update(&mut self, input: &FrameInput, dt: f32) {
        if input.key_pressed(Key::F) {
            if let Some(resident) = &mut self.resident {
                let frozen = resident.pipeline.toggle_frozen();
                self.start_frozen = frozen;
                info!("culling {}", if frozen { "frozen" } else { "resumed" });
            }
        }
        let mode = self.camera.mode();
        self.camera.apply_input(input, dt);
        if self.camera.mode() != mode {
            debug!("camera mode {:?}", self.camera.mode());
        }
    }

    fn record(
        &mut self,
        backend: &mut B,
        frame: &mut Frame<<B as FrameTarget>::Image>,
        aspect: f32,
    ) -> RenderResult<()> {
        let resident = self.resident.as_mut().ok_or(RenderError::NoScene)?;

        let view = self.camera.view_matrix();
        let proj = self.camera.projection_matrix(aspect);
        let (camera, params) = resident.pipeline.prepare_frame(&view, &proj);
        backend.write_frame_uniforms(frame.slot(), &camera, &params)?;

        resident.pipeline.record(&resident.assembly, frame.commands_mut());
        Ok(())
    }

    fn cleanup(&mut self, backend: &mut B) {
        if self.resident.take().is_some() {
            backend.release_scene();
            debug!("{} cleaned up", INSTANCING_SCENE_NAME);
        }
    }

    fn frame_dropped(&mut self) {
        if let Some(resident) = &mut self.resident {
            resident.pipeline.discard_last_frame();
        }
    }

    fn camera_mut(&mut self) -> Option<&mut Camera> {
        Some(&mut self.camera)
    }

    fn stats(&self) -> Option<CullingStats> {
        self.resident.as_ref().map(|r| r.pipeline.stats())
    }

    fn is_frozen(&self) -> bool {
        self.resident
            .as_ref()
            .map_or(self.start_frozen, |r| r.pipeline.is_frozen())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(count: u32) -> DemoConfig {
        let mut config = DemoConfig::default();
        config.scene.instance_count = count;
        config
    }

    #[test]
    fn test_generation_is_deterministic() {
        let config = small_config(100).scene;
        assert_eq!(generate_instances(&config), generate_instances(&config));

        let other = SceneConfig { seed: config.seed + 1, ..config.clone() };
        assert_ne!(generate_instances(&config), generate_instances(&other));
    }

    #[test]
    fn test_generated_instances_in_bounds() {
        let config = small_config(1000).scene;
        for record in generate_instances(&config) {
            let p = record.translation();
            for axis in [p.x, p.y, p.z] {
                assert!((-50.0..=50.0).contains(&axis));
            }
            let scale = record.max_axis_scale();
            assert!((0.499..=1.501).contains(&scale), "scale {scale}");
        }
    }

    #[test]
    fn test_bounding_radius_covers_mesh() {
        let mut config = small_config(10);
        config.culling.bounding_radius = 0.0;
        let scene = InstancingScene::new(&config);
        assert!(scene.culling.bounding_radius >= Mesh::cube().bounding_radius());
    }

    #[test]
    fn test_freeze_before_initialize_is_kept() {
        let mut scene = InstancingScene::new(&small_config(10));
        scene.set_frozen(true);
        assert!(<InstancingScene as Scene<frustra_rendering::HostDevice>>::is_frozen(&scene));
    }
}
