//! Integration tests for culling on the host device.
//!
//! Every frame goes through the full path: FrameCycle slot, frustum
//! extraction, uniform write, recorded command list, device execution.

use frustra_core::{Mat4, Vec3};
use frustra_rendering::{
    CommandList, CullingBackend, CullingConfig, CullingPipeline, FrameCycle, FrameStatus, Frustum,
    GpuCommand, HazardError, HostDevice, HostDeviceConfig, IndirectDrawAssembly, InstanceRecord,
    Mesh, RenderError, ResourceId, SceneResources, Stage,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;
use std::time::Duration;

struct Harness {
    cycle: FrameCycle<HostDevice>,
    pipeline: CullingPipeline,
    assembly: IndirectDrawAssembly,
}

impl Harness {
    fn new(instances: &[InstanceRecord], frames: usize, config: HostDeviceConfig) -> Self {
        let device = HostDevice::new(config).unwrap();
        let mut pipeline = CullingPipeline::new(
            CullingConfig {
                capacity: 8192,
                ..Default::default()
            },
            &device.limits(),
        )
        .unwrap();
        pipeline.bind_instances(instances).unwrap();

        let mesh = Mesh::cube();
        let assembly = IndirectDrawAssembly::new(&mesh.info());
        let mut cycle = FrameCycle::new(device, frames).unwrap();
        cycle
            .target_mut()
            .upload_scene(&SceneResources {
                instances,
                mesh: &mesh,
                draw_args: assembly.initial_args(),
                capacity: pipeline.capacity(),
                workgroup_size: pipeline.workgroup_size(),
                frames_in_flight: frames,
            })
            .unwrap();

        Self {
            cycle,
            pipeline,
            assembly,
        }
    }

    fn frame(&mut self, view: &Mat4, proj: &Mat4) -> FrameStatus {
        let mut frame = loop {
            if let Some(frame) = self.cycle.begin_frame().unwrap() {
                break frame;
            }
        };
        let (camera, params) = self.pipeline.prepare_frame(view, proj);
        self.cycle
            .target_mut()
            .write_frame_uniforms(frame.slot(), &camera, &params)
            .unwrap();
        self.pipeline.record(&self.assembly, frame.commands_mut());
        self.cycle.end_frame(frame).unwrap()
    }

    fn settle(&mut self) -> &HostDevice {
        self.cycle.wait_idle().unwrap();
        self.cycle.target()
    }
}

fn looking_down_z(fov_degrees: f32) -> (Mat4, Mat4) {
    (
        Mat4::look_at_rh(Vec3::ZERO, -Vec3::Z, Vec3::Y),
        Mat4::perspective_rh(fov_degrees.to_radians(), 1.0, 0.1, 100.0),
    )
}

fn overview_camera() -> (Mat4, Mat4) {
    (
        Mat4::look_at_rh(Vec3::new(0.0, 10.0, 30.0), Vec3::ZERO, Vec3::Y),
        Mat4::perspective_rh(45f32.to_radians(), 16.0 / 9.0, 0.1, 200.0),
    )
}

fn random_instances(count: usize, seed: u64) -> Vec<InstanceRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let position = Vec3::new(
                rng.gen_range(-50.0..50.0),
                rng.gen_range(-50.0..50.0),
                rng.gen_range(-50.0..50.0),
            );
            let model = Mat4::from_translation(position)
                * Mat4::from_rotation_y(rng.gen_range(0.0..std::f32::consts::TAU))
                * Mat4::from_scale(rng.gen_range(0.5..1.5));
            InstanceRecord::from_mat4(&model)
        })
        .collect()
}

fn sorted(indices: Vec<u32>) -> Vec<u32> {
    let mut indices = indices;
    indices.sort_unstable();
    indices
}

#[test]
fn test_three_instance_scene() {
    let instances = [
        InstanceRecord::at(Vec3::new(0.0, 0.0, 0.0)),
        InstanceRecord::at(Vec3::new(1000.0, 0.0, 0.0)),
        InstanceRecord::at(Vec3::new(0.0, 0.0, -5.0)),
    ];
    let mut harness = Harness::new(&instances, 2, HostDeviceConfig::default());
    let (view, proj) = looking_down_z(20.0);

    assert_eq!(harness.frame(&view, &proj), FrameStatus::Presented);
    let device = harness.settle();

    assert_eq!(sorted(device.read_visible()), vec![0, 2]);
    assert_eq!(device.read_draw_args().unwrap().instance_count, 2);
    assert_eq!(device.last_draw().unwrap().instance_count, 2);

    // Instance 1 fails the right plane.
    let frustum = Frustum::from_view_projection(&(proj * view));
    assert_eq!(
        frustum.first_rejecting_plane(Vec3::new(1000.0, 0.0, 0.0), 1.0),
        Some(Frustum::RIGHT)
    );
}

#[test]
fn test_zero_instances_draws_nothing() {
    let mut harness = Harness::new(&[], 2, HostDeviceConfig::default());
    let (view, proj) = overview_camera();

    assert_eq!(harness.pipeline.workgroups(), 0);
    assert_eq!(harness.frame(&view, &proj), FrameStatus::Presented);
    let device = harness.settle();

    assert_eq!(device.read_draw_args().unwrap().instance_count, 0);
    assert!(device.read_visible().is_empty());
    let draw = device.last_draw().unwrap();
    assert_eq!((draw.instance_count, draw.index_count), (0, 36));
    assert_eq!(device.draws_issued(), 1);
}

#[test]
fn test_count_matches_cpu_classification() {
    let instances = random_instances(5000, 42);
    let mut harness = Harness::new(&instances, 2, HostDeviceConfig::default());
    let (view, proj) = overview_camera();

    harness.frame(&view, &proj);
    let device = harness.settle();
    let visible = device.read_visible();
    let count = device.read_draw_args().unwrap().instance_count;

    let frustum = Frustum::from_view_projection(&(proj * view));
    let expected: Vec<u32> = (0u32..)
        .zip(&instances)
        .filter(|(_, record)| {
            let slack = CullingConfig::default().bounding_radius * record.max_axis_scale();
            frustum
                .first_rejecting_plane(record.translation(), slack)
                .is_none()
        })
        .map(|(index, _)| index)
        .collect();

    assert_eq!(count as usize, visible.len());
    assert_eq!(visible.len(), expected.len());
    assert!(!expected.is_empty() && expected.len() < instances.len());

    let unique: BTreeSet<u32> = visible.iter().copied().collect();
    assert_eq!(unique.len(), visible.len(), "visible indices must be unique");
    assert_eq!(sorted(visible), expected);
}

#[test]
fn test_reset_between_dispatches() {
    let instances = random_instances(3000, 7);
    let mut harness = Harness::new(&instances, 2, HostDeviceConfig::default());
    let (view, proj) = overview_camera();

    harness.frame(&view, &proj);
    let first = sorted(harness.settle().read_visible());
    harness.frame(&view, &proj);
    let second = sorted(harness.settle().read_visible());

    assert_eq!(first.len(), second.len());
    assert_eq!(first, second);
    assert_eq!(harness.settle().dispatches_executed(), 2);
}

#[test]
fn test_freeze_keeps_previous_result() {
    let instances = random_instances(3000, 11);
    let mut harness = Harness::new(&instances, 2, HostDeviceConfig::default());
    let (view, proj) = overview_camera();

    harness.frame(&view, &proj);
    let device = harness.settle();
    let frozen_visible = device.read_visible();
    let frozen_args = device.read_draw_args().unwrap();

    harness.pipeline.set_frozen(true);
    let (other_view, _) = looking_down_z(45.0);
    for _ in 0..5 {
        harness.frame(&other_view, &proj);
    }

    let device = harness.settle();
    assert_eq!(device.read_visible(), frozen_visible);
    assert_eq!(device.read_draw_args().unwrap(), frozen_args);
    assert_eq!(device.dispatches_executed(), 1);
    assert_eq!(device.draws_issued(), 6);
    assert_eq!(device.last_draw().unwrap().instances, frozen_visible);

    // Unfreezing culls against the new camera again.
    harness.pipeline.set_frozen(false);
    harness.frame(&other_view, &proj);
    assert_eq!(harness.settle().dispatches_executed(), 2);
    assert_eq!(harness.pipeline.stats().frames_frozen, 5);
}

#[test]
fn test_each_barrier_is_required() {
    let instances = random_instances(100, 3);
    let mut harness = Harness::new(&instances, 1, HostDeviceConfig::default());

    let mut full = CommandList::new(0);
    harness.pipeline.record(&harness.assembly, &mut full);
    let barriers: Vec<usize> = full
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, GpuCommand::Barrier { .. }))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(barriers.len(), 3);

    let expected = [
        (ResourceId::IndirectRecord, Stage::Transfer, Stage::ComputeShader),
        (ResourceId::IndirectRecord, Stage::ComputeShader, Stage::DrawIndirect),
        (ResourceId::VisibleIndices, Stage::ComputeShader, Stage::VertexShader),
    ];

    let device = harness.cycle.target_mut();
    assert!(device.execute(&full).is_ok());

    for (&removed, &(resource, writer, reader)) in barriers.iter().zip(&expected) {
        let mut list = CommandList::new(0);
        for (i, command) in full.iter().enumerate() {
            if i != removed {
                list.push(*command);
            }
        }
        assert_eq!(
            device.execute(&list),
            Err(RenderError::Hazard(HazardError::MissingBarrier {
                resource,
                writer,
                reader
            }))
        );
    }
    assert_eq!(device.dispatches_executed(), 1);
}

#[test]
fn test_frames_in_flight_bounded() {
    let instances = random_instances(1000, 5);
    let config = HostDeviceConfig {
        latency: Duration::from_millis(5),
        ..HostDeviceConfig::default()
    };
    let mut harness = Harness::new(&instances, 2, config);
    let (view, proj) = overview_camera();

    for _ in 0..10 {
        assert_eq!(harness.frame(&view, &proj), FrameStatus::Presented);
        assert!(harness.cycle.in_flight() <= 2);
    }

    let counters = harness.cycle.counters();
    assert_eq!(counters.submitted, 10);
    assert!(counters.blocking_waits > 0);

    let device = harness.settle();
    assert!(device.max_outstanding() <= 2);
    assert_eq!(device.presented(), 10);
    assert_eq!(device.outstanding(), 0);
}

#[test]
fn test_stale_while_recording_drops_frame() {
    let instances = random_instances(200, 9);
    let mut harness = Harness::new(&instances, 2, HostDeviceConfig::default());
    let (view, proj) = overview_camera();

    let mut frame = harness.cycle.begin_frame().unwrap().unwrap();
    let (camera, params) = harness.pipeline.prepare_frame(&view, &proj);
    harness
        .cycle
        .target_mut()
        .write_frame_uniforms(frame.slot(), &camera, &params)
        .unwrap();
    harness.pipeline.record(&harness.assembly, frame.commands_mut());

    harness.cycle.mark_stale();
    assert_eq!(harness.cycle.end_frame(frame).unwrap(), FrameStatus::Dropped);
    harness.pipeline.discard_last_frame();

    let counters = harness.cycle.counters();
    assert_eq!((counters.dropped, counters.rebuilds, counters.submitted), (1, 1, 0));
    assert_eq!(harness.settle().generation(), 1);
    assert_eq!(harness.settle().dispatches_executed(), 0);

    assert_eq!(harness.frame(&view, &proj), FrameStatus::Presented);

    // The dropped frame's dispatch never ran and is not counted.
    let stats = harness
        .pipeline
        .stats()
        .with_cycle(&harness.cycle.counters());
    assert_eq!(harness.settle().dispatches_executed(), 1);
    assert_eq!((stats.frames_recorded, stats.dispatches), (1, 1));
    assert_eq!((stats.frames_dropped, stats.surface_rebuilds), (1, 1));
}

#[test]
fn test_invalidated_images_rebuilt_at_acquire() {
    let mut harness = Harness::new(&random_instances(10, 1), 2, HostDeviceConfig::default());
    let (view, proj) = overview_camera();

    harness.cycle.target_mut().invalidate();
    assert!(harness.cycle.begin_frame().unwrap().is_none());
    assert_eq!(harness.cycle.counters().rebuilds, 1);

    assert_eq!(harness.frame(&view, &proj), FrameStatus::Presented);
    assert_eq!(harness.settle().generation(), 1);
}
