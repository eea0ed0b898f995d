//! # Host Device
//!
//! A software device that executes command lists on its own thread.
//!
//! ```text
//!   FrameCycle ──submit──> [bounded queue] ──> [device thread] ──> fence
//!                                                  │
//!                                       cull kernel across N workers
//!                                       (atomic append counter)
//! ```
//!
//! Submissions are validated for barrier hazards before they are queued.
//! The cull kernel runs the same per-thread program as the compute shader:
//! bound check, six plane tests, `fetch_add` on the indirect record's
//! `instance_count`, store of the instance index into the visible list.

use crate::backend::{CullingBackend, DeviceLimits, HazardTracker, SceneResources};
use crate::commands::{CommandList, GpuCommand};
use crate::culling::{Frustum, Plane};
use crate::error::{RenderError, RenderResult};
use crate::frame::{Acquire, FrameTarget};
use crate::indirect::{DrawIndexedIndirectArgs, DRAW_COUNT_RESET};
use crate::instancing::InstanceRecord;
use crate::uniforms::{CameraUniform, CullParams};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Configuration for the host device.
#[derive(Clone, Debug)]
pub struct HostDeviceConfig {
    /// Worker threads executing workgroups of one dispatch.
    pub worker_threads: usize,
    /// Number of output images handed out round-robin.
    pub image_count: u32,
    /// Output size in pixels.
    pub extent: (u32, u32),
    /// Extra time each submission spends on the device.
    pub latency: Duration,
    /// Maximum queued submissions.
    pub queue_depth: usize,
    /// Keep a copy of the visible list consumed by each draw.
    pub capture_draws: bool,
    /// Limits reported to the culling pipeline.
    pub limits: DeviceLimits,
}

impl Default for HostDeviceConfig {
    fn default() -> Self {
        Self {
            worker_threads: thread::available_parallelism().map_or(4, usize::from).min(8),
            image_count: 3,
            extent: (1280, 720),
            latency: Duration::ZERO,
            queue_depth: 8,
            capture_draws: true,
            limits: DeviceLimits::default(),
        }
    }
}

/// Output image of the host device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostImage {
    /// Index in the image set.
    pub index: u32,
    /// Image set generation; bumped by every rebuild.
    pub generation: u64,
}

/// A draw the device executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedDraw {
    /// Frame slot whose camera was bound.
    pub slot: usize,
    /// Indices per instance.
    pub index_count: u32,
    /// Instance count read from the indirect record.
    pub instance_count: u32,
    /// Visible indices consumed (empty unless `capture_draws`).
    pub instances: Vec<u32>,
}

/// Signal for submission completion.
struct FenceSignal {
    done: AtomicBool,
    condvar: Condvar,
    mutex: Mutex<()>,
}

impl FenceSignal {
    fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
        }
    }

    fn signal(&self) {
        let _guard = self.mutex.lock();
        self.done.store(true, Ordering::Release);
        self.condvar.notify_all();
    }

    fn wait(&self) {
        if self.done.load(Ordering::Acquire) {
            return;
        }
        let mut guard = self.mutex.lock();
        while !self.done.load(Ordering::Acquire) {
            self.condvar.wait(&mut guard);
        }
    }
}

/// Completion handle of one host submission.
pub struct HostFence {
    signal: Arc<FenceSignal>,
}

impl HostFence {
    /// True once the device finished the submission.
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.signal.done.load(Ordering::Acquire)
    }

    /// Blocks until the device finished the submission.
    pub fn wait(&self) {
        self.signal.wait();
    }
}

impl std::fmt::Debug for HostFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFence")
            .field("signaled", &self.is_signaled())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct FrameUniforms {
    camera: CameraUniform,
    params: CullParams,
}

/// Device-resident scene buffers.
struct SceneBuffers {
    instances: Vec<InstanceRecord>,
    index_count: u32,
    fixed_args: DrawIndexedIndirectArgs,
    draw_count: AtomicU32,
    visible: Vec<AtomicU32>,
    uniforms: Vec<Mutex<FrameUniforms>>,
    workgroup_size: u32,
}

struct Shared {
    scene: Mutex<Option<Arc<SceneBuffers>>>,
    last_draw: Mutex<Option<IssuedDraw>>,
    outstanding: AtomicUsize,
    max_outstanding: AtomicUsize,
    draws: AtomicU64,
    dispatches: AtomicU64,
    presented: AtomicU64,
}

struct Submission {
    commands: CommandList,
    image: Option<HostImage>,
    fence: Arc<FenceSignal>,
}

/// Software device; see the module docs.
pub struct HostDevice {
    config: HostDeviceConfig,
    shared: Arc<Shared>,
    sender: Option<Sender<Submission>>,
    worker: Option<JoinHandle<()>>,
    frames_in_flight: usize,
    next_image: u32,
    generation: u64,
    stale: bool,
}

impl HostDevice {
    /// Starts the device thread.
    ///
    /// # Errors
    ///
    /// `Setup` if the thread cannot be spawned or the config is empty.
    pub fn new(config: HostDeviceConfig) -> RenderResult<Self> {
        if config.image_count == 0 || config.queue_depth == 0 {
            return Err(RenderError::Setup(
                "host device needs at least one image and one queue slot".into(),
            ));
        }

        let shared = Arc::new(Shared {
            scene: Mutex::new(None),
            last_draw: Mutex::new(None),
            outstanding: AtomicUsize::new(0),
            max_outstanding: AtomicUsize::new(0),
            draws: AtomicU64::new(0),
            dispatches: AtomicU64::new(0),
            presented: AtomicU64::new(0),
        });

        let (sender, receiver) = bounded(config.queue_depth);
        let worker_shared = Arc::clone(&shared);
        let worker_config = config.clone();
        let worker = thread::Builder::new()
            .name("frustra-host-device".into())
            .spawn(move || Self::device_loop(&receiver, &worker_shared, &worker_config))
            .map_err(|e| RenderError::Setup(format!("failed to spawn device thread: {e}")))?;

        info!(
            worker_threads = config.worker_threads,
            images = config.image_count,
            "host device started"
        );

        Ok(Self {
            config,
            shared,
            sender: Some(sender),
            worker: Some(worker),
            frames_in_flight: 0,
            next_image: 0,
            generation: 0,
            stale: false,
        })
    }

    /// Marks the output images stale, as a resized surface would.
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    /// Changes the output size; images become stale.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.config.extent = (width, height);
        self.stale = true;
    }

    /// Submits `commands` without an output image and waits for them.
    ///
    /// # Errors
    ///
    /// As [`FrameTarget::submit`].
    pub fn execute(&mut self, commands: &CommandList) -> RenderResult<()> {
        let fence = self.enqueue(commands, None)?;
        fence.wait();
        Ok(())
    }

    /// Indirect record as currently held by the device. Read after the
    /// relevant fence has signaled.
    #[must_use]
    pub fn read_draw_args(&self) -> Option<DrawIndexedIndirectArgs> {
        let scene = self.shared.scene.lock().clone()?;
        Some(DrawIndexedIndirectArgs {
            instance_count: scene.draw_count.load(Ordering::Acquire),
            ..scene.fixed_args
        })
    }

    /// The first `instance_count` entries of the visible-index buffer.
    #[must_use]
    pub fn read_visible(&self) -> Vec<u32> {
        let Some(scene) = self.shared.scene.lock().clone() else {
            return Vec::new();
        };
        let count = scene.draw_count.load(Ordering::Acquire) as usize;
        scene.visible[..count.min(scene.visible.len())]
            .iter()
            .map(|cell| cell.load(Ordering::Relaxed))
            .collect()
    }

    /// The most recent draw executed.
    #[must_use]
    pub fn last_draw(&self) -> Option<IssuedDraw> {
        self.shared.last_draw.lock().clone()
    }

    /// Draws executed so far.
    #[must_use]
    pub fn draws_issued(&self) -> u64 {
        self.shared.draws.load(Ordering::Acquire)
    }

    /// Cull dispatches executed so far.
    #[must_use]
    pub fn dispatches_executed(&self) -> u64 {
        self.shared.dispatches.load(Ordering::Acquire)
    }

    /// Images presented so far.
    #[must_use]
    pub fn presented(&self) -> u64 {
        self.shared.presented.load(Ordering::Acquire)
    }

    /// Submissions queued or executing right now.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire)
    }

    /// Highest number of submissions ever outstanding at once.
    #[must_use]
    pub fn max_outstanding(&self) -> usize {
        self.shared.max_outstanding.load(Ordering::Acquire)
    }

    /// Current image set generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    fn enqueue(&mut self, commands: &CommandList, image: Option<HostImage>) -> RenderResult<HostFence> {
        if commands.slot() >= self.frames_in_flight.max(1) {
            return Err(RenderError::InvalidFrameSlot {
                slot: commands.slot(),
                frames: self.frames_in_flight,
            });
        }
        if !commands.is_empty() && self.shared.scene.lock().is_none() {
            return Err(RenderError::NoScene);
        }
        HazardTracker::validate(commands)?;

        let sender = self.sender.as_ref().ok_or(RenderError::DeviceLost)?;
        let fence = Arc::new(FenceSignal::new());

        let outstanding = self.shared.outstanding.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.max_outstanding.fetch_max(outstanding, Ordering::AcqRel);

        let submission = Submission {
            commands: commands.clone(),
            image,
            fence: Arc::clone(&fence),
        };
        if sender.send(submission).is_err() {
            self.shared.outstanding.fetch_sub(1, Ordering::AcqRel);
            return Err(RenderError::DeviceLost);
        }
        trace!(slot = commands.slot(), outstanding, "submission queued");

        Ok(HostFence { signal: fence })
    }

    /// Device thread main loop.
    fn device_loop(receiver: &Receiver<Submission>, shared: &Shared, config: &HostDeviceConfig) {
        for submission in receiver {
            let scene = shared.scene.lock().clone();
            match scene {
                Some(scene) => Self::run(&submission.commands, &scene, shared, config),
                None if submission.commands.is_empty() => {}
                None => warn!("submission executed after scene release; skipped"),
            }
            if !config.latency.is_zero() {
                thread::sleep(config.latency);
            }
            if submission.image.is_some() {
                shared.presented.fetch_add(1, Ordering::AcqRel);
            }
            shared.outstanding.fetch_sub(1, Ordering::AcqRel);
            submission.fence.signal();
        }
        debug!("host device thread exiting");
    }

    /// Executes one submission. Commands run in order; a dispatch joins all
    /// its workers before the next command starts.
    fn run(commands: &CommandList, scene: &SceneBuffers, shared: &Shared, config: &HostDeviceConfig) {
        for command in commands {
            match *command {
                GpuCommand::ResetDrawCount => {
                    scene.draw_count.store(DRAW_COUNT_RESET, Ordering::Release);
                }
                GpuCommand::Barrier { .. } => {}
                GpuCommand::DispatchCull { slot, workgroups } => {
                    Self::dispatch_cull(scene, slot, workgroups, config.worker_threads);
                    shared.dispatches.fetch_add(1, Ordering::AcqRel);
                }
                GpuCommand::DrawIndexedIndirect { slot } => {
                    let instance_count = scene.draw_count.load(Ordering::Acquire);
                    let instances = if config.capture_draws {
                        scene.visible[..(instance_count as usize).min(scene.visible.len())]
                            .iter()
                            .map(|cell| cell.load(Ordering::Relaxed))
                            .collect()
                    } else {
                        Vec::new()
                    };
                    *shared.last_draw.lock() = Some(IssuedDraw {
                        slot,
                        index_count: scene.index_count,
                        instance_count,
                        instances,
                    });
                    shared.draws.fetch_add(1, Ordering::AcqRel);
                }
            }
        }
    }

    fn dispatch_cull(scene: &SceneBuffers, slot: usize, workgroups: u32, worker_threads: usize) {
        if workgroups == 0 {
            return;
        }
        let Some(uniforms) = scene.uniforms.get(slot).map(|u| *u.lock()) else {
            warn!(slot, "dispatch for unknown frame slot skipped");
            return;
        };
        let frustum = Frustum {
            planes: uniforms
                .camera
                .planes
                .map(|[a, b, c, d]| Plane::new(a, b, c, d)),
        };
        let params = uniforms.params;
        let wg_size = scene.workgroup_size;
        let next_group = AtomicU32::new(0);
        let workers = worker_threads.clamp(1, workgroups as usize);

        thread::scope(|s| {
            for _ in 0..workers {
                s.spawn(|| loop {
                    let group = next_group.fetch_add(1, Ordering::Relaxed);
                    if group >= workgroups {
                        break;
                    }
                    for local in 0..wg_size {
                        let index = group * wg_size + local;
                        if index >= params.instance_count {
                            break;
                        }
                        Self::cull_invocation(scene, &frustum, &params, index);
                    }
                });
            }
        });
    }

    /// One shader invocation.
    #[inline]
    fn cull_invocation(scene: &SceneBuffers, frustum: &Frustum, params: &CullParams, index: u32) {
        let Some(record) = scene.instances.get(index as usize) else {
            return;
        };
        let slack = params.bounding_radius * record.max_axis_scale();
        if frustum.first_rejecting_plane(record.translation(), slack).is_some() {
            return;
        }
        let slot = scene.draw_count.fetch_add(1, Ordering::AcqRel);
        if let Some(cell) = scene.visible.get(slot as usize) {
            cell.store(index, Ordering::Relaxed);
        }
    }
}

impl Drop for HostDevice {
    fn drop(&mut self) {
        // Closing the queue ends the device loop after pending work.
        drop(self.sender.take());
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl FrameTarget for HostDevice {
    type Image = HostImage;
    type Fence = HostFence;

    fn acquire(&mut self) -> RenderResult<Acquire<HostImage>> {
        if self.stale {
            return Ok(Acquire::Stale);
        }
        let image = HostImage {
            index: self.next_image,
            generation: self.generation,
        };
        self.next_image = (self.next_image + 1) % self.config.image_count;
        Ok(Acquire::Image(image))
    }

    fn submit(&mut self, image: HostImage, commands: &CommandList) -> RenderResult<HostFence> {
        if image.generation != self.generation {
            return Err(RenderError::SurfaceFatal(format!(
                "image from retired set {} (current {})",
                image.generation, self.generation
            )));
        }
        self.enqueue(commands, Some(image))
    }

    fn wait(&mut self, fence: HostFence) -> RenderResult<()> {
        fence.wait();
        Ok(())
    }

    fn is_signaled(&mut self, fence: &HostFence) -> bool {
        fence.is_signaled()
    }

    fn rebuild(&mut self) -> RenderResult<()> {
        self.generation += 1;
        self.next_image = 0;
        self.stale = false;
        debug!(generation = self.generation, "host image set rebuilt");
        Ok(())
    }

    fn extent(&self) -> (u32, u32) {
        self.config.extent
    }
}

impl CullingBackend for HostDevice {
    fn limits(&self) -> DeviceLimits {
        self.config.limits
    }

    fn upload_scene(&mut self, resources: &SceneResources<'_>) -> RenderResult<()> {
        let count = resources.instances.len();
        if count > resources.capacity as usize {
            return Err(RenderError::CapacityExceeded {
                requested: u32::try_from(count).unwrap_or(u32::MAX),
                capacity: resources.capacity,
            });
        }
        if resources.frames_in_flight == 0 || resources.workgroup_size == 0 {
            return Err(RenderError::Setup(
                "scene needs at least one frame slot and a non-zero workgroup size".into(),
            ));
        }

        let capacity = (resources.capacity as usize).max(1);
        let scene = SceneBuffers {
            instances: resources.instances.to_vec(),
            index_count: resources.draw_args.index_count,
            fixed_args: resources.draw_args,
            draw_count: AtomicU32::new(resources.draw_args.instance_count),
            visible: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            uniforms: (0..resources.frames_in_flight)
                .map(|_| Mutex::new(FrameUniforms::default()))
                .collect(),
            workgroup_size: resources.workgroup_size,
        };

        *self.shared.scene.lock() = Some(Arc::new(scene));
        *self.shared.last_draw.lock() = None;
        self.frames_in_flight = resources.frames_in_flight;
        info!(
            instances = count,
            capacity = resources.capacity,
            frames_in_flight = resources.frames_in_flight,
            "host scene uploaded"
        );
        Ok(())
    }

    fn write_frame_uniforms(
        &mut self,
        slot: usize,
        camera: &CameraUniform,
        params: &CullParams,
    ) -> RenderResult<()> {
        let scene = self.shared.scene.lock().clone().ok_or(RenderError::NoScene)?;
        let cell = scene.uniforms.get(slot).ok_or(RenderError::InvalidFrameSlot {
            slot,
            frames: scene.uniforms.len(),
        })?;
        *cell.lock() = FrameUniforms {
            camera: *camera,
            params: *params,
        };
        Ok(())
    }

    fn release_scene(&mut self) {
        *self.shared.scene.lock() = None;
        *self.shared.last_draw.lock() = None;
        self.frames_in_flight = 0;
        debug!("host scene released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{ResourceId, Stage};
    use crate::culling::FrustumExtractor;
    use crate::indirect::IndirectDrawAssembly;
    use crate::mesh::Mesh;
    use frustra_core::{Mat4, Vec3};

    fn upload(device: &mut HostDevice, instances: &[InstanceRecord], frames: usize) {
        let mesh = Mesh::cube();
        let assembly = IndirectDrawAssembly::new(&mesh.info());
        device
            .upload_scene(&SceneResources {
                instances,
                mesh: &mesh,
                draw_args: assembly.initial_args(),
                capacity: 16,
                workgroup_size: 4,
                frames_in_flight: frames,
            })
            .unwrap();
    }

    fn cull_list(slot: usize, workgroups: u32) -> CommandList {
        let assembly = IndirectDrawAssembly::new(&Mesh::cube().info());
        let mut list = CommandList::new(slot);
        assembly.record_reset(&mut list);
        list.barrier(ResourceId::IndirectRecord, Stage::Transfer, Stage::ComputeShader);
        list.push(GpuCommand::DispatchCull { slot, workgroups });
        list.barrier(ResourceId::IndirectRecord, Stage::ComputeShader, Stage::DrawIndirect);
        list.barrier(ResourceId::VisibleIndices, Stage::ComputeShader, Stage::VertexShader);
        assembly.record_draw(&mut list);
        list
    }

    fn looking_down_z(device: &mut HostDevice, count: u32) {
        let view = Mat4::look_at_rh(Vec3::ZERO, -Vec3::Z, Vec3::Y);
        let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);
        let frustum = FrustumExtractor::new().extract(&view, &proj);
        device
            .write_frame_uniforms(
                0,
                &CameraUniform::new(&view, &proj, &frustum),
                &CullParams::new(count, 1.0),
            )
            .unwrap();
    }

    #[test]
    fn test_submit_without_scene_rejected() {
        let mut device = HostDevice::new(HostDeviceConfig::default()).unwrap();
        assert_eq!(device.execute(&cull_list(0, 1)), Err(RenderError::NoScene));
        assert!(device.execute(&CommandList::new(0)).is_ok());
    }

    #[test]
    fn test_cull_compacts_visible_indices() {
        let mut device = HostDevice::new(HostDeviceConfig::default()).unwrap();
        let instances = [
            InstanceRecord::at(Vec3::new(0.0, 0.0, -10.0)),
            InstanceRecord::at(Vec3::new(0.0, 0.0, 10.0)),
            InstanceRecord::at(Vec3::new(2.0, 0.0, -20.0)),
        ];
        upload(&mut device, &instances, 1);
        looking_down_z(&mut device, 3);

        device.execute(&cull_list(0, 1)).unwrap();

        let mut visible = device.read_visible();
        visible.sort_unstable();
        assert_eq!(visible, vec![0, 2]);
        let args = device.read_draw_args().unwrap();
        assert_eq!(args.instance_count, 2);
        assert_eq!(args.index_count, 36);

        let draw = device.last_draw().unwrap();
        assert_eq!(draw.instance_count, 2);
        assert_eq!(draw.instances.len(), 2);
        assert_eq!((device.draws_issued(), device.dispatches_executed()), (1, 1));
    }

    #[test]
    fn test_missing_barrier_rejected_before_execution() {
        let mut device = HostDevice::new(HostDeviceConfig::default()).unwrap();
        upload(&mut device, &[InstanceRecord::default()], 1);
        let mut list = cull_list(0, 1);
        list.retain(|c| !matches!(c, GpuCommand::Barrier { .. }));

        assert!(matches!(device.execute(&list), Err(RenderError::Hazard(_))));
        assert_eq!(device.dispatches_executed(), 0);
    }

    #[test]
    fn test_uniform_slot_checked() {
        let mut device = HostDevice::new(HostDeviceConfig::default()).unwrap();
        upload(&mut device, &[], 2);
        let result = device.write_frame_uniforms(2, &CameraUniform::default(), &CullParams::default());
        assert_eq!(result, Err(RenderError::InvalidFrameSlot { slot: 2, frames: 2 }));
    }

    #[test]
    fn test_capacity_checked_on_upload() {
        let mut device = HostDevice::new(HostDeviceConfig::default()).unwrap();
        let mesh = Mesh::cube();
        let instances = vec![InstanceRecord::default(); 17];
        let result = device.upload_scene(&SceneResources {
            instances: &instances,
            mesh: &mesh,
            draw_args: IndirectDrawAssembly::new(&mesh.info()).initial_args(),
            capacity: 16,
            workgroup_size: 4,
            frames_in_flight: 1,
        });
        assert_eq!(
            result,
            Err(RenderError::CapacityExceeded {
                requested: 17,
                capacity: 16
            })
        );
    }

    #[test]
    fn test_images_round_robin_and_invalidate() {
        let mut device = HostDevice::new(HostDeviceConfig {
            image_count: 2,
            ..HostDeviceConfig::default()
        })
        .unwrap();
        let indices: Vec<u32> = (0..3)
            .map(|_| match device.acquire().unwrap() {
                Acquire::Image(image) => image.index,
                Acquire::Stale => u32::MAX,
            })
            .collect();
        assert_eq!(indices, vec![0, 1, 0]);

        device.invalidate();
        assert!(matches!(device.acquire().unwrap(), Acquire::Stale));
        device.rebuild().unwrap();
        match device.acquire().unwrap() {
            Acquire::Image(image) => assert_eq!((image.index, image.generation), (0, 1)),
            Acquire::Stale => panic!("image set should be fresh after rebuild"),
        }
    }

    #[test]
    fn test_image_from_retired_set_rejected() {
        let mut device = HostDevice::new(HostDeviceConfig::default()).unwrap();
        let Acquire::Image(image) = device.acquire().unwrap() else {
            panic!("fresh device must hand out an image");
        };
        device.invalidate();
        device.rebuild().unwrap();
        assert!(matches!(
            device.submit(image, &CommandList::new(0)),
            Err(RenderError::SurfaceFatal(_))
        ));
    }
}
