//! The culling compute pipeline.
//!
//! Records, per frame:
//!
//! ```text
//! ResetDrawCount
//! Barrier(IndirectRecord, Transfer → ComputeShader)
//! DispatchCull(ceil(N / workgroup_size))
//! Barrier(IndirectRecord, ComputeShader → DrawIndirect)
//! Barrier(VisibleIndices, ComputeShader → VertexShader)
//! DrawIndexedIndirect
//! ```
//!
//! While frozen only the draw is recorded, so the previous visible set and
//! count are drawn again.

use crate::backend::DeviceLimits;
use crate::commands::{CommandList, GpuCommand, ResourceId, Stage};
use crate::culling::frustum::FrustumExtractor;
use crate::error::{RenderError, RenderResult};
use crate::indirect::IndirectDrawAssembly;
use crate::instancing::InstanceRecord;
use crate::stats::CullingStats;
use crate::uniforms::{CameraUniform, CullParams};
use frustra_core::Mat4;
use tracing::{debug, info, warn};

/// Culling pipeline configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CullingConfig {
    /// Requested threads per workgroup; clamped to device limits.
    pub workgroup_size: u32,
    /// Mesh bounding radius added as slack to every plane test.
    pub bounding_radius: f32,
    /// Instance capacity the buffers are sized for.
    pub capacity: u32,
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            workgroup_size: 64,
            bounding_radius: 1.0,
            capacity: 65_536,
        }
    }
}

/// Frustum extraction plus the per-frame culling command sequence.
#[derive(Debug)]
pub struct CullingPipeline {
    workgroup_size: u32,
    bounding_radius: f32,
    capacity: u32,
    max_workgroups: u32,
    instance_count: u32,
    frozen: bool,
    /// Whether the last recorded frame dispatched; `None` once it is settled.
    last_recorded: Option<bool>,
    extractor: FrustumExtractor,
    stats: CullingStats,
}

impl CullingPipeline {
    /// Creates the pipeline, clamping the workgroup size to `limits`.
    ///
    /// # Errors
    ///
    /// `Setup` for a zero workgroup size or negative radius,
    /// `CapacityExceeded` if the instance buffer would not fit a storage
    /// binding.
    pub fn new(config: CullingConfig, limits: &DeviceLimits) -> RenderResult<Self> {
        if config.workgroup_size == 0 {
            return Err(RenderError::Setup("workgroup size must be non-zero".into()));
        }
        if config.bounding_radius.is_nan() || config.bounding_radius < 0.0 {
            return Err(RenderError::Setup(format!(
                "bounding radius must be non-negative, got {}",
                config.bounding_radius
            )));
        }

        let max_capacity = limits.max_instance_capacity();
        if config.capacity > max_capacity {
            return Err(RenderError::CapacityExceeded {
                requested: config.capacity,
                capacity: max_capacity,
            });
        }

        let workgroup_size = config
            .workgroup_size
            .min(limits.max_compute_invocations_per_workgroup)
            .min(limits.max_compute_workgroup_size_x)
            .max(1);
        if workgroup_size != config.workgroup_size {
            warn!(
                requested = config.workgroup_size,
                clamped = workgroup_size,
                "workgroup size clamped to device limits"
            );
        }

        info!(
            workgroup_size,
            capacity = config.capacity,
            bounding_radius = config.bounding_radius,
            "culling pipeline created"
        );

        Ok(Self {
            workgroup_size,
            bounding_radius: config.bounding_radius,
            capacity: config.capacity,
            max_workgroups: limits.max_compute_workgroups_per_dimension,
            instance_count: 0,
            frozen: false,
            last_recorded: None,
            extractor: FrustumExtractor::new(),
            stats: CullingStats::default(),
        })
    }

    /// Threads per workgroup after clamping.
    #[must_use]
    pub const fn workgroup_size(&self) -> u32 {
        self.workgroup_size
    }

    /// Instance capacity.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of instances culled each frame.
    #[must_use]
    pub const fn instance_count(&self) -> u32 {
        self.instance_count
    }

    /// Validates and sets the instance count for the loaded scene.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` above capacity, `DispatchTooLarge` if the
    /// dispatch would exceed the device's workgroup count.
    pub fn set_instance_count(&mut self, count: u32) -> RenderResult<()> {
        if count > self.capacity {
            return Err(RenderError::CapacityExceeded {
                requested: count,
                capacity: self.capacity,
            });
        }
        let workgroups = count.div_ceil(self.workgroup_size);
        if workgroups > self.max_workgroups {
            return Err(RenderError::DispatchTooLarge {
                workgroups,
                max: self.max_workgroups,
            });
        }

        self.instance_count = count;
        self.stats.total_instances = count;
        info!(instances = count, workgroups, "culling scene sized");
        Ok(())
    }

    /// Validates the count of `instances` and sets it.
    ///
    /// # Errors
    ///
    /// As [`Self::set_instance_count`].
    pub fn bind_instances(&mut self, instances: &[InstanceRecord]) -> RenderResult<()> {
        let count = u32::try_from(instances.len()).map_err(|_| RenderError::CapacityExceeded {
            requested: u32::MAX,
            capacity: self.capacity,
        })?;
        self.set_instance_count(count)
    }

    /// Workgroups dispatched per frame.
    #[must_use]
    pub const fn workgroups(&self) -> u32 {
        self.instance_count.div_ceil(self.workgroup_size)
    }

    /// True while culling is frozen.
    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Freezes or resumes culling.
    pub fn set_frozen(&mut self, frozen: bool) {
        if self.frozen != frozen {
            debug!(frozen, "culling freeze changed");
        }
        self.frozen = frozen;
    }

    /// Flips the freeze flag and returns the new value.
    pub fn toggle_frozen(&mut self) -> bool {
        self.set_frozen(!self.frozen);
        self.frozen
    }

    /// Extracts this frame's frustum and builds the slot uniforms.
    /// Runs every frame, frozen or not; the draw still needs the camera.
    pub fn prepare_frame(&mut self, view: &Mat4, proj: &Mat4) -> (CameraUniform, CullParams) {
        let frustum = self.extractor.extract(view, proj);
        (
            CameraUniform::new(view, proj, &frustum),
            CullParams::new(self.instance_count, self.bounding_radius),
        )
    }

    /// The frustum extractor.
    #[must_use]
    pub const fn extractor(&self) -> &FrustumExtractor {
        &self.extractor
    }

    /// Records the culling sequence and the draw into `commands`.
    pub fn record(&mut self, assembly: &IndirectDrawAssembly, commands: &mut CommandList) {
        let slot = commands.slot();
        self.stats.frames_recorded += 1;
        self.last_recorded = Some(!self.frozen);

        if self.frozen {
            self.stats.frames_frozen += 1;
        } else {
            assembly.record_reset(commands);
            commands.barrier(ResourceId::IndirectRecord, Stage::Transfer, Stage::ComputeShader);
            commands.push(GpuCommand::DispatchCull {
                slot,
                workgroups: self.workgroups(),
            });
            commands.barrier(ResourceId::IndirectRecord, Stage::ComputeShader, Stage::DrawIndirect);
            commands.barrier(ResourceId::VisibleIndices, Stage::ComputeShader, Stage::VertexShader);
            self.stats.dispatches += 1;
        }

        assembly.record_draw(commands);
    }

    /// Takes the last recorded frame back out of the counters. Call when
    /// the frame cycle dropped that frame unsubmitted.
    pub fn discard_last_frame(&mut self) {
        let Some(dispatched) = self.last_recorded.take() else {
            return;
        };
        self.stats.frames_recorded = self.stats.frames_recorded.saturating_sub(1);
        if dispatched {
            self.stats.dispatches = self.stats.dispatches.saturating_sub(1);
        } else {
            self.stats.frames_frozen = self.stats.frames_frozen.saturating_sub(1);
        }
        debug!(dispatched, "dropped frame discarded from culling stats");
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> CullingStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;

    fn pipeline(workgroup_size: u32) -> CullingPipeline {
        CullingPipeline::new(
            CullingConfig {
                workgroup_size,
                capacity: 1024,
                ..Default::default()
            },
            &DeviceLimits::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_workgroup_size_clamped() {
        let limits = DeviceLimits {
            max_compute_invocations_per_workgroup: 128,
            ..DeviceLimits::default()
        };
        let p = CullingPipeline::new(
            CullingConfig {
                workgroup_size: 1024,
                ..Default::default()
            },
            &limits,
        )
        .unwrap();
        assert_eq!(p.workgroup_size(), 128);
    }

    #[test]
    fn test_workgroup_count_rounds_up() {
        let mut p = pipeline(64);
        p.set_instance_count(65).unwrap();
        assert_eq!(p.workgroups(), 2);
        p.set_instance_count(0).unwrap();
        assert_eq!(p.workgroups(), 0);
    }

    #[test]
    fn test_capacity_rejected_at_setup() {
        let mut p = pipeline(64);
        assert_eq!(
            p.set_instance_count(1025),
            Err(RenderError::CapacityExceeded {
                requested: 1025,
                capacity: 1024
            })
        );
    }

    #[test]
    fn test_dispatch_limit_rejected() {
        let limits = DeviceLimits {
            max_compute_workgroups_per_dimension: 2,
            ..DeviceLimits::default()
        };
        let mut p = CullingPipeline::new(
            CullingConfig {
                workgroup_size: 64,
                capacity: 1024,
                ..Default::default()
            },
            &limits,
        )
        .unwrap();
        assert!(p.set_instance_count(128).is_ok());
        assert_eq!(
            p.set_instance_count(129),
            Err(RenderError::DispatchTooLarge { workgroups: 3, max: 2 })
        );
    }

    #[test]
    fn test_record_sequence() {
        let mut p = pipeline(64);
        p.set_instance_count(100).unwrap();
        let assembly = IndirectDrawAssembly::new(&Mesh::cube().info());
        let mut list = CommandList::new(1);
        p.record(&assembly, &mut list);

        assert_eq!(
            list.commands(),
            &[
                GpuCommand::ResetDrawCount,
                GpuCommand::Barrier {
                    resource: ResourceId::IndirectRecord,
                    src: Stage::Transfer,
                    dst: Stage::ComputeShader
                },
                GpuCommand::DispatchCull { slot: 1, workgroups: 2 },
                GpuCommand::Barrier {
                    resource: ResourceId::IndirectRecord,
                    src: Stage::ComputeShader,
                    dst: Stage::DrawIndirect
                },
                GpuCommand::Barrier {
                    resource: ResourceId::VisibleIndices,
                    src: Stage::ComputeShader,
                    dst: Stage::VertexShader
                },
                GpuCommand::DrawIndexedIndirect { slot: 1 },
            ]
        );
    }

    #[test]
    fn test_frozen_records_draw_only() {
        let mut p = pipeline(64);
        p.set_instance_count(10).unwrap();
        assert!(p.toggle_frozen());
        let assembly = IndirectDrawAssembly::new(&Mesh::cube().info());
        let mut list = CommandList::new(0);
        p.record(&assembly, &mut list);

        assert_eq!(list.commands(), &[GpuCommand::DrawIndexedIndirect { slot: 0 }]);
        let stats = p.stats();
        assert_eq!((stats.frames_recorded, stats.frames_frozen, stats.dispatches), (1, 1, 0));
    }

    #[test]
    fn test_prepare_extracts_every_frame() {
        let mut p = pipeline(64);
        p.set_frozen(true);
        let view = Mat4::IDENTITY;
        let proj = Mat4::perspective_rh(1.0, 1.0, 0.1, 10.0);
        let (_, params) = p.prepare_frame(&view, &proj);
        let (camera, _) = p.prepare_frame(&view, &proj);
        assert_eq!(p.extractor().extractions(), 2);
        assert_eq!(params.bounding_radius, 1.0);
        let expected = CameraUniform::new(&view, &proj, p.extractor().frustum());
        assert_eq!(bytemuck::bytes_of(&camera), bytemuck::bytes_of(&expected));
    }

    #[test]
    fn test_discarded_frame_leaves_counters() {
        let mut p = pipeline(64);
        p.set_instance_count(10).unwrap();
        let assembly = IndirectDrawAssembly::new(&Mesh::cube().info());

        p.record(&assembly, &mut CommandList::new(0));
        p.discard_last_frame();
        assert_eq!(p.stats(), CullingStats::default());

        p.record(&assembly, &mut CommandList::new(0));
        p.set_frozen(true);
        p.record(&assembly, &mut CommandList::new(1));
        p.discard_last_frame();
        // Only the last frame is taken back, and only once.
        p.discard_last_frame();
        let stats = p.stats();
        assert_eq!((stats.frames_recorded, stats.dispatches, stats.frames_frozen), (1, 1, 0));
    }
}
