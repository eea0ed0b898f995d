//! Devices that execute recorded command lists.
//!
//! - [`HostDevice`]: software device on a worker thread; validates barriers.
//! - [`WgpuRenderer`]: lowers commands onto a `wgpu` encoder.

pub mod gpu;
pub mod hazard;
pub mod host;

pub use gpu::{GpuFence, WgpuRenderer};
pub use hazard::HazardTracker;
pub use host::{HostDevice, HostDeviceConfig, HostFence, HostImage, IssuedDraw};

use crate::error::RenderResult;
use crate::frame::FrameTarget;
use crate::indirect::DrawIndexedIndirectArgs;
use crate::instancing::InstanceRecord;
use crate::mesh::Mesh;
use crate::uniforms::{CameraUniform, CullParams};

/// Device limits relevant to culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Maximum threads per workgroup.
    pub max_compute_invocations_per_workgroup: u32,
    /// Maximum workgroup size along X.
    pub max_compute_workgroup_size_x: u32,
    /// Maximum workgroups per dispatch dimension.
    pub max_compute_workgroups_per_dimension: u32,
    /// Maximum bytes in one storage buffer binding.
    pub max_storage_buffer_binding_size: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroups_per_dimension: 65_535,
            max_storage_buffer_binding_size: 128 << 20,
        }
    }
}

impl DeviceLimits {
    /// Largest instance count whose transforms fit one storage binding.
    #[must_use]
    pub const fn max_instance_capacity(&self) -> u32 {
        self.max_storage_buffer_binding_size / std::mem::size_of::<InstanceRecord>() as u32
    }
}

impl From<&wgpu::Limits> for DeviceLimits {
    fn from(limits: &wgpu::Limits) -> Self {
        Self {
            max_compute_invocations_per_workgroup: limits.max_compute_invocations_per_workgroup,
            max_compute_workgroup_size_x: limits.max_compute_workgroup_size_x,
            max_compute_workgroups_per_dimension: limits.max_compute_workgroups_per_dimension,
            max_storage_buffer_binding_size: limits.max_storage_buffer_binding_size,
        }
    }
}

/// Everything a device allocates for a scene. Buffers are sized once from
/// `capacity` and `frames_in_flight`.
#[derive(Debug, Clone, Copy)]
pub struct SceneResources<'a> {
    /// Instance transforms, uploaded once.
    pub instances: &'a [InstanceRecord],
    /// The mesh drawn for every instance.
    pub mesh: &'a Mesh,
    /// Initial indirect record.
    pub draw_args: DrawIndexedIndirectArgs,
    /// Instance capacity of the instance and visible-index buffers.
    pub capacity: u32,
    /// Cull shader workgroup size.
    pub workgroup_size: u32,
    /// Number of per-frame uniform sets.
    pub frames_in_flight: usize,
}

/// Scene resource management on a device.
pub trait CullingBackend {
    /// Limits the culling pipeline must respect.
    fn limits(&self) -> DeviceLimits;

    /// Allocates and uploads scene buffers and builds pipelines.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` if `instances` exceeds `capacity`, `Setup` on
    /// allocation failure.
    fn upload_scene(&mut self, resources: &SceneResources<'_>) -> RenderResult<()>;

    /// Writes the camera and culling parameters of one frame slot.
    ///
    /// # Errors
    ///
    /// `NoScene` before upload, `InvalidFrameSlot` for a bad slot.
    fn write_frame_uniforms(
        &mut self,
        slot: usize,
        camera: &CameraUniform,
        params: &CullParams,
    ) -> RenderResult<()>;

    /// Frees scene resources. Callers wait for the device first.
    fn release_scene(&mut self);
}

/// A device usable as both a culling backend and a frame target.
pub trait RenderBackend: CullingBackend + FrameTarget {}

impl<T: CullingBackend + FrameTarget> RenderBackend for T {}
