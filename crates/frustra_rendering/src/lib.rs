//! # FRUSTRA Rendering
//!
//! GPU-driven visibility culling feeding a single indexed-indirect draw.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        ONE FRAME                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │  FrustumExtractor → camera uniform (per frame slot)          │
//! │        ↓                                                     │
//! │  reset instance_count ─[transfer → compute]─→ cull dispatch  │
//! │        ↓                                                     │
//! │  [compute → draw-indirect] [compute → vertex]                │
//! │        ↓                                                     │
//! │  draw_indexed_indirect (count written by the device)         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The core records a device-independent [`CommandList`]. Two devices
//! execute it: [`HostDevice`] (software, validates barriers) and
//! [`WgpuRenderer`] (real GPU). [`FrameCycle`] bounds the number of frames
//! in flight for either.
//!
//! The host never reads back which instances are visible.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod backend;
pub mod commands;
pub mod culling;
pub mod error;
pub mod frame;
pub mod indirect;
pub mod instancing;
pub mod mesh;
pub mod stats;
pub mod uniforms;

pub use backend::{
    CullingBackend, DeviceLimits, GpuFence, HazardTracker, HostDevice, HostDeviceConfig,
    HostFence, HostImage, IssuedDraw, RenderBackend, SceneResources, WgpuRenderer,
};
pub use commands::{CommandList, GpuCommand, ResourceId, Stage};
pub use culling::{CullingConfig, CullingPipeline, Frustum, FrustumExtractor, Plane};
pub use error::{HazardError, RenderError, RenderResult};
pub use frame::{Acquire, Frame, FrameCycle, FrameStatus, FrameTarget};
pub use indirect::{DrawIndexedIndirectArgs, IndirectDrawAssembly, DRAW_COUNT_RESET};
pub use instancing::InstanceRecord;
pub use mesh::{Mesh, MeshInfo, Vertex};
pub use stats::CullingStats;
pub use uniforms::{CameraUniform, CullParams};
