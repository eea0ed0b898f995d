//! # Rendering Error Types
//!
//! Setup failures and capacity violations are fatal. Surface staleness is
//! not an error; [`crate::FrameCycle`] rebuilds instead.

use crate::commands::{ResourceId, Stage};
use thiserror::Error;

/// A resource was accessed without the barrier that orders it after its
/// last write.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HazardError {
    /// `reader` touched `resource` written by `writer` with no barrier.
    #[error("missing barrier on {resource:?}: written by {writer:?}, accessed by {reader:?}")]
    MissingBarrier {
        /// The resource.
        resource: ResourceId,
        /// Stage of the last write.
        writer: Stage,
        /// Stage of the unordered access.
        reader: Stage,
    },
}

/// Errors that can occur in the rendering core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// More instances than the buffers were sized for.
    #[error("capacity exceeded: {requested} instances, capacity {capacity}")]
    CapacityExceeded {
        /// Instances requested.
        requested: u32,
        /// Allocated capacity.
        capacity: u32,
    },

    /// The dispatch would exceed the device's workgroup count limit.
    #[error("dispatch too large: {workgroups} workgroups, device maximum {max}")]
    DispatchTooLarge {
        /// Workgroups needed.
        workgroups: u32,
        /// Device limit.
        max: u32,
    },

    /// A frame was recorded or submitted before scene resources existed.
    #[error("no scene resources uploaded")]
    NoScene,

    /// A frame slot index outside the configured range.
    #[error("invalid frame slot {slot} (frames in flight: {frames})")]
    InvalidFrameSlot {
        /// Offending slot.
        slot: usize,
        /// Number of slots.
        frames: usize,
    },

    /// `begin_frame`/`end_frame` called out of order.
    #[error("frame out of order: {0}")]
    FrameOutOfOrder(&'static str),

    /// Barrier validation failed on the host device.
    #[error(transparent)]
    Hazard(#[from] HazardError),

    /// The device stopped accepting work.
    #[error("device lost")]
    DeviceLost,

    /// Unrecoverable presentation failure.
    #[error("surface error: {0}")]
    SurfaceFatal(String),

    /// Device, pipeline or buffer creation failed.
    #[error("setup failed: {0}")]
    Setup(String),
}

/// Result type for rendering operations.
pub type RenderResult<T> = Result<T, RenderError>;
