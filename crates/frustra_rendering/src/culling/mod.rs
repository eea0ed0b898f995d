//! Frustum culling on the device.
//!
//! Extracts frustum planes on the host and classifies instances in a
//! compute pass, compacting survivors for the indirect draw.

pub mod frustum;
pub mod pipeline;
pub mod shaders;

pub use frustum::{Frustum, FrustumExtractor, Plane};
pub use pipeline::{CullingConfig, CullingPipeline};
