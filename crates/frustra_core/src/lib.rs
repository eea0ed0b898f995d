//! # FRUSTRA Core
//!
//! GPU-free building blocks shared by the rendering core and the demo:
//! - Column-major `Mat4` / `Vec3` math matching the WGSL memory layout
//! - The fly/orbit camera that feeds view and projection matrices
//! - An explicit per-frame input context (no process-wide input statics)

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod camera;
pub mod input;
pub mod math;

pub use camera::{Camera, CameraMode, CameraMovement};
pub use input::{FrameInput, InputAccumulator, Key, MouseButton};
pub use math::{Mat4, Vec3};
