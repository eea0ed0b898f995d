//! # FRUSTRA
//!
//! Demo application for device-driven instanced frustum culling.
//!
//! The crate wires [`frustra_core`] cameras and input to the
//! [`frustra_rendering`] culling pipeline through a small scene layer:
//!
//! - [`config`]: TOML demo configuration, loaded once at startup
//! - [`scene`]: the [`Scene`] trait, the deferred-switch [`SceneManager`]
//!   and the instancing scene
//! - [`headless`]: a fixed-length run on the host device, no window needed
//! - `app`: the winit/wgpu window loop (feature `window`)
//!
//! Logging goes through `tracing`; the binaries install `env_logger` via
//! [`init_logging`].

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod error;
pub mod headless;
pub mod logging;
pub mod scene;

#[cfg(feature = "window")]
pub mod app;

pub use config::DemoConfig;
pub use error::{AppError, AppResult, ConfigError};
pub use headless::{run_headless, HeadlessOptions, HeadlessReport, VisibleSample};
pub use logging::{init_logging, LoggingConfig};
pub use scene::{InstancingScene, Scene, SceneManager};
