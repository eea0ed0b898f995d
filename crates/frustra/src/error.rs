//! Application error types.

use frustra_rendering::RenderError;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level application errors.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration failed to load.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Rendering failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Window or surface setup failed.
    #[error("window setup failed: {0}")]
    Window(String),

    /// No scene is registered under this name.
    #[error("unknown scene: {0}")]
    UnknownScene(String),

    /// An operation needs an active scene.
    #[error("no active scene")]
    NoActiveScene,
}

/// Result type for application operations.
pub type AppResult<T> = Result<T, AppError>;
