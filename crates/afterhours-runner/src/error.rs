//! Error types for the runner.
//!
//! Uses `thiserror` for typed errors across the runner's own concerns:
//! configuration, prompt rendering, LLM calls and local files.

use afterhours_core::ConfigError;

/// Errors that can occur while running the simulation from a terminal.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Environment configuration is invalid or missing.
    #[error("config error: {0}")]
    Config(String),

    /// The simulation configuration file could not be loaded.
    #[error(transparent)]
    Simulation(#[from] ConfigError),

    /// Failed to load or render a prompt template.
    #[error("template render error: {0}")]
    Template(String),

    /// An LLM backend returned an error or was unreachable.
    #[error("LLM backend error: {0}")]
    LlmBackend(String),

    /// Reading or writing local data failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}
