//! Runner configuration loaded from environment variables.
//!
//! Simulation behavior lives in the YAML file; the environment only says
//! where things are and which LLM backend to talk to.

use std::path::PathBuf;

use crate::error::RunnerError;

/// Complete runner configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Path to the simulation YAML file.
    pub config_path: PathBuf,
    /// Primary LLM backend configuration.
    pub backend: LlmBackendConfig,
    /// Path to the templates directory.
    pub templates_dir: String,
    /// Directory for message logs and the state snapshot.
    pub data_dir: PathBuf,
}

/// Configuration for a single LLM backend.
#[derive(Debug, Clone)]
pub struct LlmBackendConfig {
    /// The backend type (openai, anthropic, ollama).
    pub backend_type: BackendType,
    /// Base API URL (e.g. `https://api.openai.com/v1`).
    pub api_url: String,
    /// API key for authentication.
    pub api_key: String,
    /// Model identifier. Overrides `model_id` from the YAML file when set.
    pub model: Option<String>,
}

/// Supported LLM backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// `OpenAI`-compatible API (works with `OpenAI`, `DeepSeek`, Ollama).
    OpenAi,
    /// Anthropic Messages API (different request format).
    Anthropic,
}

impl BackendType {
    /// Parse a backend name as written in `LLM_DEFAULT_BACKEND`.
    pub fn parse(name: &str) -> Result<Self, RunnerError> {
        match name.to_lowercase().as_str() {
            "openai" | "deepseek" | "ollama" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(RunnerError::Config(format!("unknown backend type: {other}"))),
        }
    }
}

impl RunnerConfig {
    /// Load configuration from environment variables.
    ///
    /// Required variables:
    /// - `LLM_DEFAULT_BACKEND` -- backend type
    /// - `LLM_DEFAULT_API_URL` -- API base URL
    /// - `LLM_DEFAULT_API_KEY` -- API key
    ///
    /// Optional variables:
    /// - `LLM_DEFAULT_MODEL` -- model name, overriding the YAML `model_id`
    /// - `AFTERHOURS_CONFIG` -- simulation YAML (default `afterhours-config.yaml`)
    /// - `TEMPLATES_DIR` -- path to prompt templates (default `templates`)
    /// - `DATA_DIR` -- message logs and snapshot (default `data`)
    pub fn from_env() -> Result<Self, RunnerError> {
        let backend = LlmBackendConfig {
            backend_type: BackendType::parse(&env_var("LLM_DEFAULT_BACKEND")?)?,
            api_url: env_var("LLM_DEFAULT_API_URL")?,
            api_key: env_var("LLM_DEFAULT_API_KEY")?,
            model: std::env::var("LLM_DEFAULT_MODEL").ok().filter(|m| !m.is_empty()),
        };

        let config_path = std::env::var("AFTERHOURS_CONFIG")
            .unwrap_or_else(|_| "afterhours-config.yaml".to_owned());
        let templates_dir =
            std::env::var("TEMPLATES_DIR").unwrap_or_else(|_| "templates".to_owned());
        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_owned());

        Ok(Self {
            config_path: PathBuf::from(config_path),
            backend,
            templates_dir,
            data_dir: PathBuf::from(data_dir),
        })
    }
}

/// Read a required environment variable.
fn env_var(name: &str) -> Result<String, RunnerError> {
    std::env::var(name)
        .map_err(|e| RunnerError::Config(format!("missing required env var {name}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_type_parsing() {
        assert_eq!(BackendType::parse("OpenAI").ok(), Some(BackendType::OpenAi));
        assert_eq!(BackendType::parse("ollama").ok(), Some(BackendType::OpenAi));
        assert_eq!(BackendType::parse("claude").ok(), Some(BackendType::Anthropic));
        assert!(BackendType::parse("carrier-pigeon").is_err());
    }
}
