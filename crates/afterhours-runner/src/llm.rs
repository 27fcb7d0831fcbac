//! LLM backend abstraction and implementations.
//!
//! Defines an enum-based dispatch for LLM backends. Concrete
//! implementations exist for OpenAI-compatible APIs and the Anthropic
//! Messages API. All backends communicate over HTTP via `reqwest`.
//!
//! [`ChatBackend`] pairs a backend with the prompt engine and implements
//! the core's [`GenerationBackend`] seam, so the simulation never sees
//! HTTP or templates.

use afterhours_core::{GenerationBackend, GenerationError, GenerationRequest};
use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use crate::config::{BackendType, LlmBackendConfig};
use crate::error::RunnerError;
use crate::prompt::{PromptEngine, RenderedPrompt};

/// Upper bound on generated tokens. Chat lines are short.
const MAX_TOKENS: u32 = 300;

/// Sampling temperature for chat lines.
const TEMPERATURE: f64 = 0.9;

// ---------------------------------------------------------------------------
// Unified backend enum
// ---------------------------------------------------------------------------

/// An LLM backend that can process a prompt and return a response.
pub enum LlmBackend {
    /// OpenAI-compatible chat completions API.
    OpenAi(HttpBackend),
    /// Anthropic Messages API.
    Anthropic(HttpBackend),
}

/// Connection details shared by both HTTP backends.
pub struct HttpBackend {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpBackend {
    fn new(config: &LlmBackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
        }
    }
}

impl LlmBackend {
    /// Send a prompt to `model` and return the response text.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::LlmBackend`] if the HTTP call fails or the
    /// response cannot be extracted. The message keeps the provider's
    /// status and body so failures can be classified downstream.
    pub async fn complete(&self, prompt: &RenderedPrompt, model: &str) -> Result<String, RunnerError> {
        match self {
            Self::OpenAi(http) => complete_openai(http, prompt, model).await,
            Self::Anthropic(http) => complete_anthropic(http, prompt, model).await,
        }
    }

    /// Human-readable name for logging.
    pub const fn name(&self) -> &str {
        match self {
            Self::OpenAi(_) => "openai-compatible",
            Self::Anthropic(_) => "anthropic",
        }
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible backend
// ---------------------------------------------------------------------------

/// Sends requests to `{api_url}/chat/completions`.
async fn complete_openai(
    http: &HttpBackend,
    prompt: &RenderedPrompt,
    model: &str,
) -> Result<String, RunnerError> {
    let url = format!("{}/chat/completions", http.api_url);
    let body = serde_json::json!({
        "model": model,
        "messages": [
            {"role": "system", "content": prompt.system},
            {"role": "user", "content": prompt.user}
        ],
        "temperature": TEMPERATURE,
        "max_tokens": MAX_TOKENS
    });

    let response = http
        .client
        .post(&url)
        .header("Authorization", format!("Bearer {}", http.api_key))
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| RunnerError::LlmBackend(format!("OpenAI request failed: {e}")))?;

    let json = read_json(response, "OpenAI").await?;
    extract_openai_content(&json)
}

/// Extract the text content from an `OpenAI` chat completions response.
fn extract_openai_content(json: &serde_json::Value) -> Result<String, RunnerError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            RunnerError::LlmBackend("OpenAI response missing choices[0].message.content".to_owned())
        })
}

// ---------------------------------------------------------------------------
// Anthropic Messages API backend
// ---------------------------------------------------------------------------

/// Sends requests to `{api_url}/messages`.
///
/// Anthropic takes the system prompt as a top-level field and authenticates
/// with `x-api-key`.
async fn complete_anthropic(
    http: &HttpBackend,
    prompt: &RenderedPrompt,
    model: &str,
) -> Result<String, RunnerError> {
    let url = format!("{}/messages", http.api_url);
    let body = serde_json::json!({
        "model": model,
        "max_tokens": MAX_TOKENS,
        "temperature": TEMPERATURE,
        "system": prompt.system,
        "messages": [
            {"role": "user", "content": prompt.user}
        ]
    });

    let response = http
        .client
        .post(&url)
        .header("x-api-key", &http.api_key)
        .header("anthropic-version", "2023-06-01")
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| RunnerError::LlmBackend(format!("Anthropic request failed: {e}")))?;

    let json = read_json(response, "Anthropic").await?;
    extract_anthropic_content(&json)
}

/// Extract the text content from an Anthropic Messages API response.
fn extract_anthropic_content(json: &serde_json::Value) -> Result<String, RunnerError> {
    json.get("content")
        .and_then(|c| c.get(0))
        .and_then(|b| b.get("text"))
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| RunnerError::LlmBackend("Anthropic response missing content[0].text".to_owned()))
}

/// Check the status and decode the body of a provider response.
async fn read_json(response: reqwest::Response, provider: &str) -> Result<serde_json::Value, RunnerError> {
    let status = response.status();
    if !status.is_success() {
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error body".to_owned());
        return Err(RunnerError::LlmBackend(format!(
            "{provider} returned {status}: {error_body}"
        )));
    }
    response
        .json()
        .await
        .map_err(|e| RunnerError::LlmBackend(format!("{provider} response parse failed: {e}")))
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Create an LLM backend from configuration.
pub fn create_backend(config: &LlmBackendConfig) -> LlmBackend {
    let http = HttpBackend::new(config);
    match config.backend_type {
        BackendType::OpenAi => LlmBackend::OpenAi(http),
        BackendType::Anthropic => LlmBackend::Anthropic(http),
    }
}

// ---------------------------------------------------------------------------
// Simulation seam
// ---------------------------------------------------------------------------

/// Renders each request through the prompt templates and sends it to the
/// configured backend.
pub struct ChatBackend {
    llm: LlmBackend,
    prompts: PromptEngine,
}

impl ChatBackend {
    /// Pair a backend with its prompt templates.
    pub const fn new(llm: LlmBackend, prompts: PromptEngine) -> Self {
        Self { llm, prompts }
    }
}

impl GenerationBackend for ChatBackend {
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
        model_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>, GenerationError>> {
        async move {
            let prompt = self
                .prompts
                .render(request)
                .map_err(|e| GenerationError::new(format!("invalid request: {e}")))?;
            let text = self
                .llm
                .complete(&prompt, model_id)
                .await
                .map_err(|e| GenerationError::new(e.to_string()))?;
            let text = text.trim();
            debug!(
                backend = self.llm.name(),
                request = %request.label(),
                chars = text.len(),
                "generation complete"
            );
            Ok((!text.is_empty()).then(|| text.to_owned()))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_openai_content_valid() {
        let json = serde_json::json!({
            "choices": [{"message": {"content": "nova: anyone still up?"}}]
        });
        let result = extract_openai_content(&json);
        assert!(result.is_ok());
        assert_eq!(result.unwrap_or_default(), "nova: anyone still up?");
    }

    #[test]
    fn extract_openai_content_missing_choices() {
        let json = serde_json::json!({"error": "rate_limit"});
        assert!(extract_openai_content(&json).is_err());
    }

    #[test]
    fn extract_anthropic_content_valid() {
        let json = serde_json::json!({
            "content": [{"type": "text", "text": "couldn't sleep either"}]
        });
        let result = extract_anthropic_content(&json);
        assert!(result.is_ok());
        assert!(result.unwrap_or_default().contains("sleep"));
    }

    #[test]
    fn extract_anthropic_content_missing() {
        let json = serde_json::json!({"content": []});
        assert!(extract_anthropic_content(&json).is_err());
    }

    #[test]
    fn create_backend_dispatches_correctly() {
        let mut config = LlmBackendConfig {
            backend_type: BackendType::OpenAi,
            api_url: "https://api.openai.com/v1/".to_owned(),
            api_key: "test".to_owned(),
            model: None,
        };
        let backend = create_backend(&config);
        assert_eq!(backend.name(), "openai-compatible");
        if let LlmBackend::OpenAi(http) = &backend {
            assert_eq!(http.api_url, "https://api.openai.com/v1");
        }

        config.backend_type = BackendType::Anthropic;
        assert_eq!(create_backend(&config).name(), "anthropic");
    }
}
