use serde::{Deserialize, Serialize};

use super::types::{GradingBackend, GradingRequest};
use super::GradingError;
use crate::config::GraderConfig;

/// Ollama HTTP client for vision grading via `/api/chat`.
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        }
    }

    pub fn from_config(config: &GraderConfig) -> Self {
        Self::new(&config.ollama_url, &config.model, config.timeout_secs)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Names of all installed models.
    pub fn list_models(&self) -> Result<Vec<String>, GradingError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GradingError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TagsResponse = response
            .json()
            .map_err(|e| GradingError::Http(format!("Unexpected /api/tags body: {e}")))?;

        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    fn transport_error(&self, e: reqwest::Error) -> GradingError {
        if e.is_connect() {
            GradingError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            GradingError::Http(format!("Request timed out after {}s", self.timeout_secs))
        } else {
            GradingError::Http(e.to_string())
        }
    }
}

// ──────────────────────────────────────────────
// Wire types
// ──────────────────────────────────────────────

/// Request body for Ollama `/api/chat`.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    /// JSON schema constraining the reply.
    format: &'a serde_json::Value,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<&'a str>>,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    /// 0.0 for deterministic grading.
    temperature: f32,
}

/// Response body from Ollama `/api/chat` (non-streaming).
#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

/// Response body from Ollama `/api/tags`.
#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<TagsModel>,
}

#[derive(Deserialize)]
struct TagsModel {
    name: String,
}

/// Build the chat body: one user message per page, then the instruction.
fn build_chat_request<'a>(model: &'a str, request: &'a GradingRequest) -> ChatRequest<'a> {
    let mut messages: Vec<ChatMessage<'a>> = request
        .pages
        .iter()
        .map(|page| ChatMessage {
            role: "user",
            content: &page.label,
            images: Some(vec![page.base64.as_str()]),
        })
        .collect();

    messages.push(ChatMessage {
        role: "user",
        content: &request.instruction,
        images: None,
    });

    ChatRequest {
        model,
        messages,
        stream: false,
        format: &request.schema,
        options: ChatOptions { temperature: 0.0 },
    }
}

/// Extract the model's text from a 2xx `/api/chat` body.
///
/// A body that is not a chat envelope is a service fault, not bad model
/// output.
fn decode_chat_body(body: &str) -> Result<String, GradingError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| GradingError::Http(format!("Unexpected /api/chat body: {e}")))?;
    Ok(parsed.message.content)
}

impl GradingBackend for OllamaClient {
    fn complete(&self, request: &GradingRequest) -> Result<String, GradingError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = build_chat_request(&self.model, request);

        tracing::debug!(
            model = %self.model,
            pages = request.page_count(),
            "Sending grading request"
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GradingError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().map_err(|e| self.transport_error(e))?;
        decode_chat_body(&body)
    }

    fn is_model_available(&self, model: &str) -> Result<bool, GradingError> {
        let models = self.list_models()?;
        Ok(models.iter().any(|m| m.starts_with(model)))
    }
}
