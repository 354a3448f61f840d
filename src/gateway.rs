use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::error::{classify_status, PipelineError};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<TransportError> for PipelineError {
    fn from(e: TransportError) -> Self {
        PipelineError::new(crate::error::ErrorKind::Upstream, format!("AI gateway unreachable: {e}"))
    }
}

/// What came back over the wire, before any interpretation.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
}

/// The generative content service as the pipeline sees it: one single-shot call.
///
/// Implementations must not retry or classify statuses; that is the caller's job.
#[async_trait]
pub trait GenerativeService: Send + Sync {
    async fn invoke(&self, request: &ChatRequest) -> Result<RawResponse, TransportError>;
}

// --- Request schema ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<Modality>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Image,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, content: MessageContent::Text(text.into()) }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: MessageContent::Text(text.into()) }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self { role: Role::User, content: MessageContent::Parts(parts) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(url: String) -> Self {
        ContentPart::ImageUrl { image_url: ImageUrl { url } }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

// --- Response schema ---

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    images: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    image_url: ImageUrl,
}

/// Which payload a call is expected to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Text,
    Image,
}

impl CallKind {
    pub fn label(self) -> &'static str {
        match self {
            CallKind::Text => "text",
            CallKind::Image => "image",
        }
    }

    /// Turns a raw response into the expected payload.
    ///
    /// Text calls read `choices[0].message.content`, image calls read
    /// `choices[0].message.images[0].image_url.url`. Anything else on a
    /// success status is `EmptyResult`; no alternative paths are probed.
    pub fn interpret(self, raw: &RawResponse) -> Result<String, PipelineError> {
        if classify_status(raw.status).is_some() {
            error!(status = raw.status, body = %body_preview(&raw.body), "❌ AI gateway error response");
            return Err(PipelineError::from_status(raw.status));
        }

        let parsed: ChatCompletion = serde_json::from_slice(&raw.body).map_err(|e| {
            error!(error = %e, body = %body_preview(&raw.body), "❌ Unexpected AI gateway response shape");
            PipelineError::empty(format!("AI gateway returned an unexpected {} response", self.label()))
        })?;
        let message = parsed.choices.into_iter().next().map(|c| c.message);

        let payload = match self {
            CallKind::Text => message.and_then(|m| m.content).map(|s| s.trim().to_string()),
            CallKind::Image => message
                .and_then(|m| m.images.into_iter().next())
                .map(|img| img.image_url.url.trim().to_string()),
        };

        match payload.filter(|p| !p.is_empty()) {
            Some(p) => Ok(p),
            None => {
                error!(body = %body_preview(&raw.body), "❌ No {} in AI gateway response", self.label());
                Err(PipelineError::empty(match self {
                    CallKind::Text => "No text was generated",
                    CallKind::Image => "No image was generated",
                }))
            }
        }
    }
}

/// Shortens inline base64 payloads so bodies can be logged.
fn truncate_base64_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for val in map.values_mut() {
                truncate_base64_in_json(val);
            }
        }
        serde_json::Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        serde_json::Value::String(s) if s.len() > 100 => {
            if let Some(idx) = s.find(";base64,") {
                let mut keep = (idx + ";base64,".len() + 32).min(s.len());
                while !s.is_char_boundary(keep) {
                    keep -= 1;
                }
                if keep < s.len() {
                    *s = format!("{}...[truncated {} chars]", &s[..keep], s.len() - keep);
                }
            }
        }
        _ => {}
    }
}

fn body_preview(body: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(mut value) => {
            truncate_base64_in_json(&mut value);
            value.to_string()
        }
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            text.chars().take(500).collect()
        }
    }
}

/// reqwest-backed client for an OpenAI-style chat completions gateway.
pub struct GatewayClient {
    client: Client,
    api_key: String,
    url: String,
    timeout: Duration,
}

impl GatewayClient {
    pub fn new(url: String, api_key: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, api_key, url, timeout })
    }

    fn map_err(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Http(e.to_string())
        }
    }
}

#[async_trait]
impl GenerativeService for GatewayClient {
    async fn invoke(&self, request: &ChatRequest) -> Result<RawResponse, TransportError> {
        if tracing::enabled!(tracing::Level::DEBUG) {
            if let Ok(mut body) = serde_json::to_value(request) {
                truncate_base64_in_json(&mut body);
                debug!(model = %request.model, "📤 Request body: {}", body);
            }
        }

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| self.map_err(e))?;
        debug!(model = %request.model, status, bytes = body.len(), "📥 Response received");

        Ok(RawResponse { status, body })
    }
}
