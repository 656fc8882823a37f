//! The wire boundary to the vision inference service.
//!
//! [`VisionService`] is the seam: one call to list models (the liveness probe)
//! and one call to run a prompt over an image. [`OllamaService`] speaks the
//! Ollama HTTP API; tests substitute scripted implementations.
//!
//! Implementations report *what happened* on the wire as a [`ServiceError`].
//! Deciding what to retry, and enforcing timeouts, belongs to
//! [`crate::pipeline::client::ExtractionClient`].

use crate::config::ExtractionConfig;
use crate::error::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure of a single wire call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Connection refused, reset, or dropped before a response arrived.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The transport gave up waiting.
    #[error("request timed out")]
    Timeout,

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The body did not match the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// One prompt-over-image request.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub prompt: String,
    /// Base64-encoded images, without a data-URI prefix.
    pub images: Vec<String>,
    pub temperature: f32,
}

/// Async seam to a vision-capable model server.
#[async_trait]
pub trait VisionService: Send + Sync {
    /// Names of the models the service can run. Doubles as the liveness probe.
    async fn list_models(&self) -> Result<Vec<String>, ServiceError>;

    /// Run one prompt over the request's images and return the model's text.
    async fn generate(&self, request: &VisionRequest) -> Result<String, ServiceError>;
}

// ── Ollama ───────────────────────────────────────────────────────────────

/// [`VisionService`] over the Ollama HTTP API (`/api/tags`, `/api/generate`).
#[derive(Debug, Clone)]
pub struct OllamaService {
    base_url: String,
    model: String,
    probe_timeout: Duration,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    images: &'a [String],
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaService {
    pub fn new(config: &ExtractionConfig) -> Result<Self, PipelineError> {
        let probe_timeout = Duration::from_secs(config.probe_timeout_secs);
        let http = reqwest::Client::builder()
            .connect_timeout(probe_timeout)
            .build()
            .map_err(|e| PipelineError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            base_url: config.base_url().to_string(),
            model: config.model.clone(),
            probe_timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl VisionService for OllamaService {
    async fn list_models(&self) -> Result<Vec<String>, ServiceError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .http
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response).await?;
        let tags: TagsResponse = response.json().await.map_err(map_reqwest_error)?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn generate(&self, request: &VisionRequest) -> Result<String, ServiceError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateBody {
            model: &self.model,
            prompt: &request.prompt,
            images: &request.images,
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
            },
        };
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response).await?;
        let parsed: GenerateResponse = response.json().await.map_err(map_reqwest_error)?;
        debug!("generate: {} chars from {}", parsed.response.len(), self.model);
        Ok(parsed.response)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > 200 {
        let cut = (0..=200).rev().find(|&i| body.is_char_boundary(i)).unwrap_or(0);
        body.truncate(cut);
    }
    Err(ServiceError::Status {
        status: status.as_u16(),
        body,
    })
}

fn map_reqwest_error(e: reqwest::Error) -> ServiceError {
    failure_kind(e.is_connect(), e.is_timeout(), e.is_decode(), error_chain(&e))
}

/// Connect is checked first: reqwest also flags a connect timeout as a
/// timeout, but no connection was ever made, so it is retryable.
fn failure_kind(connect: bool, timeout: bool, decode: bool, detail: String) -> ServiceError {
    if connect {
        ServiceError::Connect(detail)
    } else if timeout {
        ServiceError::Timeout
    } else if decode {
        ServiceError::Malformed(detail)
    } else {
        ServiceError::Connect(detail)
    }
}

/// reqwest's top-level message omits the cause ("connection refused" etc.).
fn error_chain(e: &(dyn std::error::Error + 'static)) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

/// Does an Ollama model listing contain the configured model?
///
/// Ollama reports tags (`llava:latest`); a bare name matches any tag of it.
pub fn model_listed(models: &[String], model: &str) -> bool {
    models.iter().any(|name| {
        name == model
            || name
                .strip_prefix(model)
                .is_some_and(|rest| rest.starts_with(':'))
    })
}
