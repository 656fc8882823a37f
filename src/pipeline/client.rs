//! Extraction client: the request/response contract with the inference service.
//!
//! Three operations: an availability probe, a classification request, and an
//! extraction request. The two page requests share one send path that owns
//! the timeout and retry policy:
//!
//! | Wire outcome            | Client behaviour                                  |
//! |-------------------------|---------------------------------------------------|
//! | connection failure      | retried with exponential backoff, up to the cap   |
//! | timeout                 | surfaced at once as [`RequestError::Timeout`]     |
//! | non-2xx status          | surfaced at once as [`RequestError::Rejected`]    |
//! | unparseable body        | surfaced at once as [`RequestError::MalformedResponse`] |
//!
//! Timeouts are not retried: the per-request timeout is already long, and
//! repeating it would multiply the time a single page can hold the pipeline.
//!
//! Backoff is a plain state machine ([`Backoff`]) so its schedule can be
//! tested without sleeping; the sleep itself goes through `tokio::time`, which
//! tests pause and auto-advance.

use crate::config::ExtractionConfig;
use crate::error::{PipelineError, RequestError};
use crate::output::{ContentCategory, Page};
use crate::pipeline::encode;
use crate::pipeline::service::{model_listed, OllamaService, ServiceError, VisionRequest, VisionService};
use crate::prompts::{extraction_prompt, CLASSIFY_PROMPT};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// ── Backoff ──────────────────────────────────────────────────────────────

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Wait this long, then try again.
    Retry(Duration),
    /// The attempt budget is spent.
    GiveUp,
}

/// Retry schedule: `{attempts made, next delay}`.
///
/// Delays start at `base` and double after every retry, never exceeding `cap`.
#[derive(Debug, Clone)]
pub struct Backoff {
    attempts: u32,
    max_attempts: u32,
    next_delay: Duration,
    cap: Duration,
}

impl Backoff {
    pub fn new(max_attempts: u32, base: Duration, cap: Duration) -> Self {
        Self {
            attempts: 0,
            max_attempts: max_attempts.max(1),
            next_delay: base.min(cap),
            cap,
        }
    }

    /// Attempts recorded as failed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record a failed attempt and decide the next step.
    pub fn on_failure(&mut self) -> Step {
        self.attempts += 1;
        if self.attempts >= self.max_attempts {
            return Step::GiveUp;
        }
        let delay = self.next_delay;
        self.next_delay = (delay * 2).min(self.cap);
        Step::Retry(delay)
    }
}

// ── Client ───────────────────────────────────────────────────────────────

/// Result of a successful availability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub models: Vec<String>,
    /// Whether the configured model appears in the listing.
    pub model_available: bool,
}

/// Network-facing client for the inference service.
pub struct ExtractionClient {
    service: Arc<dyn VisionService>,
    service_url: String,
    model: String,
    request_timeout: Duration,
    probe_timeout: Duration,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_cap: Duration,
    temperature: f32,
}

impl std::fmt::Debug for ExtractionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionClient")
            .field("service_url", &self.service_url)
            .field("model", &self.model)
            .field("request_timeout", &self.request_timeout)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl ExtractionClient {
    /// Wrap any [`VisionService`] with the configured timeout and retry policy.
    pub fn new(service: Arc<dyn VisionService>, config: &ExtractionConfig) -> Self {
        Self {
            service,
            service_url: config.base_url().to_string(),
            model: config.model.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
            max_attempts: config.max_attempts,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_cap: Duration::from_millis(config.backoff_cap_ms),
            temperature: config.temperature,
        }
    }

    /// Client over the Ollama HTTP API at `config.service_url`.
    pub fn ollama(config: &ExtractionConfig) -> Result<Self, PipelineError> {
        let service = OllamaService::new(config)?;
        Ok(Self::new(Arc::new(service), config))
    }

    /// Probe the service's model listing.
    ///
    /// Any failure here is fatal for the run: if the listing cannot be fetched,
    /// no page request can succeed either. A missing model is only warned about,
    /// since the server may still resolve it (aliases, lazy pulls).
    pub async fn check_availability(&self) -> Result<ServiceStatus, PipelineError> {
        let unavailable = |detail: String| PipelineError::ServiceUnavailable {
            url: self.service_url.clone(),
            detail,
        };

        let models = tokio::time::timeout(self.probe_timeout, self.service.list_models())
            .await
            .map_err(|_| {
                unavailable(format!(
                    "no answer within {}s",
                    self.probe_timeout.as_secs()
                ))
            })?
            .map_err(|e| unavailable(e.to_string()))?;

        let model_available = model_listed(&models, &self.model);
        if model_available {
            info!("Service at {} is up; model '{}' available", self.service_url, self.model);
        } else {
            warn!(
                "Service at {} does not list model '{}' (has: {}). Try: ollama pull {}",
                self.service_url,
                self.model,
                models.join(", "),
                self.model
            );
        }
        Ok(ServiceStatus {
            models,
            model_available,
        })
    }

    /// Ask the model for one category token. Returns the raw response text.
    pub async fn classify(&self, page: &Page) -> Result<String, RequestError> {
        debug!("Page {}: classify", page.index);
        self.send(page, CLASSIFY_PROMPT).await
    }

    /// Run the category-specific extraction prompt. Returns the raw response text.
    pub async fn extract(
        &self,
        page: &Page,
        category: ContentCategory,
    ) -> Result<String, RequestError> {
        debug!("Page {}: extract as {}", page.index, category);
        self.send(page, extraction_prompt(category)).await
    }

    async fn send(&self, page: &Page, prompt: &str) -> Result<String, RequestError> {
        let request = VisionRequest {
            prompt: prompt.to_string(),
            images: vec![encode::to_base64(&page.image)],
            temperature: self.temperature,
        };
        let mut backoff = Backoff::new(self.max_attempts, self.backoff_base, self.backoff_cap);

        loop {
            let outcome = tokio::time::timeout(self.request_timeout, self.service.generate(&request))
                .await
                .unwrap_or(Err(ServiceError::Timeout));

            let detail = match outcome {
                Ok(text) => return Ok(text),
                Err(ServiceError::Connect(detail)) => detail,
                Err(ServiceError::Timeout) => {
                    return Err(RequestError::Timeout {
                        page: page.index,
                        secs: self.request_timeout.as_secs(),
                    })
                }
                Err(ServiceError::Status { status, body }) => {
                    return Err(RequestError::Rejected {
                        page: page.index,
                        status,
                        detail: body,
                    })
                }
                Err(ServiceError::Malformed(detail)) => {
                    return Err(RequestError::MalformedResponse {
                        page: page.index,
                        detail,
                    })
                }
            };

            match backoff.on_failure() {
                Step::Retry(delay) => {
                    warn!(
                        "Page {}: attempt {}/{} failed ({}); retrying in {}ms",
                        page.index,
                        backoff.attempts(),
                        self.max_attempts,
                        detail,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Step::GiveUp => {
                    return Err(RequestError::Transport {
                        page: page.index,
                        attempts: backoff.attempts(),
                        detail,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed script of outcomes, one per `generate` call.
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<String, ServiceError>>>,
        calls: Mutex<u32>,
        hang: bool,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<String, ServiceError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(0),
                hang: false,
            })
        }

        fn hanging() -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(VecDeque::new()),
                calls: Mutex::new(0),
                hang: true,
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl VisionService for Scripted {
        async fn list_models(&self) -> Result<Vec<String>, ServiceError> {
            Ok(vec!["llama3.2-vision:latest".into()])
        }

        async fn generate(&self, _request: &VisionRequest) -> Result<String, ServiceError> {
            *self.calls.lock().unwrap() += 1;
            if self.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::Connect("script exhausted".into())))
        }
    }

    fn config() -> ExtractionConfig {
        ExtractionConfig::builder()
            .request_timeout_secs(30)
            .max_attempts(3)
            .backoff_base_ms(1000)
            .backoff_cap_ms(1500)
            .build()
            .unwrap()
    }

    fn page() -> Page {
        Page::png(5, vec![0x89, b'P', b'N', b'G'])
    }

    fn refused() -> Result<String, ServiceError> {
        Err(ServiceError::Connect("connection refused".into()))
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let mut b = Backoff::new(5, Duration::from_millis(500), Duration::from_millis(1500));
        assert_eq!(b.on_failure(), Step::Retry(Duration::from_millis(500)));
        assert_eq!(b.on_failure(), Step::Retry(Duration::from_millis(1000)));
        assert_eq!(b.on_failure(), Step::Retry(Duration::from_millis(1500)));
        assert_eq!(b.on_failure(), Step::Retry(Duration::from_millis(1500)));
        assert_eq!(b.on_failure(), Step::GiveUp);
        assert_eq!(b.attempts(), 5);
    }

    #[test]
    fn single_attempt_never_retries() {
        let mut b = Backoff::new(1, Duration::from_millis(10), Duration::from_millis(10));
        assert_eq!(b.on_failure(), Step::GiveUp);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_recovers_within_budget() {
        let service = Scripted::new(vec![refused(), Ok("text".into())]);
        let client = ExtractionClient::new(service.clone(), &config());
        let raw = client.classify(&page()).await.unwrap();
        assert_eq!(raw, "text");
        assert_eq!(service.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_is_bounded_by_max_attempts() {
        let service = Scripted::new(vec![refused(), refused(), refused(), Ok("late".into())]);
        let client = ExtractionClient::new(service.clone(), &config());
        let start = tokio::time::Instant::now();
        let err = client.extract(&page(), ContentCategory::Text).await.unwrap_err();
        assert_eq!(
            err,
            RequestError::Transport {
                page: 5,
                attempts: 3,
                detail: "connection refused".into()
            }
        );
        assert_eq!(service.calls(), 3, "no call after the budget is spent");
        // 1000ms, then 1500ms (capped)
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(2500), "waited {waited:?}");
        assert!(waited < Duration::from_millis(2600), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_surfaced_without_retry() {
        let service = Scripted::hanging();
        let client = ExtractionClient::new(service.clone(), &config());
        let err = client.classify(&page()).await.unwrap_err();
        assert_eq!(err, RequestError::Timeout { page: 5, secs: 30 });
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn service_timeout_is_not_retried() {
        let service = Scripted::new(vec![Err(ServiceError::Timeout), Ok("text".into())]);
        let client = ExtractionClient::new(service.clone(), &config());
        let err = client.classify(&page()).await.unwrap_err();
        assert!(matches!(err, RequestError::Timeout { .. }));
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn http_status_is_rejected_without_retry() {
        let service = Scripted::new(vec![Err(ServiceError::Status {
            status: 404,
            body: "model not found".into(),
        })]);
        let client = ExtractionClient::new(service.clone(), &config());
        let err = client.classify(&page()).await.unwrap_err();
        assert_eq!(
            err,
            RequestError::Rejected {
                page: 5,
                status: 404,
                detail: "model not found".into()
            }
        );
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn availability_reports_model_presence() {
        let service = Scripted::new(vec![]);
        let client = ExtractionClient::new(service, &config());
        let status = client.check_availability().await.unwrap();
        assert!(status.model_available);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_service_is_unavailable() {
        struct Down;

        #[async_trait]
        impl VisionService for Down {
            async fn list_models(&self) -> Result<Vec<String>, ServiceError> {
                Err(ServiceError::Connect("connection refused".into()))
            }

            async fn generate(&self, _r: &VisionRequest) -> Result<String, ServiceError> {
                unreachable!("generate must not be called")
            }
        }

        let client = ExtractionClient::new(Arc::new(Down), &config());
        let err = client.check_availability().await.unwrap_err();
        assert!(matches!(err, PipelineError::ServiceUnavailable { .. }));
        assert!(err.to_string().contains("connection refused"));
    }
}
