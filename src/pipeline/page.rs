//! Page processor: one page in, one [`ExtractionResult`] out.
//!
//! ```text
//! classify ──fail──▶ result{unknown, classification_failed}
//!    │
//! resolve_category (never fails)
//!    │
//! extract ──fail──▶ result{category, extraction_failed}
//!    │
//! harvest figures → normalize body → result{category, body, figures}
//! ```
//!
//! [`PageProcessor::process`] returns a result for every page and never an
//! error; that is what lets the assembler run over an arbitrarily lossy run.

use crate::error::PageFailure;
use crate::output::{ContentCategory, ExtractionResult, Page};
use crate::pipeline::classify::resolve_category;
use crate::pipeline::client::ExtractionClient;
use crate::pipeline::figures::harvest_figures;
use crate::pipeline::normalize::normalize_body;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Drives single pages through classify → extract.
///
/// Cheap to clone; clones share the client.
#[derive(Debug, Clone)]
pub struct PageProcessor {
    client: Arc<ExtractionClient>,
    keep_figures: bool,
}

impl PageProcessor {
    pub fn new(client: Arc<ExtractionClient>) -> Self {
        Self {
            client,
            keep_figures: true,
        }
    }

    /// When false, embedded figures are reduced to their inline marker and no
    /// payload is kept.
    pub fn keep_figures(mut self, keep: bool) -> Self {
        self.keep_figures = keep;
        self
    }

    /// Process one page. Always returns a result.
    pub async fn process(&self, page: Page) -> ExtractionResult {
        let start = Instant::now();
        let result = self.process_inner(&page).await;
        result.with_duration_ms(start.elapsed().as_millis() as u64)
    }

    async fn process_inner(&self, page: &Page) -> ExtractionResult {
        let raw_category = match self.client.classify(page).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Page {}: classification failed, skipping extraction: {}", page.index, e);
                return ExtractionResult::failed(
                    page.index,
                    ContentCategory::Unknown,
                    PageFailure::classification(&e),
                );
            }
        };

        let category = resolve_category(&raw_category);
        debug!("Page {}: classified as {}", page.index, category);

        let raw_body = match self.client.extract(page, category).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Page {}: extraction as {} failed: {}", page.index, category, e);
                return ExtractionResult::failed(page.index, category, PageFailure::extraction(&e));
            }
        };

        let (body, mut figures) = harvest_figures(page, category, &raw_body);
        if !self.keep_figures {
            figures.clear();
        }
        let body = normalize_body(&body);
        if body.is_empty() && figures.is_empty() {
            debug!("Page {}: extraction returned no content", page.index);
        }

        ExtractionResult::succeeded(page.index, category, body, figures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::error::FailureReason;
    use crate::pipeline::service::{ServiceError, VisionRequest, VisionService};
    use crate::prompts::{CLASSIFY_PROMPT, TABLE_PROMPT, TEXT_PROMPT};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers classify with `category` and extract with `body`, recording prompts.
    struct Fixed {
        category: Result<String, ServiceError>,
        body: Result<String, ServiceError>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VisionService for Fixed {
        async fn list_models(&self) -> Result<Vec<String>, ServiceError> {
            Ok(vec![])
        }

        async fn generate(&self, request: &VisionRequest) -> Result<String, ServiceError> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            if request.prompt == CLASSIFY_PROMPT {
                self.category.clone()
            } else {
                self.body.clone()
            }
        }
    }

    fn processor(
        category: Result<String, ServiceError>,
        body: Result<String, ServiceError>,
    ) -> (PageProcessor, Arc<Fixed>) {
        let service = Arc::new(Fixed {
            category,
            body,
            prompts: Mutex::new(Vec::new()),
        });
        let config = ExtractionConfig::builder()
            .max_attempts(2)
            .backoff_base_ms(10)
            .backoff_cap_ms(10)
            .build()
            .unwrap();
        let client = ExtractionClient::new(service.clone(), &config);
        (PageProcessor::new(Arc::new(client)), service)
    }

    fn page() -> Page {
        Page::png(1, vec![1, 2, 3])
    }

    #[tokio::test]
    async fn success_populates_body() {
        let (p, _) = processor(Ok("text".into()), Ok("```markdown\n# Title\n```".into()));
        let r = p.process(page()).await;
        assert!(r.is_success());
        assert_eq!(r.category, ContentCategory::Text);
        assert_eq!(r.body, "# Title");
    }

    #[tokio::test(start_paused = true)]
    async fn classification_failure_skips_extract() {
        let (p, service) = processor(
            Err(ServiceError::Connect("refused".into())),
            Ok("never".into()),
        );
        let r = p.process(page()).await;
        let failure = r.failure.clone().unwrap();
        assert_eq!(failure.reason, FailureReason::ClassificationFailed);
        assert_eq!(r.category, ContentCategory::Unknown);
        let prompts = service.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2, "two classify attempts, no extract");
        assert!(prompts.iter().all(|p| p == CLASSIFY_PROMPT));
    }

    #[tokio::test]
    async fn extraction_failure_keeps_category() {
        let (p, _) = processor(Ok("table".into()), Err(ServiceError::Timeout));
        let r = p.process(page()).await;
        assert_eq!(r.category, ContentCategory::Table);
        assert_eq!(r.failure.unwrap().reason, FailureReason::ExtractionFailed);
        assert!(r.body.is_empty());
    }

    #[tokio::test]
    async fn prose_classification_still_extracts_with_generic_prompt() {
        let (p, service) = processor(
            Ok("This appears to be a text page.".into()),
            Ok("Body".into()),
        );
        let r = p.process(page()).await;
        assert!(r.is_success());
        assert_eq!(r.category, ContentCategory::Unknown);
        let prompts = service.prompts.lock().unwrap();
        assert_eq!(prompts.as_slice(), &[CLASSIFY_PROMPT, TEXT_PROMPT]);
    }

    #[tokio::test]
    async fn table_uses_table_prompt() {
        let (p, service) = processor(Ok("TABLE".into()), Ok("| a |\n| 1 |".into()));
        let r = p.process(page()).await;
        assert_eq!(r.category, ContentCategory::Table);
        assert_eq!(service.prompts.lock().unwrap()[1], TABLE_PROMPT);
    }

    #[tokio::test]
    async fn empty_extraction_is_a_success() {
        let (p, _) = processor(Ok("table".into()), Ok("   \n".into()));
        let r = p.process(page()).await;
        assert!(r.is_success());
        assert!(r.body.is_empty());
    }

    #[tokio::test]
    async fn figures_can_be_discarded() {
        let (p, _) = processor(Ok("figure".into()), Ok("A photo.".into()));
        let kept = p.clone().process(page()).await;
        assert_eq!(kept.figures.len(), 1);
        let dropped = p.keep_figures(false).process(page()).await;
        assert!(dropped.figures.is_empty());
        assert_eq!(dropped.body, "A photo.");
    }
}
