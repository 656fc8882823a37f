//! Streaming API: page results in page order, as soon as each is ready.
//!
//! With `concurrency == 1` pages go through the service strictly one at a time.
//! With a higher setting up to that many pages are in flight, but
//! `StreamExt::buffered` still yields them in input order, so consumers (and the
//! assembler) never have to re-sort.

use crate::config::ExtractionConfig;
use crate::output::{ExtractionResult, Page};
use crate::pipeline::page::PageProcessor;
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;

/// A boxed stream of per-page results.
pub type ResultStream = Pin<Box<dyn Stream<Item = ExtractionResult> + Send>>;

/// Process `pages` and yield one result per page, in the order given.
///
/// Progress events from `config.progress_callback` fire as each page starts
/// and finishes.
pub fn extract_stream(
    processor: PageProcessor,
    pages: Vec<Page>,
    config: &ExtractionConfig,
) -> ResultStream {
    let total = pages.len();
    let progress: Option<ProgressCallback> = config.progress_callback.clone();
    let concurrency = config.concurrency.max(1);

    let s = stream::iter(pages)
        .map(move |page| {
            let processor = processor.clone();
            let progress = progress.clone();
            async move {
                let index = page.index;
                if let Some(ref cb) = progress {
                    cb.on_page_start(index, total);
                }
                let result = processor.process(page).await;
                if let Some(ref cb) = progress {
                    match &result.failure {
                        None => cb.on_page_complete(index, total, result.category),
                        Some(f) => cb.on_page_error(index, total, f),
                    }
                }
                result
            }
        })
        .buffered(concurrency);

    Box::pin(s)
}

/// Drain [`extract_stream`] into a vector.
pub async fn extract_all(
    processor: PageProcessor,
    pages: Vec<Page>,
    config: &ExtractionConfig,
) -> Vec<ExtractionResult> {
    extract_stream(processor, pages, config).collect().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::client::ExtractionClient;
    use crate::pipeline::service::{ServiceError, VisionRequest, VisionService};
    use crate::prompts::CLASSIFY_PROMPT;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    /// Earlier pages answer more slowly, so completion order is reversed.
    struct SlowFirst;

    #[async_trait]
    impl VisionService for SlowFirst {
        async fn list_models(&self) -> Result<Vec<String>, ServiceError> {
            Ok(vec![])
        }

        async fn generate(&self, request: &VisionRequest) -> Result<String, ServiceError> {
            // The image payload is the base64 of a single byte holding the page index.
            let page = crate::pipeline::encode::from_base64(&request.images[0]).unwrap()[0];
            tokio::time::sleep(Duration::from_millis(100 * (10 - page as u64))).await;
            if request.prompt == CLASSIFY_PROMPT {
                Ok("text".into())
            } else {
                Ok(format!("page {page}"))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_results_keep_page_order() {
        let config = ExtractionConfig::builder().concurrency(3).build().unwrap();
        let client = ExtractionClient::new(Arc::new(SlowFirst), &config);
        let processor = PageProcessor::new(Arc::new(client));
        let pages = (1..=5u8).map(|i| Page::png(i as usize, vec![i])).collect();

        let results = extract_all(processor, pages, &config).await;
        let order: Vec<_> = results.iter().map(|r| r.page_index).collect();
        assert_eq!(order, vec![1, 2, 3, 4, 5]);
        assert_eq!(results[3].body, "page 4");
    }
}
