//! Progress-callback trait for per-page extraction events.
//!
//! Inject an `Arc<dyn PageProgress>` via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to observe a
//! run as it moves through the document. The CLI uses this to drive its
//! progress bar; library callers can forward events anywhere they like.
//!
//! # Example
//!
//! ```rust
//! use pagewise::{ContentCategory, ExtractionConfig, PageProgress};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl PageProgress for Counter {
//!     fn on_page_complete(&self, _page: usize, _total: usize, _category: ContentCategory) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::PageFailure;
use crate::output::ContentCategory;
use std::sync::Arc;

/// Called by the pipeline as it processes each page.
///
/// All methods have no-op defaults. With `concurrency > 1` the page-level
/// methods may be called from several tasks at once, so implementations must
/// synchronise any shared state.
pub trait PageProgress: Send + Sync {
    /// Called once, after the availability probe and rendering, before any page is sent.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the classification request for a page.
    fn on_page_start(&self, page: usize, total_pages: usize) {
        let _ = (page, total_pages);
    }

    /// Called when a page produced a successful result.
    fn on_page_complete(&self, page: usize, total_pages: usize, category: ContentCategory) {
        let _ = (page, total_pages, category);
    }

    /// Called when a page became a placeholder.
    fn on_page_error(&self, page: usize, total_pages: usize, failure: &PageFailure) {
        let _ = (page, total_pages, failure);
    }

    /// Called once after every page has a result.
    fn on_run_complete(&self, total_pages: usize, succeeded: usize) {
        let _ = (total_pages, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl PageProgress for NoopProgress {}

/// The type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn PageProgress>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureReason;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl PageProgress for Recorder {
        fn on_run_start(&self, total_pages: usize) {
            self.events.lock().unwrap().push(format!("start {total_pages}"));
        }

        fn on_page_complete(&self, page: usize, _total: usize, category: ContentCategory) {
            self.events.lock().unwrap().push(format!("ok {page} {category}"));
        }

        fn on_page_error(&self, page: usize, _total: usize, failure: &PageFailure) {
            self.events
                .lock()
                .unwrap()
                .push(format!("err {page} {}", failure.reason));
        }
    }

    #[test]
    fn noop_does_not_panic() {
        let cb: ProgressCallback = Arc::new(NoopProgress);
        cb.on_run_start(2);
        cb.on_page_start(1, 2);
        cb.on_page_complete(1, 2, ContentCategory::Text);
        cb.on_run_complete(2, 1);
    }

    #[test]
    fn recorder_sees_events_in_order() {
        let rec = Recorder::default();
        rec.on_run_start(2);
        rec.on_page_complete(1, 2, ContentCategory::Table);
        rec.on_page_error(
            2,
            2,
            &PageFailure {
                reason: FailureReason::ClassificationFailed,
                detail: "timeout".into(),
            },
        );
        let events = rec.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["start 2", "ok 1 table", "err 2 classification_failed"]
        );
    }
}
