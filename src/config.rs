//! Configuration types for a page-extraction run.
//!
//! All run behaviour is controlled through [`ExtractionConfig`], built via its
//! [`ExtractionConfigBuilder`] or loaded from a TOML file. The value is
//! constructed once and passed by reference into the extraction client and the
//! page processor; the library keeps no ambient configuration state.
//!
//! The client enforces the timeout and retry numbers it is given. The defaults
//! live here, not in the client.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hard ceiling on concurrent requests to the inference service.
///
/// A local model server is usually a single process; more than a handful of
/// in-flight requests only queues work on its side.
pub const MAX_CONCURRENCY: usize = 4;

/// Configuration for one extraction run.
///
/// # Example
/// ```rust
/// use pagewise::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .model("llama3.2-vision")
///     .request_timeout_secs(90)
///     .max_attempts(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts, 4);
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Base URL of the inference service. Default: `http://localhost:11434`.
    pub service_url: String,

    /// Vision model identifier. Default: `llama3.2-vision`.
    pub model: String,

    /// Per-request timeout for classify and extract calls, in seconds. Default: 120.
    ///
    /// Local vision models on CPU can take well over a minute per page. A
    /// request that exceeds this is surfaced as a timeout and not retried.
    pub request_timeout_secs: u64,

    /// Timeout for the availability probe, in seconds. Default: 5.
    pub probe_timeout_secs: u64,

    /// Total attempts per request (first try included). Default: 3.
    ///
    /// Only connection-level failures consume further attempts.
    pub max_attempts: u32,

    /// First retry delay in milliseconds; doubles per retry. Default: 1000.
    pub backoff_base_ms: u64,

    /// Upper bound on a single retry delay in milliseconds. Default: 8000.
    pub backoff_cap_ms: u64,

    /// Sampling temperature passed to the model. Default: 0.0.
    pub temperature: f32,

    /// Rendering DPI used when rasterising each page. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Maximum rendered image dimension in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// In-flight requests to the service. Range: 1–[`MAX_CONCURRENCY`]. Default: 1.
    ///
    /// Results are always assembled in page order regardless of this value.
    pub concurrency: usize,

    /// Write figure payloads next to the output document. Default: true.
    pub save_figures: bool,

    /// Optional `# title` heading at the top of the assembled document.
    pub document_title: Option<String>,

    /// Per-page progress events. Not serialised.
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:11434".to_string(),
            model: "llama3.2-vision".to_string(),
            request_timeout_secs: 120,
            probe_timeout_secs: 5,
            max_attempts: 3,
            backoff_base_ms: 1000,
            backoff_cap_ms: 8000,
            temperature: 0.0,
            dpi: 150,
            max_rendered_pixels: 2000,
            pages: PageSelection::default(),
            concurrency: 1,
            save_figures: true,
            document_title: None,
            progress_callback: None,
        }
    }
}

impl std::fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("service_url", &self.service_url)
            .field("model", &self.model)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("probe_timeout_secs", &self.probe_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("backoff_cap_ms", &self.backoff_cap_ms)
            .field("dpi", &self.dpi)
            .field("pages", &self.pages)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder seeded with the defaults.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load a configuration from a TOML file. Missing keys take defaults.
    ///
    /// ```toml
    /// model = "llava"
    /// request_timeout_secs = 180
    /// pages = { First = 10 }
    /// ```
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::ConfigFile {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let config = Self::from_toml_str(&text).map_err(|e| match e {
            PipelineError::InvalidConfig(detail) => PipelineError::ConfigFile {
                path: path.to_path_buf(),
                detail,
            },
            other => other,
        })?;
        Ok(config)
    }

    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self, PipelineError> {
        let config: ExtractionConfig =
            toml::from_str(text).map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        ExtractionConfigBuilder { config }.build()
    }

    /// Reopen this configuration for further changes, e.g. CLI flags over a file.
    pub fn into_builder(self) -> ExtractionConfigBuilder {
        ExtractionConfigBuilder { config: self }
    }

    /// The service URL without any trailing slash.
    pub fn base_url(&self) -> &str {
        self.service_url.trim_end_matches('/')
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn service_url(mut self, url: impl Into<String>) -> Self {
        self.config.service_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn probe_timeout_secs(mut self, secs: u64) -> Self {
        self.config.probe_timeout_secs = secs;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn backoff_base_ms(mut self, ms: u64) -> Self {
        self.config.backoff_base_ms = ms;
        self
    }

    pub fn backoff_cap_ms(mut self, ms: u64) -> Self {
        self.config.backoff_cap_ms = ms;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn save_figures(mut self, v: bool) -> Self {
        self.config.save_figures = v;
        self
    }

    pub fn document_title(mut self, title: impl Into<String>) -> Self {
        self.config.document_title = Some(title.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<ExtractionConfig, PipelineError> {
        self.config.service_url = self.config.base_url().to_string();
        let c = &self.config;
        if !(c.service_url.starts_with("http://") || c.service_url.starts_with("https://")) {
            return Err(PipelineError::InvalidConfig(format!(
                "service URL must be http(s), got '{}'",
                c.service_url
            )));
        }
        if c.model.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("model must not be empty".into()));
        }
        if c.request_timeout_secs == 0 || c.probe_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "timeouts must be at least 1 second".into(),
            ));
        }
        if c.max_attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.backoff_cap_ms < c.backoff_base_ms {
            return Err(PipelineError::InvalidConfig(format!(
                "backoff cap ({}ms) is below the base delay ({}ms)",
                c.backoff_cap_ms, c.backoff_base_ms
            )));
        }
        if c.dpi < 72 || c.dpi > 400 {
            return Err(PipelineError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 || c.concurrency > MAX_CONCURRENCY {
            return Err(PipelineError::InvalidConfig(format!(
                "concurrency must be 1–{MAX_CONCURRENCY}, got {}",
                c.concurrency
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Specifies which pages of the document to process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Process all pages (default).
    #[default]
    All,
    /// The first `n` pages only.
    First(usize),
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::First(n) => (0..(*n).min(total_pages)).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Parse the CLI form: `all`, `5`, `3-15`, or `1,3,5`.
    pub fn parse(spec: &str) -> Result<Self, PipelineError> {
        let spec = spec.trim();
        let bad = || PipelineError::InvalidConfig(format!("invalid page selection '{spec}'"));
        if spec.eq_ignore_ascii_case("all") {
            return Ok(PageSelection::All);
        }
        if spec.contains(',') {
            let pages = spec
                .split(',')
                .map(|p| p.trim().parse::<usize>().map_err(|_| bad()))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(PageSelection::Set(pages));
        }
        if let Some((a, b)) = spec.split_once('-') {
            let a = a.trim().parse::<usize>().map_err(|_| bad())?;
            let b = b.trim().parse::<usize>().map_err(|_| bad())?;
            if a == 0 || b < a {
                return Err(bad());
            }
            return Ok(PageSelection::Range(a, b));
        }
        spec.parse::<usize>()
            .ok()
            .filter(|&p| p >= 1)
            .map(PageSelection::Single)
            .ok_or_else(bad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = ExtractionConfig::builder().build().unwrap();
        assert_eq!(c.service_url, "http://localhost:11434");
        assert_eq!(c.max_attempts, 3);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.request_timeout_secs, 120);
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let c = ExtractionConfig::builder()
            .service_url("http://localhost:11434/")
            .build()
            .unwrap();
        assert_eq!(c.service_url, "http://localhost:11434");
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = ExtractionConfig::builder().max_attempts(0).build().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn cap_below_base_rejected() {
        let err = ExtractionConfig::builder()
            .backoff_base_ms(5000)
            .backoff_cap_ms(1000)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("backoff cap"));
    }

    #[test]
    fn concurrency_is_bounded() {
        assert!(ExtractionConfig::builder().concurrency(0).build().is_err());
        assert!(ExtractionConfig::builder()
            .concurrency(MAX_CONCURRENCY + 1)
            .build()
            .is_err());
        assert!(ExtractionConfig::builder().concurrency(2).build().is_ok());
    }

    #[test]
    fn toml_overrides_and_defaults() {
        let c = ExtractionConfig::from_toml_str(
            r#"
model = "deepseek-ocr"
request_timeout_secs = 180
pages = { First = 10 }
"#,
        )
        .unwrap();
        assert_eq!(c.model, "deepseek-ocr");
        assert_eq!(c.request_timeout_secs, 180);
        assert_eq!(c.pages, PageSelection::First(10));
        assert_eq!(c.dpi, 150);
    }

    #[test]
    fn toml_file_not_found() {
        let err = ExtractionConfig::from_toml_file("nonexistent.toml").unwrap_err();
        assert!(matches!(err, PipelineError::ConfigFile { .. }));
    }

    #[test]
    fn toml_file_roundtrip_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pagewise.toml");
        std::fs::write(&path, "dpi = 300\nmax_attempts = 5\n").unwrap();
        let c = ExtractionConfig::from_toml_file(&path).unwrap();
        assert_eq!(c.dpi, 300);
        assert_eq!(c.max_attempts, 5);
    }

    #[test]
    fn flags_layer_over_file_values() {
        let file = ExtractionConfig::from_toml_str("model = \"llava\"\ndpi = 200\n").unwrap();
        let c = file.into_builder().dpi(96).build().unwrap();
        assert_eq!(c.model, "llava");
        assert_eq!(c.dpi, 96);
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(3), vec![0, 1, 2]);
        assert_eq!(PageSelection::First(2).to_indices(5), vec![0, 1]);
        assert_eq!(PageSelection::First(9).to_indices(3), vec![0, 1, 2]);
        assert_eq!(PageSelection::Single(6).to_indices(5), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 4).to_indices(5), vec![1, 2, 3]);
        assert_eq!(PageSelection::Set(vec![3, 1, 3]).to_indices(5), vec![0, 2]);
    }

    #[test]
    fn page_selection_parse() {
        assert_eq!(PageSelection::parse("all").unwrap(), PageSelection::All);
        assert_eq!(PageSelection::parse("5").unwrap(), PageSelection::Single(5));
        assert_eq!(PageSelection::parse("3-15").unwrap(), PageSelection::Range(3, 15));
        assert_eq!(
            PageSelection::parse("1, 3,5").unwrap(),
            PageSelection::Set(vec![1, 3, 5])
        );
        assert!(PageSelection::parse("0").is_err());
        assert!(PageSelection::parse("9-2").is_err());
        assert!(PageSelection::parse("abc").is_err());
    }
}
