//! Pipeline stages for page-by-page extraction.
//!
//! Each submodule implements one step. Only [`service`] performs network I/O
//! and only [`render`] touches pdfium; everything between them is plain data
//! transformation and can be tested without either.
//!
//! ## Data Flow
//!
//! ```text
//! render ──▶ page ──┬─▶ client.classify ──▶ classify (policy)
//! (pdfium)          └─▶ client.extract  ──▶ figures ──▶ normalize
//!                           │
//!                        service (HTTP)
//! ```
//!
//! 1. [`render`]:    rasterise selected pages; runs in `spawn_blocking`
//! 2. [`encode`]:    PNG encoding and base64 for the request body
//! 3. [`service`]:   the [`service::VisionService`] seam and its Ollama implementation
//! 4. [`client`]:    timeouts, retry with backoff, availability probe
//! 5. [`classify`]:  map a raw classification answer to a category
//! 6. [`figures`]:   pull embedded figures out of an extraction body
//! 7. [`normalize`]: deterministic cleanup of the extracted Markdown
//! 8. [`page`]:      one page in, one result out

pub mod classify;
pub mod client;
pub mod encode;
pub mod figures;
pub mod normalize;
pub mod page;
pub mod render;
pub mod service;
