//! Figure harvesting and page-scoped figure naming.
//!
//! Figure-bearing pages (`figure`, `mixed`) may come back with images embedded
//! as Markdown data URIs. Each one is decoded into a [`FigureRef`] and the link
//! in the body is replaced by a short inline marker; the assembler later emits
//! the real relative links.
//!
//! Names derive only from the page index and the figure's position on that
//! page, so two pages can never collide and a re-run over the same input
//! produces the same names. No shared counter is involved, so pages processed
//! concurrently need no coordination.

use crate::output::{ContentCategory, FigureRef, Page};
use crate::pipeline::encode;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::warn;

static RE_DATA_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"!\[([^\]]*)\]\(\s*data:(image/[A-Za-z0-9.+-]+);base64,([A-Za-z0-9+/=\s]+?)\s*\)")
        .expect("valid data-uri regex")
});

/// `page-0003-fig-02.png`
pub fn figure_file_name(page_index: usize, sequence: usize, mime: &str) -> String {
    format!(
        "page-{:04}-fig-{:02}.{}",
        page_index,
        sequence,
        extension_for(mime)
    )
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        _ => "bin",
    }
}

/// Pull embedded figures out of an extraction body.
///
/// Returns the body with each data-URI image replaced by an italic marker,
/// and the decoded figures in order of appearance. For a `figure` page with no
/// embedded payload, the page raster itself becomes figure 1. Categories that
/// do not bear figures are returned untouched.
pub fn harvest_figures(
    page: &Page,
    category: ContentCategory,
    body: &str,
) -> (String, Vec<FigureRef>) {
    if !category.bears_figures() {
        return (body.to_string(), Vec::new());
    }

    let mut figures: Vec<FigureRef> = Vec::new();
    let rewritten = RE_DATA_IMAGE
        .replace_all(body, |caps: &Captures<'_>| {
            let alt = caps[1].trim();
            let mime = caps[2].to_ascii_lowercase();
            match encode::from_base64(&caps[3]) {
                Ok(bytes) if !bytes.is_empty() => {
                    let sequence = figures.len() + 1;
                    figures.push(FigureRef {
                        page_index: page.index,
                        sequence,
                        file_name: figure_file_name(page.index, sequence, &mime),
                        mime,
                        bytes,
                    });
                    figure_marker(sequence, alt)
                }
                Ok(_) | Err(_) => {
                    warn!("Page {}: dropping undecodable embedded image", page.index);
                    if alt.is_empty() {
                        String::new()
                    } else {
                        format!("*{alt}*")
                    }
                }
            }
        })
        .into_owned();

    if figures.is_empty() && category == ContentCategory::Figure && !page.image.is_empty() {
        figures.push(FigureRef {
            page_index: page.index,
            sequence: 1,
            file_name: figure_file_name(page.index, 1, &page.mime),
            mime: page.mime.clone(),
            bytes: page.image.clone(),
        });
    }

    (rewritten, figures)
}

fn figure_marker(sequence: usize, alt: &str) -> String {
    if alt.is_empty() {
        format!("*[Figure {sequence}]*")
    } else {
        format!("*[Figure {sequence}: {alt}]*")
    }
}
