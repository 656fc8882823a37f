//! Classifier policy: raw model answer → [`ContentCategory`].
//!
//! Total and pure. The response is trimmed and case-folded, then matched
//! exactly against the five tokens. Anything else (prose, several words,
//! empty output) resolves to [`ContentCategory::Unknown`]; that is the
//! designed fallback, not an error.

use crate::output::ContentCategory;
use tracing::debug;

/// Map a raw classification response to a category.
pub fn resolve_category(raw: &str) -> ContentCategory {
    let normalized = raw.trim().to_lowercase();
    match ContentCategory::from_token(&normalized) {
        Some(category) => category,
        None => {
            debug!("Classification fallback to unknown for response {:?}", raw);
            ContentCategory::Unknown
        }
    }
}
