//! URL-safe slugs for content items, unique per kind

use rusqlite::Connection;
use tracing::warn;

use crate::db::content_items;
use crate::db::models::ContentKind;

/// Fallback slug for titles without any ASCII letter or digit
pub const FALLBACK_SLUG: &str = "item";

/// Lowercase `title`, collapse every run of non-alphanumeric characters into
/// one hyphen and trim hyphens from both ends.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for ch in title.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch);
        } else {
            pending_hyphen = true;
        }
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// First free slug for `title` within `kind`: the base slug, then `-2`, `-3`, ...
///
/// A slug already held by `exclude_id` counts as free so an item keeps its
/// slug across updates. Lookup failures are logged and the candidate is taken;
/// the `UNIQUE(kind, slug)` index rejects it on write if it was in fact taken.
pub fn generate_unique_slug(
    conn: &Connection,
    kind: ContentKind,
    title: &str,
    exclude_id: Option<i64>,
) -> String {
    let base = slugify(title);
    let mut candidate = base.clone();
    let mut suffix = 2u64;

    loop {
        match content_items::find_slug_owner(conn, kind, &candidate) {
            Ok(None) => return candidate,
            Ok(Some(owner)) if Some(owner) == exclude_id => return candidate,
            Ok(Some(_)) => {
                candidate = format!("{}-{}", base, suffix);
                suffix += 1;
            }
            Err(e) => {
                warn!(kind = %kind, slug = %candidate, error = %e, "Slug lookup failed, assuming available");
                return candidate;
            }
        }
    }
}
