//! Slug derivation for artbook titles.
//!
//! Slugs are stable for the lifetime of an artbook except when the title
//! changes, in which case a new slug is derived and collisions are resolved
//! by numeric suffixing (`my-story`, `my-story-2`, `my-story-3`, ...).

use lazy_static::lazy_static;
use regex::Regex;
use sqlx::PgPool;

use crate::error::ApiError;

lazy_static! {
    /// Valid slug pattern: lowercase letters, numbers, and hyphens.
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
    static ref NON_ALNUM: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_REGEX.is_match(slug)
}

/// Derive the base slug from a title: lowercase, non-alphanumeric runs
/// collapsed to single hyphens, leading/trailing hyphens trimmed.
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let slug = NON_ALNUM.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// Derive a slug unique among artbooks, excluding `exclude_id` so a title
/// update does not collide with the record's own current slug.
///
/// # Errors
/// Propagates database failures.
pub async fn unique_slug(
    pool: &PgPool,
    title: &str,
    exclude_id: Option<uuid::Uuid>,
) -> Result<String, ApiError> {
    let base = slugify(title);
    let mut candidate = base.clone();
    let mut suffix = 2;
    loop {
        let taken: Option<(uuid::Uuid,)> =
            sqlx::query_as("SELECT id FROM artbooks WHERE slug = $1")
                .bind(&candidate)
                .fetch_optional(pool)
                .await?;
        match taken {
            Some((id,)) if Some(id) != exclude_id => {
                candidate = format!("{}-{}", base, suffix);
                suffix += 1;
            }
            _ => return Ok(candidate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_basic_titles() {
        assert_eq!(slugify("The Fairy Tale"), "the-fairy-tale");
        assert_eq!(slugify("Dragons & Knights!"), "dragons-knights");
        assert_eq!(slugify("  spaced   out  "), "spaced-out");
    }

    #[test]
    fn slugify_empty_falls_back() {
        assert_eq!(slugify("!!!"), "untitled");
        assert_eq!(slugify(""), "untitled");
    }

    #[test]
    fn slug_validation() {
        assert!(is_valid_slug("fairy-tale"));
        assert!(is_valid_slug("story-2"));
        assert!(!is_valid_slug("Fairy-Tale"));
        assert!(!is_valid_slug("-leading"));
        assert!(!is_valid_slug("double--hyphen"));
        assert!(!is_valid_slug(""));
    }
}
