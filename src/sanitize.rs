//! Comment content sanitization.
//!
//! A pure function with an explicit deny set: markup tags are stripped,
//! `javascript:` (and the other script-capable protocols) are removed, and
//! inline event-handler attributes (`onclick=`, `onerror=`, ...) are dropped
//! before tag stripping can turn them into visible text.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ApiError;

/// Maximum comment length, measured after sanitization.
pub const MAX_COMMENT_CHARS: usize = 1000;

lazy_static! {
    /// Script-capable URI schemes that survive tag stripping as plain text.
    static ref SCRIPT_PROTOCOL: Regex =
        Regex::new(r"(?i)(?:javascript|vbscript|data)\s*:").unwrap();
    /// Inline event-handler attributes, with or without a quoted value.
    static ref EVENT_HANDLER: Regex =
        Regex::new(r#"(?i)\bon\w+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#).unwrap();
    /// Tag-shaped spans; handler stripping is confined to these.
    static ref MARKUP_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
}

/// Strip markup and script-like content from raw comment text.
///
/// Event handlers are removed first, but only inside tag spans (otherwise
/// `<img onerror=...>` would leave the handler body behind as text once the
/// tag is stripped, while plain text like "online=true" must stay intact).
/// Then all tags go via ammonia's empty allow-list, then any remaining
/// script protocols.
pub fn sanitize(raw: &str) -> String {
    let without_handlers = MARKUP_TAG.replace_all(raw, |tag: &regex::Captures| {
        EVENT_HANDLER.replace_all(&tag[0], "").into_owned()
    });
    let stripped = ammonia::Builder::empty()
        .clean(&without_handlers)
        .to_string();
    SCRIPT_PROTOCOL.replace_all(&stripped, "").trim().to_string()
}

/// Sanitize and enforce the 1..=1000 character bound.
///
/// # Errors
/// `Validation` when the sanitized text is empty or over the limit.
pub fn sanitize_comment(raw: &str) -> Result<String, ApiError> {
    let clean = sanitize(raw);
    if clean.is_empty() {
        return Err(ApiError::Validation(
            "Comment content cannot be empty".to_string(),
        ));
    }
    if clean.chars().count() > MAX_COMMENT_CHARS {
        return Err(ApiError::Validation(format!(
            "Comment content exceeds {} characters",
            MAX_COMMENT_CHARS
        )));
    }
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(sanitize("Nice story!"), "Nice story!");
    }

    #[test]
    fn tags_are_stripped() {
        assert_eq!(sanitize("<b>bold</b> and <i>italic</i>"), "bold and italic");
        assert_eq!(sanitize("<script>alert(1)</script>hello"), "hello");
    }

    #[test]
    fn javascript_protocol_is_removed() {
        assert_eq!(sanitize("click javascript:alert(1) here"), "click alert(1) here");
        assert_eq!(sanitize("JAVASCRIPT:evil()"), "evil()");
    }

    #[test]
    fn event_handlers_are_removed() {
        let out = sanitize(r#"<img src=x onerror="alert(1)">text"#);
        assert!(!out.contains("alert"));
        assert!(out.contains("text"));
        let out = sanitize("<div onclick=steal()>ok</div>");
        assert_eq!(out, "ok");
    }

    #[test]
    fn attribute_like_plain_text_is_preserved() {
        assert_eq!(sanitize("going online=true today"), "going online=true today");
        assert_eq!(sanitize("carry-on=1 bag only"), "carry-on=1 bag only");
    }

    #[test]
    fn whitespace_is_trimmed() {
        assert_eq!(sanitize("  padded  "), "padded");
    }

    #[test]
    fn empty_after_sanitization_is_rejected() {
        assert!(sanitize_comment("<script></script>").is_err());
        assert!(sanitize_comment("   ").is_err());
    }

    #[test]
    fn oversize_content_is_rejected() {
        let long = "a".repeat(MAX_COMMENT_CHARS + 1);
        assert!(sanitize_comment(&long).is_err());
        let max = "a".repeat(MAX_COMMENT_CHARS);
        assert_eq!(sanitize_comment(&max).unwrap().len(), MAX_COMMENT_CHARS);
    }

    #[test]
    fn length_is_checked_after_stripping() {
        // Markup inflates the raw length but the sanitized text fits.
        let raw = format!("<b>{}</b>", "a".repeat(MAX_COMMENT_CHARS));
        assert!(sanitize_comment(&raw).is_ok());
    }
}
