//! Input sanitization shared by the JSON endpoints and the extractor.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use validator::ValidationError;

pub const MAX_TRANSCRIPT_LENGTH: usize = 50_000;
pub const MIN_CANDIDATE_LENGTH: usize = 5;
pub const MAX_CANDIDATE_LENGTH: usize = 300;

/// Patterns that indicate active markup rather than plain text.
static UNSAFE_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("script_tag", r"(?i)<\s*/?\s*script\b"),
        ("javascript_uri", r"(?i)javascript\s*:"),
        ("vbscript_uri", r"(?i)vbscript\s*:"),
        ("data_html_uri", r"(?i)data\s*:\s*text/html"),
        ("event_handler", r#"(?i)\bon[a-z]+\s*=\s*["'`]?"#),
        ("iframe_tag", r"(?i)<\s*/?\s*iframe\b"),
        ("embed_tag", r"(?i)<\s*/?\s*embed\b"),
        ("object_tag", r"(?i)<\s*/?\s*object\b"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("static pattern")))
    .collect()
});

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("static pattern"));

/// Name of the first unsafe pattern found in `input`, if any.
pub fn find_unsafe_markup(input: &str) -> Option<&'static str> {
    UNSAFE_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(input))
        .map(|(name, _)| *name)
}

fn has_forbidden_control(input: &str, allow_layout: bool) -> bool {
    input.chars().any(|c| {
        c.is_control() && !(allow_layout && matches!(c, '\n' | '\r' | '\t'))
    })
}

fn unsafe_error(detail: &'static str) -> ValidationError {
    ValidationError::new("unsafe_content")
        .with_message(Cow::Owned(format!("Input contains disallowed content ({})", detail)))
}

/// Validator for single-line task fields.
pub fn reject_unsafe_text(value: &str) -> Result<(), ValidationError> {
    if has_forbidden_control(value, false) {
        return Err(unsafe_error("control_character"));
    }
    match find_unsafe_markup(value) {
        Some(name) => Err(unsafe_error(name)),
        None => Ok(()),
    }
}

/// Validator for multi-line transcript bodies.
pub fn reject_unsafe_transcript(value: &str) -> Result<(), ValidationError> {
    if has_forbidden_control(value, true) {
        return Err(unsafe_error("control_character"));
    }
    match find_unsafe_markup(value) {
        Some(name) => Err(unsafe_error(name)),
        None => Ok(()),
    }
}

/// Remove HTML tags and collapse the leftovers.
pub fn strip_html(input: &str) -> String {
    HTML_TAG.replace_all(input, "").trim().to_string()
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(input: &str, max_chars: usize) -> &str {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

/// Whether a candidate task length is within the accepted extraction bounds.
pub fn is_candidate_length(task: &str) -> bool {
    let len = task.chars().count();
    (MIN_CANDIDATE_LENGTH..=MAX_CANDIDATE_LENGTH).contains(&len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_markup() {
        assert_eq!(find_unsafe_markup("<script>x</script>"), Some("script_tag"));
        assert_eq!(find_unsafe_markup("< SCRIPT src=a>"), Some("script_tag"));
        assert_eq!(find_unsafe_markup("click JavaScript:alert(1)"), Some("javascript_uri"));
        assert_eq!(find_unsafe_markup(r#"<img onerror="x">"#), Some("event_handler"));
        assert_eq!(find_unsafe_markup("<iframe src=x>"), Some("iframe_tag"));
        assert_eq!(find_unsafe_markup("<embed src=x>"), Some("embed_tag"));
        assert_eq!(find_unsafe_markup("<object data=x>"), Some("object_tag"));
    }

    #[test]
    fn test_plain_text_is_safe() {
        assert_eq!(find_unsafe_markup("Review the budget by Friday"), None);
        assert_eq!(find_unsafe_markup("Follow up on the online survey"), None);
        assert_eq!(find_unsafe_markup("Send the object model to Dana"), None);
    }

    #[test]
    fn test_control_characters() {
        assert!(reject_unsafe_text("line\nbreak").is_err());
        assert!(reject_unsafe_text("bell\u{7}").is_err());
        assert!(reject_unsafe_transcript("line\nbreak\ttab").is_ok());
        assert!(reject_unsafe_transcript("nul\u{0}").is_err());
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("<b>Ship</b> the <i>release</i>"), "Ship the release");
        assert_eq!(strip_html("  no tags  "), "no tags");
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_candidate_length() {
        assert!(!is_candidate_length("abcd"));
        assert!(is_candidate_length("abcde"));
        assert!(is_candidate_length(&"a".repeat(300)));
        assert!(!is_candidate_length(&"a".repeat(301)));
    }
}
