//! Pattern-based action item detection, used when the model is unavailable
//! or its output is unusable.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::ActionItem;
use crate::utils::sanitize::{is_candidate_length, strip_html};

/// Sentences, each keeping its terminal punctuation.
static SENTENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^.!?\n]+[.!?]*").expect("static pattern"));

/// Ordered patterns; group 1 is the task clause.
static PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // First-person commitments
        r"(?i)\b(?:I['’]ll|I\s+will|I['’]m\s+going\s+to|I\s+am\s+going\s+to|I\s+need\s+to|I\s+have\s+to|I\s+should|let\s+me|we['’]ll|we\s+will|we\s+need\s+to|we\s+should)\s+(.+)",
        r"(?i)\baction\s+items?\s*[:\-]\s*(.+)",
        r"(?i)\bnext\s+steps?\s*[:\-]\s*(.+)",
        r"(?i)\bfollow[\s-]?ups?\s*[:\-]\s*(.+)",
        // Imperatives at the start of a sentence, after an optional speaker label
        r"^\s*(?:[\p{L} .'’-]{1,40}:\s*)?(?i:please\s+)?((?i:send|review|schedule|prepare|update|create|draft|email|call|check|finalize|share|book|organize|complete|submit|set\s+up|reach\s+out|contact|write)\b.*)",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("static pattern"))
    .collect()
});

static DEADLINE_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:(?:by|before|until|on)\s+)?(?:(?:next\s+)?(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday)|tomorrow|tonight|end\s+of\s+(?:the\s+)?(?:day|week|month)|eod|eow|next\s+(?:week|month))\b",
    )
    .expect("static pattern")
});

/// Extract candidate action items from free text.
///
/// Results are in pattern order, then text order, deduplicated
/// case-insensitively by task text.
pub fn extract_with_patterns(text: &str) -> Vec<ActionItem> {
    let sentences: Vec<&str> = SENTENCE.find_iter(text).map(|m| m.as_str()).collect();
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for pattern in PATTERNS.iter() {
        for sentence in &sentences {
            for captures in pattern.captures_iter(sentence) {
                let Some(clause) = captures.get(1) else {
                    continue;
                };
                let task = clean_clause(clause.as_str());
                if !is_candidate_length(&task) {
                    continue;
                }
                if !seen.insert(task.to_lowercase()) {
                    continue;
                }

                let mut item = ActionItem::unassigned(task);
                item.deadline_text = detect_deadline_phrase(&item.task);
                items.push(item);
            }
        }
    }

    items
}

fn clean_clause(raw: &str) -> String {
    let stripped = strip_html(raw);
    stripped
        .trim()
        .trim_matches(|c| c == '"' || c == '“' || c == '”')
        .trim()
        .to_string()
}

/// Relative deadline wording such as "by Friday" or "end of day".
pub fn detect_deadline_phrase(task: &str) -> Option<String> {
    DEADLINE_PHRASE
        .find(task)
        .map(|m| m.as_str().trim().to_string())
}
