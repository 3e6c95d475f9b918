//! Action item extraction
//!
//! A generative strategy is tried first when one is configured. Any failure
//! on that path, including output that cannot be parsed, degrades to the
//! pattern strategy so extraction as a whole never fails.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::task::UNASSIGNED;
use crate::models::ActionItem;
use crate::services::fallback::extract_with_patterns;
use crate::services::generative::{generate_with_retry, GenerationError, RetryPolicy, TextGenerator};
use crate::utils::sanitize::{is_candidate_length, strip_html};
use crate::utils::time::parse_deadline;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("generative request failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("unusable model output: {0}")]
    Unusable(String),
}

/// Which strategy produced a set of candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionSource {
    Generative,
    Fallback,
}

impl ExtractionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionSource::Generative => "generative",
            ExtractionSource::Fallback => "fallback",
        }
    }
}

#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn source(&self) -> ExtractionSource;

    async fn extract(&self, text: &str) -> Result<Vec<ActionItem>, ExtractionError>;
}

const PROMPT_TEMPLATE: &str = r#"You extract action items from meeting transcripts.

Today's date is {today}.

Return ONLY a JSON array, no explanation. Each element must be an object:
{
  "task": "short imperative description of the work",
  "assignee": "person responsible, or \"Unassigned\" if unclear",
  "assigneeReason": "brief quote or reason for the assignment",
  "deadline": "YYYY-MM-DD if a concrete date can be determined, otherwise null",
  "deadlineText": "deadline wording as spoken, e.g. \"by Friday\", otherwise null"
}

Rules:
- Only include concrete commitments or requests, not general discussion.
- Keep each task under 300 characters.
- Return [] when there are no action items.

TRANSCRIPT:
{transcript}
"#;

fn build_prompt(transcript: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{today}", &Utc::now().format("%Y-%m-%d").to_string())
        .replace("{transcript}", transcript)
}

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("static pattern")
});

/// Remove a surrounding Markdown code fence, if present.
fn strip_code_fence(raw: &str) -> &str {
    match CODE_FENCE.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => raw.trim(),
    }
}

/// Parse the model reply into candidates.
///
/// The reply must be a JSON array. Elements that are neither strings nor
/// objects with a usable `task` are dropped.
pub fn parse_model_output(raw: &str) -> Result<Vec<ActionItem>, ExtractionError> {
    let body = strip_code_fence(raw);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ExtractionError::Unusable(format!("invalid JSON: {}", e)))?;

    let Value::Array(entries) = value else {
        return Err(ExtractionError::Unusable(
            "top-level value is not an array".to_string(),
        ));
    };

    Ok(entries.into_iter().filter_map(normalize_entry).collect())
}

fn normalize_entry(entry: Value) -> Option<ActionItem> {
    match entry {
        // Older prompt revisions returned bare strings
        Value::String(task) => clean_task(&task).map(ActionItem::unassigned),
        Value::Object(fields) => normalize_object(&fields),
        _ => None,
    }
}

fn normalize_object(fields: &Map<String, Value>) -> Option<ActionItem> {
    let task = clean_task(string_field(fields, "task")?)?;

    let assignee = string_field(fields, "assignee")
        .map(strip_html)
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| UNASSIGNED.to_string());

    let assignee_reason = string_field(fields, "assigneeReason")
        .map(strip_html)
        .unwrap_or_default();

    let deadline = string_field(fields, "deadline")
        .and_then(parse_deadline)
        .map(|date| date.format("%Y-%m-%d").to_string());

    let deadline_text = string_field(fields, "deadlineText")
        .map(strip_html)
        .filter(|t| !t.is_empty());

    Some(ActionItem {
        task,
        assignee,
        assignee_reason,
        deadline,
        deadline_text,
    })
}

fn string_field<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields.get(key).and_then(Value::as_str)
}

fn clean_task(raw: &str) -> Option<String> {
    let task = strip_html(raw);
    is_candidate_length(&task).then_some(task)
}

/// Model-backed strategy
pub struct GenerativeStrategy {
    generator: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
}

impl GenerativeStrategy {
    pub fn new(generator: Arc<dyn TextGenerator>, retry: RetryPolicy) -> Self {
        Self { generator, retry }
    }
}

#[async_trait]
impl ExtractionStrategy for GenerativeStrategy {
    fn source(&self) -> ExtractionSource {
        ExtractionSource::Generative
    }

    async fn extract(&self, text: &str) -> Result<Vec<ActionItem>, ExtractionError> {
        let prompt = build_prompt(text);
        let reply = generate_with_retry(self.generator.as_ref(), &prompt, self.retry).await?;
        parse_model_output(&reply)
    }
}

/// Regex-based strategy
pub struct PatternStrategy;

#[async_trait]
impl ExtractionStrategy for PatternStrategy {
    fn source(&self) -> ExtractionSource {
        ExtractionSource::Fallback
    }

    async fn extract(&self, text: &str) -> Result<Vec<ActionItem>, ExtractionError> {
        Ok(extract_with_patterns(text))
    }
}

/// Extracted candidates, consumed once
#[derive(Debug)]
pub struct ActionItems {
    items: std::vec::IntoIter<ActionItem>,
    source: ExtractionSource,
}

impl ActionItems {
    fn new(items: Vec<ActionItem>, source: ExtractionSource) -> Self {
        Self {
            items: items.into_iter(),
            source,
        }
    }

    pub fn source(&self) -> ExtractionSource {
        self.source
    }
}

impl Iterator for ActionItems {
    type Item = ActionItem;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

pub struct ActionItemExtractor {
    primary: Option<Box<dyn ExtractionStrategy>>,
    fallback: Box<dyn ExtractionStrategy>,
}

impl ActionItemExtractor {
    /// Pattern matching only.
    pub fn fallback_only() -> Self {
        Self {
            primary: None,
            fallback: Box::new(PatternStrategy),
        }
    }

    /// Generative extraction backed by pattern matching.
    pub fn with_generator(generator: Arc<dyn TextGenerator>, retry: RetryPolicy) -> Self {
        Self::with_primary(Box::new(GenerativeStrategy::new(generator, retry)))
    }

    pub fn with_primary(primary: Box<dyn ExtractionStrategy>) -> Self {
        Self {
            primary: Some(primary),
            fallback: Box::new(PatternStrategy),
        }
    }

    pub async fn extract(&self, text: &str) -> ActionItems {
        if let Some(primary) = &self.primary {
            match primary.extract(text).await {
                Ok(items) => {
                    info!("Extracted {} action items via {}", items.len(), primary.source().as_str());
                    return ActionItems::new(items, primary.source());
                }
                Err(e) => warn!("Primary extraction failed, using fallback: {}", e),
            }
        }

        match self.fallback.extract(text).await {
            Ok(items) => {
                info!("Extracted {} action items via {}", items.len(), self.fallback.source().as_str());
                ActionItems::new(items, self.fallback.source())
            }
            Err(e) => {
                warn!("Fallback extraction failed: {}", e);
                ActionItems::new(Vec::new(), self.fallback.source())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    const MEETING: &str =
        "John: I'll review the budget by Friday. Sarah: I need to schedule a meeting.";

    struct Scripted {
        reply: Result<String, GenerationError>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                calls: AtomicU32::new(0),
            })
        }

        fn err(error: GenerationError) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(error),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    fn no_delay() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_parse_fenced_array() {
        let raw = "```json\n[{\"task\":\"Send the agenda\",\"assignee\":\"Dana\",\"assigneeReason\":\"Dana offered\",\"deadline\":\"2025-04-01\",\"deadlineText\":\"by April 1\"}]\n```";
        let items = parse_model_output(raw).unwrap();
        assert_eq!(
            items,
            vec![ActionItem {
                task: "Send the agenda".into(),
                assignee: "Dana".into(),
                assignee_reason: "Dana offered".into(),
                deadline: Some("2025-04-01".into()),
                deadline_text: Some("by April 1".into()),
            }]
        );
    }

    #[test]
    fn test_parse_normalizes_legacy_strings_and_filters() {
        let raw = r#"["Book the venue", "tiny", 42, {"assignee":"x"}, {"task":"<b>Order</b> catering","deadline":"Friday"}]"#;
        let items = parse_model_output(raw).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], ActionItem::unassigned("Book the venue"));
        assert_eq!(items[1].task, "Order catering");
        assert_eq!(items[1].assignee, UNASSIGNED);
        assert_eq!(items[1].assignee_reason, "");
        assert_eq!(items[1].deadline, None);
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(matches!(
            parse_model_output(r#"{"task":"Send the agenda"}"#),
            Err(ExtractionError::Unusable(_))
        ));
        assert!(matches!(
            parse_model_output("Sure! Here are the items:"),
            Err(ExtractionError::Unusable(_))
        ));
    }

    #[test]
    fn test_parse_empty_array() {
        assert!(parse_model_output("[]").unwrap().is_empty());
    }

    #[test]
    fn test_prompt_embeds_transcript() {
        let prompt = build_prompt("Alice: ship it");
        assert!(prompt.contains("Alice: ship it"));
        assert!(!prompt.contains("{transcript}"));
        assert!(!prompt.contains("{today}"));
    }

    #[tokio::test]
    async fn test_without_generator_uses_fallback() {
        let extractor = ActionItemExtractor::fallback_only();
        let items = extractor.extract(MEETING).await;
        assert_eq!(items.source(), ExtractionSource::Fallback);
        let tasks: Vec<String> = items.map(|i| i.task).collect();
        assert_eq!(tasks, vec!["review the budget by Friday.", "schedule a meeting."]);
    }

    #[tokio::test]
    async fn test_generative_success() {
        let generator = Scripted::ok(r#"[{"task":"Review the budget","assignee":"John"}]"#);
        let extractor = ActionItemExtractor::with_generator(generator.clone(), no_delay());
        let items = extractor.extract(MEETING).await;
        assert_eq!(items.source(), ExtractionSource::Generative);
        let items: Vec<ActionItem> = items.collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].assignee, "John");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_generative_empty_result_is_not_fallback() {
        let extractor = ActionItemExtractor::with_generator(Scripted::ok("[]"), no_delay());
        let items = extractor.extract(MEETING).await;
        assert_eq!(items.source(), ExtractionSource::Generative);
        assert_eq!(items.count(), 0);
    }

    #[tokio::test]
    async fn test_retryable_failure_exhausts_then_falls_back() {
        let generator = Scripted::err(GenerationError::status(503, "unavailable"));
        let extractor = ActionItemExtractor::with_generator(generator.clone(), no_delay());
        let items = extractor.extract(MEETING).await;
        assert_eq!(generator.calls.load(Ordering::SeqCst), 4);
        assert_eq!(items.source(), ExtractionSource::Fallback);
        assert_eq!(items.count(), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_falls_back_after_one_call() {
        let generator = Scripted::err(GenerationError::status(400, "bad request"));
        let extractor = ActionItemExtractor::with_generator(generator.clone(), no_delay());
        let items = extractor.extract(MEETING).await;
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(items.source(), ExtractionSource::Fallback);
    }

    #[tokio::test]
    async fn test_unusable_output_falls_back() {
        let extractor =
            ActionItemExtractor::with_generator(Scripted::ok("not json at all"), no_delay());
        let items = extractor.extract(MEETING).await;
        assert_eq!(items.source(), ExtractionSource::Fallback);
    }

    #[tokio::test]
    async fn test_fallback_is_idempotent() {
        let extractor = ActionItemExtractor::fallback_only();
        let first: Vec<ActionItem> = extractor.extract(MEETING).await.collect();
        let second: Vec<ActionItem> = extractor.extract(MEETING).await.collect();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_generative_is_idempotent_for_same_reply() {
        let generator = Scripted::ok(
            r#"[{"task":"Review the budget","assignee":"John","deadline":"2025-03-07","deadlineText":"by Friday"},"Schedule a meeting"]"#,
        );
        let extractor = ActionItemExtractor::with_generator(generator.clone(), no_delay());

        let first = extractor.extract(MEETING).await;
        assert_eq!(first.source(), ExtractionSource::Generative);
        let first: Vec<ActionItem> = first.collect();
        let second: Vec<ActionItem> = extractor.extract(MEETING).await.collect();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_items_found() {
        let extractor = ActionItemExtractor::fallback_only();
        assert_eq!(extractor.extract("Nice weather today.").await.count(), 0);
    }
}
