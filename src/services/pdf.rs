use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use crate::utils::sanitize::{truncate_chars, MAX_TRANSCRIPT_LENGTH};

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("Failed to read PDF: {0}")]
    Decode(String),
    #[error("No readable text found in the PDF")]
    NoText,
}

/// Extract plain text from an uploaded PDF on the blocking pool.
///
/// The result is trimmed and capped at the transcript length limit.
pub async fn extract_text(data: Bytes) -> Result<String, PdfError> {
    let decoded = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&data))
        .await
        .map_err(|e| {
            if e.is_panic() {
                PdfError::Decode("decoder panicked on malformed input".to_string())
            } else {
                PdfError::Decode(e.to_string())
            }
        })?
        .map_err(|e| PdfError::Decode(e.to_string()))?;

    normalize_text(&decoded)
}

fn normalize_text(decoded: &str) -> Result<String, PdfError> {
    let text = decoded.trim();
    if text.is_empty() {
        return Err(PdfError::NoText);
    }

    let total = text.chars().count();
    if total > MAX_TRANSCRIPT_LENGTH {
        debug!(
            "Truncating extracted PDF text from {} to {} characters",
            total, MAX_TRANSCRIPT_LENGTH
        );
    }
    Ok(truncate_chars(text, MAX_TRANSCRIPT_LENGTH).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_text_is_an_error() {
        assert!(matches!(normalize_text("  \n\t "), Err(PdfError::NoText)));
    }

    #[test]
    fn test_long_text_truncated() {
        let long = "a".repeat(MAX_TRANSCRIPT_LENGTH + 10);
        assert_eq!(normalize_text(&long).unwrap().len(), MAX_TRANSCRIPT_LENGTH);
        assert_eq!(normalize_text("  Minutes  ").unwrap(), "Minutes");
    }

    #[tokio::test]
    async fn test_garbage_reports_decode_error() {
        let result = extract_text(Bytes::from_static(b"%PDF-1.4\nthis is not a real pdf")).await;
        assert!(matches!(result, Err(PdfError::Decode(_))));
    }
}
