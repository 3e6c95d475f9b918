use std::collections::BTreeMap;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::middleware::session::clear_session_cookie;
use crate::utils::upload::UploadRejection;

/// Why a request failed the authentication gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No token cookie on the request.
    Missing,
    /// Cookie present but not a JSON token bundle.
    InvalidFormat,
    /// Bundle without an access token.
    MissingField,
    /// Access token expired and no refresh token to recover with.
    Expired,
}

impl AuthFailure {
    pub fn code(&self) -> &'static str {
        match self {
            AuthFailure::Missing => "UNAUTHENTICATED",
            AuthFailure::InvalidFormat => "INVALID_TOKEN_FORMAT",
            AuthFailure::MissingField => "MISSING_TOKEN_FIELD",
            AuthFailure::Expired => "TOKEN_EXPIRED",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AuthFailure::Missing => "Not authenticated. Please sign in with Google.",
            AuthFailure::InvalidFormat => "Invalid authentication data. Please sign in again.",
            AuthFailure::MissingField => "Incomplete authentication data. Please sign in again.",
            AuthFailure::Expired => "Authentication expired. Please sign in again.",
        }
    }

    /// Whether the stale cookie should be removed along with the rejection.
    pub fn clears_cookie(&self) -> bool {
        !matches!(self, AuthFailure::Missing)
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthenticated: {0:?}")]
    Unauthenticated(AuthFailure),

    #[error("Authentication expired: {0}")]
    AuthExpired(String),

    #[error("Validation failed: {message}")]
    ValidationFailed {
        message: String,
        errors: BTreeMap<String, Vec<String>>,
    },

    #[error("CSRF validation failed")]
    CsrfFailed,

    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Upload rejected: {0}")]
    UploadRejected(#[from] UploadRejection),

    #[error("Processing error: {0}")]
    ProcessingError(String),

    #[error("Upstream failure: {message}")]
    UpstreamFailure { message: String, detail: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Validation failure without per-field detail.
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::ValidationFailed {
            message: message.into(),
            errors: BTreeMap::new(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(failure) => failure.code(),
            AppError::AuthExpired(_) => "AUTH_EXPIRED",
            AppError::ValidationFailed { .. } => "VALIDATION_FAILED",
            AppError::CsrfFailed => "CSRF_FAILED",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            AppError::UploadRejected(_) => "UPLOAD_REJECTED",
            AppError::ProcessingError(_) => "PROCESSING_ERROR",
            AppError::UpstreamFailure { .. } => "UPSTREAM_FAILURE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, body) = match &self {
            AppError::Unauthenticated(failure) => (
                StatusCode::UNAUTHORIZED,
                json!({ "success": false, "error": code, "message": failure.message() }),
            ),
            AppError::AuthExpired(ref e) => {
                tracing::warn!("Token refresh failed: {}", e);
                (
                    StatusCode::UNAUTHORIZED,
                    json!({
                        "success": false,
                        "error": code,
                        "reauth": true,
                        "message": "Authentication expired. Please sign in again to continue.",
                    }),
                )
            }
            AppError::ValidationFailed {
                ref message,
                ref errors,
            } => (
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "error": code, "message": message, "errors": errors }),
            ),
            AppError::CsrfFailed => (
                StatusCode::FORBIDDEN,
                json!({ "success": false, "error": code, "message": "Invalid or missing CSRF token" }),
            ),
            AppError::RateLimited { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({
                    "success": false,
                    "error": code,
                    "message": "Too many requests. Please try again later.",
                }),
            ),
            AppError::PayloadTooLarge(ref e) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                json!({ "success": false, "error": code, "message": e }),
            ),
            AppError::UploadRejected(ref rejection) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "success": false,
                    "error": code,
                    "reason": rejection.reason(),
                    "message": rejection.to_string(),
                }),
            ),
            // Reported in-band so the client flow stays on the happy path
            AppError::ProcessingError(ref e) => (
                StatusCode::OK,
                json!({ "success": false, "error": code, "message": e }),
            ),
            AppError::UpstreamFailure {
                ref message,
                ref detail,
            } => {
                tracing::error!("Upstream failure: {} ({})", message, detail);
                (
                    StatusCode::BAD_GATEWAY,
                    json!({ "success": false, "error": code, "message": message }),
                )
            }
            AppError::Internal(ref e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "success": false, "error": code, "message": "Internal server error" }),
                )
            }
        };

        let mut response = (status, Json(body)).into_response();

        match &self {
            AppError::Unauthenticated(failure) if failure.clears_cookie() => {
                append_cookie_removal(&mut response);
            }
            AppError::AuthExpired(_) => append_cookie_removal(&mut response),
            AppError::RateLimited { retry_after_secs } => {
                if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
            }
            _ => {}
        }

        response
    }
}

fn append_cookie_removal(response: &mut Response) {
    let removal = clear_session_cookie();
    if let Ok(value) = HeaderValue::from_str(&removal.encoded().to_string()) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields = BTreeMap::new();
        flatten_validation_errors("", &errors, &mut fields);
        AppError::ValidationFailed {
            message: "Invalid input".to_string(),
            errors: fields,
        }
    }
}

fn flatten_validation_errors(
    prefix: &str,
    errors: &validator::ValidationErrors,
    out: &mut BTreeMap<String, Vec<String>>,
) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                let messages = out.entry(path).or_default();
                for error in field_errors {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value ({})", error.code));
                    messages.push(message);
                }
            }
            ValidationErrorsKind::Struct(nested) => {
                flatten_validation_errors(&path, nested, out);
            }
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    flatten_validation_errors(&format!("{}[{}]", path, index), nested, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = vec![
            (AppError::Unauthenticated(AuthFailure::Missing), StatusCode::UNAUTHORIZED),
            (AppError::AuthExpired("x".into()), StatusCode::UNAUTHORIZED),
            (AppError::validation("bad"), StatusCode::BAD_REQUEST),
            (AppError::CsrfFailed, StatusCode::FORBIDDEN),
            (
                AppError::RateLimited { retry_after_secs: 3 },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                AppError::PayloadTooLarge("big".into()),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (AppError::ProcessingError("pdf".into()), StatusCode::OK),
            (
                AppError::UpstreamFailure {
                    message: "m".into(),
                    detail: "d".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (AppError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_expired_clears_cookie() {
        let response = AppError::Unauthenticated(AuthFailure::Expired).into_response();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(cookie.starts_with("userTokens="));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn test_missing_cookie_does_not_set_cookie() {
        let response = AppError::Unauthenticated(AuthFailure::Missing).into_response();
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = AppError::RateLimited { retry_after_secs: 42 }.into_response();
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");
    }
}
