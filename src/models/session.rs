use serde::{Deserialize, Serialize};

use crate::error::AuthFailure;
use crate::services::oauth_provider::OAuthTokenResponse;

/// OAuth credential set carried in the `userTokens` cookie.
///
/// Field names follow the Google token shape (`expiry_date` in epoch
/// milliseconds) so bundles written by other Google clients parse as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBundle {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenBundle {
    /// Parse an untrusted cookie value into a bundle.
    pub fn parse(raw: &str) -> Result<Self, AuthFailure> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|_| AuthFailure::InvalidFormat)?;

        let object = value.as_object().ok_or(AuthFailure::InvalidFormat)?;
        match object.get("access_token") {
            Some(serde_json::Value::String(token)) if !token.trim().is_empty() => {}
            Some(serde_json::Value::String(_)) | None | Some(serde_json::Value::Null) => {
                return Err(AuthFailure::MissingField)
            }
            Some(_) => return Err(AuthFailure::InvalidFormat),
        }

        serde_json::from_value(value).map_err(|_| AuthFailure::InvalidFormat)
    }

    /// Build a bundle from a token endpoint response received at `now_ms`.
    ///
    /// A refresh response usually omits the refresh token; `previous_refresh`
    /// carries the one already held.
    pub fn from_token_response(
        response: OAuthTokenResponse,
        now_ms: i64,
        previous_refresh: Option<String>,
    ) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh),
            expiry_date: response.expires_in.map(|secs| now_ms + secs * 1000),
            token_type: Some(response.token_type),
            scope: response.scope,
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expiry_date, Some(expiry) if expiry <= now_ms)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .map(|t| !t.is_empty())
            .unwrap_or(false)
    }

    pub fn to_cookie_value(&self) -> String {
        // Serializing a struct of strings and integers cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}
