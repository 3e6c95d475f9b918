//! `userTokens` cookie handling and the authentication gate.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, AppResult, AuthFailure};
use crate::middleware::client_info::ClientInfo;
use crate::models::TokenBundle;
use crate::services::OAuthProvider;
use crate::utils::time::current_timestamp_millis;
use crate::AppState;

pub const SESSION_COOKIE: &str = "userTokens";

/// Create the session cookie carrying `bundle`.
pub fn session_cookie(bundle: &TokenBundle, config: &Config) -> Cookie<'static> {
    let same_site = if config.is_production() {
        SameSite::Strict
    } else {
        SameSite::Lax
    };

    Cookie::build((SESSION_COOKIE, bundle.to_cookie_value()))
        .http_only(true)
        .secure(config.is_production())
        .same_site(same_site)
        .path("/")
        .max_age(Duration::days(config.session_cookie_max_age_days))
        .build()
}

/// Create removal cookie for the session.
pub fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}

/// Token bundle of an authenticated request.
///
/// Rejects with 401 when the cookie is missing, malformed, lacks an access
/// token, or has expired with no refresh token to recover it.
#[derive(Debug, Clone)]
pub struct SessionTokens(pub TokenBundle);

impl SessionTokens {
    pub fn from_jar(jar: &CookieJar, now_ms: i64) -> Result<Self, AuthFailure> {
        let raw = jar.get(SESSION_COOKIE).ok_or(AuthFailure::Missing)?;
        let bundle = TokenBundle::parse(raw.value())?;

        if bundle.is_expired(now_ms) && !bundle.can_refresh() {
            return Err(AuthFailure::Expired);
        }
        Ok(Self(bundle))
    }

    /// Refresh the access token when it has expired.
    ///
    /// Returns the bundle to use and, when it changed, the cookie to send.
    pub async fn ensure_fresh(
        self,
        oauth: &dyn OAuthProvider,
        config: &Config,
    ) -> AppResult<(TokenBundle, Option<Cookie<'static>>)> {
        let now_ms = current_timestamp_millis();
        let bundle = self.0;
        if !bundle.is_expired(now_ms) {
            return Ok((bundle, None));
        }

        let refresh_token = bundle
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::AuthExpired("no refresh token".to_string()))?;

        debug!("Access token expired, refreshing");
        let response = oauth
            .refresh_token(&refresh_token)
            .await
            .map_err(|e| AppError::AuthExpired(e.to_string()))?;

        let refreshed = TokenBundle::from_token_response(response, now_ms, Some(refresh_token));
        info!("Access token refreshed");
        let cookie = session_cookie(&refreshed, config);
        Ok((refreshed, Some(cookie)))
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for SessionTokens {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);

        Self::from_jar(&jar, current_timestamp_millis()).map_err(|failure| {
            if failure != AuthFailure::Missing {
                ClientInfo::from_parts(parts, state.config.trust_proxy)
                    .security_event(failure.code(), "Rejected session cookie");
            }
            AppError::Unauthenticated(failure)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderMap, HeaderValue};

    fn jar_with(value: &str) -> CookieJar {
        let mut headers = HeaderMap::new();
        let cookie = format!("{}={}", SESSION_COOKIE, urlencoding::encode(value));
        headers.insert(header::COOKIE, HeaderValue::from_str(&cookie).unwrap());
        CookieJar::from_headers(&headers)
    }

    #[test]
    fn test_gate_outcomes() {
        let now = 10_000;
        assert_eq!(
            SessionTokens::from_jar(&CookieJar::new(), now).unwrap_err(),
            AuthFailure::Missing
        );
        assert_eq!(
            SessionTokens::from_jar(&jar_with("{oops"), now).unwrap_err(),
            AuthFailure::InvalidFormat
        );
        assert_eq!(
            SessionTokens::from_jar(&jar_with(r#"{"refresh_token":"r"}"#), now).unwrap_err(),
            AuthFailure::MissingField
        );
        assert_eq!(
            SessionTokens::from_jar(&jar_with(r#"{"access_token":"a","expiry_date":5}"#), now)
                .unwrap_err(),
            AuthFailure::Expired
        );
    }

    #[test]
    fn test_expired_with_refresh_token_passes_gate() {
        let jar = jar_with(r#"{"access_token":"a","refresh_token":"r","expiry_date":5}"#);
        let SessionTokens(bundle) = SessionTokens::from_jar(&jar, 10_000).unwrap();
        assert_eq!(bundle.refresh_token.as_deref(), Some("r"));
    }

    #[test]
    fn test_cookie_attributes() {
        let config = Config::load(
            config::Config::builder()
                .set_override("google_client_id", "id")
                .unwrap()
                .set_override("google_client_secret", "secret")
                .unwrap(),
        )
        .unwrap();
        let bundle = TokenBundle::parse(r#"{"access_token":"a"}"#).unwrap();
        let cookie = session_cookie(&bundle, &config);

        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(Duration::days(30)));

        let removal = clear_session_cookie();
        assert_eq!(removal.max_age(), Some(Duration::ZERO));
    }
}
