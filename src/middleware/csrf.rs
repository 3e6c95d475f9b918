//! Double-submit CSRF protection.
//!
//! The token lives in a readable `csrfToken` cookie and state-changing
//! requests must echo it in `X-CSRF-Token`.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::RngCore;
use tracing::debug;

use crate::config::Config;
use crate::error::AppError;
use crate::middleware::client_info::ClientInfo;
use crate::AppState;

pub const CSRF_COOKIE: &str = "csrfToken";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Token issued by the middleware for a request that arrived without one.
#[derive(Debug, Clone)]
pub struct IssuedCsrfToken(pub String);

/// 32 random bytes, hex encoded.
pub fn generate_csrf_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn csrf_cookie(token: &str, config: &Config) -> Cookie<'static> {
    Cookie::build((CSRF_COOKIE, token.to_string()))
        .http_only(false)
        .secure(config.is_production())
        .same_site(SameSite::Strict)
        .path("/")
        .build()
}

fn tokens_match(expected: &[u8], provided: &[u8]) -> bool {
    if expected.len() != provided.len() {
        return false;
    }
    expected
        .iter()
        .zip(provided)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn is_state_changing(method: &Method) -> bool {
    [Method::POST, Method::PUT, Method::PATCH, Method::DELETE].contains(method)
}

pub async fn csrf_protect(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let cookie_token = jar.get(CSRF_COOKIE).map(|c| c.value().to_string());

    if is_state_changing(request.method()) {
        let header_token = request
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok());

        let valid = match (&cookie_token, header_token) {
            (Some(expected), Some(provided)) if !expected.is_empty() => {
                tokens_match(expected.as_bytes(), provided.as_bytes())
            }
            _ => false,
        };

        if !valid {
            let reason = if header_token.is_none() {
                "csrf_missing"
            } else {
                "csrf_mismatch"
            };
            client.security_event(reason, request.uri().path());
            return Err(AppError::CsrfFailed);
        }

        return Ok(next.run(request).await);
    }

    if cookie_token.is_some() {
        return Ok(next.run(request).await);
    }

    let token = generate_csrf_token();
    debug!("Issuing CSRF token");
    request.extensions_mut().insert(IssuedCsrfToken(token.clone()));

    let mut response = next.run(request).await;
    let cookie = csrf_cookie(&token, &state.config);
    if let Ok(value) = HeaderValue::from_str(&cookie.encoded().to_string()) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    Ok(response)
}
