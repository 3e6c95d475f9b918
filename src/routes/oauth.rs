/// OAuth Routes
/// Google sign-in, account switching and session teardown
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::{json, Value};
use time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::middleware::csrf::{csrf_cookie, generate_csrf_token, IssuedCsrfToken, CSRF_COOKIE};
use crate::middleware::session::{clear_session_cookie, session_cookie, SessionTokens};
use crate::middleware::ClientInfo;
use crate::models::TokenBundle;
use crate::services::oauth_provider::{generate_state, ConsentPrompt, PKCEData};
use crate::utils::time::current_timestamp_millis;
use crate::AppState;

const STATE_COOKIE: &str = "oauth_state";
const PKCE_COOKIE: &str = "oauth_pkce";

/// Query parameters Google sends back to the callback
#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Register OAuth routes
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/google", get(google_login))
        .route("/oauth2callback", get(oauth_callback))
        .route("/auth/status", get(auth_status))
        .route("/logout", post(logout))
        .route("/switch-account", get(switch_account))
        .route("/remove-account", post(remove_account))
        .route("/csrf-token", get(csrf_token))
}

fn flow_cookie(name: &'static str, value: &str, config: &Config) -> Cookie<'static> {
    Cookie::build((name, value.to_string()))
        .http_only(true)
        .secure(config.is_production())
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::minutes(10))
        .build()
}

fn clear_flow_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(STATE_COOKIE).path("/"))
        .remove(Cookie::build(PKCE_COOKIE).path("/"))
}

fn error_redirect(jar: CookieJar, code: &str) -> (CookieJar, Redirect) {
    let location = format!("/?error={}", urlencoding::encode(code));
    (clear_flow_cookies(jar), Redirect::to(&location))
}

/// Store state and PKCE verifier, then send the browser to the consent screen.
fn begin_consent(
    state: &AppState,
    jar: CookieJar,
    prompt: ConsentPrompt,
) -> AppResult<(CookieJar, Redirect)> {
    let oauth_state = generate_state();
    let pkce = PKCEData::generate();
    let url = state.oauth.authorization_url(&oauth_state, &pkce, prompt)?;

    let jar = jar
        .add(flow_cookie(STATE_COOKIE, &oauth_state, &state.config))
        .add(flow_cookie(PKCE_COOKIE, &pkce.code_verifier, &state.config));

    debug!("Redirecting to Google consent screen ({:?})", prompt);
    Ok((jar, Redirect::to(&url)))
}

async fn google_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Redirect)> {
    begin_consent(&state, jar, ConsentPrompt::Consent)
}

async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    jar: CookieJar,
    Query(params): Query<OAuthCallbackQuery>,
) -> (CookieJar, Redirect) {
    if let Some(provider_error) = &params.error {
        warn!(error = %provider_error, "OAuth error returned by Google");
        return error_redirect(jar, provider_error);
    }

    let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
        return error_redirect(jar, "missing_code");
    };

    let stored_state = jar.get(STATE_COOKIE).map(|c| c.value().to_string());
    let state_matches = matches!(
        (&stored_state, &params.state),
        (Some(stored), Some(received)) if !stored.is_empty() && stored == received
    );
    if !state_matches {
        client.security_event("oauth_state_mismatch", "OAuth callback state did not match");
        return error_redirect(jar, "state_mismatch");
    }

    let verifier = jar.get(PKCE_COOKIE).map(|c| c.value().to_string());

    let token_response = match state.oauth.exchange_code(code, verifier.as_deref()).await {
        Ok(response) => response,
        Err(e) => {
            error!("Token exchange failed: {}", e);
            return error_redirect(jar, "token_exchange_failed");
        }
    };

    let bundle = TokenBundle::from_token_response(token_response, current_timestamp_millis(), None);
    if bundle.refresh_token.is_none() {
        warn!("Google did not issue a refresh token; session will end when the access token expires");
    }

    info!(ip = %client.ip, "Google sign-in completed");
    let jar = clear_flow_cookies(jar).add(session_cookie(&bundle, &state.config));
    (jar, Redirect::to("/"))
}

async fn auth_status(jar: CookieJar) -> Json<Value> {
    let authenticated = SessionTokens::from_jar(&jar, current_timestamp_millis()).is_ok();
    Json(json!({ "success": true, "authenticated": authenticated }))
}

async fn logout(jar: CookieJar) -> (CookieJar, Json<Value>) {
    info!("User logged out");
    (
        jar.remove(clear_session_cookie()),
        Json(json!({ "success": true, "message": "Logged out successfully" })),
    )
}

async fn switch_account(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Redirect)> {
    let jar = jar.remove(clear_session_cookie());
    begin_consent(&state, jar, ConsentPrompt::SelectAccount)
}

async fn remove_account(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Json<Value>) {
    let bundle = jar
        .get(crate::middleware::session::SESSION_COOKIE)
        .and_then(|c| TokenBundle::parse(c.value()).ok());

    if let Some(bundle) = bundle {
        // Revoking the refresh token also invalidates its access tokens
        let token = bundle.refresh_token.as_deref().unwrap_or(&bundle.access_token);
        match state.oauth.revoke_token(token).await {
            Ok(()) => info!("Google access revoked"),
            Err(e) => warn!("Token revocation failed, clearing session anyway: {}", e),
        }
    }

    (
        jar.remove(clear_session_cookie()),
        Json(json!({ "success": true, "message": "Account removed successfully" })),
    )
}

async fn csrf_token(
    State(state): State<Arc<AppState>>,
    issued: Option<Extension<IssuedCsrfToken>>,
    jar: CookieJar,
) -> (CookieJar, Json<Value>) {
    // Freshly issued tokens already have their cookie set by the middleware
    if let Some(Extension(IssuedCsrfToken(token))) = issued {
        return (jar, Json(json!({ "success": true, "csrfToken": token })));
    }

    let token = jar
        .get(CSRF_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(generate_csrf_token);

    let jar = jar.add(csrf_cookie(&token, &state.config));
    (jar, Json(json!({ "success": true, "csrfToken": token })))
}
