/// Google OAuth 2.0 client
/// Authorization URL construction, code exchange, refresh and revocation
use crate::config::Config;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, warn};

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";

/// OAuth provider configuration
#[derive(Debug, Clone)]
pub struct OAuthProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub revoke_url: String,
    pub scopes: Vec<String>,
    pub redirect_uri: String,
}

impl OAuthProviderConfig {
    pub fn google(config: &Config) -> Self {
        Self {
            client_id: config.google_client_id.clone(),
            client_secret: config.google_client_secret.clone(),
            authorize_url: GOOGLE_AUTHORIZE_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            revoke_url: GOOGLE_REVOKE_URL.to_string(),
            scopes: config
                .google_oauth_scope
                .split_whitespace()
                .map(|s| s.to_string())
                .collect(),
            redirect_uri: config.google_redirect_uri.clone(),
        }
    }
}

/// OAuth token response from provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Which account chooser behaviour to request from the consent screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentPrompt {
    /// Always show consent so a refresh token is issued
    Consent,
    /// Let the user pick a different Google account
    SelectAccount,
}

impl ConsentPrompt {
    fn as_param(&self) -> &'static str {
        match self {
            ConsentPrompt::Consent => "consent",
            ConsentPrompt::SelectAccount => "select_account consent",
        }
    }
}

/// PKCE (Proof Key for Code Exchange) data
#[derive(Debug, Clone)]
pub struct PKCEData {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

impl PKCEData {
    /// Generate PKCE challenge data
    pub fn generate() -> Self {
        let code_verifier = Self::generate_code_verifier();
        let code_challenge = Self::challenge_for(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: "S256".to_string(),
        }
    }

    fn generate_code_verifier() -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    pub fn challenge_for(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        let result = hasher.finalize();
        URL_SAFE_NO_PAD.encode(result)
    }
}

/// Random value for the OAuth `state` parameter
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// OAuth provider trait
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Build the consent screen URL
    fn authorization_url(
        &self,
        state: &str,
        pkce: &PKCEData,
        prompt: ConsentPrompt,
    ) -> AppResult<String>;

    /// Exchange authorization code for tokens
    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: Option<&str>,
    ) -> AppResult<OAuthTokenResponse>;

    /// Refresh access token
    async fn refresh_token(&self, refresh_token: &str) -> AppResult<OAuthTokenResponse>;

    /// Revoke a previously issued token
    async fn revoke_token(&self, token: &str) -> AppResult<()>;
}

/// Google OAuth provider
pub struct GoogleOAuthProvider {
    config: OAuthProviderConfig,
    client: Client,
}

impl GoogleOAuthProvider {
    pub fn new(config: OAuthProviderConfig, client: Client) -> Self {
        Self { config, client }
    }

    async fn post_token_form(
        &self,
        params: &[(&str, &str)],
        operation: &str,
    ) -> AppResult<OAuthTokenResponse> {
        let response = self
            .client
            .post(&self.config.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                error!("{} failed: {}", operation, e);
                AppError::UpstreamFailure {
                    message: format!("{} failed", operation),
                    detail: e.to_string(),
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("{} failed: {} - {}", operation, status, error_text);
            return Err(AppError::UpstreamFailure {
                message: format!("{} failed", operation),
                detail: format!("{} - {}", status, error_text),
            });
        }

        response.json().await.map_err(|e| {
            error!("Failed to parse {} response: {}", operation, e);
            AppError::UpstreamFailure {
                message: format!("{} failed", operation),
                detail: e.to_string(),
            }
        })
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuthProvider {
    fn authorization_url(
        &self,
        state: &str,
        pkce: &PKCEData,
        prompt: ConsentPrompt,
    ) -> AppResult<String> {
        let scope_str = self.config.scopes.join(" ");
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("response_type", "code"),
            ("access_type", "offline"),
            ("include_granted_scopes", "true"),
            ("prompt", prompt.as_param()),
            ("state", state),
            ("scope", scope_str.as_str()),
            ("code_challenge", pkce.code_challenge.as_str()),
            ("code_challenge_method", pkce.code_challenge_method.as_str()),
        ];

        let url = reqwest::Url::parse_with_params(&self.config.authorize_url, &params)
            .map_err(|e| AppError::Internal(format!("Failed to build auth URL: {}", e)))?;

        Ok(url.to_string())
    }

    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: Option<&str>,
    ) -> AppResult<OAuthTokenResponse> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        if let Some(verifier) = pkce_verifier {
            params.push(("code_verifier", verifier));
        }

        debug!("Exchanging authorization code for tokens");
        self.post_token_form(&params, "Token exchange").await
    }

    async fn refresh_token(&self, refresh_token: &str) -> AppResult<OAuthTokenResponse> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        debug!("Refreshing access token");
        self.post_token_form(&params, "Token refresh").await
    }

    async fn revoke_token(&self, token: &str) -> AppResult<()> {
        let response = self
            .client
            .post(&self.config.revoke_url)
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| AppError::UpstreamFailure {
                message: "Token revocation failed".to_string(),
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!("Token revocation failed: {} - {}", status, error_text);
            return Err(AppError::UpstreamFailure {
                message: "Token revocation failed".to_string(),
                detail: format!("{} - {}", status, error_text),
            });
        }

        debug!("Token revoked");
        Ok(())
    }
}
