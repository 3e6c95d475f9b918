use serde::Deserialize;

/// Runtime configuration, read from the process environment (and `.env`).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_environment")]
    pub environment: String,

    // Google OAuth
    #[serde(default)]
    pub google_client_id: String,
    #[serde(default)]
    pub google_client_secret: String,
    #[serde(default = "default_google_redirect_uri")]
    pub google_redirect_uri: String,
    #[serde(default = "default_google_oauth_scope")]
    pub google_oauth_scope: String,

    // Generative text service
    #[serde(default)]
    pub gemini_api_key: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_gemini_api_url")]
    pub gemini_api_url: String,

    // Google Tasks
    #[serde(default = "default_tasks_api_url")]
    pub tasks_api_url: String,
    #[serde(default = "default_tasklist_id")]
    pub tasklist_id: String,

    // Rate limiting
    #[serde(default = "default_rate_limit_max_requests")]
    pub rate_limit_max_requests: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    #[serde(default = "default_processing_rate_limit_max_requests")]
    pub processing_rate_limit_max_requests: u32,
    #[serde(default = "default_processing_rate_limit_window_secs")]
    pub processing_rate_limit_window_secs: u64,

    // Request limits
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default = "default_upload_body_limit_bytes")]
    pub upload_body_limit_bytes: usize,
    #[serde(default = "default_json_body_limit_bytes")]
    pub json_body_limit_bytes: usize,

    #[serde(default)]
    pub trust_proxy: bool,
    #[serde(default = "default_session_cookie_max_age_days")]
    pub session_cookie_max_age_days: i64,
    #[serde(default)]
    pub cors_origin: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_google_redirect_uri() -> String {
    "http://localhost:3000/oauth2callback".to_string()
}

fn default_google_oauth_scope() -> String {
    "https://www.googleapis.com/auth/tasks".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_gemini_api_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_tasks_api_url() -> String {
    "https://tasks.googleapis.com/tasks/v1".to_string()
}

fn default_tasklist_id() -> String {
    "@default".to_string()
}

fn default_rate_limit_max_requests() -> u32 {
    100
}

fn default_rate_limit_window_secs() -> u64 {
    15 * 60
}

fn default_processing_rate_limit_max_requests() -> u32 {
    10
}

fn default_processing_rate_limit_window_secs() -> u64 {
    60
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_upload_body_limit_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_json_body_limit_bytes() -> usize {
    1024 * 1024
}

fn default_session_cookie_max_age_days() -> i64 {
    30
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Variable names map to field names case-insensitively, so
    /// `GOOGLE_CLIENT_ID` populates `google_client_id`.
    pub fn from_env() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true));
        Self::load(builder)
    }

    pub fn load(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> anyhow::Result<Self> {
        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.google_client_id.is_empty() || self.google_client_secret.is_empty() {
            anyhow::bail!("GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET must be set");
        }
        if self.rate_limit_max_requests == 0 || self.processing_rate_limit_max_requests == 0 {
            anyhow::bail!("rate limit request counts must be greater than zero");
        }
        if self.rate_limit_window_secs == 0 || self.processing_rate_limit_window_secs == 0 {
            anyhow::bail!("rate limit windows must be greater than zero");
        }
        if self.upload_body_limit_bytes <= self.max_upload_bytes {
            anyhow::bail!("UPLOAD_BODY_LIMIT_BYTES must exceed MAX_UPLOAD_BYTES");
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn generative_enabled(&self) -> bool {
        !self.gemini_api_key.is_empty()
    }
}
