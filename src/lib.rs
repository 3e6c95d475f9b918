pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::Config;
use crate::middleware::csrf::{csrf_protect, CSRF_HEADER};
use crate::middleware::rate_limit::rate_limit;
use crate::middleware::RateLimits;
use crate::services::{
    ActionItemExtractor, GeminiClient, GoogleOAuthProvider, GoogleTasksClient, OAuthProvider,
    OAuthProviderConfig, RetryPolicy, TasksApi,
};

pub struct AppState {
    pub config: Config,
    // Google OAuth client (consent URL, code exchange, refresh, revoke)
    pub oauth: Arc<dyn OAuthProvider>,
    // Google Tasks insertion
    pub tasks: Arc<dyn TasksApi>,
    pub extractor: Arc<ActionItemExtractor>,
    pub rate_limits: RateLimits,
}

impl AppState {
    /// Wire the Google-backed collaborators over a shared HTTP client.
    pub fn from_config(config: Config, http_client: reqwest::Client) -> Self {
        let oauth = GoogleOAuthProvider::new(
            OAuthProviderConfig::google(&config),
            http_client.clone(),
        );
        let tasks = GoogleTasksClient::from_config(&config, http_client.clone());

        let extractor = match GeminiClient::from_config(&config, http_client) {
            Some(gemini) => {
                info!("Generative extraction enabled (model {})", config.gemini_model);
                ActionItemExtractor::with_generator(Arc::new(gemini), RetryPolicy::default())
            }
            None => {
                warn!("GEMINI_API_KEY not set, using pattern-based extraction only");
                ActionItemExtractor::fallback_only()
            }
        };

        Self::new(config, Arc::new(oauth), Arc::new(tasks), extractor)
    }

    pub fn new(
        config: Config,
        oauth: Arc<dyn OAuthProvider>,
        tasks: Arc<dyn TasksApi>,
        extractor: ActionItemExtractor,
    ) -> Self {
        let rate_limits = RateLimits::from_config(&config);
        Self {
            config,
            oauth,
            tasks,
            extractor: Arc::new(extractor),
            rate_limits,
        }
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origin = config
        .cors_origin
        .as_deref()
        .and_then(|o| HeaderValue::from_str(o).ok());

    match origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(CSRF_HEADER)])
            .max_age(Duration::from_secs(3600)),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .max_age(Duration::from_secs(3600)),
    }
}

/// Build the application router.
///
/// Requests pass the rate limiter, then CSRF protection, then the handler.
pub fn create_app(state: Arc<AppState>) -> Router {
    let config = &state.config;

    routes::routes(config)
        .layer(DefaultBodyLimit::max(config.json_body_limit_bytes))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            csrf_protect,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors_layer(config)),
        )
        .with_state(state.clone())
}
