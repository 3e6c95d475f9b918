use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{header, request::Parts, HeaderMap};
use tracing::warn;

use crate::AppState;

const UNKNOWN: &str = "unknown";

/// Caller identity used for rate limiting and security logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn from_parts(parts: &Parts, trust_proxy: bool) -> Self {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        let forwarded = if trust_proxy {
            forwarded_for(&parts.headers)
        } else {
            None
        };

        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(UNKNOWN)
            .to_string();

        Self {
            ip: forwarded.or(peer).unwrap_or_else(|| UNKNOWN.to_string()),
            user_agent,
        }
    }

    /// Log a rejected request with a stable reason code.
    pub fn security_event(&self, reason: &str, detail: &str) {
        warn!(
            ip = %self.ip,
            user_agent = %self.user_agent,
            reason = reason,
            "Security event: {}",
            detail
        );
    }
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for ClientInfo {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts, state.config.trust_proxy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(request: Request<()>) -> Parts {
        request.into_parts().0
    }

    #[test]
    fn test_peer_address() {
        let mut request = Request::builder()
            .header("user-agent", "curl/8.0")
            .header("x-forwarded-for", "203.0.113.9")
            .body(())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 5000))));

        let info = ClientInfo::from_parts(&parts(request), false);
        assert_eq!(info.ip, "10.0.0.7");
        assert_eq!(info.user_agent, "curl/8.0");
    }

    #[test]
    fn test_trusted_forwarded_for() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(())
            .unwrap();
        let info = ClientInfo::from_parts(&parts(request), true);
        assert_eq!(info.ip, "203.0.113.9");
        assert_eq!(info.user_agent, "unknown");
    }

    #[test]
    fn test_unknown_without_peer() {
        let request = Request::builder().body(()).unwrap();
        assert_eq!(ClientInfo::from_parts(&parts(request), true).ip, "unknown");
    }
}
