pub mod client_info;
pub mod csrf;
pub mod rate_limit;
pub mod session;
pub mod validated_json;

pub use client_info::ClientInfo;
pub use rate_limit::RateLimits;
pub use session::SessionTokens;
pub use validated_json::ValidatedJson;
