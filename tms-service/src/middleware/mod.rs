//! Middleware for authentication, rate limiting, and request tracking

// Token abstraction layer (always available)
pub mod token;

// Token revocation (requires cache feature) — repurposed for single-use
// exchange-token consumption tracking.
#[cfg(feature = "cache")]
pub mod revocation;

// JWT authentication (requires jwt feature)
#[cfg(feature = "jwt")]
pub mod jwt;

pub mod rate_limit;
pub mod request_tracking;
pub mod route_matcher;

#[cfg(feature = "governor")]
pub mod governor;

// Token abstraction exports (always available)
pub use token::{Claims, TokenValidator};

#[cfg(feature = "cache")]
pub use token::TokenRevocation;

// Token revocation exports (requires cache)
#[cfg(feature = "cache")]
pub use revocation::RedisTokenRevocation;

// JWT exports (requires jwt feature)
#[cfg(feature = "jwt")]
pub use jwt::JwtAuth;

// Other middleware exports
pub use rate_limit::RateLimit;
pub use route_matcher::normalize_path;
pub use request_tracking::{
    request_id_layer, request_id_propagation_layer, sensitive_headers_layer,
    RequestTrackingConfig, PROPAGATE_HEADERS, SENSITIVE_HEADERS,
};

#[cfg(feature = "governor")]
pub use governor::{GovernorConfig, GovernorRateLimit, RateLimitExceeded};
