//! Authentication configuration structures
//!
//! Configuration for the session-token generator used after a delegated
//! authentication exchange.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Token generation configuration
    #[serde(default)]
    pub tokens: TokenGenerationConfig,

    /// JWT-specific generation config (requires jwt feature)
    #[cfg(feature = "jwt")]
    #[serde(default)]
    pub jwt: Option<JwtGenerationConfig>,
}

/// Token generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGenerationConfig {
    /// Session token lifetime in seconds (default: 86400 = 24h)
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime_secs: i64,

    /// Issuer claim
    #[serde(default)]
    pub issuer: Option<String>,

    /// Audience claim (optional)
    #[serde(default)]
    pub audience: Option<String>,

    /// Include jti (token ID) for revocation support (default: true)
    #[serde(default = "default_true")]
    pub include_jti: bool,
}

impl Default for TokenGenerationConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime_secs: default_access_token_lifetime(),
            issuer: None,
            audience: None,
            include_jti: true,
        }
    }
}

/// JWT token generation configuration (requires jwt feature)
#[cfg(feature = "jwt")]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtGenerationConfig {
    /// Path to private key file (for signing), unused for HMAC algorithms
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,

    /// Shared secret for HMAC algorithms (HS256/HS512)
    #[serde(default)]
    pub shared_secret: Option<String>,

    /// JWT algorithm (HS256, HS512, RS256)
    pub algorithm: String,

    /// Issuer claim (overrides tokens.issuer if set)
    #[serde(default)]
    pub issuer: Option<String>,

    /// Audience claim (overrides tokens.audience if set)
    #[serde(default)]
    pub audience: Option<String>,
}

fn default_access_token_lifetime() -> i64 {
    86400 // 24 hours
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_config_defaults() {
        let config = TokenGenerationConfig::default();
        assert_eq!(config.access_token_lifetime_secs, 86400);
        assert!(config.include_jti);
    }
}
