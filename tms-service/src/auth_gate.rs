//! Delegated authentication: local signature/expiry verification and the
//! single-use defense for SSO exchange tokens.
//!
//! `AuthGate` never calls out to the identity provider to validate a
//! session token -- that is the whole point of delegated auth. It wraps
//! [`crate::middleware::jwt::JwtAuth`] for HS/RS signature and expiry
//! checking, and (when the `cache` feature is enabled) the
//! `TokenConsumption` trait from [`crate::middleware::revocation`] to burn
//! one-time exchange tokens.

use crate::config::JwtConfig;
use crate::error::{Error, Result};
use crate::middleware::jwt::JwtAuth;

/// The authenticated principal carried through a request or WebSocket
/// session once a token has passed [`AuthGate::authenticate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// `sub`, falling back to `id` if `sub` is absent (see `Claims::principal_id`).
    pub id: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Verifies bearer tokens presented on HTTP requests and WebSocket
/// handshakes, and burns single-use SSO exchange tokens.
#[derive(Clone)]
pub struct AuthGate {
    jwt: JwtAuth,
    #[cfg(feature = "cache")]
    consumption: Option<std::sync::Arc<dyn crate::middleware::revocation::TokenConsumption>>,
}

impl AuthGate {
    pub fn new(config: &JwtConfig) -> Result<Self> {
        Ok(Self {
            jwt: JwtAuth::new(config)?,
            #[cfg(feature = "cache")]
            consumption: None,
        })
    }

    /// Attach a single-use exchange-token consumption tracker (backed by
    /// Redis `SET ... NX EX`).
    #[cfg(feature = "cache")]
    pub fn with_consumption(
        mut self,
        consumption: std::sync::Arc<dyn crate::middleware::revocation::TokenConsumption>,
    ) -> Self {
        self.consumption = Some(consumption);
        self
    }

    /// Strip a leading `Bearer ` prefix from an `Authorization` header value.
    pub fn extract_token(header_value: &str) -> Result<&str> {
        header_value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::TokenRejected("missing or malformed Authorization header".into()))
    }

    /// Decode and verify a bearer token: signature, expiry, and principal
    /// extraction. Does not touch the network -- this is the ≤10ms local
    /// path the spec requires. Maps failures to `TokenRejected` (bad
    /// signature/expiry/missing id).
    pub async fn authenticate(&self, bearer_header: &str) -> Result<Principal> {
        let token = Self::extract_token(bearer_header)?;
        let claims = self
            .jwt
            .validate_token(token)
            .map_err(|e| Error::TokenRejected(e.to_string()))?;

        let id = claims.principal_id().ok_or_else(|| {
            Error::TokenRejected("token is missing both `sub` and `id` claims".into())
        })?;

        Ok(Principal {
            id: id.to_string(),
            email: claims.email.clone(),
            username: claims.username.clone(),
            roles: claims.roles.clone(),
        })
    }

    /// Burn a one-time SSO exchange token. The token's content is hashed
    /// (never stored in the clear) and the hash is used as the consumption
    /// key with a bounded TTL. A second presentation of the same token
    /// fails with `TokenRejected`.
    #[cfg(feature = "cache")]
    pub async fn consume_exchange_token(&self, raw_token: &str, ttl_secs: u64) -> Result<()> {
        let Some(consumption) = &self.consumption else {
            return Ok(());
        };
        let hash = blake3::hash(raw_token.as_bytes()).to_hex().to_string();
        // `consume` itself is the atomic NX check -- it returns
        // `TokenRejected` if this hash was already burned.
        consumption.consume(&hash, ttl_secs).await
    }

    #[cfg(not(feature = "cache"))]
    pub async fn consume_exchange_token(&self, _raw_token: &str, _ttl_secs: u64) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig {
            algorithm: "HS256".to_string(),
            shared_secret: Some("test-secret-at-least-32-bytes-long".to_string()),
            public_key_path: None,
            private_key_path: None,
            issuer: None,
            audience: None,
            expiration_hours: 720,
        }
    }

    #[test]
    fn extract_token_requires_bearer_prefix() {
        assert!(AuthGate::extract_token("not-bearer stuff").is_err());
        assert_eq!(AuthGate::extract_token("Bearer abc.def.ghi").unwrap(), "abc.def.ghi");
    }

    #[tokio::test]
    async fn authenticate_rejects_malformed_header() {
        let gate = AuthGate::new(&test_config()).unwrap();
        let result = gate.authenticate("abc.def.ghi").await;
        assert!(result.is_err());
    }
}
