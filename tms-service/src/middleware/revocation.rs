//! Single-use token consumption tracking.
//!
//! A delegated-authentication exchange token must be redeemable exactly
//! once. This reuses the revoke-by-key-with-TTL shape that JWT revocation
//! lists use, keyed on a content hash of the exchange token rather than a
//! `jti`, so a replayed token is rejected even though it was never assigned
//! an identifier by its issuer.

use async_trait::async_trait;
use deadpool_redis::Pool as RedisPool;

use crate::error::Error;

/// Tracks consumption of single-use tokens (e.g. SSO exchange tokens).
#[async_trait]
pub trait TokenConsumption: Send + Sync {
    /// Returns true if the given key has already been consumed.
    async fn is_consumed(&self, key: &str) -> Result<bool, Error>;

    /// Marks a key as consumed, with a TTL in seconds bounding how long the
    /// replay-protection record needs to live (normally the exchange
    /// token's own lifetime).
    async fn consume(&self, key: &str, ttl_secs: u64) -> Result<(), Error>;
}

/// Redis-based revoked-JWT and single-use-token tracker.
///
/// Stores keys with automatic expiration (SETEX). JWT revocations use the
/// `jwt:revoked:{jti}` key pattern; single-use token consumption uses
/// `exchange:consumed:{hash}`.
#[derive(Clone)]
pub struct RedisTokenRevocation {
    pool: RedisPool,
}

impl RedisTokenRevocation {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    fn revocation_key(jti: &str) -> String {
        format!("jwt:revoked:{}", jti)
    }

    fn consumption_key(hash: &str) -> String {
        format!("exchange:consumed:{}", hash)
    }
}

#[async_trait]
impl crate::middleware::token::TokenRevocation for RedisTokenRevocation {
    async fn is_revoked(&self, jti: &str) -> Result<bool, Error> {
        use deadpool_redis::redis::AsyncCommands;

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| Error::Internal(format!("Failed to get Redis connection: {}", e)))?;

        let key = Self::revocation_key(jti);
        let exists: bool = conn
            .exists(&key)
            .await
            .map_err(|e| Error::Internal(format!("Failed to check revocation status: {}", e)))?;

        Ok(exists)
    }

    async fn revoke(&self, jti: &str, ttl_secs: u64) -> Result<(), Error> {
        use deadpool_redis::redis::AsyncCommands;

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| Error::Internal(format!("Failed to get Redis connection: {}", e)))?;

        let key = Self::revocation_key(jti);
        conn.set_ex::<_, _, ()>(&key, true, ttl_secs)
            .await
            .map_err(|e| Error::Internal(format!("Failed to set revocation: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl TokenConsumption for RedisTokenRevocation {
    async fn is_consumed(&self, key: &str) -> Result<bool, Error> {
        use deadpool_redis::redis::AsyncCommands;

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| Error::Internal(format!("Failed to get Redis connection: {}", e)))?;

        let redis_key = Self::consumption_key(key);
        let exists: bool = conn
            .exists(&redis_key)
            .await
            .map_err(|e| Error::Internal(format!("Failed to check consumption status: {}", e)))?;

        Ok(exists)
    }

    async fn consume(&self, key: &str, ttl_secs: u64) -> Result<(), Error> {
        use deadpool_redis::redis::AsyncCommands;

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| Error::Internal(format!("Failed to get Redis connection: {}", e)))?;

        let redis_key = Self::consumption_key(key);
        // NX so a racing second redemption sees it was already set and can
        // treat the token as consumed rather than silently overwriting.
        let set: bool = deadpool_redis::redis::cmd("SET")
            .arg(&redis_key)
            .arg(true)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Internal(format!("Failed to record consumption: {}", e)))?;

        if !set {
            return Err(Error::TokenRejected(
                "exchange token already consumed".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumption_key_is_namespaced() {
        assert_eq!(
            RedisTokenRevocation::consumption_key("abc"),
            "exchange:consumed:abc"
        );
    }

    #[test]
    fn revocation_key_is_namespaced() {
        assert_eq!(
            RedisTokenRevocation::revocation_key("jti-1"),
            "jwt:revoked:jti-1"
        );
    }
}
