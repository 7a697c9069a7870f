//! Local cache of identity-provider users ("reflection"): read the local
//! row if fresh, otherwise re-sync from the IdP without ever blocking a
//! request on IdP availability.

use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;

use crate::config::IdpConfig;
use crate::error::{Error, Result};
use crate::models::{User, USER_STALENESS_SECS};

/// Shape returned by the identity provider. Field names are accepted in
/// either camelCase or snake_case since upstream services are inconsistent
/// about it.
#[derive(Debug, Deserialize)]
struct IdpUser {
    #[serde(alias = "tmsUserId", alias = "tms_user_id", alias = "id")]
    tms_user_id: String,
    email: String,
    #[serde(alias = "displayName", alias = "display_name")]
    display_name: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    division: Option<String>,
    #[serde(default)]
    department: Option<String>,
    #[serde(alias = "isActive", alias = "is_active", default = "default_true")]
    is_active: bool,
    #[serde(alias = "isLeader", alias = "is_leader", default)]
    is_leader: bool,
    #[serde(alias = "imageUrl", alias = "image_url", default)]
    image_url: Option<String>,
    #[serde(alias = "settingsJson", alias = "settings_json", default)]
    settings_json: Option<serde_json::Value>,
}

const fn default_true() -> bool {
    true
}

/// Reflects identity-provider users into the local store, with an optional
/// `user:{id}` Redis cache in front.
pub struct UserReflector {
    #[cfg(feature = "database")]
    pool: sqlx::PgPool,
    http: reqwest::Client,
    idp: IdpConfig,
    #[cfg(feature = "cache")]
    redis: Option<deadpool_redis::Pool>,
}

impl UserReflector {
    #[cfg(feature = "database")]
    pub fn new(pool: sqlx::PgPool, idp: IdpConfig) -> Self {
        Self {
            pool,
            http: reqwest::Client::new(),
            idp,
            #[cfg(feature = "cache")]
            redis: None,
        }
    }

    #[cfg(feature = "cache")]
    pub fn with_cache(mut self, redis: deadpool_redis::Pool) -> Self {
        self.redis = Some(redis);
        self
    }

    /// Read the local reflected row without triggering a sync, regardless
    /// of staleness. Returns `None` if no local record exists yet.
    #[cfg(feature = "database")]
    pub async fn get_local_user(&self, tms_user_id: &str) -> Result<Option<User>> {
        if let Some(user) = self.get_cached(tms_user_id).await {
            return Ok(Some(user));
        }

        let row = sqlx::query(
            "SELECT id, tms_user_id, email, display_name, role, division, department, \
             is_active, is_leader, image_url, last_synced_at, settings_json \
             FROM users WHERE tms_user_id = $1",
        )
        .bind(tms_user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        let Some(row) = row else { return Ok(None) };
        let user = Self::user_from_row(&row)?;
        self.cache_user(&user).await;
        Ok(Some(user))
    }

    /// Return a fresh local user, re-syncing from the IdP first if the
    /// local record is absent or older than `USER_STALENESS_SECS`.
    ///
    /// If the IdP call fails and a local record already exists, the stale
    /// local record is returned rather than propagating the failure --
    /// degraded service beats an outage for every message view.
    #[cfg(feature = "database")]
    pub async fn ensure_fresh(&self, tms_user_id: &str) -> Result<User> {
        let local = self.get_local_user(tms_user_id).await?;

        let needs_sync = match &local {
            None => true,
            Some(u) => (Utc::now() - u.last_synced_at).num_seconds() > USER_STALENESS_SECS,
        };

        if !needs_sync {
            return Ok(local.expect("checked above"));
        }

        match self.sync_from_idp(tms_user_id).await {
            Ok(user) => Ok(user),
            Err(e) => {
                if let Some(stale) = local {
                    tracing::warn!(
                        tms_user_id,
                        error = %e,
                        "IdP sync failed, serving stale local user"
                    );
                    Ok(stale)
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Build a user from principal-hint claims (no local record, IdP
    /// unreachable). `last_synced_at` is deliberately set far in the past
    /// so the next successful sync overwrites this placeholder.
    pub fn synthesize_from_principal(
        &self,
        tms_user_id: &str,
        email: Option<&str>,
        username: Option<&str>,
    ) -> User {
        User {
            id: tms_user_id.to_string(),
            tms_user_id: tms_user_id.to_string(),
            email: email.unwrap_or_default().to_string(),
            display_name: username.unwrap_or(tms_user_id).to_string(),
            role: None,
            division: None,
            department: None,
            is_active: true,
            is_leader: false,
            image_url: None,
            last_synced_at: Utc::now() - chrono::Duration::seconds(USER_STALENESS_SECS * 2),
            settings_json: None,
        }
    }

    /// Fetch the user-by-id from the IdP and upsert it locally.
    #[cfg(feature = "database")]
    pub async fn sync_from_idp(&self, tms_user_id: &str) -> Result<User> {
        let url = format!(
            "{}/users/{}",
            self.idp.api_url.trim_end_matches('/'),
            tms_user_id
        );

        let response = self
            .http
            .get(&url)
            .header("X-API-Key", &self.idp.api_key)
            .timeout(Duration::from_secs(self.idp.timeout_secs))
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("identity provider unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "identity provider returned {}",
                response.status()
            )));
        }

        let idp_user: IdpUser = response
            .json()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("malformed identity provider response: {e}")))?;

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO users (id, tms_user_id, email, display_name, role, division, \
             department, is_active, is_leader, image_url, last_synced_at, settings_json) \
             VALUES ($1, $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (tms_user_id) DO UPDATE SET \
               email = EXCLUDED.email, display_name = EXCLUDED.display_name, \
               role = EXCLUDED.role, division = EXCLUDED.division, \
               department = EXCLUDED.department, is_active = EXCLUDED.is_active, \
               is_leader = EXCLUDED.is_leader, image_url = EXCLUDED.image_url, \
               last_synced_at = EXCLUDED.last_synced_at, settings_json = EXCLUDED.settings_json",
        )
        .bind(&idp_user.tms_user_id)
        .bind(&idp_user.email)
        .bind(&idp_user.display_name)
        .bind(&idp_user.role)
        .bind(&idp_user.division)
        .bind(&idp_user.department)
        .bind(idp_user.is_active)
        .bind(idp_user.is_leader)
        .bind(&idp_user.image_url)
        .bind(now)
        .bind(&idp_user.settings_json)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        let user = User {
            id: idp_user.tms_user_id.clone(),
            tms_user_id: idp_user.tms_user_id,
            email: idp_user.email,
            display_name: idp_user.display_name,
            role: idp_user.role,
            division: idp_user.division,
            department: idp_user.department,
            is_active: idp_user.is_active,
            is_leader: idp_user.is_leader,
            image_url: idp_user.image_url,
            last_synced_at: now,
            settings_json: idp_user.settings_json,
        };

        self.cache_user(&user).await;
        Ok(user)
    }

    /// Delegate a user search to the identity provider. The local reflection
    /// is a cache, not a search index -- the IdP is the source of truth for
    /// discovery.
    pub async fn search_users(&self, query: &str) -> Result<Vec<User>> {
        let url = format!("{}/users", self.idp.api_url.trim_end_matches('/'));

        let response = self
            .http
            .get(&url)
            .query(&[("q", query)])
            .header("X-API-Key", &self.idp.api_key)
            .timeout(Duration::from_secs(self.idp.timeout_secs))
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("identity provider unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "identity provider returned {}",
                response.status()
            )));
        }

        let idp_users: Vec<IdpUser> = response
            .json()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("malformed identity provider response: {e}")))?;

        let now = Utc::now();
        Ok(idp_users
            .into_iter()
            .map(|u| User {
                id: u.tms_user_id.clone(),
                tms_user_id: u.tms_user_id,
                email: u.email,
                display_name: u.display_name,
                role: u.role,
                division: u.division,
                department: u.department,
                is_active: u.is_active,
                is_leader: u.is_leader,
                image_url: u.image_url,
                last_synced_at: now,
                settings_json: u.settings_json,
            })
            .collect())
    }

    #[cfg(feature = "database")]
    fn user_from_row(row: &sqlx::postgres::PgRow) -> Result<User> {
        use sqlx::Row;
        Ok(User {
            id: row.try_get("id").map_err(crate::error::DatabaseError::from)?,
            tms_user_id: row.try_get("tms_user_id").map_err(crate::error::DatabaseError::from)?,
            email: row.try_get("email").map_err(crate::error::DatabaseError::from)?,
            display_name: row.try_get("display_name").map_err(crate::error::DatabaseError::from)?,
            role: row.try_get("role").map_err(crate::error::DatabaseError::from)?,
            division: row.try_get("division").map_err(crate::error::DatabaseError::from)?,
            department: row.try_get("department").map_err(crate::error::DatabaseError::from)?,
            is_active: row.try_get("is_active").map_err(crate::error::DatabaseError::from)?,
            is_leader: row.try_get("is_leader").map_err(crate::error::DatabaseError::from)?,
            image_url: row.try_get("image_url").map_err(crate::error::DatabaseError::from)?,
            last_synced_at: row.try_get("last_synced_at").map_err(crate::error::DatabaseError::from)?,
            settings_json: row.try_get("settings_json").map_err(crate::error::DatabaseError::from)?,
        })
    }

    #[cfg(feature = "cache")]
    async fn get_cached(&self, tms_user_id: &str) -> Option<User> {
        let redis = self.redis.as_ref()?;
        let mut conn = redis.get().await.ok()?;
        let raw: Option<String> = deadpool_redis::redis::AsyncCommands::get(&mut conn, Self::cache_key(tms_user_id))
            .await
            .ok()?;
        raw.and_then(|s| serde_json::from_str(&s).ok())
    }

    #[cfg(not(feature = "cache"))]
    async fn get_cached(&self, _tms_user_id: &str) -> Option<User> {
        None
    }

    /// Populate the `user:{id}` cache entry. Cache failures are swallowed --
    /// the local table is authoritative, the cache only saves round trips.
    #[cfg(feature = "cache")]
    async fn cache_user(&self, user: &User) {
        let Some(redis) = &self.redis else { return };
        let Ok(mut conn) = redis.get().await else { return };
        if let Ok(json) = serde_json::to_string(user) {
            let _: Result<(), _> = deadpool_redis::redis::cmd("SET")
                .arg(Self::cache_key(&user.tms_user_id))
                .arg(json)
                .arg("EX")
                .arg(600u64)
                .query_async(&mut conn)
                .await;
        }
    }

    #[cfg(not(feature = "cache"))]
    async fn cache_user(&self, _user: &User) {}

    #[cfg(feature = "cache")]
    fn cache_key(tms_user_id: &str) -> String {
        format!("user:{tms_user_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_user_is_marked_stale() {
        let config = IdpConfig {
            api_url: "https://idp.example.com".to_string(),
            api_key: "key".to_string(),
            timeout_secs: 30,
        };
        let reflector = UserReflectorTestHarness::new(config);
        let user = reflector.synthesize_from_principal("u-1", Some("a@example.com"), Some("alice"));
        assert_eq!(user.tms_user_id, "u-1");
        assert!((Utc::now() - user.last_synced_at).num_seconds() > USER_STALENESS_SECS);
    }

    // `UserReflector` requires a live pool to construct under the `database`
    // feature; this harness exercises the pool-independent logic only.
    struct UserReflectorTestHarness {
        idp: IdpConfig,
    }

    impl UserReflectorTestHarness {
        fn new(idp: IdpConfig) -> Self {
            Self { idp }
        }

        fn synthesize_from_principal(&self, tms_user_id: &str, email: Option<&str>, username: Option<&str>) -> User {
            let _ = &self.idp;
            User {
                id: tms_user_id.to_string(),
                tms_user_id: tms_user_id.to_string(),
                email: email.unwrap_or_default().to_string(),
                display_name: username.unwrap_or(tms_user_id).to_string(),
                role: None,
                division: None,
                department: None,
                is_active: true,
                is_leader: false,
                image_url: None,
                last_synced_at: Utc::now() - chrono::Duration::seconds(USER_STALENESS_SECS * 2),
                settings_json: None,
            }
        }
    }
}
