//! Application state management

use std::sync::Arc;

#[cfg(any(feature = "database", feature = "cache"))]
use tokio::sync::RwLock;

#[cfg(feature = "database")]
use sqlx::PgPool;

#[cfg(feature = "cache")]
use deadpool_redis::Pool as RedisPool;

use acton_reactive::prelude::AgentHandle;

use crate::auth_gate::AuthGate;
use crate::blob_broker::BlobBroker;
use crate::conversation_store::ConversationStore;
use crate::error::Error;
use crate::fanout::FanOut;
use crate::message_ingest::MessageIngest;
use crate::rate_limiter::RateLimiter;
use crate::status_machine::StatusMachine;
use crate::user_reflector::UserReflector;
use crate::{config::Config, error::Result};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,

    #[cfg(feature = "database")]
    db_pool: Arc<RwLock<Option<PgPool>>>,

    #[cfg(feature = "cache")]
    redis_pool: Arc<RwLock<Option<RedisPool>>>,

    /// Agent broker handle for type-safe event broadcasting
    ///
    /// When the acton-reactive runtime is initialized, HTTP handlers can use
    /// this broker to broadcast typed events to subscribed agents (e.g. the
    /// WebSocket fan-out agent).
    broker: Option<AgentHandle>,

    /// Bearer-token verification and SSO exchange-token consumption.
    #[cfg(feature = "jwt")]
    auth_gate: Arc<AuthGate>,

    /// Connection/room/heartbeat bookkeeping for the WebSocket surface.
    #[cfg(feature = "websocket")]
    fanout: Arc<FanOut>,

    /// Per-principal, per-class rate limiting (general API, send-message,
    /// WS events, upload URL).
    rate_limiter: Arc<RateLimiter>,

    /// Presigned upload/download URLs for attachments. `None` when no
    /// object store is configured.
    blob_broker: Option<Arc<BlobBroker>>,
}

impl Default for AppState {
    fn default() -> Self {
        let config = Config::default();
        Self {
            #[cfg(feature = "jwt")]
            auth_gate: Arc::new(
                AuthGate::new(&config.jwt).expect("default JWT config builds a valid AuthGate"),
            ),
            #[cfg(feature = "websocket")]
            fanout: Arc::new(FanOut::new()),
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
            blob_broker: config.object_store.clone().map(|c| Arc::new(BlobBroker::new(c))),
            config: Arc::new(config),
            #[cfg(feature = "database")]
            db_pool: Arc::new(RwLock::new(None)),
            #[cfg(feature = "cache")]
            redis_pool: Arc::new(RwLock::new(None)),
            broker: None,
        }
    }
}

impl AppState {
    /// Create a new AppState with the given configuration
    ///
    /// This creates an AppState with no connection pools initialized.
    /// For lazy initialization of connections, use `AppStateBuilder` instead.
    pub fn new(config: Config) -> Self {
        #[cfg(feature = "jwt")]
        let auth_gate = Arc::new(
            AuthGate::new(&config.jwt).expect("configured JWT settings build a valid AuthGate"),
        );
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let blob_broker = config.object_store.clone().map(|c| Arc::new(BlobBroker::new(c)));

        Self {
            #[cfg(feature = "jwt")]
            auth_gate,
            #[cfg(feature = "websocket")]
            fanout: Arc::new(FanOut::new()),
            rate_limiter,
            blob_broker,
            config: Arc::new(config),
            #[cfg(feature = "database")]
            db_pool: Arc::new(RwLock::new(None)),
            #[cfg(feature = "cache")]
            redis_pool: Arc::new(RwLock::new(None)),
            broker: None,
        }
    }

    /// Create a new builder for AppState
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the database pool (async to handle RwLock)
    ///
    /// Returns a cloned PgPool if available. PgPool uses Arc internally,
    /// so cloning is cheap.
    #[cfg(feature = "database")]
    pub async fn db(&self) -> Option<PgPool> {
        self.db_pool.read().await.clone()
    }

    /// Get direct access to the database pool RwLock
    ///
    /// Use this if you need to check availability without acquiring the pool
    #[cfg(feature = "database")]
    pub fn db_lock(&self) -> &Arc<RwLock<Option<PgPool>>> {
        &self.db_pool
    }

    /// Get the Redis pool (async to handle RwLock)
    ///
    /// Returns a cloned RedisPool if available. RedisPool uses Arc internally,
    /// so cloning is cheap.
    #[cfg(feature = "cache")]
    pub async fn redis(&self) -> Option<RedisPool> {
        self.redis_pool.read().await.clone()
    }

    /// Get direct access to the Redis pool RwLock
    #[cfg(feature = "cache")]
    pub fn redis_lock(&self) -> &Arc<RwLock<Option<RedisPool>>> {
        &self.redis_pool
    }

    /// Get the agent broker handle for event broadcasting
    ///
    /// Returns the broker handle if the acton-reactive runtime was initialized.
    /// HTTP handlers can use this to broadcast typed events to subscribed agents,
    /// e.g. publishing a delivered message to the WebSocket fan-out agent.
    pub fn broker(&self) -> Option<&AgentHandle> {
        self.broker.as_ref()
    }

    /// Set the agent broker handle
    ///
    /// This is typically called by `ServiceBuilder` when an agent runtime
    /// is initialized via `with_agent_runtime()`.
    pub fn set_broker(&mut self, broker: AgentHandle) {
        self.broker = Some(broker);
    }

    /// Get pool health metrics for all configured pools
    ///
    /// Returns a summary of connection pool health including utilization,
    /// availability, and connection status for database and cache.
    pub async fn pool_health(&self) -> crate::pool_health::PoolHealthSummary {
        let mut summary = crate::pool_health::PoolHealthSummary::new();

        #[cfg(feature = "database")]
        if let Some(pool) = self.db().await {
            if let Some(db_config) = &self.config.database {
                summary.database = Some(crate::pool_health::DatabasePoolHealth::from_pool(
                    &pool, db_config,
                ));
            }
        }

        #[cfg(feature = "cache")]
        if let Some(pool) = self.redis().await {
            if let Some(redis_config) = &self.config.redis {
                summary.redis = Some(crate::pool_health::RedisPoolHealth::from_pool(
                    &pool,
                    redis_config,
                ));
            }
        }

        summary.healthy = summary.is_healthy();
        summary
    }

    /// Bearer-token verification and SSO exchange-token consumption.
    #[cfg(feature = "jwt")]
    pub fn auth_gate(&self) -> &AuthGate {
        &self.auth_gate
    }

    /// Connection/room/heartbeat bookkeeping for the WebSocket surface.
    #[cfg(feature = "websocket")]
    pub fn fanout(&self) -> &FanOut {
        &self.fanout
    }

    /// Per-principal, per-class rate limiting.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Presigned upload/download URLs for attachments, if an object store
    /// is configured.
    pub fn blob_broker(&self) -> Option<&BlobBroker> {
        self.blob_broker.as_deref()
    }

    /// Conversation membership, creation, and search, built fresh from the
    /// current database pool. Cheap: `ConversationStore` only wraps a
    /// `PgPool`, which is itself an `Arc` internally.
    #[cfg(feature = "database")]
    pub async fn conversations(&self) -> Result<ConversationStore> {
        let pool = self
            .db()
            .await
            .ok_or_else(|| Error::UpstreamUnavailable("database pool not initialized".into()))?;
        Ok(ConversationStore::new(pool))
    }

    /// Message send/edit/delete/react pipeline, built fresh from the
    /// current database pool.
    #[cfg(feature = "database")]
    pub async fn messages(&self) -> Result<MessageIngest> {
        let pool = self
            .db()
            .await
            .ok_or_else(|| Error::UpstreamUnavailable("database pool not initialized".into()))?;
        Ok(MessageIngest::new(pool.clone(), ConversationStore::new(pool)))
    }

    /// Delivery/read status tracking, built fresh from the current
    /// database pool.
    #[cfg(feature = "database")]
    pub async fn statuses(&self) -> Result<StatusMachine> {
        let pool = self
            .db()
            .await
            .ok_or_else(|| Error::UpstreamUnavailable("database pool not initialized".into()))?;
        Ok(StatusMachine::new(pool))
    }

    /// Identity-provider user reflection, built fresh from the current
    /// database pool and (if configured) the Redis cache.
    #[cfg(feature = "database")]
    pub async fn user_reflector(&self) -> Result<UserReflector> {
        let pool = self
            .db()
            .await
            .ok_or_else(|| Error::UpstreamUnavailable("database pool not initialized".into()))?;
        let reflector = UserReflector::new(pool, self.config.idp.clone());

        #[cfg(feature = "cache")]
        let reflector = match self.redis().await {
            Some(redis) => reflector.with_cache(redis),
            None => reflector,
        };

        Ok(reflector)
    }
}

/// Builder for AppState
pub struct AppStateBuilder {
    config: Option<Config>,
    enable_tracing: bool,

    #[cfg(feature = "database")]
    db_pool: Option<PgPool>,

    #[cfg(feature = "cache")]
    redis_pool: Option<RedisPool>,

    broker: Option<AgentHandle>,
}

impl AppStateBuilder {
    /// Create a new builder with sensible defaults
    ///
    /// By default:
    /// - Config will be loaded from `Config::default()` if not provided
    /// - Tracing will be auto-initialized if not already set up
    pub fn new() -> Self {
        Self {
            config: None,
            enable_tracing: true,
            #[cfg(feature = "database")]
            db_pool: None,
            #[cfg(feature = "cache")]
            redis_pool: None,
            broker: None,
        }
    }

    /// Set the configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the database pool
    #[cfg(feature = "database")]
    pub fn db_pool(mut self, pool: PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    /// Set the Redis pool
    #[cfg(feature = "cache")]
    pub fn redis_pool(mut self, pool: RedisPool) -> Self {
        self.redis_pool = Some(pool);
        self
    }

    /// Set the agent broker handle for event broadcasting
    ///
    /// The broker handle can be obtained from `AgentRuntime::broker()` after
    /// initializing the acton-reactive runtime via `ServiceBuilder::with_agent_runtime()`.
    pub fn broker(mut self, broker: AgentHandle) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Enable automatic tracing initialization (default: enabled)
    pub fn with_tracing(mut self) -> Self {
        self.enable_tracing = true;
        self
    }

    /// Disable automatic tracing initialization
    ///
    /// Use this if you want to set up tracing manually or if your application
    /// already has tracing configured before calling `build()`.
    pub fn without_tracing(mut self) -> Self {
        self.enable_tracing = false;
        self
    }

    /// Initialize tracing with sensible defaults
    ///
    /// This is called automatically during `build()` unless disabled with `without_tracing()`.
    /// It's safe to call multiple times - subsequent calls are no-ops.
    fn init_tracing() {
        use std::sync::Once;
        static INIT: Once = Once::new();

        INIT.call_once(|| {
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::INFO)
                .with_target(false)
                .init();
            tracing::debug!("Tracing initialized with default configuration");
        });
    }

    /// Build the AppState, initializing connection pools as needed
    ///
    /// This will:
    /// - Use provided config or load `Config::default()` if not set
    /// - Initialize tracing with sensible defaults (unless disabled or already initialized)
    /// - Set up database and cache connections based on config
    pub async fn build(self) -> Result<AppState> {
        if self.enable_tracing {
            Self::init_tracing();
        }

        let config = self.config.unwrap_or_default();

        #[cfg(feature = "database")]
        let db_pool = if let Some(pool) = self.db_pool {
            Arc::new(RwLock::new(Some(pool)))
        } else if let Some(db_config) = &config.database {
            if db_config.lazy_init {
                let pool_lock = Arc::new(RwLock::new(None));
                let pool_clone = pool_lock.clone();
                let db_config_clone = db_config.clone();

                tokio::spawn(async move {
                    tracing::info!("Initiating lazy database connection...");
                    match crate::database::create_pool(&db_config_clone).await {
                        Ok(pool) => {
                            *pool_clone.write().await = Some(pool);
                            tracing::info!("Lazy database connection established successfully");
                        }
                        Err(e) => {
                            if db_config_clone.optional {
                                tracing::warn!("Optional database connection failed: {}. Service will continue without database.", e);
                            } else {
                                tracing::error!("Required database connection failed: {}. Service is degraded.", e);
                            }
                        }
                    }
                });

                pool_lock
            } else {
                match crate::database::create_pool(db_config).await {
                    Ok(pool) => Arc::new(RwLock::new(Some(pool))),
                    Err(e) => {
                        if db_config.optional {
                            tracing::warn!("Optional database connection failed: {}. Service starting without database.", e);
                            Arc::new(RwLock::new(None))
                        } else {
                            return Err(e);
                        }
                    }
                }
            }
        } else {
            Arc::new(RwLock::new(None))
        };

        #[cfg(feature = "cache")]
        let redis_pool = if let Some(pool) = self.redis_pool {
            Arc::new(RwLock::new(Some(pool)))
        } else if let Some(redis_config) = &config.redis {
            if redis_config.lazy_init {
                let pool_lock = Arc::new(RwLock::new(None));
                let pool_clone = pool_lock.clone();
                let redis_config_clone = redis_config.clone();

                tokio::spawn(async move {
                    tracing::info!("Initiating lazy Redis connection...");
                    match crate::cache::create_pool(&redis_config_clone).await {
                        Ok(pool) => {
                            *pool_clone.write().await = Some(pool);
                            tracing::info!("Lazy Redis connection established successfully");
                        }
                        Err(e) => {
                            if redis_config_clone.optional {
                                tracing::warn!("Optional Redis connection failed: {}. Service will continue without Redis.", e);
                            } else {
                                tracing::error!("Required Redis connection failed: {}. Service is degraded.", e);
                            }
                        }
                    }
                });

                pool_lock
            } else {
                match crate::cache::create_pool(redis_config).await {
                    Ok(pool) => Arc::new(RwLock::new(Some(pool))),
                    Err(e) => {
                        if redis_config.optional {
                            tracing::warn!("Optional Redis connection failed: {}. Service starting without Redis.", e);
                            Arc::new(RwLock::new(None))
                        } else {
                            return Err(e);
                        }
                    }
                }
            }
        } else {
            Arc::new(RwLock::new(None))
        };

        #[cfg(feature = "jwt")]
        let auth_gate = Arc::new(AuthGate::new(&config.jwt)?);
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let blob_broker = config.object_store.clone().map(|c| Arc::new(BlobBroker::new(c)));

        Ok(AppState {
            #[cfg(feature = "jwt")]
            auth_gate,
            #[cfg(feature = "websocket")]
            fanout: Arc::new(FanOut::new()),
            rate_limiter,
            blob_broker,
            config: Arc::new(config),
            #[cfg(feature = "database")]
            db_pool,
            #[cfg(feature = "cache")]
            redis_pool,
            broker: self.broker,
        })
    }
}

impl Default for AppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_builder() {
        let config = Config::default();
        let builder = AppStateBuilder::new()
            .config(config)
            .without_tracing(); // Disable tracing in tests to avoid global subscriber conflicts

        let state = builder.build().await.unwrap();
        assert_eq!(state.config().service.name, "tms-service");
    }

    #[tokio::test]
    async fn test_state_builder_defaults() {
        let state = AppStateBuilder::new()
            .without_tracing()
            .build()
            .await
            .unwrap();

        assert_eq!(state.config().service.name, "tms-service");
    }
}
