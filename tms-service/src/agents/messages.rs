//! Agent message types for pool management
//!
//! These messages define the communication protocol between pool agents
//! and other components in the system.
//!
//! All messages derive `Clone` and `Debug` to satisfy the `ActonMessage` trait
//! requirements via blanket implementation.

/// Health status of a pool
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum HealthStatus {
    /// Pool is healthy and operational
    Healthy,
    /// Pool is degraded but operational
    Degraded,
    /// Pool is unhealthy/disconnected
    #[default]
    Unhealthy,
    /// Pool is in the process of connecting
    Connecting,
}


/// Response containing aggregated health status from all pools
#[derive(Clone, Debug, Default)]
pub struct AggregatedHealthResponse {
    /// Overall health status (unhealthy if any component is unhealthy)
    pub overall_healthy: bool,
    /// Individual pool health statuses
    pub components: Vec<ComponentHealth>,
}

/// Health status of a single component/pool
#[derive(Clone, Debug, Default)]
pub struct ComponentHealth {
    /// Component name (e.g., "database", "redis", "nats")
    pub name: String,
    /// Health status
    pub status: HealthStatus,
    /// Status message
    pub message: String,
}

// =============================================================================
// Internal messages for pool connection state management
// These are sent by spawned connection tasks back to the agent
// =============================================================================

/// Internal message sent when a database pool connects successfully
#[cfg(feature = "database")]
#[derive(Clone, Debug)]
pub(crate) struct DatabasePoolConnected {
    pub pool: sqlx::PgPool,
}

/// Internal message sent when a database pool connection fails
#[cfg(feature = "database")]
#[derive(Clone, Debug, Default)]
pub(crate) struct DatabasePoolConnectionFailed {
    pub error: String,
}

/// Internal message sent when a Redis pool connects successfully
#[cfg(feature = "cache")]
#[derive(Clone, Debug)]
pub(crate) struct RedisPoolConnected {
    pub pool: deadpool_redis::Pool,
}

/// Internal message sent when a Redis pool connection fails
#[cfg(feature = "cache")]
#[derive(Clone, Debug, Default)]
pub(crate) struct RedisPoolConnectionFailed {
    pub error: String,
}

// =============================================================================
// Health monitor agent messages
// =============================================================================

/// Broadcast sent by a pool agent whenever its connection health changes
#[derive(Clone, Debug, Default)]
pub struct PoolHealthUpdate {
    /// Which pool this update describes ("database", "redis")
    pub pool_type: String,
    /// Current health status
    pub status: HealthStatus,
    /// Human-readable detail
    pub message: String,
}

/// Query message requesting the cached aggregated health view
#[derive(Clone, Debug, Default)]
pub struct GetAggregatedHealth;

// =============================================================================
// JWT revocation agent messages
// =============================================================================

/// Write-behind request to mark a token revoked
#[derive(Clone, Debug, Default)]
pub struct RevokeToken {
    /// The token's `jti` claim
    pub token_id: String,
    /// When the revocation entry itself can be forgotten
    pub expires_at: std::time::SystemTime,
}

/// Periodic tick telling the revocation agent to drop expired cache entries
#[derive(Clone, Debug, Default)]
pub struct CleanupExpiredTokens;
