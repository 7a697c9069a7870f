//! # tms-service
//!
//! Core of a team-messaging backend: delegated authentication and user
//! reflection caching, ordered per-conversation message ingest, a
//! real-time WebSocket fan-out bus, and delivery/read status tracking.
//!
//! ## Example
//!
//! ```rust,no_run
//! use tms_service::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let state = AppState::builder()
//!         .config(config.clone())
//!         .build()
//!         .await?;
//!
//!     let app = Router::new()
//!         .route("/health", get(health))
//!         .route("/ready", get(readiness))
//!         .with_state(state);
//!
//!     Server::new(config).serve(app).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod auth_gate;
pub mod blob_broker;
pub mod config;
pub mod conversation_store;
pub mod error;
pub mod event_envelope;
pub mod fanout;
pub mod health;
pub mod ids;
pub mod message_ingest;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod pool_health;
pub mod rate_limiter;
pub mod responses;
pub mod server;
pub mod service_builder;
pub mod state;
pub mod status_machine;
pub mod user_reflector;

#[cfg(feature = "database")]
pub mod database;

#[cfg(feature = "cache")]
pub mod cache;

#[cfg(feature = "websocket")]
pub mod websocket;

pub mod auth;

#[cfg(feature = "repository")]
pub mod repository;

/// Internal agent-based components.
///
/// Connection pool management is handled internally by agents. Callers
/// don't need to interact with this module directly -- use
/// `ServiceBuilder::build()` and access pools via `state.db()`, `state.redis()`.
pub mod agents;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, RateLimitConfig, RouteRateLimitConfig};

    pub use crate::error::{Error, Result};
    pub use crate::health::{health, pool_metrics, readiness};
    pub use crate::ids::{MakeTypedRequestId, RequestId, RequestIdError};
    pub use crate::pool_health::PoolHealthSummary;

    #[cfg(feature = "database")]
    pub use crate::pool_health::DatabasePoolHealth;

    #[cfg(feature = "cache")]
    pub use crate::pool_health::RedisPoolHealth;

    pub use crate::middleware::{
        normalize_path, request_id_layer, request_id_propagation_layer, sensitive_headers_layer,
        Claims, RateLimit, RequestTrackingConfig, TokenValidator,
        PROPAGATE_HEADERS, SENSITIVE_HEADERS,
    };

    #[cfg(feature = "cache")]
    pub use crate::middleware::{RedisTokenRevocation, TokenRevocation};

    #[cfg(feature = "jwt")]
    pub use crate::middleware::JwtAuth;

    pub use crate::server::Server;
    pub use crate::service_builder::{ActonService, ServiceBuilder};
    pub use crate::state::{AppState, AppStateBuilder};
    pub use crate::responses::{
        Accepted, Conflict, Created, FieldError, NoContent, Success, ValidationError,
    };

    #[cfg(feature = "governor")]
    pub use crate::middleware::{GovernorConfig, GovernorRateLimit, RateLimitExceeded};

    #[cfg(feature = "observability")]
    pub use crate::observability::init_tracing;

    // Auth module exports
    pub use crate::auth::{AuthConfig, ClaimsBuilder, JwtGenerationConfig, TokenGenerator};

    #[cfg(feature = "jwt")]
    pub use crate::auth::JwtGenerator;

    #[cfg(feature = "websocket")]
    pub use crate::websocket::{
        Broadcaster, BroadcastTarget, ConnectionId, RoomConfig, WebSocket, WebSocketConfig,
        WebSocketConnection, WebSocketUpgrade, Message as WsMessage,
    };

    // Domain components
    pub use crate::auth_gate::{AuthGate, Principal};
    pub use crate::blob_broker::BlobBroker;
    pub use crate::conversation_store::ConversationStore;
    pub use crate::event_envelope::{conversation_room, Event, EventEnvelope};
    pub use crate::fanout::FanOut;
    pub use crate::message_ingest::{MessageIngest, SendMessageRequest};
    pub use crate::models::{
        Conversation, ConversationMember, ConversationRole, ConversationType, DeleteScope,
        Message, MessageReaction, MessageStatus, MessageStatusValue, MessageType, User,
        UserBlock,
    };
    pub use crate::rate_limiter::{RateLimitClass, RateLimiter};
    pub use crate::status_machine::StatusMachine;
    pub use crate::user_reflector::UserReflector;

    // Pool health monitoring (user-facing)
    pub use crate::agents::{AggregatedHealthResponse, HealthStatus};

    pub use axum::{
        extract::{Path, Query, State},
        http::{HeaderMap, HeaderValue, StatusCode},
        response::{IntoResponse, Json, Response},
        routing::{delete, get, patch, post, put},
        Extension, Router,
    };

    pub use serde::{Deserialize, Serialize};

    pub use tracing::{debug, error, info, instrument, trace, warn, Level, Span};

    pub use tokio;

    pub use async_trait::async_trait;

    pub use thiserror::Error;
    pub use anyhow::{self, Context as AnyhowContext};

    pub use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};

    pub use uuid::Uuid;

    pub use futures::{future, stream, Future, Stream, StreamExt, TryFutureExt, TryStreamExt};

    pub use http::{Method, Uri};

    pub use acton_reactive::prelude::*;
}
