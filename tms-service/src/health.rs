//! Health check handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{error::Error, state::AppState};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service name
    pub service: String,

    /// Version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Readiness check response with dependency status
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Overall readiness status
    pub ready: bool,

    /// Service name
    pub service: String,

    /// Dependency statuses
    pub dependencies: HashMap<String, DependencyStatus>,
}

/// Individual dependency status
#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    /// Dependency is healthy
    pub healthy: bool,

    /// Optional message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Simple health check (liveness probe)
///
/// Always returns 200 OK if the service is running.
/// This is used by Kubernetes to determine if the pod should be restarted.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        service: state.config().service.name.clone(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    };

    (StatusCode::OK, Json(response))
}

/// Readiness check with dependency validation (readiness probe)
///
/// Returns 200 OK only when the relational store is reachable, the JWT
/// signing secret/key is loaded, and the identity provider responded to a
/// recent probe. Returns 503 Service Unavailable otherwise so the pod is
/// taken out of rotation rather than serving requests it cannot fulfil.
pub async fn readiness(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let mut dependencies = HashMap::new();
    let mut all_ready = true;

    #[cfg(feature = "database")]
    if state.config().database.is_some() {
        match state.db().await {
            Some(db_pool) => match sqlx::query("SELECT 1").fetch_one(&db_pool).await {
                Ok(_) => {
                    dependencies.insert(
                        "database".to_string(),
                        DependencyStatus {
                            healthy: true,
                            message: Some("Connected".to_string()),
                        },
                    );
                }
                Err(e) => {
                    tracing::error!("Database health check failed: {}", e);
                    let is_optional = state
                        .config()
                        .database
                        .as_ref()
                        .map(|db| db.optional)
                        .unwrap_or(false);

                    if !is_optional {
                        all_ready = false;
                    }

                    dependencies.insert(
                        "database".to_string(),
                        DependencyStatus {
                            healthy: false,
                            message: Some(format!("Connection failed: {}", e)),
                        },
                    );
                }
            },
            None => {
                let is_optional = state
                    .config()
                    .database
                    .as_ref()
                    .map(|db| db.optional)
                    .unwrap_or(false);

                let is_lazy = state
                    .config()
                    .database
                    .as_ref()
                    .map(|db| db.lazy_init)
                    .unwrap_or(false);

                if !is_optional {
                    all_ready = false;
                }

                let message = if is_lazy {
                    "Connection initializing (lazy mode)".to_string()
                } else {
                    "Not connected".to_string()
                };

                dependencies.insert(
                    "database".to_string(),
                    DependencyStatus {
                        healthy: false,
                        message: Some(message),
                    },
                );
            }
        }
    }

    #[cfg(feature = "cache")]
    if state.config().redis.is_some() {
        match state.redis().await {
            Some(redis_pool) => match redis_pool.get().await {
                Ok(mut conn) => {
                    use std::ops::DerefMut;
                    match redis::cmd("PING")
                        .query_async::<String>(conn.deref_mut())
                        .await
                    {
                        Ok(_) => {
                            dependencies.insert(
                                "redis".to_string(),
                                DependencyStatus {
                                    healthy: true,
                                    message: Some("Connected".to_string()),
                                },
                            );
                        }
                        Err(e) => {
                            tracing::error!("Redis ping failed: {}", e);
                            let is_optional = state
                                .config()
                                .redis
                                .as_ref()
                                .map(|r| r.optional)
                                .unwrap_or(false);

                            if !is_optional {
                                all_ready = false;
                            }

                            dependencies.insert(
                                "redis".to_string(),
                                DependencyStatus {
                                    healthy: false,
                                    message: Some(format!("Ping failed: {}", e)),
                                },
                            );
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to get Redis connection: {}", e);
                    let is_optional = state
                        .config()
                        .redis
                        .as_ref()
                        .map(|r| r.optional)
                        .unwrap_or(false);

                    if !is_optional {
                        all_ready = false;
                    }

                    dependencies.insert(
                        "redis".to_string(),
                        DependencyStatus {
                            healthy: false,
                            message: Some(format!("Connection pool error: {}", e)),
                        },
                    );
                }
            },
            None => {
                let is_optional = state
                    .config()
                    .redis
                    .as_ref()
                    .map(|r| r.optional)
                    .unwrap_or(false);

                let is_lazy = state
                    .config()
                    .redis
                    .as_ref()
                    .map(|r| r.lazy_init)
                    .unwrap_or(false);

                if !is_optional {
                    all_ready = false;
                }

                let message = if is_lazy {
                    "Connection initializing (lazy mode)".to_string()
                } else {
                    "Not connected".to_string()
                };

                dependencies.insert(
                    "redis".to_string(),
                    DependencyStatus {
                        healthy: false,
                        message: Some(message),
                    },
                );
            }
        }
    }

    // Signing secret/key must be loaded for session tokens to validate.
    let jwt = &state.config().jwt;
    let signing_material_loaded = jwt.shared_secret.is_some() || jwt.public_key_path.is_some();
    if !signing_material_loaded {
        all_ready = false;
    }
    dependencies.insert(
        "jwt_signing_material".to_string(),
        DependencyStatus {
            healthy: signing_material_loaded,
            message: Some(if signing_material_loaded {
                "Loaded".to_string()
            } else {
                "No shared_secret or public_key_path configured".to_string()
            }),
        },
    );

    // Probe the identity provider. Any response (including a non-2xx status)
    // counts as reachable -- we only care that the network path and TLS
    // handshake succeed, not that the endpoint accepts anonymous requests.
    match probe_idp(&state.config().idp).await {
        Ok(()) => {
            dependencies.insert(
                "idp".to_string(),
                DependencyStatus {
                    healthy: true,
                    message: Some("Reachable".to_string()),
                },
            );
        }
        Err(e) => {
            tracing::warn!("Identity provider probe failed: {}", e);
            all_ready = false;
            dependencies.insert(
                "idp".to_string(),
                DependencyStatus {
                    healthy: false,
                    message: Some(e),
                },
            );
        }
    }

    let response = ReadinessResponse {
        ready: all_ready,
        service: state.config().service.name.clone(),
        dependencies,
    };

    let status = if all_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    Ok((status, Json(response)))
}

/// Probe the identity provider's token-exchange API for basic reachability.
///
/// Returns `Ok(())` if any HTTP response was received, `Err` with a
/// diagnostic message if the request could not complete (DNS, TLS, timeout).
async fn probe_idp(idp: &crate::config::IdpConfig) -> Result<(), String> {
    let client = reqwest::Client::builder()
        .timeout(idp.timeout())
        .build()
        .map_err(|e| format!("Failed to build IdP probe client: {}", e))?;

    client
        .head(&idp.api_url)
        .send()
        .await
        .map(|_| ())
        .map_err(|e| format!("Probe failed: {}", e))
}

/// Pool health metrics endpoint
///
/// Returns detailed metrics about connection pool health including:
/// - Database pool: size, idle connections, utilization
/// - Redis pool: status, availability
///
/// This is useful for monitoring and capacity planning.
pub async fn pool_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.pool_health().await;
    let status = if health.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(health))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            service: "test-service".to_string(),
            version: Some("1.0.0".to_string()),
        };

        assert_eq!(response.status, "healthy");
        assert_eq!(response.service, "test-service");
    }

    #[test]
    fn test_dependency_status() {
        let status = DependencyStatus {
            healthy: true,
            message: Some("OK".to_string()),
        };

        assert!(status.healthy);
        assert_eq!(status.message, Some("OK".to_string()));
    }
}
