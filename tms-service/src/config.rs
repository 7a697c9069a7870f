//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: ACTON_)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/tms-service/{service_name}/config.toml
//! 4. System directory: /etc/tms-service/{service_name}/config.toml
//! 5. Default values
//!
//! A handful of fields follow the comma-separated convention of the upstream
//! service rather than Figment's usual JSON-typed env values -- `ALLOWED_ORIGINS`
//! in particular is a plain comma-separated list, never a JSON array, so that
//! it can be set the same way in a shell export as in a `.env` file.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,

    /// JWT / delegated-auth configuration
    pub jwt: JwtConfig,

    /// Upstream identity provider used to exchange SSO tokens
    pub idp: IdpConfig,

    /// Per-endpoint-class rate limiting configuration
    pub rate_limit: RateLimitConfig,

    /// CORS configuration
    #[serde(default)]
    pub cors: CorsConfig,

    /// Security header configuration
    #[serde(default)]
    pub security_headers: SecurityHeadersConfig,

    /// Middleware configuration
    #[serde(default)]
    pub middleware: MiddlewareConfig,

    /// Database configuration (optional)
    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    /// Redis configuration (optional)
    #[serde(default)]
    pub redis: Option<RedisConfig>,

    /// Object store configuration, used by the upload-URL broker (optional)
    #[serde(default)]
    pub object_store: Option<ObjectStoreConfig>,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// JWT configuration.
///
/// Supports both a pre-shared HMAC secret (matching the identity provider's
/// signing secret byte-for-byte, `HS256`/`HS512`) and an asymmetric public
/// key (`RS256`) for verifying locally-minted session tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// JWT algorithm (HS256, HS512, RS256)
    #[serde(default = "default_jwt_algorithm")]
    pub algorithm: String,

    /// Shared secret for HMAC algorithms. Read from `JWT_SECRET` or
    /// `NEXTAUTH_SECRET` -- either name is accepted so the service can sit
    /// behind an existing NextAuth-issued session cookie without
    /// renaming the deployment's secret.
    #[serde(default)]
    pub shared_secret: Option<String>,

    /// Path to public key for RS256 verification
    #[serde(default)]
    pub public_key_path: Option<PathBuf>,

    /// Path to private key for RS256 signing of locally-minted session tokens
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,

    /// JWT issuer to validate
    #[serde(default)]
    pub issuer: Option<String>,

    /// JWT audience to validate
    #[serde(default)]
    pub audience: Option<String>,

    /// Session token lifetime in hours
    #[serde(default = "default_jwt_expiration_hours")]
    pub expiration_hours: u64,
}

impl JwtConfig {
    pub fn expiration(&self) -> Duration {
        Duration::from_secs(self.expiration_hours * 3600)
    }
}

/// Upstream identity-provider configuration for the delegated-auth exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdpConfig {
    /// Base URL of the identity provider's token-exchange API
    pub api_url: String,

    /// API key presented to the identity provider
    pub api_key: String,

    /// Timeout in seconds for the exchange request
    #[serde(default = "default_idp_timeout")]
    pub timeout_secs: u64,
}

impl IdpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Rate limit parameters for one endpoint class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRateLimitConfig {
    /// Requests allowed per period
    pub requests_per_period: u32,

    /// Period in seconds
    pub period_secs: u64,

    /// Burst allowance above the steady rate
    pub burst_size: u32,

    /// Whether the limit is keyed per-principal (true) or applied globally (false)
    #[serde(default = "default_true")]
    pub per_user: bool,
}

impl RouteRateLimitConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

/// Rate limiting configuration, one entry per endpoint class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// General API surface: 100 requests/minute per principal
    #[serde(default = "default_general_rate_limit")]
    pub general: RouteRateLimitConfig,

    /// Send-message endpoint: 30 requests/minute per principal
    #[serde(default = "default_send_message_rate_limit")]
    pub send_message: RouteRateLimitConfig,

    /// WebSocket inbound events: 10 events/second per connection
    #[serde(default = "default_ws_events_rate_limit")]
    pub ws_events: RouteRateLimitConfig,

    /// Upload-URL issuance: 5 requests/minute per principal
    #[serde(default = "default_upload_url_rate_limit")]
    pub upload_url: RouteRateLimitConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            general: default_general_rate_limit(),
            send_message: default_send_message_rate_limit(),
            ws_events: default_ws_events_rate_limit(),
            upload_url: default_upload_url_rate_limit(),
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Comma-separated list of allowed origins (e.g. "https://a.example,https://b.example").
    /// Intentionally a flat string, not a JSON array -- kept consistent with
    /// how every other list-valued setting in this service is expressed in
    /// environment variables.
    #[serde(default)]
    pub allowed_origins: String,
}

impl CorsConfig {
    /// Parsed list of allowed origins, trimmed and with empties dropped.
    pub fn origins(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: String::new(),
        }
    }
}

/// Security headers middleware configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityHeadersConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub hsts: bool,

    #[serde(default = "default_hsts_max_age")]
    pub hsts_max_age_secs: u64,

    #[serde(default = "default_true")]
    pub hsts_include_subdomains: bool,

    #[serde(default = "default_false")]
    pub hsts_preload: bool,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hsts: true,
            hsts_max_age_secs: default_hsts_max_age(),
            hsts_include_subdomains: true,
            hsts_preload: false,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL (primary/write endpoint)
    pub url: String,

    /// Database connection URL for read replicas, if separate from `url`
    #[serde(default)]
    pub url_sync: Option<String>,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum idle connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Maximum retry attempts for establishing database connection
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retry attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Whether database is optional (service can start without it)
    #[serde(default = "default_false")]
    pub optional: bool,

    /// Whether to initialize connection lazily (in background)
    #[serde(default = "default_lazy_init")]
    pub lazy_init: bool,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (redis://host:port or cluster URLs)
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: usize,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Maximum retry attempts for establishing Redis connection
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retry attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Whether Redis is optional (service can start without it)
    #[serde(default = "default_false")]
    pub optional: bool,

    /// Whether to initialize connection lazily (in background)
    #[serde(default = "default_lazy_init")]
    pub lazy_init: bool,
}

/// Object storage configuration for presigned upload/download URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    pub oss_endpoint: String,
    pub oss_access_key: String,
    pub oss_secret_key: String,
    pub oss_bucket: String,
    #[serde(default)]
    pub oss_region: Option<String>,

    /// Presigned URL lifetime in seconds
    #[serde(default = "default_presign_ttl")]
    pub presign_ttl_secs: u64,
}

impl ObjectStoreConfig {
    pub fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_secs)
    }
}

/// Middleware configuration (all optional, feature-gated)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Request tracking configuration (request IDs, header propagation)
    #[serde(default)]
    pub request_tracking: RequestTrackingConfig,

    /// Request body size limit in MB
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,

    /// Enable panic recovery middleware
    #[serde(default = "default_true")]
    pub catch_panic: bool,

    /// Enable compression
    #[serde(default = "default_true")]
    pub compression: bool,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            request_tracking: RequestTrackingConfig::default(),
            body_limit_mb: default_body_limit_mb(),
            catch_panic: true,
            compression: true,
        }
    }
}

/// Request tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTrackingConfig {
    /// Enable request ID generation
    #[serde(default = "default_true")]
    pub request_id_enabled: bool,

    /// Request ID header name
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,

    /// Enable header propagation
    #[serde(default = "default_true")]
    pub propagate_headers: bool,

    /// Enable sensitive header masking in logs
    #[serde(default = "default_true")]
    pub mask_sensitive_headers: bool,
}

impl Default for RequestTrackingConfig {
    fn default() -> Self {
        Self {
            request_id_enabled: true,
            request_id_header: default_request_id_header(),
            propagate_headers: true,
            mask_sensitive_headers: true,
        }
    }
}

// Default value functions
fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_jwt_algorithm() -> String {
    "HS256".to_string()
}

fn default_jwt_expiration_hours() -> u64 {
    720 // 30 days
}

fn default_idp_timeout() -> u64 {
    10
}

fn default_general_rate_limit() -> RouteRateLimitConfig {
    RouteRateLimitConfig {
        requests_per_period: 100,
        period_secs: 60,
        burst_size: 20,
        per_user: true,
    }
}

fn default_send_message_rate_limit() -> RouteRateLimitConfig {
    RouteRateLimitConfig {
        requests_per_period: 30,
        period_secs: 60,
        burst_size: 5,
        per_user: true,
    }
}

fn default_ws_events_rate_limit() -> RouteRateLimitConfig {
    RouteRateLimitConfig {
        requests_per_period: 10,
        period_secs: 1,
        burst_size: 5,
        per_user: true,
    }
}

fn default_upload_url_rate_limit() -> RouteRateLimitConfig {
    RouteRateLimitConfig {
        requests_per_period: 5,
        period_secs: 60,
        burst_size: 1,
        per_user: true,
    }
}

fn default_presign_ttl() -> u64 {
    900
}

fn default_hsts_max_age() -> u64 {
    31_536_000
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_redis_max_connections() -> usize {
    20
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    2
}

fn default_lazy_init() -> bool {
    true
}

fn default_body_limit_mb() -> usize {
    10
}

fn default_request_id_header() -> String {
    "x-request-id".to_string()
}

impl Config {
    /// Load configuration from all sources
    ///
    /// Searches for config files in this order (first found is used):
    /// 1. Current working directory: ./config.toml
    /// 2. XDG config directory: ~/.config/tms-service/{service_name}/config.toml
    /// 3. System directory: /etc/tms-service/{service_name}/config.toml
    ///
    /// Environment variables (ACTON_ prefix) override all file-based configs.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "tms-service".to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        // Environment variables have highest priority. `JWT_SECRET` and
        // `NEXTAUTH_SECRET` are both accepted for jwt.shared_secret; whichever
        // is set wins, with `JWT_SECRET` checked first.
        figment = figment.merge(Env::prefixed("ACTON_").split("_"));

        if let Ok(secret) = std::env::var("JWT_SECRET").or_else(|_| std::env::var("NEXTAUTH_SECRET")) {
            figment = figment.merge(("jwt.shared_secret", secret));
        }
        if let Ok(origins) = std::env::var("ALLOWED_ORIGINS") {
            figment = figment.merge(("cors.allowed_origins", origins));
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            figment = figment.merge(("database.url", url));
        }
        if let Ok(url) = std::env::var("DATABASE_URL_SYNC") {
            figment = figment.merge(("database.url_sync", url));
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            figment = figment.merge(("redis.url", url));
        }

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &str) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("ACTON_").split("_"))
            .extract()?;

        Ok(config)
    }

    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        paths.push(PathBuf::from("config.toml"));

        let xdg_dirs = xdg::BaseDirectories::with_prefix("tms-service");
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Ok(path) = xdg_dirs.place_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(
            PathBuf::from("/etc/tms-service")
                .join(service_name)
                .join("config.toml"),
        );

        paths
    }

    pub fn recommended_path(service_name: &str) -> PathBuf {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("tms-service");
        let config_file_path = Path::new(service_name).join("config.toml");

        xdg_dirs.place_config_file(&config_file_path).unwrap_or_else(|_| {
            PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| String::from("~")))
                .join(".config/tms-service")
                .join(service_name)
                .join("config.toml")
        })
    }

    pub fn create_config_dir(service_name: &str) -> Result<PathBuf> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("tms-service");
        let config_file_path = Path::new(service_name).join("config.toml");

        let config_path = xdg_dirs
            .place_config_file(&config_file_path)
            .map_err(|e| crate::error::Error::Internal(format!("Failed to create config directory: {}", e)))?;

        Ok(config_path
            .parent()
            .ok_or_else(|| crate::error::Error::Internal("Invalid config path".to_string()))?
            .to_path_buf())
    }

    pub fn database_url(&self) -> Option<&str> {
        self.database.as_ref().map(|db| db.url.as_str())
    }

    pub fn redis_url(&self) -> Option<&str> {
        self.redis.as_ref().map(|r| r.url.as_str())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "tms-service".to_string(),
                port: default_port(),
                log_level: default_log_level(),
                timeout_secs: default_timeout(),
                environment: default_environment(),
            },
            jwt: JwtConfig {
                algorithm: default_jwt_algorithm(),
                shared_secret: None,
                public_key_path: None,
                private_key_path: None,
                issuer: None,
                audience: None,
                expiration_hours: default_jwt_expiration_hours(),
            },
            idp: IdpConfig {
                api_url: String::new(),
                api_key: String::new(),
                timeout_secs: default_idp_timeout(),
            },
            rate_limit: RateLimitConfig {
                general: default_general_rate_limit(),
                send_message: default_send_message_rate_limit(),
                ws_events: default_ws_events_rate_limit(),
                upload_url: default_upload_url_rate_limit(),
            },
            cors: CorsConfig::default(),
            security_headers: SecurityHeadersConfig::default(),
            middleware: MiddlewareConfig::default(),
            database: None,
            redis: None,
            object_store: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service.port, 8080);
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.rate_limit.general.requests_per_period, 100);
        assert_eq!(config.rate_limit.send_message.requests_per_period, 30);
        assert_eq!(config.rate_limit.ws_events.requests_per_period, 10);
        assert_eq!(config.rate_limit.upload_url.requests_per_period, 5);
    }

    #[test]
    fn test_cors_origins_parsing() {
        let cors = CorsConfig {
            allowed_origins: "https://a.example, https://b.example ,,".to_string(),
        };
        assert_eq!(
            cors.origins(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn test_cors_origins_empty() {
        let cors = CorsConfig::default();
        assert!(cors.origins().is_empty());
    }
}
