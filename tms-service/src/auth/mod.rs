//! Token generation and claims construction.
//!
//! Complements the validation middleware with the local-JWT minting step of
//! the delegated-authentication exchange: an upstream identity provider
//! hands back a one-time exchange token, and this module builds the claims
//! for the session JWT issued in its place.
//!
//! # Example
//!
//! ```rust,ignore
//! use tms_service::auth::{ClaimsBuilder, TokenGenerator};
//!
//! let claims = ClaimsBuilder::new().user("123").email("user@example.com").build()?;
//! let token = generator.generate_token(&claims)?;
//! ```

pub mod config;
pub mod tokens;

pub use config::{AuthConfig, JwtGenerationConfig, TokenGenerationConfig};

pub use tokens::{ClaimsBuilder, TokenGenerator};

#[cfg(feature = "jwt")]
pub use tokens::jwt_generator::JwtGenerator;
