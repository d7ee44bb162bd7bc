//! Middleware for the store API
//!
//! Request tracing, rate limiting, security headers, client identification
//! and authentication extractors.

pub mod auth;
mod client;
mod rate_limiter;
mod security;
mod tracing;

pub use auth::{AdminUser, AuthenticatedUser, OptionalUser};
pub use client::{client_ip, ClientInfo};
pub use rate_limiter::{rate_limit_layer, RateLimiter};
pub use security::{hsts_header, security_headers};
pub use tracing::request_tracing;
