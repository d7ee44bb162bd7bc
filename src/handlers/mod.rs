//! API handlers for the store

pub mod admin;
pub mod auth;
pub mod currency;
pub mod items;
pub mod orders;
pub mod users;

// Re-export extractors from middleware for handler use
pub use crate::middleware::auth::{AdminUser, AuthenticatedUser, OptionalUser};
pub use crate::middleware::ClientInfo;
