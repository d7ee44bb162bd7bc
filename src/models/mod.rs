//! Data models for the store backend

pub mod auth;
pub mod directory;
pub mod ledger;
pub mod store;

pub use auth::*;
pub use directory::*;
pub use ledger::*;
pub use store::*;
