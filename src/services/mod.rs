//! Business logic services for the store

pub mod audit;
pub mod catalog;
mod directory_admin;
pub mod ledger;
mod orders;
mod reviews;
mod users;

pub use audit::{AuditLog, ClientContext};
pub use catalog::CatalogService;
pub use directory_admin::DirectoryAdminService;
pub use ledger::LedgerService;
pub use orders::OrderService;
pub use reviews::ReviewService;
pub use users::UserService;
