//! Route definitions for the store API

mod admin;
mod auth;
mod currency;
mod items;
mod orders;
mod users;

pub use admin::admin_routes;
pub use auth::auth_routes;
pub use currency::currency_routes;
pub use items::item_routes;
pub use orders::order_routes;
pub use users::user_routes;
