//! Authentication for the store
//!
//! - Local accounts with bcrypt password hashes
//! - Active Directory accounts through a [`DirectoryClient`]
//! - JWT access/refresh tokens tracked as sessions
//! - Throttling of failed logins per username

mod directory;
mod jwt;
mod normalize;
mod password;
mod service;
mod throttle;

pub use directory::{
    escape_filter_value, BindMode, DirectoryAuthenticator, DirectoryClient, DirectoryEntry,
    DirectoryError, MockDirectory, OfflineDirectory, MOCK_PASSWORD,
};
pub use jwt::{generate_access_token, generate_refresh_token, verify_token, Claims, JwtError};
pub use normalize::{normalize_username, normalize_username_for_domain};
pub use password::{hash_password, hash_password_with_cost, verify_password};
pub use service::AuthService;
pub use throttle::LoginThrottle;
