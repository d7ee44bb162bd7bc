//! Password hashing

use crate::error::StoreError;

/// Hash a password with bcrypt at the default cost.
pub fn hash_password(plain: &str) -> Result<String, StoreError> {
    hash_password_with_cost(plain, bcrypt::DEFAULT_COST)
}

pub fn hash_password_with_cost(plain: &str, cost: u32) -> Result<String, StoreError> {
    bcrypt::hash(plain, cost)
        .map_err(|e| StoreError::Internal(format!("Password hashing failed: {}", e)))
}

/// Check a password against a stored hash. Malformed hashes never match.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    match bcrypt::verify(plain, hash) {
        Ok(valid) => valid,
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash could not be verified");
            false
        }
    }
}
