//! Directory administration and notification DTOs

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::DirectoryEntry;

#[derive(Debug, Deserialize, Default)]
pub struct DirectorySearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
}

/// Directory entry annotated with whether it already has a local account
#[derive(Debug, Serialize)]
pub struct DirectoryUserView {
    #[serde(flatten)]
    pub entry: DirectoryEntry,
    pub imported: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ImportUsersRequest {
    #[validate(length(min = 1, max = 500))]
    pub usernames: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ImportFailure {
    pub username: String,
    pub error: String,
}

#[derive(Debug, Serialize, Default)]
pub struct ImportResult {
    pub imported: Vec<String>,
    pub failed: Vec<ImportFailure>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TestNotificationRequest {
    #[validate(email)]
    pub to: String,
}
