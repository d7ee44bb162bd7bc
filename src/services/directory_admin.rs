//! Directory account search, import and sync

use crate::auth::{normalize_username, DirectoryAuthenticator, DirectoryError};
use crate::error::{StoreError, StoreResult};
use crate::models::{DirectoryUserView, ImportFailure, ImportResult, User};
use crate::services::audit::{AuditLog, ClientContext};
use crate::services::UserService;

const DEFAULT_SEARCH_LIMIT: usize = 25;
const MAX_SEARCH_LIMIT: usize = 200;

#[derive(Clone)]
pub struct DirectoryAdminService {
    directory: DirectoryAuthenticator,
    users: UserService,
    audit: AuditLog,
}

impl DirectoryAdminService {
    pub fn new(directory: DirectoryAuthenticator, users: UserService, audit: AuditLog) -> Self {
        Self {
            directory,
            users,
            audit,
        }
    }

    fn ensure_enabled(&self) -> StoreResult<()> {
        if self.directory.is_enabled() {
            Ok(())
        } else {
            Err(DirectoryError::Disabled.into())
        }
    }

    pub async fn search(
        &self,
        term: &str,
        limit: Option<usize>,
    ) -> StoreResult<Vec<DirectoryUserView>> {
        self.ensure_enabled()?;
        let term = term.trim();
        if term.is_empty() {
            return Err(StoreError::Invalid("Search term is required".to_string()));
        }
        let limit = limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT);

        let entries = self.directory.search_users(term, limit).await?;

        let mut views = Vec::with_capacity(entries.len());
        for entry in entries {
            let imported = self
                .users
                .find(&normalize_username(&entry.account_name))
                .await?
                .is_some();
            views.push(DirectoryUserView { entry, imported });
        }
        Ok(views)
    }

    /// Create local records for directory accounts. One failure does not stop the rest.
    pub async fn import(&self, usernames: &[String], imported_by: &str) -> StoreResult<ImportResult> {
        self.ensure_enabled()?;
        let mut result = ImportResult::default();

        for raw in usernames {
            match self.import_one(raw).await {
                Ok(user) => result.imported.push(user.username),
                Err(e) => result.failed.push(ImportFailure {
                    username: raw.clone(),
                    error: e.to_string(),
                }),
            }
        }

        self.audit
            .record(
                imported_by,
                "import_users",
                Some(&format!(
                    "imported={} failed={}",
                    result.imported.len(),
                    result.failed.len()
                )),
                &ClientContext::default(),
                result.failed.is_empty(),
                None,
            )
            .await;

        tracing::info!(
            imported = result.imported.len(),
            failed = result.failed.len(),
            imported_by = %imported_by,
            "Directory import finished"
        );
        Ok(result)
    }

    async fn import_one(&self, raw: &str) -> StoreResult<User> {
        let username = self.directory.account_name(raw);
        if username.is_empty() {
            return Err(StoreError::Invalid("Empty username".to_string()));
        }

        if let Some(existing) = self.users.find(&username).await? {
            return Err(StoreError::Conflict(format!(
                "'{}' already exists as a {} account",
                existing.username,
                existing.kind.as_str()
            )));
        }

        let entry = self
            .directory
            .lookup(&username)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Directory account '{}'", username)))?;

        self.users.upsert_directory_user(&entry).await
    }

    /// Refresh display name, e-mail and sync time from the directory
    pub async fn sync(&self, username: &str, synced_by: &str) -> StoreResult<User> {
        self.ensure_enabled()?;

        let user = self.users.get(username).await?;
        if user.kind != crate::models::UserKind::Directory {
            return Err(StoreError::Invalid(format!(
                "'{}' is not a directory account",
                user.username
            )));
        }

        let account = user
            .directory_account
            .clone()
            .unwrap_or_else(|| user.username.clone());
        let entry = self
            .directory
            .lookup(&account)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Directory account '{}'", account)))?;

        let refreshed = self.users.upsert_directory_user(&entry).await?;

        self.audit
            .record(
                synced_by,
                "sync_user",
                Some(&refreshed.username),
                &ClientContext::default(),
                true,
                None,
            )
            .await;

        Ok(refreshed)
    }
}
