//! Active Directory authentication
//!
//! The wire protocol sits behind [`DirectoryClient`]; this module decides
//! which DN to bind as, how accounts are looked up, and what gets audited.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use axum::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::normalize::{normalize_username, normalize_username_for_domain};
use crate::config::DirectoryConfig;
use crate::services::audit::{AuditLog, ClientContext};

/// Directory errors
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    #[error("Directory protocol error: {0}")]
    Protocol(String),

    #[error("Directory authentication is disabled")]
    Disabled,
}

/// How user credentials are checked against the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindMode {
    /// Bind directly with the user's own credentials
    SimpleBind,
    /// Bind as a service account, find the user, then bind as the user
    ServiceAccount,
}

impl BindMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindMode::SimpleBind => "simple_bind",
            BindMode::ServiceAccount => "service_account",
        }
    }
}

/// A user entry as returned by the directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub account_name: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub domain: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Directory protocol client
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Attempt a bind. `Ok(false)` means the credentials were rejected.
    async fn bind(&self, dn: &str, password: &str) -> Result<bool, DirectoryError>;

    /// Search below `base_dn` with an RFC 4515 filter
    async fn search(
        &self,
        base_dn: &str,
        filter: &str,
        limit: usize,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError>;
}

/// Escape a value for use inside an RFC 4515 filter
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\5c"),
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Authenticates users and looks up accounts through a [`DirectoryClient`]
#[derive(Clone)]
pub struct DirectoryAuthenticator {
    client: Arc<dyn DirectoryClient>,
    config: DirectoryConfig,
    audit: AuditLog,
}

impl DirectoryAuthenticator {
    pub fn new(client: Arc<dyn DirectoryClient>, config: DirectoryConfig, audit: AuditLog) -> Self {
        Self {
            client,
            config,
            audit,
        }
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Account name without any domain decoration
    pub fn account_name(&self, username: &str) -> String {
        normalize_username_for_domain(username, &self.config.domain)
    }

    /// Bind DN for simple bind mode, built from the configured pattern
    pub fn user_dn(&self, username: &str) -> String {
        let domain = self.config.domain.as_str();
        let trimmed = username.trim();
        let lowered = trimmed.to_ascii_lowercase();
        let domain_lower = domain.to_ascii_lowercase();

        let suffix = format!("@{}", domain_lower);

        let clean = if let Some(cut) = lowered.find(&suffix).filter(|_| !domain.is_empty()) {
            &trimmed[..cut]
        } else if !domain.is_empty() && lowered.starts_with(&format!("{}\\", domain_lower)) {
            &trimmed[domain.len() + 1..]
        } else {
            trimmed
        };

        self.config
            .user_dn_pattern
            .replace("{username}", clean)
            .replace("{domain}", domain)
            .replace("{user_base_dn}", &self.config.user_base_dn)
    }

    /// Filter matching exactly one account
    pub fn account_filter(&self, username: &str) -> String {
        format!(
            "(&{}(sAMAccountName={}))",
            self.config.user_filter,
            escape_filter_value(username)
        )
    }

    fn search_filter(&self, term: &str) -> String {
        let term = term.trim();
        if term.is_empty() || term == "*" {
            return self.config.user_filter.clone();
        }
        let escaped = escape_filter_value(term);
        format!(
            "(&{}(|(sAMAccountName=*{}*)(displayName=*{}*)))",
            self.config.user_filter, escaped, escaped
        )
    }

    /// Check a username/password pair against the directory.
    ///
    /// `Ok(None)` means the directory answered and rejected the credentials;
    /// `Err` means it could not be asked.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        ctx: &ClientContext,
    ) -> Result<Option<DirectoryEntry>, DirectoryError> {
        let account = self.account_name(username);
        let mode = self.config.mode();

        self.audit
            .record(
                &account,
                "auth_attempt",
                Some(&format!("mode={}", mode.as_str())),
                ctx,
                true,
                None,
            )
            .await;

        // An empty password would be an anonymous bind, which most servers accept
        if password.is_empty() {
            self.audit
                .record(&account, "auth_failure", None, ctx, false, Some("empty password"))
                .await;
            return Ok(None);
        }

        let outcome = match mode {
            BindMode::SimpleBind => self.simple_bind(username, &account, password).await,
            BindMode::ServiceAccount => self.service_account_bind(&account, password).await,
        };

        match &outcome {
            Ok(Some(entry)) => {
                tracing::info!(username = %account, dn = %entry.dn, "Directory authentication succeeded");
                self.audit
                    .record(&account, "auth_success", Some(&entry.dn), ctx, true, None)
                    .await;
            }
            Ok(None) => {
                tracing::warn!(username = %account, "Directory rejected credentials");
                self.audit
                    .record(&account, "auth_failure", None, ctx, false, Some("invalid credentials"))
                    .await;
            }
            Err(e) => {
                tracing::error!(username = %account, error = %e, "Directory authentication error");
                self.audit
                    .record(&account, "auth_error", None, ctx, false, Some(&e.to_string()))
                    .await;
            }
        }

        outcome
    }

    async fn simple_bind(
        &self,
        username: &str,
        account: &str,
        password: &str,
    ) -> Result<Option<DirectoryEntry>, DirectoryError> {
        let dn = self.user_dn(username);
        tracing::debug!(dn = %dn, "Simple bind");

        if !self.client.bind(&dn, password).await? {
            return Ok(None);
        }

        // Attributes are a bonus here; the bind already proved the password
        let found = match self
            .client
            .search(&self.config.user_base_dn, &self.account_filter(account), 1)
            .await
        {
            Ok(mut entries) if !entries.is_empty() => Some(entries.remove(0)),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "Attribute lookup after simple bind failed");
                None
            }
        };

        Ok(Some(found.unwrap_or_else(|| DirectoryEntry {
            dn,
            account_name: account.to_string(),
            display_name: None,
            email: None,
            domain: Some(self.config.domain.clone()),
            groups: Vec::new(),
        })))
    }

    async fn service_account_bind(
        &self,
        account: &str,
        password: &str,
    ) -> Result<Option<DirectoryEntry>, DirectoryError> {
        let entry = match self.lookup(account).await? {
            Some(entry) => entry,
            None => return Ok(None),
        };

        if self.client.bind(&entry.dn, password).await? {
            Ok(Some(entry))
        } else {
            Ok(None)
        }
    }

    async fn bind_service_account(&self) -> Result<(), DirectoryError> {
        let accepted = self
            .client
            .bind(&self.config.bind_dn, &self.config.bind_password)
            .await?;
        if accepted {
            Ok(())
        } else {
            Err(DirectoryError::Unavailable(
                "service account bind was rejected".to_string(),
            ))
        }
    }

    /// Find a single account with the service account
    pub async fn lookup(&self, username: &str) -> Result<Option<DirectoryEntry>, DirectoryError> {
        self.bind_service_account().await?;

        let account = self.account_name(username);
        let mut entries = self
            .client
            .search(&self.config.user_base_dn, &self.account_filter(&account), 1)
            .await?;

        Ok(if entries.is_empty() {
            None
        } else {
            Some(entries.remove(0))
        })
    }

    /// Search accounts by account name or display name
    pub async fn search_users(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        if !self.config.enabled {
            return Err(DirectoryError::Disabled);
        }
        self.bind_service_account().await?;

        let entries = self
            .client
            .search(&self.config.user_base_dn, &self.search_filter(term), limit)
            .await?;

        tracing::info!(term = %term, found = entries.len(), "Directory search");
        Ok(entries)
    }
}

/// Stand-in used when the directory is enabled without a transport
pub struct OfflineDirectory {
    server_url: String,
}

impl OfflineDirectory {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
        }
    }
}

#[async_trait]
impl DirectoryClient for OfflineDirectory {
    async fn bind(&self, _dn: &str, _password: &str) -> Result<bool, DirectoryError> {
        Err(DirectoryError::Unavailable(format!(
            "no directory transport for {}",
            self.server_url
        )))
    }

    async fn search(
        &self,
        _base_dn: &str,
        _filter: &str,
        _limit: usize,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        Err(DirectoryError::Unavailable(format!(
            "no directory transport for {}",
            self.server_url
        )))
    }
}

// ============================================================================
// Mock directory
// ============================================================================

/// Password accepted for every sample account
pub const MOCK_PASSWORD: &str = "password123";

struct MockAccount {
    entry: DirectoryEntry,
    password: String,
}

/// In-memory directory for development and tests
pub struct MockDirectory {
    service_dn: String,
    service_password: String,
    accounts: HashMap<String, MockAccount>,
    available: AtomicBool,
}

impl MockDirectory {
    pub fn new(service_dn: impl Into<String>, service_password: impl Into<String>) -> Self {
        Self {
            service_dn: service_dn.into(),
            service_password: service_password.into(),
            accounts: HashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Directory pre-populated with four sample accounts
    pub fn with_sample_accounts(
        service_dn: impl Into<String>,
        service_password: impl Into<String>,
    ) -> Self {
        let mut directory = Self::new(service_dn, service_password);
        let samples = [
            ("jsmith", "John Smith", "john.smith@company.com", "IT"),
            ("mjohnson", "Mary Johnson", "mary.johnson@company.com", "HR"),
            ("bwilson", "Bob Wilson", "bob.wilson@company.com", "Sales"),
            ("admin", "Administrator", "admin@company.com", "NESOP_Admins"),
        ];
        for (account, display, mail, group) in samples {
            directory.add_account(account, display, Some(mail), MOCK_PASSWORD, &[group]);
        }
        directory
    }

    pub fn add_account(
        &mut self,
        account: &str,
        display_name: &str,
        email: Option<&str>,
        password: &str,
        groups: &[&str],
    ) {
        let entry = DirectoryEntry {
            dn: format!("CN={},CN=Users,DC=company,DC=com", display_name),
            account_name: account.to_string(),
            display_name: Some(display_name.to_string()),
            email: email.map(str::to_string),
            domain: Some("company.com".to_string()),
            groups: groups
                .iter()
                .map(|g| format!("CN={},DC=company,DC=com", g))
                .collect(),
        };
        self.accounts.insert(
            account.to_lowercase(),
            MockAccount {
                entry,
                password: password.to_string(),
            },
        );
    }

    /// Simulate an outage
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), DirectoryError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DirectoryError::Unavailable("mock directory is offline".to_string()))
        }
    }

    fn account_for_dn(&self, dn: &str) -> Option<&MockAccount> {
        if let Some(account) = self
            .accounts
            .values()
            .find(|a| a.entry.dn.eq_ignore_ascii_case(dn))
        {
            return Some(account);
        }

        // CN=<name>,... or user@domain or DOMAIN\user
        let name = match dn.strip_prefix("CN=").or_else(|| dn.strip_prefix("cn=")) {
            Some(rest) => rest.split(',').next().unwrap_or(rest).to_lowercase(),
            None => normalize_username(dn),
        };

        self.accounts.get(&name).or_else(|| {
            self.accounts.values().find(|a| {
                a.entry
                    .display_name
                    .as_deref()
                    .map(|d| d.eq_ignore_ascii_case(&name))
                    .unwrap_or(false)
            })
        })
    }
}

#[async_trait]
impl DirectoryClient for MockDirectory {
    async fn bind(&self, dn: &str, password: &str) -> Result<bool, DirectoryError> {
        self.check_available()?;

        if dn.eq_ignore_ascii_case(&self.service_dn) {
            return Ok(password == self.service_password);
        }

        Ok(self
            .account_for_dn(dn)
            .map(|account| account.password == password)
            .unwrap_or(false))
    }

    async fn search(
        &self,
        _base_dn: &str,
        filter: &str,
        limit: usize,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        self.check_available()?;

        let terms = name_assertions(filter)?;
        let mut entries: Vec<DirectoryEntry> = self
            .accounts
            .values()
            .filter(|account| {
                terms.is_empty()
                    || terms.iter().any(|(attr, pattern)| {
                        let value = if attr.eq_ignore_ascii_case("displayName") {
                            account.entry.display_name.as_deref().unwrap_or("")
                        } else {
                            account.entry.account_name.as_str()
                        };
                        wildcard_match(pattern, value)
                    })
            })
            .map(|account| account.entry.clone())
            .collect();

        entries.sort_by(|a, b| a.account_name.cmp(&b.account_name));
        entries.truncate(limit);
        Ok(entries)
    }
}

/// Pull the `sAMAccountName` / `displayName` assertions out of a filter
fn name_assertions(filter: &str) -> Result<Vec<(String, String)>, DirectoryError> {
    if filter.matches('(').count() != filter.matches(')').count() {
        return Err(DirectoryError::Protocol(format!("malformed filter: {}", filter)));
    }

    let mut terms = Vec::new();
    let mut rest = filter;
    while let Some(open) = rest.find('(') {
        let after = &rest[open + 1..];
        let close = match after.find(')') {
            Some(close) => close,
            None => break,
        };
        let inner = &after[..close];
        if !inner.contains('(') {
            if let Some((attr, value)) = inner.split_once('=') {
                if attr.eq_ignore_ascii_case("sAMAccountName")
                    || attr.eq_ignore_ascii_case("displayName")
                {
                    terms.push((attr.to_string(), value.to_string()));
                }
            }
        }
        rest = after;
    }
    Ok(terms)
}

fn unescape_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let hex: String = chars.by_ref().take(2).collect();
            match u8::from_str_radix(&hex, 16) {
                Ok(byte) => out.push(byte as char),
                Err(_) => {
                    out.push('\\');
                    out.push_str(&hex);
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Case-insensitive match of an assertion value with `*` wildcards
fn wildcard_match(pattern: &str, value: &str) -> bool {
    let value = value.to_lowercase();
    let pieces: Vec<String> = pattern
        .split('*')
        .map(|p| unescape_filter_value(p).to_lowercase())
        .collect();

    if pieces.len() == 1 {
        return value == pieces[0];
    }

    let first = &pieces[0];
    let last = &pieces[pieces.len() - 1];
    if !value.starts_with(first.as_str()) || !value[first.len()..].ends_with(last.as_str()) {
        return false;
    }

    let mut cursor = first.len();
    let end = value.len() - last.len();
    for piece in &pieces[1..pieces.len() - 1] {
        if piece.is_empty() {
            continue;
        }
        match value[cursor..end].find(piece.as_str()) {
            Some(pos) => cursor += pos + piece.len(),
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICE_DN: &str = "CN=svc,OU=Service Accounts,DC=company,DC=com";

    fn config(mode: BindMode) -> DirectoryConfig {
        DirectoryConfig {
            enabled: true,
            domain: "company.com".to_string(),
            bind_dn: SERVICE_DN.to_string(),
            bind_password: "svc-pass".to_string(),
            user_base_dn: "OU=Users,DC=company,DC=com".to_string(),
            simple_bind_mode: mode == BindMode::SimpleBind,
            use_mock: true,
            ..DirectoryConfig::default()
        }
    }

    fn authenticator(mode: BindMode) -> (DirectoryAuthenticator, Arc<MockDirectory>) {
        let mock = Arc::new(MockDirectory::with_sample_accounts(SERVICE_DN, "svc-pass"));
        let auth = DirectoryAuthenticator::new(mock.clone(), config(mode), AuditLog::disabled());
        (auth, mock)
    }

    #[test]
    fn test_user_dn_patterns() {
        let (mut auth, _) = authenticator(BindMode::SimpleBind);
        assert_eq!(auth.user_dn("jsmith"), "jsmith@company.com");
        assert_eq!(auth.user_dn("jsmith@company.com"), "jsmith@company.com");

        auth.config.user_dn_pattern = "CN={username},{user_base_dn}".to_string();
        assert_eq!(auth.user_dn("jsmith"), "CN=jsmith,OU=Users,DC=company,DC=com");

        auth.config.user_dn_pattern = "{domain}\\{username}".to_string();
        assert_eq!(auth.user_dn("company.com\\jsmith"), "company.com\\jsmith");
    }

    #[test]
    fn test_filter_escaping() {
        assert_eq!(escape_filter_value("a*b(c)\\"), "a\\2ab\\28c\\29\\5c");

        let (auth, _) = authenticator(BindMode::ServiceAccount);
        assert_eq!(
            auth.account_filter("j*"),
            "(&(objectClass=user)(sAMAccountName=j\\2a))"
        );
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("*smi*", "jsmith"));
        assert!(wildcard_match("jsmith", "JSmith"));
        assert!(!wildcard_match("jsmit", "jsmith"));
        assert!(!wildcard_match("j\\2a", "jsmith"));
        assert!(wildcard_match("j\\2a", "j*"));
        assert!(wildcard_match("*", "anything"));
    }

    #[tokio::test]
    async fn test_service_account_authentication() {
        let (auth, _) = authenticator(BindMode::ServiceAccount);
        let ctx = ClientContext::default();

        let entry = auth
            .authenticate("COMPANY\\JSmith", MOCK_PASSWORD, &ctx)
            .await
            .unwrap()
            .expect("valid credentials");
        assert_eq!(entry.account_name, "jsmith");
        assert_eq!(entry.display_name.as_deref(), Some("John Smith"));

        let rejected = auth.authenticate("jsmith", "wrong", &ctx).await.unwrap();
        assert!(rejected.is_none());

        let unknown = auth.authenticate("nobody", MOCK_PASSWORD, &ctx).await.unwrap();
        assert!(unknown.is_none());
    }

    #[tokio::test]
    async fn test_simple_bind_authentication() {
        let (auth, _) = authenticator(BindMode::SimpleBind);
        let ctx = ClientContext::default();

        let entry = auth
            .authenticate("mjohnson@company.com", MOCK_PASSWORD, &ctx)
            .await
            .unwrap()
            .expect("valid credentials");
        assert_eq!(entry.email.as_deref(), Some("mary.johnson@company.com"));
    }

    #[tokio::test]
    async fn test_empty_password_never_binds() {
        let (auth, mock) = authenticator(BindMode::SimpleBind);
        // Even an offline directory is not contacted
        mock.set_available(false);
        let result = auth
            .authenticate("jsmith", "", &ClientContext::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_outage_is_an_error() {
        let (auth, mock) = authenticator(BindMode::ServiceAccount);
        mock.set_available(false);
        let result = auth
            .authenticate("jsmith", MOCK_PASSWORD, &ClientContext::default())
            .await;
        assert!(matches!(result, Err(DirectoryError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_rejected_service_account_is_unavailable() {
        let mock = Arc::new(MockDirectory::with_sample_accounts(SERVICE_DN, "other"));
        let auth =
            DirectoryAuthenticator::new(mock, config(BindMode::ServiceAccount), AuditLog::disabled());
        let result = auth
            .authenticate("jsmith", MOCK_PASSWORD, &ClientContext::default())
            .await;
        assert!(matches!(result, Err(DirectoryError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_search_users() {
        let (auth, _) = authenticator(BindMode::ServiceAccount);

        let all = auth.search_users("*", 50).await.unwrap();
        assert_eq!(all.len(), 4);

        let found = auth.search_users("john", 50).await.unwrap();
        let names: Vec<_> = found.iter().map(|e| e.account_name.as_str()).collect();
        assert_eq!(names, vec!["jsmith", "mjohnson"]);

        let limited = auth.search_users("", 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_search_disabled() {
        let (mut auth, _) = authenticator(BindMode::ServiceAccount);
        auth.config.enabled = false;
        assert!(matches!(
            auth.search_users("j", 5).await,
            Err(DirectoryError::Disabled)
        ));
    }
}
