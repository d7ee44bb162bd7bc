//! Outbound notifications
//!
//! Messages are rendered as plain text and handed to a [`Notifier`]. Delivery
//! is always best effort: callers get an outcome, never an error that would
//! undo the operation that triggered the message.

mod message;

pub use message::{Notification, OutboundMessage, CURRENCY_SYMBOL};

use std::{sync::Arc, time::Duration};

use axum::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::{NotificationConfig, PLACEHOLDER_DOMAIN};

/// Notification errors
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notifications are disabled")]
    Disabled,

    #[error("No recipient address for {0}")]
    NoRecipient(String),

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Delivery backend
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), NotifyError>;

    fn name(&self) -> &'static str;
}

/// Drops every message
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), NotifyError> {
        tracing::debug!(to = %message.to, subject = %message.subject, "Notifications disabled, message dropped");
        Err(NotifyError::Disabled)
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Writes messages to the log instead of sending them
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), NotifyError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            body_len = message.body.len(),
            "Notification (log only)"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Posts messages as JSON to an HTTP mail relay
pub struct RelayNotifier {
    client: reqwest::Client,
    relay_url: String,
}

impl RelayNotifier {
    pub fn new(relay_url: String, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::DeliveryFailed(e.to_string()))?;

        Ok(Self { client, relay_url })
    }
}

#[async_trait]
impl Notifier for RelayNotifier {
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.relay_url)
            .json(message)
            .send()
            .await
            .map_err(|e| NotifyError::DeliveryFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::DeliveryFailed(format!(
                "relay answered {}",
                response.status()
            )));
        }

        tracing::info!(to = %message.to, subject = %message.subject, "Notification relayed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "relay"
    }
}

/// Current notification setup, safe to show to admins
#[derive(Debug, Serialize)]
pub struct NotificationStatus {
    pub enabled: bool,
    pub backend: String,
    pub relay_url_set: bool,
    pub from_address: String,
    pub fulfillment_address_set: bool,
    pub recipient_domain: Option<String>,
}

#[derive(Clone)]
pub struct NotificationService {
    notifier: Arc<dyn Notifier>,
    config: NotificationConfig,
    recipient_domain: Option<String>,
}

impl NotificationService {
    pub fn new(notifier: Arc<dyn Notifier>, config: NotificationConfig, domain: &str) -> Self {
        let domain = domain.trim();
        let recipient_domain = if domain.is_empty() || domain.eq_ignore_ascii_case(PLACEHOLDER_DOMAIN) {
            None
        } else {
            Some(domain.to_string())
        };

        Self {
            notifier,
            config,
            recipient_domain,
        }
    }

    /// Pick the backend the configuration asks for
    pub fn from_config(config: &NotificationConfig, domain: &str) -> Result<Self, NotifyError> {
        let notifier: Arc<dyn Notifier> = match (config.enabled, &config.relay_url) {
            (false, _) => Arc::new(DisabledNotifier),
            (true, Some(url)) => Arc::new(RelayNotifier::new(
                url.clone(),
                Duration::from_secs(config.timeout_seconds),
            )?),
            (true, None) => Arc::new(LogNotifier),
        };

        Ok(Self::new(notifier, config.clone(), domain))
    }

    /// Address derived from the account name and the directory domain
    pub fn recipient_for(&self, username: &str) -> Option<String> {
        self.recipient_domain
            .as_ref()
            .map(|domain| format!("{}@{}", username, domain))
    }

    /// The stored address when there is one, else the derived address
    pub fn address_for(&self, username: &str, stored: Option<&str>) -> Option<String> {
        stored
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(str::to_string)
            .or_else(|| self.recipient_for(username))
    }

    pub fn fulfillment_address(&self) -> Option<&str> {
        self.config.fulfillment_address.as_deref()
    }

    pub async fn send(&self, to: &str, notification: &Notification) -> Result<(), NotifyError> {
        let message = OutboundMessage {
            from: self.config.from_address.clone(),
            to: to.to_string(),
            subject: notification.subject(),
            body: notification.body(),
        };

        let result = self.notifier.deliver(&message).await;
        match &result {
            Ok(()) => tracing::debug!(kind = notification.kind(), to = %to, "Notification delivered"),
            Err(NotifyError::Disabled) => {}
            Err(e) => tracing::warn!(kind = notification.kind(), to = %to, error = %e, "Notification failed"),
        }
        result
    }

    /// Send to the user's stored address, falling back to the derived one
    pub async fn send_to_user(
        &self,
        username: &str,
        stored_email: Option<&str>,
        notification: &Notification,
    ) -> Result<(), NotifyError> {
        let to = self
            .address_for(username, stored_email)
            .ok_or_else(|| NotifyError::NoRecipient(username.to_string()))?;
        self.send(&to, notification).await
    }

    pub async fn send_test(&self, to: &str) -> Result<(), NotifyError> {
        self.send(to, &Notification::Test).await
    }

    pub fn status(&self) -> NotificationStatus {
        NotificationStatus {
            enabled: self.config.enabled,
            backend: self.notifier.name().to_string(),
            relay_url_set: self.config.relay_url.is_some(),
            from_address: self.config.from_address.clone(),
            fulfillment_address_set: self.config.fulfillment_address.is_some(),
            recipient_domain: self.recipient_domain.clone(),
        }
    }
}
