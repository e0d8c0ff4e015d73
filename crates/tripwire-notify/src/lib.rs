//! Multi-channel notification delivery.
//!
//! A [`dispatcher::Dispatcher`] selects the channels that accept an alert,
//! applies the per-channel hourly rate limit, renders a
//! [`message::NotificationMessage`] and hands it to the
//! [`NotificationProvider`] registered for the channel's type. Every delivery
//! leaves one [`NotificationAttempt`](tripwire_common::types::NotificationAttempt)
//! row behind. Built-in providers cover email (SMTP), Slack, Discord, SMS and
//! generic signed webhooks.

pub mod channels;
pub mod dispatcher;
pub mod error;
pub mod escalation;
pub mod matcher;
pub mod message;
pub mod rate_limit;
pub mod registry;
pub mod utils;


use async_trait::async_trait;
use serde_json::Value;
use tripwire_common::types::{AlertInstance, NotificationChannel};

pub use dispatcher::{ChannelDelivery, DeliveryReport, Dispatcher};
pub use error::{NotifyError, Result};
pub use message::NotificationMessage;
pub use registry::ProviderRegistry;

/// The closed set of provider kinds a channel's `channel_type` may name.
///
/// ```
/// use tripwire_notify::ProviderKind;
///
/// let kind: ProviderKind = "discord".parse().unwrap();
/// assert_eq!(kind, ProviderKind::Discord);
/// assert!("pager".parse::<ProviderKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Email,
    Slack,
    Discord,
    Sms,
    Webhook,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::Email,
        ProviderKind::Slack,
        ProviderKind::Discord,
        ProviderKind::Sms,
        ProviderKind::Webhook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Email => "email",
            ProviderKind::Slack => "slack",
            ProviderKind::Discord => "discord",
            ProviderKind::Sms => "sms",
            ProviderKind::Webhook => "webhook",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = NotifyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| NotifyError::UnknownChannelType(s.to_string()))
    }
}

/// Result of one provider `send`, including internal retries.
#[derive(Debug, Clone, Default)]
pub struct SendOutcome {
    pub success: bool,
    pub message_id: Option<String>,
    pub response: Option<String>,
    pub error: Option<String>,
    /// Number of transport attempts made, retries included.
    pub attempts: u32,
}

impl SendOutcome {
    pub fn failed(error: impl Into<String>, attempts: u32) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            attempts,
            ..Default::default()
        }
    }
}

/// A delivery backend for one [`ProviderKind`].
///
/// Providers never fail past this boundary: transport errors are retried
/// internally and then reported through [`SendOutcome::success`].
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    fn provider_type(&self) -> ProviderKind;

    /// Checks a channel config blob before it is persisted.
    fn validate_config(&self, config: &Value) -> Result<()>;

    async fn send(
        &self,
        channel: &NotificationChannel,
        alert: &AlertInstance,
        message: &NotificationMessage,
    ) -> SendOutcome;
}
