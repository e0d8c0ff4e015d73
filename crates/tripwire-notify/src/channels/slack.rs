use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::OnceLock;
use tripwire_common::types::{AlertInstance, NotificationChannel};

use crate::channels::{cached_regex, hex_color, parse_config};
use crate::error::{NotifyError, Result};
use crate::utils::send_with_retry;
use crate::{NotificationMessage, NotificationProvider, ProviderKind, SendOutcome};

#[derive(Debug, Deserialize)]
struct SlackConfig {
    webhook_url: String,
    channel: Option<String>,
    username: Option<String>,
    icon_emoji: Option<String>,
}

impl SlackConfig {
    fn parse(config: &Value) -> Result<Self> {
        static RE: OnceLock<regex::Regex> = OnceLock::new();
        let cfg: SlackConfig = parse_config("slack", config)?;
        let pattern = r"^https://hooks\.slack\.com/services/[A-Za-z0-9]+/[A-Za-z0-9]+/[A-Za-z0-9]+$";
        if !cached_regex(&RE, pattern).is_match(&cfg.webhook_url) {
            return Err(NotifyError::InvalidConfig(
                "slack: webhook_url is not a Slack incoming webhook URL".into(),
            ));
        }
        Ok(cfg)
    }
}

/// Slack incoming webhooks, rendered as a colored attachment.
pub struct SlackProvider {
    client: reqwest::Client,
}

impl SlackProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn payload(cfg: &SlackConfig, message: &NotificationMessage) -> Value {
        let fields: Vec<Value> = message
            .fields
            .iter()
            .map(|f| json!({"title": f.name, "value": f.value, "short": true}))
            .collect();
        let mut attachment = json!({
            "color": hex_color(message.color()),
            "title": message.title,
            "text": message.summary,
            "fields": fields,
            "footer": "tripwire",
            "ts": message.timestamp.timestamp(),
        });
        if let Some(ref url) = message.action_url {
            attachment["title_link"] = json!(url);
            attachment["actions"] = json!([
                {"type": "button", "text": "View alert", "url": url}
            ]);
        }

        let mut payload = json!({
            "text": message.title,
            "attachments": [attachment],
        });
        if let Some(ref ch) = cfg.channel {
            payload["channel"] = json!(ch);
        }
        if let Some(ref name) = cfg.username {
            payload["username"] = json!(name);
        }
        if let Some(ref icon) = cfg.icon_emoji {
            payload["icon_emoji"] = json!(icon);
        }
        payload
    }
}

impl Default for SlackProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationProvider for SlackProvider {
    fn provider_type(&self) -> ProviderKind {
        ProviderKind::Slack
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        SlackConfig::parse(config).map(|_| ())
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        _alert: &AlertInstance,
        message: &NotificationMessage,
    ) -> SendOutcome {
        let cfg = match SlackConfig::parse(&channel.config) {
            Ok(cfg) => cfg,
            Err(e) => return SendOutcome::failed(e.to_string(), 0),
        };
        let payload = Self::payload(&cfg, message);
        send_with_retry("slack", || self.client.post(&cfg.webhook_url).json(&payload))
            .await
            .into_outcome(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_foreign_webhook_urls() {
        let ok = json!({"webhook_url": "https://hooks.slack.com/services/T000/B000/XXXX"});
        assert!(SlackConfig::parse(&ok).is_ok());

        let bad = json!({"webhook_url": "https://example.com/services/T000/B000/XXXX"});
        assert!(matches!(
            SlackConfig::parse(&bad),
            Err(NotifyError::InvalidConfig(_))
        ));
        assert!(SlackConfig::parse(&json!({})).is_err());
    }
}
