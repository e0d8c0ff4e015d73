use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::OnceLock;
use tripwire_common::types::{AlertInstance, NotificationChannel};

use crate::channels::{cached_regex, parse_config};
use crate::error::{NotifyError, Result};
use crate::utils::send_with_retry;
use crate::{NotificationMessage, NotificationProvider, ProviderKind, SendOutcome};

/// Discord caps embed descriptions at 4096 characters.
const MAX_DESCRIPTION: usize = 4000;

#[derive(Debug, Deserialize)]
struct DiscordConfig {
    webhook_url: String,
    username: Option<String>,
    avatar_url: Option<String>,
}

impl DiscordConfig {
    fn parse(config: &Value) -> Result<Self> {
        static RE: OnceLock<regex::Regex> = OnceLock::new();
        let cfg: DiscordConfig = parse_config("discord", config)?;
        let pattern = r"^https://(?:ptb\.|canary\.)?(?:discord|discordapp)\.com/api/webhooks/\d+/[\w-]+$";
        if !cached_regex(&RE, pattern).is_match(&cfg.webhook_url) {
            return Err(NotifyError::InvalidConfig(
                "discord: webhook_url is not a Discord webhook URL".into(),
            ));
        }
        Ok(cfg)
    }
}

/// Discord webhooks, rendered as one embed. Sends with `wait=true` so the
/// created message id comes back in the response.
pub struct DiscordProvider {
    client: reqwest::Client,
}

impl DiscordProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn payload(cfg: &DiscordConfig, message: &NotificationMessage) -> Value {
        let fields: Vec<Value> = message
            .fields
            .iter()
            .map(|f| json!({"name": f.name, "value": f.value, "inline": true}))
            .collect();
        let mut embed = json!({
            "title": message.title,
            "description": crate::utils::truncate_string(&message.summary, MAX_DESCRIPTION),
            "color": message.color(),
            "fields": fields,
            "timestamp": message.timestamp.to_rfc3339(),
            "footer": {"text": "tripwire"},
        });
        if let Some(ref url) = message.action_url {
            embed["url"] = json!(url);
        }

        let mut payload = json!({ "embeds": [embed] });
        if let Some(ref name) = cfg.username {
            payload["username"] = json!(name);
        }
        if let Some(ref avatar) = cfg.avatar_url {
            payload["avatar_url"] = json!(avatar);
        }
        payload
    }
}

impl Default for DiscordProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn message_id_from(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("id")?.as_str().map(str::to_string)
}

#[async_trait]
impl NotificationProvider for DiscordProvider {
    fn provider_type(&self) -> ProviderKind {
        ProviderKind::Discord
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        DiscordConfig::parse(config).map(|_| ())
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        _alert: &AlertInstance,
        message: &NotificationMessage,
    ) -> SendOutcome {
        let cfg = match DiscordConfig::parse(&channel.config) {
            Ok(cfg) => cfg,
            Err(e) => return SendOutcome::failed(e.to_string(), 0),
        };
        let payload = Self::payload(&cfg, message);
        let url = format!("{}?wait=true", cfg.webhook_url);
        send_with_retry("discord", || self.client.post(&url).json(&payload))
            .await
            .into_outcome(message_id_from)
    }
}
