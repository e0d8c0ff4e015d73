use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tripwire_common::types::{AlertInstance, NotificationChannel};

use crate::channels::{is_e164, is_http_url, parse_config};
use crate::error::{NotifyError, Result};
use crate::utils::send_with_retry;
use crate::{NotificationMessage, NotificationProvider, ProviderKind, SendOutcome};

/// Single-segment SMS length.
pub const SMS_MAX_CHARS: usize = 160;

fn default_api_base() -> String {
    "https://api.twilio.com".to_string()
}

#[derive(Debug, Deserialize)]
struct SmsConfig {
    account_sid: String,
    auth_token: String,
    from_number: String,
    to_numbers: Vec<String>,
    #[serde(default = "default_api_base")]
    api_base: String,
}

impl SmsConfig {
    fn parse(config: &Value) -> Result<Self> {
        let cfg: SmsConfig = parse_config("sms", config)?;
        if cfg.account_sid.trim().is_empty() || cfg.auth_token.trim().is_empty() {
            return Err(NotifyError::InvalidConfig(
                "sms: account_sid and auth_token are required".into(),
            ));
        }
        if cfg.to_numbers.is_empty() {
            return Err(NotifyError::InvalidConfig("sms: to_numbers is empty".into()));
        }
        for number in std::iter::once(&cfg.from_number).chain(&cfg.to_numbers) {
            if !is_e164(number) {
                return Err(NotifyError::InvalidConfig(format!(
                    "sms: '{number}' is not an E.164 phone number"
                )));
            }
        }
        if !is_http_url(&cfg.api_base) {
            return Err(NotifyError::InvalidConfig("sms: api_base is not a URL".into()));
        }
        Ok(cfg)
    }
}

/// Cuts `text` to [`SMS_MAX_CHARS`] characters, ending with `...` when cut.
pub fn fit_sms(text: &str) -> String {
    if text.chars().count() <= SMS_MAX_CHARS {
        return text.to_string();
    }
    let kept: String = text.chars().take(SMS_MAX_CHARS - 3).collect();
    format!("{kept}...")
}

/// Twilio-style messaging API: one request per destination number.
pub struct SmsProvider {
    client: reqwest::Client,
}

impl SmsProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn text(message: &NotificationMessage) -> String {
        let summary = message.summary.lines().next().unwrap_or_default();
        fit_sms(&format!("{} {}", message.title, summary))
    }
}

impl Default for SmsProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn sid_from(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("sid")?.as_str().map(str::to_string)
}

#[async_trait]
impl NotificationProvider for SmsProvider {
    fn provider_type(&self) -> ProviderKind {
        ProviderKind::Sms
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        SmsConfig::parse(config).map(|_| ())
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        _alert: &AlertInstance,
        message: &NotificationMessage,
    ) -> SendOutcome {
        let cfg = match SmsConfig::parse(&channel.config) {
            Ok(cfg) => cfg,
            Err(e) => return SendOutcome::failed(e.to_string(), 0),
        };
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            cfg.api_base.trim_end_matches('/'),
            cfg.account_sid
        );
        let text = Self::text(message);

        let mut outcome = SendOutcome {
            success: true,
            ..Default::default()
        };
        let mut responses = Vec::with_capacity(cfg.to_numbers.len());
        let mut errors = Vec::new();

        for to in &cfg.to_numbers {
            let payload = json!({"From": cfg.from_number, "To": to, "Body": text});
            let delivery = send_with_retry("sms", || {
                self.client
                    .post(&url)
                    .basic_auth(&cfg.account_sid, Some(&cfg.auth_token))
                    .json(&payload)
            })
            .await;
            let result = delivery.into_outcome(sid_from);
            outcome.attempts = outcome.attempts.max(result.attempts);
            if outcome.message_id.is_none() {
                outcome.message_id = result.message_id;
            }
            if let Some(r) = result.response {
                responses.push(format!("{to}: {r}"));
            }
            if !result.success {
                outcome.success = false;
                errors.push(format!(
                    "{to}: {}",
                    result.error.unwrap_or_else(|| "unknown error".into())
                ));
            }
        }

        outcome.response = (!responses.is_empty()).then(|| responses.join("\n"));
        outcome.error = (!errors.is_empty()).then(|| errors.join("; "));
        outcome
    }
}
