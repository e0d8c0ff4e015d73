use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::collections::HashMap;
use tripwire_common::types::{AlertInstance, NotificationChannel};

use crate::channels::{is_http_url, parse_config};
use crate::error::{NotifyError, Result};
use crate::utils::send_with_retry;
use crate::{NotificationMessage, NotificationProvider, ProviderKind, SendOutcome};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Tripwire-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Tripwire-Timestamp";

#[derive(Debug, Deserialize)]
struct WebhookConfig {
    url: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    secret: Option<String>,
}

impl WebhookConfig {
    fn parse(config: &Value) -> Result<Self> {
        let cfg: WebhookConfig = parse_config("webhook", config)?;
        if !is_http_url(&cfg.url) {
            return Err(NotifyError::InvalidConfig(format!(
                "webhook: '{}' is not an http(s) URL",
                cfg.url
            )));
        }
        cfg.method()?;
        Ok(cfg)
    }

    fn method(&self) -> Result<reqwest::Method> {
        match self.method.as_deref().map(str::to_uppercase).as_deref() {
            None | Some("POST") => Ok(reqwest::Method::POST),
            Some("PUT") => Ok(reqwest::Method::PUT),
            Some(other) => Err(NotifyError::InvalidConfig(format!(
                "webhook: unsupported method '{other}'"
            ))),
        }
    }
}

/// Hex HMAC-SHA256 of `"{timestamp}.{body}"`, sent as `sha256=<hex>`.
pub fn sign_payload(secret: &str, timestamp: i64, body: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| NotifyError::InvalidConfig(format!("webhook: bad secret: {e}")))?;
    mac.update(format!("{timestamp}.{body}").as_bytes());
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Generic JSON webhook carrying the full alert.
pub struct WebhookProvider {
    client: reqwest::Client,
}

impl WebhookProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn payload(alert: &AlertInstance, message: &NotificationMessage) -> Value {
        json!({
            "event": message.kind.as_str(),
            "title": message.title,
            "message": message.body,
            "severity": message.severity.as_str(),
            "timestamp": message.timestamp.to_rfc3339(),
            "action_url": message.action_url,
            "alert": alert,
        })
    }
}

impl Default for WebhookProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn id_from(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl NotificationProvider for WebhookProvider {
    fn provider_type(&self) -> ProviderKind {
        ProviderKind::Webhook
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        WebhookConfig::parse(config).map(|_| ())
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        alert: &AlertInstance,
        message: &NotificationMessage,
    ) -> SendOutcome {
        let prepared = WebhookConfig::parse(&channel.config).and_then(|cfg| {
            let method = cfg.method()?;
            let body = serde_json::to_string(&Self::payload(alert, message))?;
            let timestamp = Utc::now().timestamp();
            let signature = cfg
                .secret
                .as_deref()
                .map(|secret| sign_payload(secret, timestamp, &body))
                .transpose()?;
            Ok((cfg, method, body, timestamp, signature))
        });
        let (cfg, method, body, timestamp, signature) = match prepared {
            Ok(p) => p,
            Err(e) => return SendOutcome::failed(e.to_string(), 0),
        };

        send_with_retry("webhook", || {
            let mut req = self
                .client
                .request(method.clone(), &cfg.url)
                .header("Content-Type", "application/json")
                .body(body.clone());
            for (name, value) in &cfg.headers {
                req = req.header(name.as_str(), value.as_str());
            }
            if let Some(ref sig) = signature {
                req = req
                    .header(SIGNATURE_HEADER, sig.as_str())
                    .header(TIMESTAMP_HEADER, timestamp.to_string());
            }
            req
        })
        .await
        .into_outcome(id_from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_stable_and_secret_dependent() {
        let a = sign_payload("s3cret", 1_700_000_000, r#"{"a":1}"#).unwrap();
        let b = sign_payload("s3cret", 1_700_000_000, r#"{"a":1}"#).unwrap();
        let c = sign_payload("other", 1_700_000_000, r#"{"a":1}"#).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("sha256="));
        assert_eq!(a.len(), "sha256=".len() + 64);
    }

    #[test]
    fn validates_url_and_method() {
        assert!(WebhookConfig::parse(&json!({"url": "https://ops.example.com/hook"})).is_ok());
        assert!(WebhookConfig::parse(&json!({"url": "http://10.0.0.5:8080/x", "method": "put"})).is_ok());
        assert!(WebhookConfig::parse(&json!({"url": "ftp://example.com"})).is_err());
        assert!(WebhookConfig::parse(&json!({"url": "https://x.io", "method": "DELETE"})).is_err());
    }
}
