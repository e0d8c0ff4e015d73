//! Helpers shared by the HTTP providers.

use serde_json::Value;
use std::time::Duration;

use crate::SendOutcome;

/// Maximum length for a response body stored on an attempt row.
pub const MAX_BODY_LENGTH: usize = 4000;

/// Transport attempts per send, first try included.
pub const MAX_ATTEMPTS: u32 = 3;

/// Truncates to at most `max_chars` characters, marking the cut.
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((idx, _)) => format!("{}... [truncated]", &s[..idx]),
    }
}

/// Backoff before retry `attempt` (0-based): 100 ms, then 200 ms.
pub fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(100 * 2u64.pow(attempt))
}

/// Redacts values of keys that commonly hold credentials:
/// password, token, secret, api_key, auth and credentials variants.
pub fn redact_sensitive_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = serde_json::Map::new();
            for (key, val) in map {
                let key_lower = key.to_lowercase();
                let is_sensitive = key_lower.contains("password")
                    || key_lower.contains("passwd")
                    || key_lower.contains("token")
                    || key_lower.contains("secret")
                    || key_lower.contains("api_key")
                    || key_lower.contains("apikey")
                    || key_lower.contains("credentials");

                if is_sensitive {
                    redacted.insert(key.clone(), Value::String("***".to_string()));
                } else if val.is_object() || val.is_array() {
                    redacted.insert(key.clone(), redact_sensitive_json(val));
                } else {
                    redacted.insert(key.clone(), val.clone());
                }
            }
            Value::Object(redacted)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(redact_sensitive_json).collect()),
        _ => value.clone(),
    }
}

/// Final state of an HTTP delivery after retries.
#[derive(Debug, Default)]
pub(crate) struct HttpDelivery {
    pub status: Option<u16>,
    pub body: Option<String>,
    pub attempts: u32,
    pub error: Option<String>,
}

impl HttpDelivery {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.status.is_some_and(|s| (200..300).contains(&s))
    }

    /// Converts into a [`SendOutcome`], letting the caller pull a provider
    /// message id out of the response body.
    pub fn into_outcome(self, message_id: impl FnOnce(&str) -> Option<String>) -> SendOutcome {
        let success = self.succeeded();
        let message_id = if success {
            self.body.as_deref().and_then(message_id)
        } else {
            None
        };
        SendOutcome {
            success,
            message_id,
            response: self.body,
            error: self.error,
            attempts: self.attempts,
        }
    }
}

/// Sends the request built by `build` up to [`MAX_ATTEMPTS`] times with
/// exponential backoff until a 2xx arrives.
pub(crate) async fn send_with_retry<F>(provider: &'static str, mut build: F) -> HttpDelivery
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let mut delivery = HttpDelivery::default();

    for attempt in 0..MAX_ATTEMPTS {
        delivery.attempts = attempt + 1;
        match build().send().await {
            Ok(resp) => {
                let status = resp.status();
                delivery.status = Some(status.as_u16());
                let body = match resp.text().await {
                    Ok(text) => truncate_string(&text, MAX_BODY_LENGTH),
                    Err(e) => format!("[Failed to read response body: {e}]"),
                };
                delivery.body = Some(body.clone());

                if status.is_success() {
                    delivery.error = None;
                    return delivery;
                }
                tracing::warn!(
                    provider,
                    attempt = delivery.attempts,
                    status = %status,
                    "Provider returned non-success status, retrying"
                );
                delivery.error = Some(format!("HTTP {status}: {body}"));
            }
            Err(e) => {
                tracing::warn!(
                    provider,
                    attempt = delivery.attempts,
                    error = %e,
                    "Provider request failed, retrying"
                );
                delivery.status = None;
                delivery.error = Some(e.to_string());
            }
        }
        if attempt + 1 < MAX_ATTEMPTS {
            tokio::time::sleep(backoff(attempt)).await;
        }
    }

    if let Some(ref e) = delivery.error {
        tracing::error!(provider, error = %e, "Notification failed after {MAX_ATTEMPTS} attempts");
    }
    delivery
}
