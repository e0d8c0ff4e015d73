//! Built-in providers, one module per [`ProviderKind`](crate::ProviderKind).

pub mod discord;
pub mod email;
pub mod slack;
pub mod sms;
pub mod webhook;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::{NotifyError, Result};

/// Deserializes a channel config, tagging errors with the provider name.
pub(crate) fn parse_config<T: DeserializeOwned>(provider: &str, config: &Value) -> Result<T> {
    serde_json::from_value(config.clone())
        .map_err(|e| NotifyError::InvalidConfig(format!("{provider}: {e}")))
}

pub(crate) fn cached_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex pattern is valid"))
}

pub(crate) fn is_http_url(url: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached_regex(&RE, r"^https?://[^\s/?#]+[^\s]*$").is_match(url)
}

pub(crate) fn is_e164(number: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached_regex(&RE, r"^\+[1-9]\d{1,14}$").is_match(number)
}

pub(crate) fn hex_color(color: u32) -> String {
    format!("#{color:06x}")
}
