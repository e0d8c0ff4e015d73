use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::channels::{
    discord::DiscordProvider, email::EmailProvider, slack::SlackProvider, sms::SmsProvider,
    webhook::WebhookProvider,
};
use crate::error::{NotifyError, Result};
use crate::utils::redact_sensitive_json;
use crate::{NotificationProvider, ProviderKind};

/// Lookup table from [`ProviderKind`] to its provider.
///
/// # Examples
///
/// ```
/// use tripwire_notify::registry::ProviderRegistry;
///
/// let registry = ProviderRegistry::default();
/// assert!(registry.has_provider("email"));
/// assert!(registry.has_provider("discord"));
/// assert!(!registry.has_provider("pager"));
/// ```
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn NotificationProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Registers a provider under its own kind, replacing any previous one.
    pub fn register(&mut self, provider: Arc<dyn NotificationProvider>) {
        self.providers.insert(provider.provider_type(), provider);
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn NotificationProvider>> {
        self.providers.get(&kind).cloned()
    }

    /// Resolves a channel's `channel_type` string to its provider.
    pub fn resolve(&self, channel_type: &str) -> Result<Arc<dyn NotificationProvider>> {
        let kind: ProviderKind = channel_type.parse()?;
        self.get(kind)
            .ok_or_else(|| NotifyError::UnknownChannelType(channel_type.to_string()))
    }

    /// Validates a channel config against the provider named by `channel_type`.
    pub fn validate(&self, channel_type: &str, config: &Value) -> Result<()> {
        self.resolve(channel_type)?.validate_config(config)
    }

    pub fn has_provider(&self, channel_type: &str) -> bool {
        self.resolve(channel_type).is_ok()
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.providers.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    /// Copy of a channel config safe to show to operators.
    pub fn redact_config(&self, config: &Value) -> Value {
        redact_sensitive_json(config)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(EmailProvider::new()));
        registry.register(Arc::new(SlackProvider::new()));
        registry.register(Arc::new(DiscordProvider::new()));
        registry.register(Arc::new(SmsProvider::new()));
        registry.register(Arc::new(WebhookProvider::new()));
        registry
    }
}
