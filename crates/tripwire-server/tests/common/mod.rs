#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tripwire_common::types::*;
use tripwire_notify::{
    NotificationMessage, NotificationProvider, NotifyError, ProviderKind, ProviderRegistry,
    SendOutcome,
};
use tripwire_server::app::App;
use tripwire_server::config::ServerConfig;
use tripwire_server::service::ChannelSpec;

/// Stands in for the webhook provider: requires an http(s) `url` and
/// records every send instead of making a request.
pub struct RecordingWebhook {
    calls: Mutex<Vec<(String, NotificationKind)>>,
}

impl RecordingWebhook {
    pub fn calls(&self) -> Vec<(String, NotificationKind)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationProvider for RecordingWebhook {
    fn provider_type(&self) -> ProviderKind {
        ProviderKind::Webhook
    }

    fn validate_config(&self, config: &Value) -> tripwire_notify::Result<()> {
        match config["url"].as_str() {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => Ok(()),
            _ => Err(NotifyError::InvalidConfig("webhook: url must be http(s)".into())),
        }
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        _alert: &AlertInstance,
        message: &NotificationMessage,
    ) -> SendOutcome {
        self.calls
            .lock()
            .unwrap()
            .push((channel.id.clone(), message.kind));
        SendOutcome {
            success: true,
            message_id: None,
            response: Some("HTTP 200".into()),
            error: None,
            attempts: 1,
        }
    }
}

pub struct TestContext {
    pub temp_dir: TempDir,
    pub app: App,
    pub webhook: Arc<RecordingWebhook>,
}

pub fn test_config(temp_dir: &TempDir) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.database.url = format!(
        "sqlite://{}?mode=rwc",
        temp_dir.path().join("tripwire.db").display()
    );
    config.evaluation.critical_metrics = vec!["error_rate".to_string()];
    config.evaluation.interval_secs = 1;
    config
}

pub async fn build_test_context() -> Result<TestContext> {
    let temp_dir = tempfile::tempdir()?;
    let config = test_config(&temp_dir);

    let webhook = Arc::new(RecordingWebhook {
        calls: Mutex::new(Vec::new()),
    });
    let mut registry = ProviderRegistry::default();
    registry.register(webhook.clone());

    let app = App::build_with_registry(&config, registry).await?;
    Ok(TestContext {
        temp_dir,
        app,
        webhook,
    })
}

pub fn webhook_channel(name: &str, severities: Option<Vec<Severity>>) -> ChannelSpec {
    ChannelSpec {
        name: name.to_string(),
        channel_type: "webhook".to_string(),
        config: json!({ "url": "https://hooks.example.com/tripwire", "secret": "s3cret" }),
        severity_filter: severities,
        category_filter: None,
        tag_filter: None,
        enabled: true,
        rate_limit_per_hour: 10,
        message_template: None,
        title_template: None,
    }
}

pub fn error_rate_rule() -> AlertRule {
    let now = Utc::now();
    AlertRule {
        id: tripwire_common::id::next_id(),
        name: "trading error rate".to_string(),
        metric_name: "error_rate".to_string(),
        operator: Some(CompareOp::Gt),
        threshold: Some(0.3),
        use_anomaly_detection: false,
        aggregation_window_secs: 300,
        severity: Severity::High,
        category: "trading".to_string(),
        max_alerts_per_hour: 10,
        enabled: true,
        created_at: now,
        updated_at: now,
    }
}

pub fn sample(value: f64, at: DateTime<Utc>) -> MetricSample {
    MetricSample {
        name: "error_rate".to_string(),
        value,
        source: "trading-engine".to_string(),
        source_id: None,
        timestamp: at,
        labels: HashMap::new(),
        additional_data: None,
    }
}
