//! Operator-facing operations over alerts, channels and suppressions.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tripwire_alert::{AlertTransition, EvaluatorStatus, RuleEvaluator};
use tripwire_common::types::{
    AlertInstance, AnalyticsBucket, MetricSample, NotificationAttempt, NotificationChannel,
    Severity, Suppression,
};
use tripwire_notify::{ChannelDelivery, Dispatcher};
use tripwire_storage::{ActiveAlertFilter, AlertStore};

use tripwire_alert::analytics::HOURLY;

/// Default and maximum page sizes for listings.
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
}

/// A notification channel as submitted by an operator or a seed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub name: String,
    pub channel_type: String,
    pub config: serde_json::Value,
    #[serde(default)]
    pub severity_filter: Option<Vec<Severity>>,
    #[serde(default)]
    pub category_filter: Option<Vec<String>>,
    #[serde(default)]
    pub tag_filter: Option<Vec<String>>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_hour: u32,
    #[serde(default)]
    pub message_template: Option<String>,
    #[serde(default)]
    pub title_template: Option<String>,
}

/// A suppression window. Without `starts_at` it starts now; `duration_secs`
/// is used when `ends_at` is absent; with neither it never ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionSpec {
    pub name: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub rule_ids: Option<Vec<String>>,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub severities: Option<Vec<Severity>>,
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_secs: Option<u64>,
    #[serde(default)]
    pub created_by: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_rate_limit() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub firing_alerts: u64,
    pub evaluator: EvaluatorStatus,
}

fn clamp_limit(limit: usize) -> usize {
    match limit {
        0 => DEFAULT_PAGE_SIZE,
        n => n.min(MAX_PAGE_SIZE),
    }
}

#[derive(Clone)]
pub struct AlertingService {
    store: Arc<AlertStore>,
    dispatcher: Dispatcher,
    evaluator: RuleEvaluator,
    running: Arc<AtomicBool>,
}

impl AlertingService {
    /// `running` is the scheduler's liveness flag.
    pub fn new(evaluator: RuleEvaluator, running: Arc<AtomicBool>) -> Self {
        Self {
            store: evaluator.store().clone(),
            dispatcher: evaluator.dispatcher().clone(),
            evaluator,
            running,
        }
    }

    pub fn store(&self) -> &Arc<AlertStore> {
        &self.store
    }

    pub async fn ingest_metric(&self, sample: MetricSample) -> Result<Vec<AlertTransition>> {
        Ok(self.evaluator.ingest_metric(sample).await?)
    }

    pub async fn list_active_alerts(
        &self,
        filter: &ActiveAlertFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Page<AlertInstance>> {
        let limit = clamp_limit(limit);
        let items = self.store.list_active_alerts(filter, limit, offset).await?;
        let total = self.store.count_active_alerts(filter).await?;
        Ok(Page {
            items,
            total,
            limit,
            offset,
        })
    }

    pub async fn alert_history(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
        offset: usize,
    ) -> Result<Page<AlertInstance>> {
        if from >= to {
            return Err(anyhow!("history window is empty: {from} >= {to}"));
        }
        let limit = clamp_limit(limit);
        let items = self.store.alert_history(from, to, limit, offset).await?;
        let total = self.store.count_alert_history(from, to).await?;
        Ok(Page {
            items,
            total,
            limit,
            offset,
        })
    }

    /// Validates the config against the channel's provider before anything
    /// is persisted. The returned channel has secrets redacted.
    pub async fn create_channel(&self, spec: ChannelSpec) -> Result<NotificationChannel> {
        if spec.name.trim().is_empty() {
            return Err(anyhow!("channel name must not be empty"));
        }
        self.dispatcher
            .registry()
            .validate(&spec.channel_type, &spec.config)?;

        let now = Utc::now();
        let channel = NotificationChannel {
            id: tripwire_common::id::next_id(),
            name: spec.name,
            channel_type: spec.channel_type,
            config: spec.config,
            severity_filter: spec.severity_filter,
            category_filter: spec.category_filter,
            tag_filter: spec.tag_filter,
            enabled: spec.enabled,
            rate_limit_per_hour: spec.rate_limit_per_hour,
            message_template: spec.message_template,
            title_template: spec.title_template,
            created_at: now,
            updated_at: now,
        };
        let stored = self.store.insert_channel(&channel).await?;
        tracing::info!(channel_id = %stored.id, name = %stored.name, channel_type = %stored.channel_type, "Channel created");
        Ok(self.redacted(stored))
    }

    pub async fn list_channels(&self) -> Result<Vec<NotificationChannel>> {
        let channels = self.store.list_channels().await?;
        Ok(channels.into_iter().map(|c| self.redacted(c)).collect())
    }

    pub async fn test_channel(&self, channel_id: &str) -> Result<ChannelDelivery> {
        let channel = self
            .store
            .get_channel(channel_id)
            .await?
            .ok_or_else(|| anyhow!("channel not found: {channel_id}"))?;
        Ok(self.dispatcher.test_channel(&channel).await?)
    }

    pub async fn channel_attempts(
        &self,
        channel_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<NotificationAttempt>> {
        Ok(self
            .store
            .list_attempts_for_channel(channel_id, clamp_limit(limit), offset)
            .await?)
    }

    pub async fn create_suppression(&self, spec: SuppressionSpec) -> Result<Suppression> {
        let now = Utc::now();
        let starts_at = spec.starts_at.unwrap_or(now);
        let ends_at = spec.ends_at.or_else(|| {
            spec.duration_secs
                .map(|secs| starts_at + Duration::seconds(secs.min(u64::from(u32::MAX)) as i64))
        });
        if ends_at.is_some_and(|end| end <= starts_at) {
            return Err(anyhow!("suppression '{}' ends before it starts", spec.name));
        }

        let suppression = Suppression {
            id: tripwire_common::id::next_id(),
            name: spec.name,
            reason: spec.reason,
            rule_ids: spec.rule_ids,
            categories: spec.categories,
            severities: spec.severities,
            sources: spec.sources,
            tags: spec.tags,
            starts_at,
            ends_at,
            is_active: true,
            created_by: spec.created_by,
            created_at: now,
        };
        let stored = self.store.insert_suppression(&suppression).await?;
        tracing::info!(suppression_id = %stored.id, name = %stored.name, "Suppression created");
        Ok(stored)
    }

    pub async fn deactivate_suppression(&self, id: &str) -> Result<bool> {
        let changed = self.store.deactivate_suppression(id).await?;
        if changed {
            tracing::info!(suppression_id = %id, "Suppression deactivated");
        }
        Ok(changed)
    }

    pub async fn acknowledge_alert(&self, alert_id: &str, by: &str) -> Result<AlertInstance> {
        let alert = self
            .store
            .acknowledge_alert(alert_id, by, Utc::now())
            .await?
            .ok_or_else(|| anyhow!("no firing alert with id {alert_id}"))?;
        tracing::info!(alert_id = %alert.id, by = %by, "Alert acknowledged");
        Ok(alert)
    }

    /// Resolves a firing alert on behalf of an operator and sends the
    /// resolution notice.
    pub async fn resolve_alert(
        &self,
        alert_id: &str,
        by: &str,
        notes: Option<&str>,
    ) -> Result<AlertInstance> {
        let alert = self
            .store
            .resolve_alert(alert_id, by, notes, Utc::now())
            .await?
            .ok_or_else(|| anyhow!("no firing alert with id {alert_id}"))?;
        tracing::info!(alert_id = %alert.id, by = %by, "Alert resolved manually");
        if let Err(e) = self.dispatcher.notify_resolution(&alert).await {
            tracing::error!(alert_id = %alert.id, error = %e, "Resolution notification failed");
        }
        Ok(alert)
    }

    pub async fn analytics(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AnalyticsBucket>> {
        Ok(self.store.list_analytics_buckets(HOURLY, from, to).await?)
    }

    pub async fn status(&self) -> Result<ServiceStatus> {
        let firing_alerts = self
            .store
            .count_active_alerts(&ActiveAlertFilter::default())
            .await?;
        Ok(ServiceStatus {
            running: self.running.load(Ordering::SeqCst),
            firing_alerts,
            evaluator: self.evaluator.status().await,
        })
    }

    fn redacted(&self, mut channel: NotificationChannel) -> NotificationChannel {
        channel.config = self.dispatcher.registry().redact_config(&channel.config);
        channel
    }
}
