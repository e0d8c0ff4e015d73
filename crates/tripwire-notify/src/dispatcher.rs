use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tripwire_common::types::{
    AlertInstance, AlertStatus, AttemptStatus, NotificationAttempt, NotificationChannel,
    NotificationKind, Severity,
};
use tripwire_storage::{AlertStore, AttemptOutcome};

use crate::error::Result;
use crate::matcher::select_channels;
use crate::message::NotificationMessage;
use crate::rate_limit::RateLimiter;
use crate::registry::ProviderRegistry;

/// Outcome of one channel delivery as recorded in the attempt log.
#[derive(Debug, Clone)]
pub struct ChannelDelivery {
    pub channel_id: String,
    pub attempt_id: String,
    pub status: AttemptStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DeliveryReport {
    pub deliveries: Vec<ChannelDelivery>,
}

impl DeliveryReport {
    pub fn count(&self, status: AttemptStatus) -> usize {
        self.deliveries.iter().filter(|d| d.status == status).count()
    }

    pub fn sent(&self) -> usize {
        self.count(AttemptStatus::Sent)
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }
}

/// Fans alerts out to channels and keeps the attempt log.
///
/// Cloning is cheap; clones share the rate-limit cache.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<AlertStore>,
    registry: Arc<ProviderRegistry>,
    limiter: Arc<RateLimiter>,
}

impl Dispatcher {
    pub fn new(store: Arc<AlertStore>, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            store,
            registry,
            limiter: Arc::new(RateLimiter::new()),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Enabled channels whose filters accept the alert.
    pub async fn channels_for_alert(&self, alert: &AlertInstance) -> Result<Vec<NotificationChannel>> {
        let channels = self.store.list_enabled_channels().await?;
        Ok(select_channels(channels, alert))
    }

    /// First-time notification of a newly opened alert.
    pub async fn notify_alert(&self, alert: &AlertInstance) -> Result<DeliveryReport> {
        let channels = self.channels_for_alert(alert).await?;
        if channels.is_empty() {
            tracing::debug!(alert_id = %alert.id, "No channel accepts alert");
            return Ok(DeliveryReport::default());
        }
        Ok(self.fan_out(alert, channels, NotificationKind::Alert).await)
    }

    /// Resolution notice, sent only to channels that already delivered
    /// something for this alert.
    pub async fn notify_resolution(&self, alert: &AlertInstance) -> Result<DeliveryReport> {
        let notified = self.store.channels_notified_for_alert(&alert.id).await?;
        let channels = self.store.list_enabled_channels_by_ids(&notified).await?;
        if channels.is_empty() {
            return Ok(DeliveryReport::default());
        }
        Ok(self.fan_out(alert, channels, NotificationKind::Resolution).await)
    }

    /// Escalation step delivery to an explicit channel list; channel filters
    /// are not applied.
    pub async fn send_escalation(
        &self,
        alert: &AlertInstance,
        channels: Vec<NotificationChannel>,
    ) -> DeliveryReport {
        self.fan_out(alert, channels, NotificationKind::Escalation).await
    }

    /// Sends a synthetic alert through the channel's provider. Test sends
    /// bypass the rate limit and are recorded with kind `test`.
    pub async fn test_channel(&self, channel: &NotificationChannel) -> Result<ChannelDelivery> {
        let alert = synthetic_alert(Utc::now());
        self.deliver(channel, &alert, NotificationKind::Test).await
    }

    async fn fan_out(
        &self,
        alert: &AlertInstance,
        channels: Vec<NotificationChannel>,
        kind: NotificationKind,
    ) -> DeliveryReport {
        let alert = Arc::new(alert.clone());
        let mut set = JoinSet::new();
        for channel in channels {
            let this = self.clone();
            let alert = Arc::clone(&alert);
            set.spawn(async move {
                let result = this.deliver(&channel, &alert, kind).await;
                (channel.id, result)
            });
        }

        let mut report = DeliveryReport::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(delivery))) => report.deliveries.push(delivery),
                Ok((channel_id, Err(e))) => {
                    tracing::error!(
                        alert_id = %alert.id,
                        channel_id = %channel_id,
                        error = %e,
                        "Notification delivery failed"
                    );
                }
                Err(e) => {
                    tracing::error!(alert_id = %alert.id, error = %e, "Notification task panicked");
                }
            }
        }
        report
    }

    /// The per-channel path: rate limit, provider lookup, pending attempt,
    /// send, finalize. Concurrent deliveries on one channel never exceed its
    /// hourly limit.
    pub async fn deliver(
        &self,
        channel: &NotificationChannel,
        alert: &AlertInstance,
        kind: NotificationKind,
    ) -> Result<ChannelDelivery> {
        let now = Utc::now();

        // Held until the pending row claims the slot.
        let admission = match kind {
            NotificationKind::Test => None,
            _ => Some(self.limiter.admit(&self.store, channel, now).await?),
        };
        if admission.as_ref().is_some_and(|a| !a.allowed) {
            tracing::info!(
                alert_id = %alert.id,
                channel_id = %channel.id,
                limit = channel.rate_limit_per_hour,
                "Channel rate limited"
            );
            let error = format!(
                "rate limit of {} per hour reached",
                channel.rate_limit_per_hour
            );
            let attempt = new_attempt(alert, channel, kind, AttemptStatus::RateLimited, now);
            let attempt = self
                .store
                .insert_attempt(&NotificationAttempt {
                    error_message: Some(error.clone()),
                    ..attempt
                })
                .await?;
            return Ok(ChannelDelivery {
                channel_id: channel.id.clone(),
                attempt_id: attempt.id,
                status: AttemptStatus::RateLimited,
                error: Some(error),
            });
        }

        let provider = match self.registry.resolve(&channel.channel_type) {
            Ok(p) => p,
            Err(e) => {
                let attempt = new_attempt(alert, channel, kind, AttemptStatus::Failed, now);
                let attempt = self
                    .store
                    .insert_attempt(&NotificationAttempt {
                        error_message: Some(e.to_string()),
                        ..attempt
                    })
                    .await?;
                return Ok(ChannelDelivery {
                    channel_id: channel.id.clone(),
                    attempt_id: attempt.id,
                    status: AttemptStatus::Failed,
                    error: Some(e.to_string()),
                });
            }
        };

        let message = NotificationMessage::build(alert, channel, kind, now);
        let pending = self
            .store
            .insert_attempt(&new_attempt(alert, channel, kind, AttemptStatus::Pending, now))
            .await?;
        drop(admission);

        let outcome = provider.send(channel, alert, &message).await;
        let status = if outcome.success {
            AttemptStatus::Sent
        } else {
            AttemptStatus::Failed
        };
        self.store
            .finalize_attempt(
                &pending.id,
                &AttemptOutcome {
                    status,
                    attempts: outcome.attempts,
                    response: outcome.response,
                    error_message: outcome.error.clone(),
                    message_id: outcome.message_id,
                },
            )
            .await?;

        if outcome.success {
            self.limiter.record(&channel.id, now);
            tracing::info!(
                alert_id = %alert.id,
                channel_id = %channel.id,
                kind = %kind,
                "Notification sent"
            );
        } else {
            tracing::warn!(
                alert_id = %alert.id,
                channel_id = %channel.id,
                kind = %kind,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "Notification failed"
            );
        }

        Ok(ChannelDelivery {
            channel_id: channel.id.clone(),
            attempt_id: pending.id,
            status,
            error: outcome.error,
        })
    }
}

fn new_attempt(
    alert: &AlertInstance,
    channel: &NotificationChannel,
    kind: NotificationKind,
    status: AttemptStatus,
    now: DateTime<Utc>,
) -> NotificationAttempt {
    NotificationAttempt {
        id: tripwire_common::id::next_id(),
        alert_id: alert.id.clone(),
        channel_id: channel.id.clone(),
        kind,
        status,
        attempts: 0,
        response: None,
        error_message: None,
        message_id: None,
        created_at: now,
        sent_at: None,
        updated_at: now,
    }
}

fn synthetic_alert(now: DateTime<Utc>) -> AlertInstance {
    AlertInstance {
        id: format!("test-{}", tripwire_common::id::next_id()),
        rule_id: "test".to_string(),
        rule_name: "Channel test".to_string(),
        metric_name: "test_metric".to_string(),
        category: "system".to_string(),
        status: AlertStatus::Firing,
        severity: Severity::Low,
        message: "Test notification from tripwire".to_string(),
        description: None,
        metric_value: 1.0,
        threshold: Some(0.0),
        anomaly_score: None,
        source: "tripwire".to_string(),
        source_id: None,
        correlation_id: None,
        escalation_level: 0,
        escalation_policy_id: None,
        next_escalation_at: None,
        first_triggered_at: now,
        last_triggered_at: now,
        last_escalated_at: None,
        acknowledged_at: None,
        acknowledged_by: None,
        resolved_at: None,
        resolved_by: None,
        resolution_notes: None,
        labels: HashMap::new(),
        additional_data: None,
    }
}
