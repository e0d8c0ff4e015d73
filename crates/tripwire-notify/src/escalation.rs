//! Timed escalation of alerts that stay open.
//!
//! Schedules live on the alert row (`next_escalation_at`) so they survive
//! restarts; [`Escalator::process_due`] is driven by the periodic cycle.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tripwire_common::types::{AlertInstance, EscalationCondition, EscalationPolicy};
use tripwire_storage::AlertStore;

use crate::dispatcher::{DeliveryReport, Dispatcher};
use crate::error::Result;

/// Where escalation policies come from.
#[async_trait]
pub trait EscalationPolicySource: Send + Sync {
    /// The policy that should govern a newly opened alert, if any.
    async fn policy_for(&self, alert: &AlertInstance) -> anyhow::Result<Option<EscalationPolicy>>;

    async fn policy_by_id(&self, id: &str) -> anyhow::Result<Option<EscalationPolicy>>;
}

/// Reads policies from the `escalation_policies` table. Rule-bound policies
/// win over catch-all ones.
pub struct StorePolicySource {
    store: Arc<AlertStore>,
}

impl StorePolicySource {
    pub fn new(store: Arc<AlertStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EscalationPolicySource for StorePolicySource {
    async fn policy_for(&self, alert: &AlertInstance) -> anyhow::Result<Option<EscalationPolicy>> {
        let policies = self.store.list_enabled_escalation_policies().await?;
        Ok(policies.into_iter().find(|p| p.applies_to(alert)))
    }

    async fn policy_by_id(&self, id: &str) -> anyhow::Result<Option<EscalationPolicy>> {
        Ok(self.store.get_escalation_policy(id).await?)
    }
}

fn step_delay(secs: u64) -> Duration {
    Duration::seconds(secs.min(u64::from(u32::MAX)) as i64)
}

pub struct Escalator {
    store: Arc<AlertStore>,
    dispatcher: Dispatcher,
    policies: Arc<dyn EscalationPolicySource>,
    chain_steps: bool,
}

impl Escalator {
    /// With `chain_steps` off, only the first step of a policy ever fires.
    pub fn new(
        store: Arc<AlertStore>,
        dispatcher: Dispatcher,
        policies: Arc<dyn EscalationPolicySource>,
        chain_steps: bool,
    ) -> Self {
        Self {
            store,
            dispatcher,
            policies,
            chain_steps,
        }
    }

    /// Persists the first-step schedule for a newly opened alert. Returns the
    /// due time, or `None` when no policy applies.
    pub async fn schedule(&self, alert: &AlertInstance) -> Result<Option<DateTime<Utc>>> {
        let policy = match self.policies.policy_for(alert).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(alert_id = %alert.id, error = %e, "Escalation policy lookup failed");
                None
            }
        };
        let Some(policy) = policy else {
            return Ok(None);
        };
        let Some(first) = policy.steps.first() else {
            return Ok(None);
        };

        let due = alert.first_triggered_at + step_delay(first.delay_secs);
        self.store
            .set_escalation_schedule(&alert.id, Some(&policy.id), Some(due))
            .await?;
        tracing::debug!(
            alert_id = %alert.id,
            policy_id = %policy.id,
            due = %due,
            "Escalation scheduled"
        );
        Ok(Some(due))
    }

    /// Fires every escalation step due at `now`. Returns how many steps
    /// delivered. A failing alert is logged and skipped.
    pub async fn process_due(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.store.list_due_escalations(now).await?;
        let mut fired = 0;
        for alert in due {
            match self.fire_step(&alert, now).await {
                Ok(Some(_)) => fired += 1,
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(alert_id = %alert.id, error = %e, "Escalation step failed");
                }
            }
        }
        Ok(fired)
    }

    async fn fire_step(
        &self,
        alert: &AlertInstance,
        now: DateTime<Utc>,
    ) -> Result<Option<DeliveryReport>> {
        // Re-read: the alert may have been resolved since the scan.
        let Some(current) = self.store.get_alert(&alert.id).await? else {
            return Ok(None);
        };
        if !current.is_firing() {
            return Ok(None);
        }

        let policy = match current.escalation_policy_id.as_deref() {
            Some(id) => self.policies.policy_by_id(id).await.unwrap_or_else(|e| {
                tracing::warn!(alert_id = %current.id, error = %e, "Escalation policy lookup failed");
                None
            }),
            None => None,
        };
        let level = current.escalation_level as usize;
        let step = policy
            .as_ref()
            .filter(|p| p.enabled)
            .and_then(|p| p.steps.get(level));
        let Some(step) = step else {
            self.clear(&current).await?;
            return Ok(None);
        };

        let condition_holds = match step.condition {
            None | Some(EscalationCondition::Unresolved) => true,
            Some(EscalationCondition::Unacknowledged) => current.acknowledged_at.is_none(),
        };
        if !condition_holds {
            tracing::debug!(alert_id = %current.id, level, "Escalation condition no longer holds");
            self.clear(&current).await?;
            return Ok(None);
        }

        let channels = self
            .store
            .list_enabled_channels_by_ids(&step.channel_ids)
            .await?;
        let report = self.dispatcher.send_escalation(&current, channels).await;

        let next = if self.chain_steps {
            policy
                .as_ref()
                .and_then(|p| p.steps.get(level + 1))
                .map(|s| now + step_delay(s.delay_secs))
        } else {
            None
        };
        self.store
            .record_escalation(&current.id, current.escalation_level + 1, now, next)
            .await?;

        tracing::info!(
            alert_id = %current.id,
            level = current.escalation_level + 1,
            sent = report.sent(),
            "Escalation step fired"
        );
        Ok(Some(report))
    }

    async fn clear(&self, alert: &AlertInstance) -> Result<()> {
        self.store
            .set_escalation_schedule(&alert.id, alert.escalation_policy_id.as_deref(), None)
            .await?;
        Ok(())
    }
}
