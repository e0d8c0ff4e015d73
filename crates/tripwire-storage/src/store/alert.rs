use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select,
};
use std::collections::HashMap;
use tripwire_common::types::{AlertInstance, AlertStatus, Severity};

use crate::entities::alert_instance::{self, Column as AlertCol, Entity as AlertEntity};
use crate::error::Result;
use crate::store::{parse_column, ts, utc, AlertStore};

/// Filters for the active (firing) alert listing. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct ActiveAlertFilter {
    pub severity: Option<Severity>,
    pub rule_id: Option<String>,
    pub source_contains: Option<String>,
    pub category: Option<String>,
}

fn model_to_alert(m: alert_instance::Model) -> Result<AlertInstance> {
    let labels: HashMap<String, String> = serde_json::from_str(&m.labels_json)?;
    let additional_data = m
        .additional_data_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;
    Ok(AlertInstance {
        status: parse_column("status", &m.status)?,
        severity: parse_column("severity", &m.severity)?,
        id: m.id,
        rule_id: m.rule_id,
        rule_name: m.rule_name,
        metric_name: m.metric_name,
        category: m.category,
        message: m.message,
        description: m.description,
        metric_value: m.metric_value,
        threshold: m.threshold,
        anomaly_score: m.anomaly_score,
        source: m.source,
        source_id: m.source_id,
        correlation_id: m.correlation_id,
        escalation_level: m.escalation_level.max(0) as u32,
        escalation_policy_id: m.escalation_policy_id,
        next_escalation_at: m.next_escalation_at.map(utc),
        first_triggered_at: utc(m.first_triggered_at),
        last_triggered_at: utc(m.last_triggered_at),
        last_escalated_at: m.last_escalated_at.map(utc),
        acknowledged_at: m.acknowledged_at.map(utc),
        acknowledged_by: m.acknowledged_by,
        resolved_at: m.resolved_at.map(utc),
        resolved_by: m.resolved_by,
        resolution_notes: m.resolution_notes,
        labels,
        additional_data,
    })
}

fn models_to_alerts(rows: Vec<alert_instance::Model>) -> Result<Vec<AlertInstance>> {
    rows.into_iter().map(model_to_alert).collect()
}

fn firing() -> Select<AlertEntity> {
    AlertEntity::find().filter(AlertCol::Status.eq(AlertStatus::Firing.as_str()))
}

fn apply_active_filter(mut q: Select<AlertEntity>, filter: &ActiveAlertFilter) -> Select<AlertEntity> {
    if let Some(sev) = filter.severity {
        q = q.filter(AlertCol::Severity.eq(sev.as_str()));
    }
    if let Some(ref rule_id) = filter.rule_id {
        q = q.filter(AlertCol::RuleId.eq(rule_id.as_str()));
    }
    if let Some(ref s) = filter.source_contains {
        q = q.filter(AlertCol::Source.contains(s.as_str()));
    }
    if let Some(ref cat) = filter.category {
        q = q.filter(AlertCol::Category.eq(cat.as_str()));
    }
    q
}

impl AlertStore {
    pub async fn insert_alert(&self, alert: &AlertInstance) -> Result<AlertInstance> {
        let am = alert_instance::ActiveModel {
            id: Set(alert.id.clone()),
            rule_id: Set(alert.rule_id.clone()),
            rule_name: Set(alert.rule_name.clone()),
            metric_name: Set(alert.metric_name.clone()),
            category: Set(alert.category.clone()),
            status: Set(alert.status.as_str().to_string()),
            severity: Set(alert.severity.as_str().to_string()),
            message: Set(alert.message.clone()),
            description: Set(alert.description.clone()),
            metric_value: Set(alert.metric_value),
            threshold: Set(alert.threshold),
            anomaly_score: Set(alert.anomaly_score),
            source: Set(alert.source.clone()),
            source_id: Set(alert.source_id.clone()),
            correlation_id: Set(alert.correlation_id.clone()),
            escalation_level: Set(alert.escalation_level as i32),
            escalation_policy_id: Set(alert.escalation_policy_id.clone()),
            next_escalation_at: Set(alert.next_escalation_at.map(ts)),
            first_triggered_at: Set(ts(alert.first_triggered_at)),
            last_triggered_at: Set(ts(alert.last_triggered_at)),
            last_escalated_at: Set(alert.last_escalated_at.map(ts)),
            acknowledged_at: Set(alert.acknowledged_at.map(ts)),
            acknowledged_by: Set(alert.acknowledged_by.clone()),
            resolved_at: Set(alert.resolved_at.map(ts)),
            resolved_by: Set(alert.resolved_by.clone()),
            resolution_notes: Set(alert.resolution_notes.clone()),
            labels_json: Set(serde_json::to_string(&alert.labels)?),
            additional_data_json: Set(alert
                .additional_data
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?),
        };
        let model = am.insert(self.db()).await?;
        model_to_alert(model)
    }

    pub async fn get_alert(&self, id: &str) -> Result<Option<AlertInstance>> {
        AlertEntity::find_by_id(id)
            .one(self.db())
            .await?
            .map(model_to_alert)
            .transpose()
    }

    /// The single firing instance for a (rule, source) pair, if any.
    pub async fn find_firing_alert(
        &self,
        rule_id: &str,
        source: &str,
    ) -> Result<Option<AlertInstance>> {
        firing()
            .filter(AlertCol::RuleId.eq(rule_id))
            .filter(AlertCol::Source.eq(source))
            .order_by(AlertCol::FirstTriggeredAt, Order::Desc)
            .one(self.db())
            .await?
            .map(model_to_alert)
            .transpose()
    }

    /// Records a repeated breach on a firing alert. Returns `None` if the alert
    /// is missing or no longer firing.
    pub async fn retrigger_alert(
        &self,
        id: &str,
        metric_value: f64,
        anomaly_score: Option<f64>,
        triggered_at: DateTime<Utc>,
    ) -> Result<Option<AlertInstance>> {
        let Some(model) = firing().filter(AlertCol::Id.eq(id)).one(self.db()).await? else {
            return Ok(None);
        };
        let mut am: alert_instance::ActiveModel = model.into();
        am.metric_value = Set(metric_value);
        am.anomaly_score = Set(anomaly_score);
        am.last_triggered_at = Set(ts(triggered_at));
        let updated = am.update(self.db()).await?;
        model_to_alert(updated).map(Some)
    }

    /// Moves a firing alert to `resolved` and clears its escalation schedule.
    /// Returns `None` if the alert is missing or already resolved.
    pub async fn resolve_alert(
        &self,
        id: &str,
        resolved_by: &str,
        notes: Option<&str>,
        resolved_at: DateTime<Utc>,
    ) -> Result<Option<AlertInstance>> {
        let Some(model) = firing().filter(AlertCol::Id.eq(id)).one(self.db()).await? else {
            return Ok(None);
        };
        let mut am: alert_instance::ActiveModel = model.into();
        am.status = Set(AlertStatus::Resolved.as_str().to_string());
        am.resolved_at = Set(Some(ts(resolved_at)));
        am.resolved_by = Set(Some(resolved_by.to_string()));
        am.resolution_notes = Set(notes.map(str::to_string));
        am.next_escalation_at = Set(None);
        let updated = am.update(self.db()).await?;
        model_to_alert(updated).map(Some)
    }

    pub async fn acknowledge_alert(
        &self,
        id: &str,
        acknowledged_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<AlertInstance>> {
        let Some(model) = firing().filter(AlertCol::Id.eq(id)).one(self.db()).await? else {
            return Ok(None);
        };
        let mut am: alert_instance::ActiveModel = model.into();
        am.acknowledged_at = Set(Some(ts(at)));
        am.acknowledged_by = Set(Some(acknowledged_by.to_string()));
        let updated = am.update(self.db()).await?;
        model_to_alert(updated).map(Some)
    }

    pub async fn set_escalation_schedule(
        &self,
        id: &str,
        policy_id: Option<&str>,
        next_escalation_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let Some(model) = AlertEntity::find_by_id(id).one(self.db()).await? else {
            return Ok(false);
        };
        let mut am: alert_instance::ActiveModel = model.into();
        am.escalation_policy_id = Set(policy_id.map(str::to_string));
        am.next_escalation_at = Set(next_escalation_at.map(ts));
        am.update(self.db()).await?;
        Ok(true)
    }

    /// Persists a fired escalation step together with the next schedule so a
    /// restart never repeats the step.
    pub async fn record_escalation(
        &self,
        id: &str,
        level: u32,
        escalated_at: DateTime<Utc>,
        next_escalation_at: Option<DateTime<Utc>>,
    ) -> Result<Option<AlertInstance>> {
        let Some(model) = AlertEntity::find_by_id(id).one(self.db()).await? else {
            return Ok(None);
        };
        let mut am: alert_instance::ActiveModel = model.into();
        am.escalation_level = Set(level as i32);
        am.last_escalated_at = Set(Some(ts(escalated_at)));
        am.next_escalation_at = Set(next_escalation_at.map(ts));
        let updated = am.update(self.db()).await?;
        model_to_alert(updated).map(Some)
    }

    /// Number of alerts opened by a rule since `since`, resolved ones included.
    pub async fn count_alerts_for_rule_since(
        &self,
        rule_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        Ok(AlertEntity::find()
            .filter(AlertCol::RuleId.eq(rule_id))
            .filter(AlertCol::FirstTriggeredAt.gte(ts(since)))
            .count(self.db())
            .await?)
    }

    pub async fn list_active_alerts(
        &self,
        filter: &ActiveAlertFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AlertInstance>> {
        let rows = apply_active_filter(firing(), filter)
            .order_by(AlertCol::LastTriggeredAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        models_to_alerts(rows)
    }

    pub async fn count_active_alerts(&self, filter: &ActiveAlertFilter) -> Result<u64> {
        Ok(apply_active_filter(firing(), filter).count(self.db()).await?)
    }

    /// Alerts of any status first triggered in `[from, to)`, newest first.
    pub async fn alert_history(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AlertInstance>> {
        let rows = AlertEntity::find()
            .filter(AlertCol::FirstTriggeredAt.gte(ts(from)))
            .filter(AlertCol::FirstTriggeredAt.lt(ts(to)))
            .order_by(AlertCol::FirstTriggeredAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        models_to_alerts(rows)
    }

    pub async fn count_alert_history(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<u64> {
        Ok(AlertEntity::find()
            .filter(AlertCol::FirstTriggeredAt.gte(ts(from)))
            .filter(AlertCol::FirstTriggeredAt.lt(ts(to)))
            .count(self.db())
            .await?)
    }

    pub async fn list_alerts_triggered_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AlertInstance>> {
        let rows = AlertEntity::find()
            .filter(AlertCol::FirstTriggeredAt.gte(ts(from)))
            .filter(AlertCol::FirstTriggeredAt.lt(ts(to)))
            .order_by(AlertCol::FirstTriggeredAt, Order::Asc)
            .all(self.db())
            .await?;
        models_to_alerts(rows)
    }

    /// Firing alerts whose persisted escalation schedule is due at `now`.
    pub async fn list_due_escalations(&self, now: DateTime<Utc>) -> Result<Vec<AlertInstance>> {
        let rows = firing()
            .filter(AlertCol::NextEscalationAt.is_not_null())
            .filter(AlertCol::NextEscalationAt.lte(ts(now)))
            .order_by(AlertCol::NextEscalationAt, Order::Asc)
            .all(self.db())
            .await?;
        models_to_alerts(rows)
    }
}
