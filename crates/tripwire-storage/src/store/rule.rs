use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder,
};
use tripwire_common::types::{AlertRule, CompareOp};

use crate::entities::alert_rule::{self, Column as RuleCol, Entity as RuleEntity};
use crate::error::{Result, StorageError};
use crate::store::{parse_column, ts, utc, AlertStore};

fn model_to_rule(m: alert_rule::Model) -> Result<AlertRule> {
    let operator = m
        .operator
        .as_deref()
        .map(|op| parse_column::<CompareOp>("operator", op))
        .transpose()?;
    Ok(AlertRule {
        severity: parse_column("severity", &m.severity)?,
        operator,
        id: m.id,
        name: m.name,
        metric_name: m.metric_name,
        threshold: m.threshold,
        use_anomaly_detection: m.use_anomaly_detection,
        aggregation_window_secs: m.aggregation_window_secs.max(0) as u64,
        category: m.category,
        max_alerts_per_hour: m.max_alerts_per_hour.max(0) as u32,
        enabled: m.enabled,
        created_at: utc(m.created_at),
        updated_at: utc(m.updated_at),
    })
}

impl AlertStore {
    pub async fn insert_rule(&self, rule: &AlertRule) -> Result<AlertRule> {
        let am = alert_rule::ActiveModel {
            id: Set(rule.id.clone()),
            name: Set(rule.name.clone()),
            metric_name: Set(rule.metric_name.clone()),
            operator: Set(rule.operator.map(|op| op.as_str().to_string())),
            threshold: Set(rule.threshold),
            use_anomaly_detection: Set(rule.use_anomaly_detection),
            aggregation_window_secs: Set(rule.aggregation_window_secs as i64),
            severity: Set(rule.severity.as_str().to_string()),
            category: Set(rule.category.clone()),
            max_alerts_per_hour: Set(rule.max_alerts_per_hour as i32),
            enabled: Set(rule.enabled),
            created_at: Set(ts(rule.created_at)),
            updated_at: Set(ts(rule.updated_at)),
        };
        let model = am.insert(self.db()).await?;
        model_to_rule(model)
    }

    pub async fn get_rule(&self, id: &str) -> Result<Option<AlertRule>> {
        RuleEntity::find_by_id(id)
            .one(self.db())
            .await?
            .map(model_to_rule)
            .transpose()
    }

    pub async fn list_rules(&self) -> Result<Vec<AlertRule>> {
        let rows = RuleEntity::find()
            .order_by(RuleCol::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_rule).collect()
    }

    pub async fn list_enabled_rules(&self) -> Result<Vec<AlertRule>> {
        let rows = RuleEntity::find()
            .filter(RuleCol::Enabled.eq(true))
            .order_by(RuleCol::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_rule).collect()
    }

    pub async fn list_enabled_rules_for_metric(&self, metric_name: &str) -> Result<Vec<AlertRule>> {
        let rows = RuleEntity::find()
            .filter(RuleCol::Enabled.eq(true))
            .filter(RuleCol::MetricName.eq(metric_name))
            .order_by(RuleCol::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_rule).collect()
    }

    /// Rewrites every mutable column of an existing rule.
    pub async fn update_rule(&self, rule: &AlertRule) -> Result<AlertRule> {
        let model = RuleEntity::find_by_id(rule.id.as_str())
            .one(self.db())
            .await?
            .ok_or_else(|| StorageError::NotFound {
                entity: "alert_rule",
                id: rule.id.clone(),
            })?;
        let mut am: alert_rule::ActiveModel = model.into();
        am.name = Set(rule.name.clone());
        am.metric_name = Set(rule.metric_name.clone());
        am.operator = Set(rule.operator.map(|op| op.as_str().to_string()));
        am.threshold = Set(rule.threshold);
        am.use_anomaly_detection = Set(rule.use_anomaly_detection);
        am.aggregation_window_secs = Set(rule.aggregation_window_secs as i64);
        am.severity = Set(rule.severity.as_str().to_string());
        am.category = Set(rule.category.clone());
        am.max_alerts_per_hour = Set(rule.max_alerts_per_hour as i32);
        am.enabled = Set(rule.enabled);
        am.updated_at = Set(Utc::now().fixed_offset());
        let updated = am.update(self.db()).await?;
        model_to_rule(updated)
    }

    /// Returns `false` when the rule does not exist.
    pub async fn set_rule_enabled(&self, id: &str, enabled: bool) -> Result<bool> {
        let Some(model) = RuleEntity::find_by_id(id).one(self.db()).await? else {
            return Ok(false);
        };
        let mut am: alert_rule::ActiveModel = model.into();
        am.enabled = Set(enabled);
        am.updated_at = Set(Utc::now().fixed_offset());
        am.update(self.db()).await?;
        Ok(true)
    }

    pub async fn delete_rule(&self, id: &str) -> Result<bool> {
        let res = RuleEntity::delete_by_id(id).exec(self.db()).await?;
        Ok(res.rows_affected > 0)
    }
}
