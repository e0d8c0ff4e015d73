use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder,
};
use tripwire_common::types::EscalationPolicy;

use crate::entities::escalation_policy::{self, Column as PolicyCol, Entity as PolicyEntity};
use crate::error::Result;
use crate::store::{decode_list, encode_list, AlertStore};

fn model_to_policy(m: escalation_policy::Model) -> Result<EscalationPolicy> {
    Ok(EscalationPolicy {
        severities: decode_list(m.severities.as_deref())?,
        steps: serde_json::from_str(&m.steps_json)?,
        id: m.id,
        name: m.name,
        rule_id: m.rule_id,
        enabled: m.enabled,
    })
}

impl AlertStore {
    pub async fn insert_escalation_policy(
        &self,
        policy: &EscalationPolicy,
    ) -> Result<EscalationPolicy> {
        let now = Utc::now().fixed_offset();
        let am = escalation_policy::ActiveModel {
            id: Set(policy.id.clone()),
            name: Set(policy.name.clone()),
            rule_id: Set(policy.rule_id.clone()),
            severities: Set(encode_list(&policy.severities)?),
            steps_json: Set(serde_json::to_string(&policy.steps)?),
            enabled: Set(policy.enabled),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        model_to_policy(model)
    }

    pub async fn get_escalation_policy(&self, id: &str) -> Result<Option<EscalationPolicy>> {
        PolicyEntity::find_by_id(id)
            .one(self.db())
            .await?
            .map(model_to_policy)
            .transpose()
    }

    /// Enabled policies, rule-bound ones first so a specific binding wins over
    /// a catch-all.
    pub async fn list_enabled_escalation_policies(&self) -> Result<Vec<EscalationPolicy>> {
        let rows = PolicyEntity::find()
            .filter(PolicyCol::Enabled.eq(true))
            .order_by(PolicyCol::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        let mut policies = rows
            .into_iter()
            .map(model_to_policy)
            .collect::<Result<Vec<_>>>()?;
        policies.sort_by_key(|p| p.rule_id.is_none());
        Ok(policies)
    }
}
