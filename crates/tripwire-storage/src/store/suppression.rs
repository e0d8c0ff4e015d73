use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, EntityTrait, Order, QueryFilter,
    QueryOrder,
};
use tripwire_common::types::Suppression;

use crate::entities::suppression::{self, Column as SupCol, Entity as SupEntity};
use crate::error::Result;
use crate::store::{decode_list, encode_list, ts, utc, AlertStore};

fn model_to_suppression(m: suppression::Model) -> Result<Suppression> {
    Ok(Suppression {
        rule_ids: decode_list(m.rule_ids.as_deref())?,
        categories: decode_list(m.categories.as_deref())?,
        severities: decode_list(m.severities.as_deref())?,
        sources: decode_list(m.sources.as_deref())?,
        tags: decode_list(m.tags.as_deref())?,
        id: m.id,
        name: m.name,
        reason: m.reason,
        starts_at: utc(m.starts_at),
        ends_at: m.ends_at.map(utc),
        is_active: m.is_active,
        created_by: m.created_by,
        created_at: utc(m.created_at),
    })
}

impl AlertStore {
    pub async fn insert_suppression(&self, s: &Suppression) -> Result<Suppression> {
        let am = suppression::ActiveModel {
            id: Set(s.id.clone()),
            name: Set(s.name.clone()),
            reason: Set(s.reason.clone()),
            rule_ids: Set(encode_list(&s.rule_ids)?),
            categories: Set(encode_list(&s.categories)?),
            severities: Set(encode_list(&s.severities)?),
            sources: Set(encode_list(&s.sources)?),
            tags: Set(encode_list(&s.tags)?),
            starts_at: Set(ts(s.starts_at)),
            ends_at: Set(s.ends_at.map(ts)),
            is_active: Set(s.is_active),
            created_by: Set(s.created_by.clone()),
            created_at: Set(ts(s.created_at)),
        };
        let model = am.insert(self.db()).await?;
        model_to_suppression(model)
    }

    pub async fn get_suppression(&self, id: &str) -> Result<Option<Suppression>> {
        SupEntity::find_by_id(id)
            .one(self.db())
            .await?
            .map(model_to_suppression)
            .transpose()
    }

    /// Suppressions flagged active whose window contains `now`.
    pub async fn list_active_suppressions(&self, now: DateTime<Utc>) -> Result<Vec<Suppression>> {
        let rows = SupEntity::find()
            .filter(SupCol::IsActive.eq(true))
            .filter(SupCol::StartsAt.lte(ts(now)))
            .filter(
                Condition::any()
                    .add(SupCol::EndsAt.is_null())
                    .add(SupCol::EndsAt.gt(ts(now))),
            )
            .order_by(SupCol::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_suppression).collect()
    }

    pub async fn deactivate_suppression(&self, id: &str) -> Result<bool> {
        let Some(model) = SupEntity::find_by_id(id).one(self.db()).await? else {
            return Ok(false);
        };
        let mut am: suppression::ActiveModel = model.into();
        am.is_active = Set(false);
        am.update(self.db()).await?;
        Ok(true)
    }
}
