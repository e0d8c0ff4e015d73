use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use std::collections::HashSet;
use tripwire_common::types::{
    AttemptStatus, NotificationAttempt, NotificationChannel, NotificationKind,
};

use crate::entities::notification_attempt::{self, Column as AttemptCol, Entity as AttemptEntity};
use crate::entities::notification_channel::{self, Column as ChanCol, Entity as ChanEntity};
use crate::error::Result;
use crate::store::{decode_list, encode_list, parse_column, ts, utc, AlertStore};

fn model_to_channel(m: notification_channel::Model) -> Result<NotificationChannel> {
    Ok(NotificationChannel {
        config: serde_json::from_str(&m.config_json)?,
        severity_filter: decode_list(m.severity_filter.as_deref())?,
        category_filter: decode_list(m.category_filter.as_deref())?,
        tag_filter: decode_list(m.tag_filter.as_deref())?,
        id: m.id,
        name: m.name,
        channel_type: m.channel_type,
        enabled: m.enabled,
        rate_limit_per_hour: m.rate_limit_per_hour.max(0) as u32,
        message_template: m.message_template,
        title_template: m.title_template,
        created_at: utc(m.created_at),
        updated_at: utc(m.updated_at),
    })
}

fn model_to_attempt(m: notification_attempt::Model) -> Result<NotificationAttempt> {
    Ok(NotificationAttempt {
        kind: parse_column::<NotificationKind>("kind", &m.kind)?,
        status: parse_column::<AttemptStatus>("status", &m.status)?,
        id: m.id,
        alert_id: m.alert_id,
        channel_id: m.channel_id,
        attempts: m.attempts.max(0) as u32,
        response: m.response,
        error_message: m.error_message,
        message_id: m.message_id,
        created_at: utc(m.created_at),
        sent_at: m.sent_at.map(utc),
        updated_at: utc(m.updated_at),
    })
}

/// Final state written onto a pending attempt once the provider returns.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub status: AttemptStatus,
    pub attempts: u32,
    pub response: Option<String>,
    pub error_message: Option<String>,
    pub message_id: Option<String>,
}

impl AlertStore {
    // ---- notification_channels ----

    pub async fn insert_channel(&self, ch: &NotificationChannel) -> Result<NotificationChannel> {
        let am = notification_channel::ActiveModel {
            id: Set(ch.id.clone()),
            name: Set(ch.name.clone()),
            channel_type: Set(ch.channel_type.clone()),
            config_json: Set(serde_json::to_string(&ch.config)?),
            severity_filter: Set(encode_list(&ch.severity_filter)?),
            category_filter: Set(encode_list(&ch.category_filter)?),
            tag_filter: Set(encode_list(&ch.tag_filter)?),
            enabled: Set(ch.enabled),
            rate_limit_per_hour: Set(ch.rate_limit_per_hour as i32),
            message_template: Set(ch.message_template.clone()),
            title_template: Set(ch.title_template.clone()),
            created_at: Set(ts(ch.created_at)),
            updated_at: Set(ts(ch.updated_at)),
        };
        let model = am.insert(self.db()).await?;
        model_to_channel(model)
    }

    pub async fn get_channel(&self, id: &str) -> Result<Option<NotificationChannel>> {
        ChanEntity::find_by_id(id)
            .one(self.db())
            .await?
            .map(model_to_channel)
            .transpose()
    }

    pub async fn list_channels(&self) -> Result<Vec<NotificationChannel>> {
        let rows = ChanEntity::find()
            .order_by(ChanCol::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_channel).collect()
    }

    pub async fn list_enabled_channels(&self) -> Result<Vec<NotificationChannel>> {
        let rows = ChanEntity::find()
            .filter(ChanCol::Enabled.eq(true))
            .order_by(ChanCol::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_channel).collect()
    }

    /// Enabled channels among `ids`; unknown or disabled ids are skipped.
    pub async fn list_enabled_channels_by_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<NotificationChannel>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = ChanEntity::find()
            .filter(ChanCol::Enabled.eq(true))
            .filter(ChanCol::Id.is_in(ids.iter().cloned()))
            .order_by(ChanCol::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_channel).collect()
    }

    pub async fn set_channel_enabled(&self, id: &str, enabled: bool) -> Result<bool> {
        let Some(model) = ChanEntity::find_by_id(id).one(self.db()).await? else {
            return Ok(false);
        };
        let mut am: notification_channel::ActiveModel = model.into();
        am.enabled = Set(enabled);
        am.updated_at = Set(Utc::now().fixed_offset());
        am.update(self.db()).await?;
        Ok(true)
    }

    // ---- notification_attempts ----

    pub async fn insert_attempt(&self, attempt: &NotificationAttempt) -> Result<NotificationAttempt> {
        let am = notification_attempt::ActiveModel {
            id: Set(attempt.id.clone()),
            alert_id: Set(attempt.alert_id.clone()),
            channel_id: Set(attempt.channel_id.clone()),
            kind: Set(attempt.kind.as_str().to_string()),
            status: Set(attempt.status.as_str().to_string()),
            attempts: Set(attempt.attempts as i32),
            response: Set(attempt.response.clone()),
            error_message: Set(attempt.error_message.clone()),
            message_id: Set(attempt.message_id.clone()),
            created_at: Set(ts(attempt.created_at)),
            sent_at: Set(attempt.sent_at.map(ts)),
            updated_at: Set(ts(attempt.updated_at)),
        };
        let model = am.insert(self.db()).await?;
        model_to_attempt(model)
    }

    /// Moves a pending attempt to its final status. `sent_at` is stamped only
    /// for successful deliveries.
    pub async fn finalize_attempt(
        &self,
        id: &str,
        outcome: &AttemptOutcome,
    ) -> Result<Option<NotificationAttempt>> {
        let Some(model) = AttemptEntity::find_by_id(id).one(self.db()).await? else {
            return Ok(None);
        };
        let now = Utc::now().fixed_offset();
        let mut am: notification_attempt::ActiveModel = model.into();
        am.status = Set(outcome.status.as_str().to_string());
        am.attempts = Set(outcome.attempts as i32);
        am.response = Set(outcome.response.clone());
        am.error_message = Set(outcome.error_message.clone());
        am.message_id = Set(outcome.message_id.clone());
        if outcome.status == AttemptStatus::Sent {
            am.sent_at = Set(Some(now));
        }
        am.updated_at = Set(now);
        let updated = am.update(self.db()).await?;
        model_to_attempt(updated).map(Some)
    }

    /// Pending and successful deliveries on a channel since `since`; the
    /// authoritative input of the hourly rate limit. Pending rows count so an
    /// in-flight send holds its slot until it is finalized.
    pub async fn count_delivery_slots_since(
        &self,
        channel_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        Ok(AttemptEntity::find()
            .filter(AttemptCol::ChannelId.eq(channel_id))
            .filter(AttemptCol::Status.is_in([
                AttemptStatus::Pending.as_str(),
                AttemptStatus::Sent.as_str(),
            ]))
            .filter(AttemptCol::CreatedAt.gte(ts(since)))
            .count(self.db())
            .await?)
    }

    pub async fn list_attempts_for_alert(&self, alert_id: &str) -> Result<Vec<NotificationAttempt>> {
        let rows = AttemptEntity::find()
            .filter(AttemptCol::AlertId.eq(alert_id))
            .order_by(AttemptCol::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_attempt).collect()
    }

    pub async fn list_attempts_for_channel(
        &self,
        channel_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<NotificationAttempt>> {
        let rows = AttemptEntity::find()
            .filter(AttemptCol::ChannelId.eq(channel_id))
            .order_by(AttemptCol::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_attempt).collect()
    }

    /// Ids of channels holding at least one `sent` attempt for the alert,
    /// in first-delivery order.
    pub async fn channels_notified_for_alert(&self, alert_id: &str) -> Result<Vec<String>> {
        let rows = AttemptEntity::find()
            .filter(AttemptCol::AlertId.eq(alert_id))
            .filter(AttemptCol::Status.eq(AttemptStatus::Sent.as_str()))
            .order_by(AttemptCol::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        let mut seen = HashSet::new();
        Ok(rows
            .into_iter()
            .filter(|r| seen.insert(r.channel_id.clone()))
            .map(|r| r.channel_id)
            .collect())
    }
}
