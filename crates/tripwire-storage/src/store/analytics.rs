use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder,
};
use tripwire_common::types::AnalyticsBucket;

use crate::entities::analytics_bucket::{self, Column as BucketCol, Entity as BucketEntity};
use crate::error::Result;
use crate::store::{ts, utc, AlertStore};

fn bucket_key(granularity: &str, start: DateTime<Utc>) -> String {
    format!("{granularity}:{}", start.to_rfc3339())
}

fn model_to_bucket(m: analytics_bucket::Model) -> Result<AnalyticsBucket> {
    Ok(AnalyticsBucket {
        by_severity: serde_json::from_str(&m.by_severity_json)?,
        by_source_category: serde_json::from_str(&m.by_source_category_json)?,
        id: m.id,
        granularity: m.granularity,
        bucket_start: utc(m.bucket_start),
        total_alerts: m.total_alerts.max(0) as u64,
        resolved_alerts: m.resolved_alerts.max(0) as u64,
        average_resolution_time_ms: m.average_resolution_time_ms,
        updated_at: utc(m.updated_at),
    })
}

impl AlertStore {
    /// Inserts or overwrites the bucket identified by `(granularity, bucket_start)`.
    /// The row id of an existing bucket is kept.
    pub async fn upsert_analytics_bucket(&self, bucket: &AnalyticsBucket) -> Result<AnalyticsBucket> {
        let key = bucket_key(&bucket.granularity, bucket.bucket_start);
        let existing = BucketEntity::find()
            .filter(BucketCol::BucketKey.eq(key.as_str()))
            .one(self.db())
            .await?;

        let by_severity = serde_json::to_string(&bucket.by_severity)?;
        let by_source_category = serde_json::to_string(&bucket.by_source_category)?;

        let model = match existing {
            Some(m) => {
                let mut am: analytics_bucket::ActiveModel = m.into();
                am.total_alerts = Set(bucket.total_alerts as i64);
                am.by_severity_json = Set(by_severity);
                am.by_source_category_json = Set(by_source_category);
                am.resolved_alerts = Set(bucket.resolved_alerts as i64);
                am.average_resolution_time_ms = Set(bucket.average_resolution_time_ms);
                am.updated_at = Set(ts(bucket.updated_at));
                am.update(self.db()).await?
            }
            None => {
                analytics_bucket::ActiveModel {
                    id: Set(bucket.id.clone()),
                    bucket_key: Set(key),
                    granularity: Set(bucket.granularity.clone()),
                    bucket_start: Set(ts(bucket.bucket_start)),
                    total_alerts: Set(bucket.total_alerts as i64),
                    by_severity_json: Set(by_severity),
                    by_source_category_json: Set(by_source_category),
                    resolved_alerts: Set(bucket.resolved_alerts as i64),
                    average_resolution_time_ms: Set(bucket.average_resolution_time_ms),
                    updated_at: Set(ts(bucket.updated_at)),
                }
                .insert(self.db())
                .await?
            }
        };
        model_to_bucket(model)
    }

    /// Buckets of one granularity starting in `[from, to)`, oldest first.
    pub async fn list_analytics_buckets(
        &self,
        granularity: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AnalyticsBucket>> {
        let rows = BucketEntity::find()
            .filter(BucketCol::Granularity.eq(granularity))
            .filter(BucketCol::BucketStart.gte(ts(from)))
            .filter(BucketCol::BucketStart.lt(ts(to)))
            .order_by(BucketCol::BucketStart, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_bucket).collect()
    }
}
