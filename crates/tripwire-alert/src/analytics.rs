use chrono::{DateTime, Duration, DurationRound, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tripwire_common::types::{AlertInstance, AnalyticsBucket, Severity};
use tripwire_storage::AlertStore;

use crate::error::Result;

pub const HOURLY: &str = "hourly";

const SOURCE_CATEGORIES: [&str; 4] = ["trading", "market", "pattern", "system"];

/// Coarse category of an alert source: the first keyword it contains.
///
/// ```
/// use tripwire_alert::analytics::source_category;
///
/// assert_eq!(source_category("Trading-Engine"), "trading");
/// assert_eq!(source_category("market-data-feed"), "market");
/// assert_eq!(source_category("billing"), "other");
/// ```
pub fn source_category(source: &str) -> &'static str {
    let source = source.to_lowercase();
    SOURCE_CATEGORIES
        .into_iter()
        .find(|kw| source.contains(kw))
        .unwrap_or("other")
}

/// Start of the hour containing `at`.
pub fn hour_start(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(Duration::hours(1)).unwrap_or(at)
}

/// Rolls alert volume for the current hour into an [`AnalyticsBucket`].
pub struct AnalyticsAggregator {
    store: Arc<AlertStore>,
}

impl AnalyticsAggregator {
    pub fn new(store: Arc<AlertStore>) -> Self {
        Self { store }
    }

    /// Recomputes and upserts the hourly bucket containing `now`.
    pub async fn aggregate(&self, now: DateTime<Utc>) -> Result<AnalyticsBucket> {
        let start = hour_start(now);
        let alerts = self
            .store
            .list_alerts_triggered_between(start, start + Duration::hours(1))
            .await?;
        let bucket = summarize(&alerts, start, now);
        let stored = self.store.upsert_analytics_bucket(&bucket).await?;
        tracing::debug!(
            bucket_start = %start,
            total = stored.total_alerts,
            resolved = stored.resolved_alerts,
            "Analytics bucket updated"
        );
        Ok(stored)
    }
}

pub fn summarize(
    alerts: &[AlertInstance],
    bucket_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> AnalyticsBucket {
    let mut by_severity: HashMap<String, u64> = Severity::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    let mut by_source_category: HashMap<String, u64> = HashMap::new();
    let mut resolution_ms = Vec::new();

    for alert in alerts {
        *by_severity.entry(alert.severity.as_str().to_string()).or_default() += 1;
        *by_source_category
            .entry(source_category(&alert.source).to_string())
            .or_default() += 1;
        if let Some(resolved_at) = alert.resolved_at {
            resolution_ms.push((resolved_at - alert.first_triggered_at).num_milliseconds() as f64);
        }
    }

    let average_resolution_time_ms = (!resolution_ms.is_empty())
        .then(|| resolution_ms.iter().sum::<f64>() / resolution_ms.len() as f64);

    AnalyticsBucket {
        id: tripwire_common::id::next_id(),
        granularity: HOURLY.to_string(),
        bucket_start,
        total_alerts: alerts.len() as u64,
        by_severity,
        by_source_category,
        resolved_alerts: resolution_ms.len() as u64,
        average_resolution_time_ms,
        updated_at: now,
    }
}
