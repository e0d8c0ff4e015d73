//! Rule evaluation and alert lifecycle.
//!
//! [`evaluator::RuleEvaluator`] buffers incoming [`MetricSample`]s, checks
//! enabled rules against them (thresholds and optional anomaly scoring),
//! opens, updates and resolves [`AlertInstance`]s with at most one firing
//! instance per (rule, source), and hands transitions to the notification
//! dispatcher. [`analytics::AnalyticsAggregator`] rolls alert volume into
//! hourly buckets.

pub mod analytics;
pub mod error;
pub mod evaluator;
pub mod rules;
pub mod suppression;
pub mod window;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tripwire_common::types::AlertInstance;

pub use error::{EvalError, Result};
pub use evaluator::{
    AlertTransition, CycleReport, EvaluatorConfig, EvaluatorStatus, RuleEvaluator,
    DEFAULT_CRITICAL_METRICS,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyVerdict {
    pub is_anomaly: bool,
    pub score: f64,
}

/// External anomaly detector. An `Err` is treated as "no anomaly".
#[async_trait]
pub trait AnomalyScorer: Send + Sync {
    async fn detect_anomaly(
        &self,
        metric_name: &str,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<AnomalyVerdict>;
}

/// External alert correlation. An `Err` is treated as "no correlation".
#[async_trait]
pub trait CorrelationEngine: Send + Sync {
    /// Correlation id to attach to a candidate alert before it is persisted.
    async fn find_correlation(&self, candidate: &AlertInstance) -> anyhow::Result<Option<String>>;

    /// Called once per evaluation cycle.
    async fn analyze_recent_alerts(&self) -> anyhow::Result<()>;
}
