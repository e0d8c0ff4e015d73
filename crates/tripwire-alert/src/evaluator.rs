use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tripwire_common::types::{
    AlertInstance, AlertRule, AlertStatus, MetricSample, Severity, Suppression,
};
use tripwire_notify::escalation::Escalator;
use tripwire_notify::Dispatcher;
use tripwire_storage::AlertStore;

use crate::analytics::AnalyticsAggregator;
use crate::error::{EvalError, Result};
use crate::rules::threshold::{escalate_for_anomaly, threshold_breached, threshold_message};
use crate::suppression::{find_alert_suppression, find_rule_suppression, AlertCandidate};
use crate::window::MetricBuffer;
use crate::{AnomalyScorer, CorrelationEngine};

pub const AUTO_RESOLVED: &str = "auto_resolved";

/// Metrics evaluated on ingest unless configuration says otherwise.
pub const DEFAULT_CRITICAL_METRICS: &[&str] = &["error_rate", "latency_p99", "order_failure_rate"];

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub batch_size: usize,
    /// Metric names evaluated as soon as they are ingested.
    pub critical_metrics: HashSet<String>,
    pub buffer_retention_secs: u64,
    pub buffer_max_samples: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            critical_metrics: DEFAULT_CRITICAL_METRICS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            buffer_retention_secs: 600,
            buffer_max_samples: 1000,
        }
    }
}

/// A lifecycle change made by one evaluation.
#[derive(Debug, Clone)]
pub enum AlertTransition {
    Opened(AlertInstance),
    /// An already firing alert breached again.
    Updated(AlertInstance),
    Resolved(AlertInstance),
    Suppressed {
        rule_id: String,
        source: String,
        suppression_id: String,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub rules_evaluated: usize,
    pub rules_skipped: usize,
    pub rules_failed: usize,
    pub opened: usize,
    pub updated: usize,
    pub resolved: usize,
    pub suppressed: usize,
    pub escalations_fired: usize,
    pub duration_ms: u64,
}

impl CycleReport {
    fn record(&mut self, transitions: &[AlertTransition]) {
        for t in transitions {
            match t {
                AlertTransition::Opened(_) => self.opened += 1,
                AlertTransition::Updated(_) => self.updated += 1,
                AlertTransition::Resolved(_) => self.resolved += 1,
                AlertTransition::Suppressed { .. } => self.suppressed += 1,
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluatorStatus {
    pub buffered_samples: usize,
    pub buffered_series: usize,
    pub cycles_completed: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_cycle: Option<CycleReport>,
    pub anomaly_detection: bool,
    pub correlation: bool,
    pub escalation: bool,
    pub analytics: bool,
    pub critical_metrics: Vec<String>,
}

#[derive(Default)]
struct CycleState {
    cycles_completed: u64,
    last_cycle_at: Option<DateTime<Utc>>,
    last_cycle: Option<CycleReport>,
}

/// Outcome of checking one sample against one rule.
struct Verdict {
    should_alert: bool,
    severity: Severity,
    messages: Vec<String>,
    anomaly_score: Option<f64>,
}

/// Evaluates rules against buffered metrics and drives the alert lifecycle.
///
/// Cloning is cheap; clones share the buffer and lifecycle locks, so the
/// real-time path and the periodic cycle can run on separate tasks.
#[derive(Clone)]
pub struct RuleEvaluator {
    store: Arc<AlertStore>,
    dispatcher: Dispatcher,
    escalator: Option<Arc<Escalator>>,
    anomaly: Option<Arc<dyn AnomalyScorer>>,
    correlation: Option<Arc<dyn CorrelationEngine>>,
    analytics: Option<Arc<AnalyticsAggregator>>,
    config: Arc<EvaluatorConfig>,
    buffer: Arc<Mutex<MetricBuffer>>,
    /// One lock per `rule_id:source`, held across find-then-write.
    pair_locks: Arc<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    state: Arc<std::sync::Mutex<CycleState>>,
}

impl RuleEvaluator {
    pub fn new(store: Arc<AlertStore>, dispatcher: Dispatcher, config: EvaluatorConfig) -> Self {
        let buffer = MetricBuffer::new(config.buffer_retention_secs, config.buffer_max_samples);
        Self {
            store,
            dispatcher,
            escalator: None,
            anomaly: None,
            correlation: None,
            analytics: None,
            config: Arc::new(config),
            buffer: Arc::new(Mutex::new(buffer)),
            pair_locks: Arc::new(std::sync::Mutex::new(HashMap::new())),
            state: Arc::new(std::sync::Mutex::new(CycleState::default())),
        }
    }

    pub fn with_escalator(mut self, escalator: Arc<Escalator>) -> Self {
        self.escalator = Some(escalator);
        self
    }

    pub fn with_anomaly_scorer(mut self, scorer: Arc<dyn AnomalyScorer>) -> Self {
        self.anomaly = Some(scorer);
        self
    }

    pub fn with_correlation(mut self, engine: Arc<dyn CorrelationEngine>) -> Self {
        self.correlation = Some(engine);
        self
    }

    pub fn with_analytics(mut self, analytics: Arc<AnalyticsAggregator>) -> Self {
        self.analytics = Some(analytics);
        self
    }

    pub fn store(&self) -> &Arc<AlertStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Buffers a sample. Critical metrics are evaluated immediately against
    /// every enabled rule bound to the metric name.
    pub async fn ingest_metric(&self, sample: MetricSample) -> Result<Vec<AlertTransition>> {
        self.ingest_metric_at(sample, Utc::now()).await
    }

    pub async fn ingest_metric_at(
        &self,
        sample: MetricSample,
        now: DateTime<Utc>,
    ) -> Result<Vec<AlertTransition>> {
        self.buffer.lock().await.push(sample.clone(), now);

        if !self.config.critical_metrics.contains(&sample.name) {
            return Ok(Vec::new());
        }

        let rules = self.store.list_enabled_rules_for_metric(&sample.name).await?;
        let mut transitions = Vec::new();
        for rule in rules {
            match self
                .evaluate_rule(&rule, std::slice::from_ref(&sample), None, now)
                .await
            {
                Ok(Some(t)) => transitions.extend(t),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        rule_id = %rule.id,
                        metric = %sample.name,
                        error = %e,
                        "Real-time rule evaluation failed"
                    );
                }
            }
        }
        Ok(transitions)
    }

    /// One periodic cycle: every enabled rule in concurrent batches, then
    /// correlation analysis, due escalations and the analytics roll-up.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let started = std::time::Instant::now();
        self.buffer.lock().await.prune(now);

        let rules = self.store.list_enabled_rules().await?;
        tracing::info!(rules = rules.len(), "Evaluation cycle started");

        let mut report = CycleReport::default();
        for batch in rules.chunks(self.config.batch_size.max(1)) {
            let mut set = JoinSet::new();
            for rule in batch {
                let this = self.clone();
                let rule = rule.clone();
                set.spawn(async move {
                    let result = this.evaluate_rule_periodic(&rule, now).await;
                    (rule.id, result)
                });
            }
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((_, Ok(Some(transitions)))) => {
                        report.rules_evaluated += 1;
                        report.record(&transitions);
                    }
                    Ok((_, Ok(None))) => report.rules_skipped += 1,
                    Ok((rule_id, Err(e))) => {
                        report.rules_failed += 1;
                        tracing::error!(rule_id = %rule_id, error = %e, "Rule evaluation failed");
                    }
                    Err(e) => {
                        report.rules_failed += 1;
                        let err = EvalError::Task(e.to_string());
                        tracing::error!(error = %err, "Rule evaluation task failed");
                    }
                }
            }
        }

        if let Some(correlation) = &self.correlation {
            if let Err(e) = correlation.analyze_recent_alerts().await {
                tracing::warn!(error = %e, "Correlation analysis failed");
            }
        }

        if let Some(escalator) = &self.escalator {
            match escalator.process_due(now).await {
                Ok(fired) => report.escalations_fired = fired,
                Err(e) => tracing::error!(error = %e, "Escalation scan failed"),
            }
        }

        if let Some(analytics) = &self.analytics {
            if let Err(e) = analytics.aggregate(now).await {
                tracing::error!(error = %e, "Analytics aggregation failed");
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            evaluated = report.rules_evaluated,
            skipped = report.rules_skipped,
            failed = report.rules_failed,
            opened = report.opened,
            resolved = report.resolved,
            escalations = report.escalations_fired,
            duration_ms = report.duration_ms,
            "Evaluation cycle finished"
        );

        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.cycles_completed += 1;
        state.last_cycle_at = Some(now);
        state.last_cycle = Some(report.clone());
        Ok(report)
    }

    pub async fn status(&self) -> EvaluatorStatus {
        let (buffered_samples, buffered_series) = {
            let buffer = self.buffer.lock().await;
            (buffer.len(), buffer.series_count())
        };
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let mut critical_metrics: Vec<String> =
            self.config.critical_metrics.iter().cloned().collect();
        critical_metrics.sort();
        EvaluatorStatus {
            buffered_samples,
            buffered_series,
            cycles_completed: state.cycles_completed,
            last_cycle_at: state.last_cycle_at,
            last_cycle: state.last_cycle.clone(),
            anomaly_detection: self.anomaly.is_some(),
            correlation: self.correlation.is_some(),
            escalation: self.escalator.is_some(),
            analytics: self.analytics.is_some(),
            critical_metrics,
        }
    }

    /// Latest sample per source inside the rule's window decides.
    async fn evaluate_rule_periodic(
        &self,
        rule: &AlertRule,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<AlertTransition>>> {
        let window = Duration::seconds(rule.aggregation_window_secs.min(u64::from(u32::MAX)) as i64);
        let samples = self
            .buffer
            .lock()
            .await
            .samples_since(&rule.metric_name, now - window);

        let mut by_source: HashMap<String, (MetricSample, usize, usize)> = HashMap::new();
        for sample in samples {
            let breached = threshold_breached(rule, sample.value) as usize;
            match by_source.get_mut(&sample.source) {
                Some((latest, total, breaches)) => {
                    *total += 1;
                    *breaches += breached;
                    if sample.timestamp >= latest.timestamp {
                        *latest = sample;
                    }
                }
                None => {
                    by_source.insert(sample.source.clone(), (sample, 1, breached));
                }
            }
        }

        let mut latest = Vec::with_capacity(by_source.len());
        let mut breach_counts = HashMap::with_capacity(by_source.len());
        for (source, (sample, total, breaches)) in by_source {
            breach_counts.insert(source, (breaches, total));
            latest.push(sample);
        }
        latest.sort_by(|a, b| a.source.cmp(&b.source));

        self.evaluate_rule(rule, &latest, Some((&breach_counts, rule.aggregation_window_secs)), now)
            .await
    }

    /// `None` when a suppression silenced the whole rule.
    async fn evaluate_rule(
        &self,
        rule: &AlertRule,
        samples: &[MetricSample],
        window: Option<(&HashMap<String, (usize, usize)>, u64)>,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<AlertTransition>>> {
        let suppressions = self.store.list_active_suppressions(now).await?;
        if let Some(s) = find_rule_suppression(&suppressions, rule) {
            tracing::debug!(rule_id = %rule.id, suppression_id = %s.id, "Rule suppressed");
            return Ok(None);
        }

        let mut opened_last_hour = self
            .store
            .count_alerts_for_rule_since(&rule.id, now - Duration::hours(1))
            .await?;

        let mut transitions = Vec::new();
        for sample in samples {
            // 0 disables the cap. A capped rule stops opening alerts but keeps
            // updating and resolving the ones already firing.
            let capped = rule.max_alerts_per_hour > 0
                && opened_last_hour >= u64::from(rule.max_alerts_per_hour);
            let verdict = self.verdict(rule, sample).await;
            let description = window.and_then(|(counts, secs)| {
                counts.get(&sample.source).map(|(breaches, total)| {
                    format!("{breaches} of {total} samples in the last {secs}s breached")
                })
            });
            if let Some(t) = self
                .apply(rule, sample, verdict, description, &suppressions, capped, now)
                .await?
            {
                if matches!(t, AlertTransition::Opened(_)) {
                    opened_last_hour += 1;
                }
                transitions.push(t);
            }
        }
        Ok(Some(transitions))
    }

    async fn verdict(&self, rule: &AlertRule, sample: &MetricSample) -> Verdict {
        let mut verdict = Verdict {
            should_alert: false,
            severity: rule.severity,
            messages: Vec::new(),
            anomaly_score: None,
        };

        if threshold_breached(rule, sample.value) {
            verdict.should_alert = true;
            verdict.messages.extend(threshold_message(rule, sample));
        }

        if rule.use_anomaly_detection {
            if let Some(scorer) = &self.anomaly {
                match scorer
                    .detect_anomaly(&rule.metric_name, sample.value, sample.timestamp)
                    .await
                {
                    Ok(a) if a.is_anomaly => {
                        verdict.should_alert = true;
                        verdict.anomaly_score = Some(a.score);
                        verdict.severity = escalate_for_anomaly(verdict.severity, a.score);
                        verdict.messages.push(format!(
                            "{} anomaly on {} (score {:.2})",
                            rule.metric_name, sample.source, a.score
                        ));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(
                            rule_id = %rule.id,
                            metric = %rule.metric_name,
                            error = %e,
                            "Anomaly detection failed"
                        );
                    }
                }
            }
        }
        verdict
    }

    fn pair_lock(&self, rule_id: &str, source: &str) -> Arc<Mutex<()>> {
        let mut locks = self.pair_locks.lock().unwrap_or_else(|p| p.into_inner());
        locks
            .entry(format!("{rule_id}:{source}"))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn apply(
        &self,
        rule: &AlertRule,
        sample: &MetricSample,
        verdict: Verdict,
        description: Option<String>,
        suppressions: &[Suppression],
        capped: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<AlertTransition>> {
        let lock = self.pair_lock(&rule.id, &sample.source);
        let guard = lock.lock().await;
        let existing = self.store.find_firing_alert(&rule.id, &sample.source).await?;

        if !verdict.should_alert {
            let Some(existing) = existing else {
                return Ok(None);
            };
            let Some(resolved) = self
                .store
                .resolve_alert(&existing.id, AUTO_RESOLVED, None, now)
                .await?
            else {
                return Ok(None);
            };
            drop(guard);
            tracing::info!(alert_id = %resolved.id, rule_id = %rule.id, source = %resolved.source, "Alert auto-resolved");
            if let Err(e) = self.dispatcher.notify_resolution(&resolved).await {
                tracing::error!(alert_id = %resolved.id, error = %e, "Resolution notification failed");
            }
            return Ok(Some(AlertTransition::Resolved(resolved)));
        }

        if let Some(existing) = existing {
            let updated = self
                .store
                .retrigger_alert(&existing.id, sample.value, verdict.anomaly_score, now)
                .await?;
            tracing::debug!(alert_id = %existing.id, rule_id = %rule.id, "Alert still firing");
            return Ok(updated.map(AlertTransition::Updated));
        }

        if capped {
            tracing::debug!(
                rule_id = %rule.id,
                source = %sample.source,
                max = rule.max_alerts_per_hour,
                "Rule hourly alert cap reached"
            );
            return Ok(None);
        }

        let candidate = AlertCandidate {
            rule_id: &rule.id,
            category: &rule.category,
            severity: verdict.severity,
            source: &sample.source,
            labels: &sample.labels,
        };
        if let Some(s) = find_alert_suppression(suppressions, &candidate) {
            tracing::debug!(
                rule_id = %rule.id,
                source = %sample.source,
                suppression_id = %s.id,
                "Alert suppressed"
            );
            return Ok(Some(AlertTransition::Suppressed {
                rule_id: rule.id.clone(),
                source: sample.source.clone(),
                suppression_id: s.id.clone(),
            }));
        }

        let mut alert = new_alert(rule, sample, verdict, description, now);
        if let Some(correlation) = &self.correlation {
            match correlation.find_correlation(&alert).await {
                Ok(id) => alert.correlation_id = id,
                Err(e) => {
                    tracing::warn!(rule_id = %rule.id, error = %e, "Correlation lookup failed");
                }
            }
        }
        let alert = self.store.insert_alert(&alert).await?;
        drop(guard);

        tracing::info!(
            alert_id = %alert.id,
            rule_id = %rule.id,
            source = %alert.source,
            severity = %alert.severity,
            "Alert opened"
        );
        match self.dispatcher.notify_alert(&alert).await {
            Ok(report) => {
                tracing::debug!(alert_id = %alert.id, sent = report.sent(), "Alert dispatched");
            }
            Err(e) => tracing::error!(alert_id = %alert.id, error = %e, "Alert notification failed"),
        }

        let mut alert = alert;
        if let Some(escalator) = &self.escalator {
            match escalator.schedule(&alert).await {
                Ok(next) => alert.next_escalation_at = next,
                Err(e) => tracing::error!(alert_id = %alert.id, error = %e, "Escalation scheduling failed"),
            }
        }
        Ok(Some(AlertTransition::Opened(alert)))
    }
}

fn new_alert(
    rule: &AlertRule,
    sample: &MetricSample,
    verdict: Verdict,
    description: Option<String>,
    now: DateTime<Utc>,
) -> AlertInstance {
    AlertInstance {
        id: tripwire_common::id::next_id(),
        rule_id: rule.id.clone(),
        rule_name: rule.name.clone(),
        metric_name: rule.metric_name.clone(),
        category: rule.category.clone(),
        status: AlertStatus::Firing,
        severity: verdict.severity,
        message: verdict.messages.join("; "),
        description,
        metric_value: sample.value,
        threshold: rule.threshold,
        anomaly_score: verdict.anomaly_score,
        source: sample.source.clone(),
        source_id: sample.source_id.clone(),
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
        labels: sample.labels.clone(),
        additional_data: sample.additional_data.clone(),
    }
}
