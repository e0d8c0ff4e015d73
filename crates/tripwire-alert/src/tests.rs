use crate::analytics::{hour_start, summarize, AnalyticsAggregator, HOURLY};
use crate::rules::threshold::{escalate_for_anomaly, evaluate_threshold};
use crate::suppression::{find_alert_suppression, matches_rule, AlertCandidate};
use crate::window::MetricBuffer;
use crate::{
    AlertTransition, AnomalyScorer, AnomalyVerdict, CorrelationEngine, EvaluatorConfig,
    RuleEvaluator,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tripwire_common::types::*;
use tripwire_notify::escalation::{Escalator, StorePolicySource};
use tripwire_notify::{
    Dispatcher, NotificationMessage, NotificationProvider, ProviderKind, ProviderRegistry,
    SendOutcome,
};
use tripwire_storage::AlertStore;

struct RecordingProvider {
    calls: Mutex<Vec<(String, NotificationKind)>>,
}

impl RecordingProvider {
    fn calls(&self) -> Vec<(String, NotificationKind)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationProvider for RecordingProvider {
    fn provider_type(&self) -> ProviderKind {
        ProviderKind::Email
    }

    fn validate_config(&self, _config: &Value) -> tripwire_notify::Result<()> {
        Ok(())
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        _alert: &AlertInstance,
        message: &NotificationMessage,
    ) -> SendOutcome {
        self.calls
            .lock()
            .unwrap()
            .push((channel.id.clone(), message.kind));
        SendOutcome {
            success: true,
            message_id: None,
            response: Some("250 OK".into()),
            error: None,
            attempts: 1,
        }
    }
}

/// Fixed score for every metric; `None` makes the scorer fail.
struct FixedScorer(Option<f64>);

#[async_trait]
impl AnomalyScorer for FixedScorer {
    async fn detect_anomaly(
        &self,
        _metric_name: &str,
        _value: f64,
        _timestamp: DateTime<Utc>,
    ) -> anyhow::Result<AnomalyVerdict> {
        match self.0 {
            Some(score) => Ok(AnomalyVerdict {
                is_anomaly: score > 2.0,
                score,
            }),
            None => anyhow::bail!("model not loaded"),
        }
    }
}

struct FixedCorrelation {
    analyzed: Mutex<u32>,
}

#[async_trait]
impl CorrelationEngine for FixedCorrelation {
    async fn find_correlation(&self, candidate: &AlertInstance) -> anyhow::Result<Option<String>> {
        Ok(Some(format!("corr-{}", candidate.source)))
    }

    async fn analyze_recent_alerts(&self) -> anyhow::Result<()> {
        *self.analyzed.lock().unwrap() += 1;
        Ok(())
    }
}

struct Harness {
    _dir: TempDir,
    url: String,
    store: Arc<AlertStore>,
    dispatcher: Dispatcher,
    provider: Arc<RecordingProvider>,
}

async fn setup() -> Harness {
    tripwire_common::id::init(1, 1);
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("alert.db").display());
    let store = Arc::new(AlertStore::new(&url).await.unwrap());

    let provider = Arc::new(RecordingProvider {
        calls: Mutex::new(Vec::new()),
    });
    let mut registry = ProviderRegistry::default();
    registry.register(provider.clone());
    let dispatcher = Dispatcher::new(store.clone(), Arc::new(registry));

    Harness {
        _dir: dir,
        url,
        store,
        dispatcher,
        provider,
    }
}

fn periodic_only() -> EvaluatorConfig {
    EvaluatorConfig {
        critical_metrics: HashSet::new(),
        ..EvaluatorConfig::default()
    }
}

fn critical(metric: &str) -> EvaluatorConfig {
    EvaluatorConfig {
        critical_metrics: HashSet::from([metric.to_string()]),
        ..EvaluatorConfig::default()
    }
}

fn make_rule(metric: &str, threshold: Option<f64>, severity: Severity) -> AlertRule {
    let now = Utc::now();
    AlertRule {
        id: tripwire_common::id::next_id(),
        name: format!("{metric} breach"),
        metric_name: metric.to_string(),
        operator: threshold.map(|_| CompareOp::Gt),
        threshold,
        use_anomaly_detection: false,
        aggregation_window_secs: 300,
        severity,
        category: "trading".into(),
        max_alerts_per_hour: 10,
        enabled: true,
        created_at: now,
        updated_at: now,
    }
}

fn make_sample(metric: &str, source: &str, value: f64, at: DateTime<Utc>) -> MetricSample {
    MetricSample {
        name: metric.to_string(),
        value,
        source: source.to_string(),
        source_id: None,
        timestamp: at,
        labels: HashMap::from([("env".to_string(), "prod".to_string())]),
        additional_data: None,
    }
}

fn make_channel(name: &str, severities: Option<Vec<Severity>>) -> NotificationChannel {
    let now = Utc::now();
    NotificationChannel {
        id: tripwire_common::id::next_id(),
        name: name.into(),
        channel_type: "email".into(),
        config: json!({}),
        severity_filter: severities,
        category_filter: None,
        tag_filter: None,
        enabled: true,
        rate_limit_per_hour: 10,
        message_template: None,
        title_template: None,
        created_at: now,
        updated_at: now,
    }
}

fn make_suppression(severities: Option<Vec<Severity>>, sources: Option<Vec<String>>) -> Suppression {
    let now = Utc::now();
    Suppression {
        id: tripwire_common::id::next_id(),
        name: "maintenance".into(),
        reason: Some("planned upgrade".into()),
        rule_ids: None,
        categories: None,
        severities,
        sources,
        tags: None,
        starts_at: now - Duration::minutes(10),
        ends_at: Some(now + Duration::hours(1)),
        is_active: true,
        created_by: Some("ops".into()),
        created_at: now,
    }
}

async fn firing(store: &AlertStore) -> Vec<AlertInstance> {
    store
        .list_active_alerts(&Default::default(), 100, 0)
        .await
        .unwrap()
}

#[test]
fn threshold_operators() {
    assert!(evaluate_threshold(10.0, CompareOp::Gt, 5.0));
    assert!(!evaluate_threshold(5.0, CompareOp::Gt, 5.0));
    assert!(evaluate_threshold(5.0, CompareOp::Gte, 5.0));
    assert!(!evaluate_threshold(4.9, CompareOp::Gte, 5.0));

    assert!(evaluate_threshold(4.0, CompareOp::Lt, 5.0));
    assert!(!evaluate_threshold(5.0, CompareOp::Lt, 5.0));
    assert!(!evaluate_threshold(6.0, CompareOp::Lt, 5.0));
    assert!(evaluate_threshold(5.0, CompareOp::Lte, 5.0));
    assert!(evaluate_threshold(-1.0, CompareOp::Lte, 5.0));
    assert!(!evaluate_threshold(5.01, CompareOp::Lte, 5.0));

    assert!(evaluate_threshold(4.9995, CompareOp::Eq, 5.0));
    assert!(!evaluate_threshold(5.01, CompareOp::Eq, 5.0));
}

#[test]
fn anomaly_scores_escalate_severity() {
    assert_eq!(escalate_for_anomaly(Severity::Low, 3.5), Severity::Critical);
    assert_eq!(escalate_for_anomaly(Severity::Low, 2.8), Severity::High);
    assert_eq!(escalate_for_anomaly(Severity::Critical, 2.8), Severity::Critical);
    assert_eq!(escalate_for_anomaly(Severity::Medium, 2.5), Severity::Medium);
}

#[tokio::test]
async fn repeated_breaches_update_the_firing_alert() {
    let h = setup().await;
    let rule = h
        .store
        .insert_rule(&make_rule("error_rate", Some(0.3), Severity::High))
        .await
        .unwrap();
    let eval = RuleEvaluator::new(h.store.clone(), h.dispatcher.clone(), critical("error_rate"));

    let t0 = Utc::now();
    let first = eval
        .ingest_metric_at(make_sample("error_rate", "trading-engine", 0.5, t0), t0)
        .await
        .unwrap();
    assert!(matches!(first.as_slice(), [AlertTransition::Opened(_)]));

    let t1 = t0 + Duration::seconds(5);
    let second = eval
        .ingest_metric_at(make_sample("error_rate", "trading-engine", 0.7, t1), t1)
        .await
        .unwrap();
    assert!(matches!(second.as_slice(), [AlertTransition::Updated(_)]));

    let alerts = firing(&h.store).await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].rule_id, rule.id);
    assert_eq!(alerts[0].metric_value, 0.7);
    assert!(alerts[0].last_triggered_at > alerts[0].first_triggered_at);
}

#[tokio::test]
async fn recovered_metric_auto_resolves_and_notifies() {
    let h = setup().await;
    h.store
        .insert_rule(&make_rule("error_rate", Some(0.3), Severity::High))
        .await
        .unwrap();
    let channel = h.store.insert_channel(&make_channel("ops-email", None)).await.unwrap();
    let eval = RuleEvaluator::new(h.store.clone(), h.dispatcher.clone(), critical("error_rate"));

    let t0 = Utc::now();
    eval.ingest_metric_at(make_sample("error_rate", "trading-engine", 0.5, t0), t0)
        .await
        .unwrap();
    let t1 = t0 + Duration::seconds(30);
    let transitions = eval
        .ingest_metric_at(make_sample("error_rate", "trading-engine", 0.1, t1), t1)
        .await
        .unwrap();

    let [AlertTransition::Resolved(resolved)] = transitions.as_slice() else {
        panic!("expected a resolution, got {transitions:?}");
    };
    assert_eq!(resolved.status, AlertStatus::Resolved);
    assert_eq!(resolved.resolved_by.as_deref(), Some("auto_resolved"));
    assert!(resolved.resolved_at.is_some());
    assert!(firing(&h.store).await.is_empty());

    assert_eq!(
        h.provider.calls(),
        vec![
            (channel.id.clone(), NotificationKind::Alert),
            (channel.id.clone(), NotificationKind::Resolution),
        ]
    );
}

#[tokio::test]
async fn periodic_cycle_notifies_only_matching_channels() {
    let h = setup().await;
    h.store
        .insert_rule(&make_rule("error_rate", Some(0.3), Severity::High))
        .await
        .unwrap();
    let email = h
        .store
        .insert_channel(&make_channel(
            "ops-email",
            Some(vec![Severity::High, Severity::Critical]),
        ))
        .await
        .unwrap();
    let low = h
        .store
        .insert_channel(&make_channel("low-noise", Some(vec![Severity::Low])))
        .await
        .unwrap();
    let eval = RuleEvaluator::new(h.store.clone(), h.dispatcher.clone(), periodic_only());

    let now = Utc::now();
    let transitions = eval
        .ingest_metric_at(make_sample("error_rate", "trading-engine", 0.5, now), now)
        .await
        .unwrap();
    assert!(transitions.is_empty(), "non-critical metrics wait for the cycle");

    let report = eval.run_cycle(now + Duration::seconds(1)).await.unwrap();
    assert_eq!(report.rules_evaluated, 1);
    assert_eq!(report.opened, 1);

    let alerts = firing(&h.store).await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, Severity::High);
    assert_eq!(alerts[0].source, "trading-engine");
    assert_eq!(
        alerts[0].description.as_deref(),
        Some("1 of 1 samples in the last 300s breached")
    );

    let sent = h.store.list_attempts_for_channel(&email.id, 10, 0).await.unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].status, AttemptStatus::Sent);
    assert!(h.store.list_attempts_for_channel(&low.id, 10, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn default_config_evaluates_error_rate_on_ingest() {
    let h = setup().await;
    h.store
        .insert_rule(&make_rule("error_rate", Some(0.3), Severity::High))
        .await
        .unwrap();
    let email = h
        .store
        .insert_channel(&make_channel(
            "ops-email",
            Some(vec![Severity::High, Severity::Critical]),
        ))
        .await
        .unwrap();
    let eval = RuleEvaluator::new(h.store.clone(), h.dispatcher.clone(), EvaluatorConfig::default());

    let now = Utc::now();
    let transitions = eval
        .ingest_metric_at(make_sample("error_rate", "trading-engine", 0.5, now), now)
        .await
        .unwrap();
    let [AlertTransition::Opened(alert)] = transitions.as_slice() else {
        panic!("expected an opened alert, got {transitions:?}");
    };
    assert_eq!(alert.severity, Severity::High);

    let sent = h.store.list_attempts_for_channel(&email.id, 10, 0).await.unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].status, AttemptStatus::Sent);
    assert!(eval.status().await.critical_metrics.contains(&"error_rate".to_string()));
}

#[tokio::test]
async fn failing_rule_does_not_abort_the_batch() {
    use sea_orm::ConnectionTrait;

    let h = setup().await;
    let broken = h
        .store
        .insert_rule(&make_rule("error_rate", Some(0.3), Severity::High))
        .await
        .unwrap();
    let latency = h
        .store
        .insert_rule(&make_rule("latency_ms", Some(250.0), Severity::Medium))
        .await
        .unwrap();
    let depth = h
        .store
        .insert_rule(&make_rule("queue_depth", Some(100.0), Severity::Low))
        .await
        .unwrap();

    // a firing row for the first rule that can no longer be decoded
    let t0 = Utc::now();
    RuleEvaluator::new(h.store.clone(), h.dispatcher.clone(), critical("error_rate"))
        .ingest_metric_at(make_sample("error_rate", "trading-engine", 0.9, t0), t0)
        .await
        .unwrap();
    let raw = sea_orm::Database::connect(&h.url).await.unwrap();
    raw.execute_unprepared(&format!(
        "UPDATE alert_instances SET severity = 'catastrophic' WHERE rule_id = '{}'",
        broken.id
    ))
    .await
    .unwrap();

    let eval = RuleEvaluator::new(h.store.clone(), h.dispatcher.clone(), periodic_only());
    let t1 = t0 + Duration::seconds(5);
    for (metric, value) in [("error_rate", 0.9), ("latency_ms", 900.0), ("queue_depth", 400.0)] {
        eval.ingest_metric_at(make_sample(metric, "trading-engine", value, t1), t1)
            .await
            .unwrap();
    }

    let report = eval.run_cycle(t1 + Duration::seconds(1)).await.unwrap();
    assert_eq!(report.rules_failed, 1);
    assert_eq!(report.rules_evaluated, 2);
    assert_eq!(report.opened, 2);
    for rule in [&latency, &depth] {
        assert!(h
            .store
            .find_firing_alert(&rule.id, "trading-engine")
            .await
            .unwrap()
            .is_some());
    }
    assert!(h.store.find_firing_alert(&broken.id, "trading-engine").await.is_err());
    assert_eq!(eval.status().await.cycles_completed, 1);
}

#[tokio::test]
async fn latest_sample_per_source_decides_the_cycle() {
    let h = setup().await;
    h.store
        .insert_rule(&make_rule("error_rate", Some(0.3), Severity::High))
        .await
        .unwrap();
    let eval = RuleEvaluator::new(h.store.clone(), h.dispatcher.clone(), periodic_only());

    let t0 = Utc::now();
    for (offset, value) in [(0, 0.9), (10, 0.8), (20, 0.1)] {
        let at = t0 + Duration::seconds(offset);
        eval.ingest_metric_at(make_sample("error_rate", "trading-engine", value, at), at)
            .await
            .unwrap();
    }
    eval.ingest_metric_at(make_sample("error_rate", "market-feed", 0.6, t0), t0)
        .await
        .unwrap();

    let report = eval.run_cycle(t0 + Duration::seconds(30)).await.unwrap();
    assert_eq!(report.opened, 1);
    let alerts = firing(&h.store).await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].source, "market-feed");
}

#[tokio::test]
async fn critical_suppression_blocks_alert_and_notifications() {
    let h = setup().await;
    h.store
        .insert_rule(&make_rule("error_rate", Some(0.3), Severity::Critical))
        .await
        .unwrap();
    h.store.insert_channel(&make_channel("ops-email", None)).await.unwrap();
    h.store
        .insert_suppression(&make_suppression(Some(vec![Severity::Critical]), None))
        .await
        .unwrap();
    let eval = RuleEvaluator::new(h.store.clone(), h.dispatcher.clone(), critical("error_rate"));

    let now = Utc::now();
    let transitions = eval
        .ingest_metric_at(make_sample("error_rate", "trading-engine", 0.9, now), now)
        .await
        .unwrap();
    assert!(transitions.is_empty());
    assert!(firing(&h.store).await.is_empty());
    assert!(h.provider.calls().is_empty());
}

#[tokio::test]
async fn anomaly_escalated_severity_is_suppressed_at_alert_level() {
    let h = setup().await;
    let mut rule = make_rule("latency_ms", None, Severity::High);
    rule.use_anomaly_detection = true;
    h.store.insert_rule(&rule).await.unwrap();
    h.store.insert_channel(&make_channel("ops-email", None)).await.unwrap();
    h.store
        .insert_suppression(&make_suppression(Some(vec![Severity::Critical]), None))
        .await
        .unwrap();
    let eval = RuleEvaluator::new(h.store.clone(), h.dispatcher.clone(), critical("latency_ms"))
        .with_anomaly_scorer(Arc::new(FixedScorer(Some(3.4))));

    let now = Utc::now();
    let transitions = eval
        .ingest_metric_at(make_sample("latency_ms", "trading-engine", 950.0, now), now)
        .await
        .unwrap();
    assert!(matches!(
        transitions.as_slice(),
        [AlertTransition::Suppressed { .. }]
    ));
    assert!(firing(&h.store).await.is_empty());
    assert!(h.provider.calls().is_empty());
}

#[tokio::test]
async fn anomaly_score_escalates_severity() {
    let h = setup().await;
    let mut rule = make_rule("latency_ms", None, Severity::Low);
    rule.use_anomaly_detection = true;
    h.store.insert_rule(&rule).await.unwrap();

    let high = RuleEvaluator::new(h.store.clone(), h.dispatcher.clone(), critical("latency_ms"))
        .with_anomaly_scorer(Arc::new(FixedScorer(Some(2.7))));
    let now = Utc::now();
    high.ingest_metric_at(make_sample("latency_ms", "pattern-scanner", 800.0, now), now)
        .await
        .unwrap();

    let critical_eval =
        RuleEvaluator::new(h.store.clone(), h.dispatcher.clone(), critical("latency_ms"))
            .with_anomaly_scorer(Arc::new(FixedScorer(Some(3.5))));
    critical_eval
        .ingest_metric_at(make_sample("latency_ms", "system-monitor", 900.0, now), now)
        .await
        .unwrap();

    let alerts = firing(&h.store).await;
    let by_source: HashMap<_, _> = alerts.iter().map(|a| (a.source.as_str(), a)).collect();
    assert_eq!(by_source["pattern-scanner"].severity, Severity::High);
    assert_eq!(by_source["pattern-scanner"].anomaly_score, Some(2.7));
    assert_eq!(by_source["system-monitor"].severity, Severity::Critical);
    assert!(by_source["system-monitor"].message.contains("score 3.50"));
}

#[tokio::test]
async fn failing_scorer_means_no_anomaly() {
    let h = setup().await;
    let mut rule = make_rule("latency_ms", None, Severity::High);
    rule.use_anomaly_detection = true;
    h.store.insert_rule(&rule).await.unwrap();
    let eval = RuleEvaluator::new(h.store.clone(), h.dispatcher.clone(), critical("latency_ms"))
        .with_anomaly_scorer(Arc::new(FixedScorer(None)));

    let now = Utc::now();
    let transitions = eval
        .ingest_metric_at(make_sample("latency_ms", "trading-engine", 5000.0, now), now)
        .await
        .unwrap();
    assert!(transitions.is_empty());
    assert!(firing(&h.store).await.is_empty());
}

#[tokio::test]
async fn hourly_cap_stops_new_alerts_but_not_resolution() {
    let h = setup().await;
    let mut rule = make_rule("error_rate", Some(0.3), Severity::High);
    rule.max_alerts_per_hour = 1;
    h.store.insert_rule(&rule).await.unwrap();
    let eval = RuleEvaluator::new(h.store.clone(), h.dispatcher.clone(), critical("error_rate"));

    let now = Utc::now();
    eval.ingest_metric_at(make_sample("error_rate", "trading-a", 0.5, now), now)
        .await
        .unwrap();
    let capped = eval
        .ingest_metric_at(make_sample("error_rate", "trading-b", 0.5, now), now)
        .await
        .unwrap();
    assert!(capped.is_empty());
    assert_eq!(firing(&h.store).await.len(), 1);

    let later = now + Duration::seconds(10);
    let resolved = eval
        .ingest_metric_at(make_sample("error_rate", "trading-a", 0.1, later), later)
        .await
        .unwrap();
    assert!(matches!(resolved.as_slice(), [AlertTransition::Resolved(_)]));
}

#[tokio::test]
async fn correlation_id_is_attached_and_analysis_runs_each_cycle() {
    let h = setup().await;
    h.store
        .insert_rule(&make_rule("error_rate", Some(0.3), Severity::High))
        .await
        .unwrap();
    let correlation = Arc::new(FixedCorrelation {
        analyzed: Mutex::new(0),
    });
    let eval = RuleEvaluator::new(h.store.clone(), h.dispatcher.clone(), critical("error_rate"))
        .with_correlation(correlation.clone());

    let now = Utc::now();
    eval.ingest_metric_at(make_sample("error_rate", "trading-engine", 0.5, now), now)
        .await
        .unwrap();
    eval.run_cycle(now).await.unwrap();
    eval.run_cycle(now + Duration::seconds(30)).await.unwrap();

    let alerts = firing(&h.store).await;
    assert_eq!(alerts[0].correlation_id.as_deref(), Some("corr-trading-engine"));
    assert_eq!(*correlation.analyzed.lock().unwrap(), 2);
}

#[tokio::test]
async fn escalation_fires_once_from_the_cycle() {
    let h = setup().await;
    let rule = h
        .store
        .insert_rule(&make_rule("error_rate", Some(0.3), Severity::High))
        .await
        .unwrap();
    let pager = h.store.insert_channel(&make_channel("pager", Some(vec![Severity::Critical]))).await.unwrap();
    h.store
        .insert_escalation_policy(&EscalationPolicy {
            id: tripwire_common::id::next_id(),
            name: "page on-call".into(),
            rule_id: Some(rule.id.clone()),
            severities: None,
            steps: vec![EscalationStep {
                delay_secs: 60,
                channel_ids: vec![pager.id.clone()],
                condition: None,
            }],
            enabled: true,
        })
        .await
        .unwrap();

    let escalator = Arc::new(Escalator::new(
        h.store.clone(),
        h.dispatcher.clone(),
        Arc::new(StorePolicySource::new(h.store.clone())),
        false,
    ));
    let eval = RuleEvaluator::new(h.store.clone(), h.dispatcher.clone(), critical("error_rate"))
        .with_escalator(escalator);

    let t0 = Utc::now();
    let opened = eval
        .ingest_metric_at(make_sample("error_rate", "trading-engine", 0.5, t0), t0)
        .await
        .unwrap();
    let [AlertTransition::Opened(alert)] = opened.as_slice() else {
        panic!("expected an opened alert, got {opened:?}");
    };
    let due_at = alert.next_escalation_at.expect("escalation scheduled");
    assert!((due_at - (t0 + Duration::seconds(60))).num_milliseconds().abs() < 1);

    let early = eval.run_cycle(t0 + Duration::seconds(30)).await.unwrap();
    assert_eq!(early.escalations_fired, 0);

    let due = eval.run_cycle(t0 + Duration::seconds(61)).await.unwrap();
    assert_eq!(due.escalations_fired, 1);
    let again = eval.run_cycle(t0 + Duration::seconds(120)).await.unwrap();
    assert_eq!(again.escalations_fired, 0);

    let stored = h.store.get_alert(&alert.id).await.unwrap().unwrap();
    assert_eq!(stored.escalation_level, 1);
    assert_eq!(
        h.provider.calls(),
        vec![(pager.id.clone(), NotificationKind::Escalation)]
    );
}

#[tokio::test]
async fn cycle_rolls_alerts_into_the_hourly_bucket() {
    let h = setup().await;
    h.store
        .insert_rule(&make_rule("error_rate", Some(0.3), Severity::High))
        .await
        .unwrap();
    let eval = RuleEvaluator::new(h.store.clone(), h.dispatcher.clone(), critical("error_rate"))
        .with_analytics(Arc::new(AnalyticsAggregator::new(h.store.clone())));

    let now = Utc::now();
    for source in ["trading-engine", "market-feed", "billing"] {
        eval.ingest_metric_at(make_sample("error_rate", source, 0.5, now), now)
            .await
            .unwrap();
    }
    eval.run_cycle(now).await.unwrap();

    let start = hour_start(now);
    let buckets = h
        .store
        .list_analytics_buckets(HOURLY, start, start + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].total_alerts, 3);
    assert_eq!(buckets[0].by_severity["high"], 3);
    assert_eq!(buckets[0].by_source_category["trading"], 1);
    assert_eq!(buckets[0].by_source_category["other"], 1);

    let status = eval.status().await;
    assert_eq!(status.cycles_completed, 1);
    assert!(status.analytics);
    assert!(!status.anomaly_detection);
    assert_eq!(status.buffered_samples, 3);
}

#[test]
fn summary_averages_resolution_time() {
    let now = Utc::now();
    let start = hour_start(now);
    let rule = make_rule("error_rate", Some(0.3), Severity::Medium);
    let base = AlertInstance {
        id: "a1".into(),
        rule_id: rule.id.clone(),
        rule_name: rule.name.clone(),
        metric_name: rule.metric_name.clone(),
        category: rule.category.clone(),
        status: AlertStatus::Resolved,
        severity: Severity::Medium,
        message: String::new(),
        description: None,
        metric_value: 0.5,
        threshold: Some(0.3),
        anomaly_score: None,
        source: "system-core".into(),
        source_id: None,
        correlation_id: None,
        escalation_level: 0,
        escalation_policy_id: None,
        next_escalation_at: None,
        first_triggered_at: start,
        last_triggered_at: start,
        last_escalated_at: None,
        acknowledged_at: None,
        acknowledged_by: None,
        resolved_at: Some(start + Duration::seconds(2)),
        resolved_by: Some("auto_resolved".into()),
        resolution_notes: None,
        labels: HashMap::new(),
        additional_data: None,
    };
    let slower = AlertInstance {
        id: "a2".into(),
        resolved_at: Some(start + Duration::seconds(4)),
        ..base.clone()
    };
    let open = AlertInstance {
        id: "a3".into(),
        status: AlertStatus::Firing,
        resolved_at: None,
        resolved_by: None,
        ..base.clone()
    };

    let bucket = summarize(&[base, slower, open], start, now);
    assert_eq!(bucket.total_alerts, 3);
    assert_eq!(bucket.resolved_alerts, 2);
    assert_eq!(bucket.average_resolution_time_ms, Some(3000.0));
    assert_eq!(bucket.by_severity["medium"], 3);
    assert_eq!(bucket.by_severity["critical"], 0);
    assert_eq!(bucket.by_source_category["system"], 3);
}

#[test]
fn buffer_prunes_by_age_and_caps_length() {
    let now = Utc::now();
    let mut buffer = MetricBuffer::new(600, 3);
    buffer.push(make_sample("cpu", "host-a", 1.0, now - Duration::minutes(11)), now);
    assert!(buffer.is_empty(), "stale sample dropped on push");

    for i in 0..5 {
        buffer.push(make_sample("cpu", "host-a", i as f64, now), now);
    }
    buffer.push(make_sample("cpu", "host-b", 9.0, now - Duration::minutes(5)), now);
    buffer.push(make_sample("mem", "host-a", 1.0, now), now);
    assert_eq!(buffer.len(), 5);
    assert_eq!(buffer.series_count(), 3);

    let cpu = buffer.samples_since("cpu", now - Duration::minutes(1));
    let values: Vec<f64> = cpu.iter().map(|s| s.value).collect();
    assert_eq!(values, vec![2.0, 3.0, 4.0]);

    buffer.prune(now + Duration::minutes(6));
    assert_eq!(buffer.series_count(), 2);
    buffer.prune(now + Duration::minutes(11));
    assert!(buffer.is_empty());
}

#[test]
fn suppression_scoping() {
    let rule = make_rule("error_rate", Some(0.3), Severity::High);
    let labels = HashMap::from([("env".to_string(), "prod".to_string())]);
    let candidate = |source: &'static str, severity| AlertCandidate {
        rule_id: "r1",
        category: "trading",
        severity,
        source,
        labels: &labels,
    };

    let by_source = make_suppression(None, Some(vec!["trading-*".into()]));
    assert!(!matches_rule(&by_source, &rule), "source-scoped waits for the alert");
    let sups = [by_source];
    assert!(find_alert_suppression(&sups, &candidate("trading-engine", Severity::High)).is_some());
    assert!(find_alert_suppression(&sups, &candidate("market-feed", Severity::High)).is_none());

    let mut by_tag = make_suppression(None, None);
    by_tag.tags = Some(vec!["env=staging".into()]);
    assert!(find_alert_suppression(&[by_tag.clone()], &candidate("x", Severity::Low)).is_none());
    by_tag.tags = Some(vec!["env".into()]);
    assert!(find_alert_suppression(&[by_tag], &candidate("x", Severity::Low)).is_some());

    let mut by_category = make_suppression(Some(vec![Severity::High]), None);
    by_category.categories = Some(vec!["Trading".into()]);
    assert!(matches_rule(&by_category, &rule));
    by_category.categories = Some(vec!["market".into()]);
    assert!(!matches_rule(&by_category, &rule));
}
