use crate::types::*;
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};

fn make_alert(rule_id: &str, severity: Severity) -> AlertInstance {
    let now = Utc::now();
    AlertInstance {
        id: crate::id::next_id(),
        rule_id: rule_id.to_string(),
        rule_name: "error rate".to_string(),
        metric_name: "error_rate".to_string(),
        category: "system".to_string(),
        status: AlertStatus::Firing,
        severity,
        message: "error_rate is 0.5000".to_string(),
        description: None,
        metric_value: 0.5,
        threshold: Some(0.3),
        anomaly_score: None,
        source: "trading-engine".to_string(),
        source_id: None,
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
        labels: HashMap::new(),
        additional_data: None,
    }
}

#[test]
fn next_id_returns_unique_numeric_ids() {
    crate::id::init(1, 1);
    let mut ids = HashSet::new();
    for _ in 0..1000 {
        let id = crate::id::next_id();
        assert!(id.parse::<i64>().is_ok(), "id should be numeric: {id}");
        assert!(ids.insert(id), "duplicate id generated");
    }
}

#[test]
fn severity_parses_legacy_names() {
    assert_eq!("info".parse::<Severity>().unwrap(), Severity::Low);
    assert_eq!("Warning".parse::<Severity>().unwrap(), Severity::Medium);
    assert_eq!("CRITICAL".parse::<Severity>().unwrap(), Severity::Critical);
    assert!("urgent".parse::<Severity>().is_err());
}

#[test]
fn severity_serializes_lowercase() {
    let json = serde_json::to_string(&vec![Severity::High, Severity::Low]).unwrap();
    assert_eq!(json, r#"["high","low"]"#);
}

#[test]
fn compare_ops_follow_threshold_semantics() {
    assert!(CompareOp::Gt.check(10.0, 5.0));
    assert!(!CompareOp::Gt.check(5.0, 5.0));
    assert!(CompareOp::Gte.check(5.0, 5.0));
    assert!(CompareOp::Lt.check(1.0, 5.0));
    assert!(CompareOp::Lte.check(5.0, 5.0));
    assert!(CompareOp::Eq.check(4.9995, 5.0));
    assert!(!CompareOp::Eq.check(5.01, 5.0));
    assert_eq!(">=".parse::<CompareOp>().unwrap(), CompareOp::Gte);
}

#[test]
fn attempt_status_round_trips_through_str() {
    for status in [
        AttemptStatus::Pending,
        AttemptStatus::Sent,
        AttemptStatus::Failed,
        AttemptStatus::RateLimited,
    ] {
        assert_eq!(status.as_str().parse::<AttemptStatus>().unwrap(), status);
    }
}

#[test]
fn suppression_window_bounds() {
    let now = Utc::now();
    let mut s = Suppression {
        id: "s1".into(),
        name: "maintenance".into(),
        reason: None,
        rule_ids: None,
        categories: None,
        severities: None,
        sources: None,
        tags: None,
        starts_at: now - Duration::minutes(5),
        ends_at: Some(now + Duration::minutes(5)),
        is_active: true,
        created_by: None,
        created_at: now,
    };
    assert!(s.is_in_window(now));
    assert!(!s.is_in_window(now + Duration::minutes(6)));
    assert!(!s.is_in_window(now - Duration::minutes(6)));

    s.ends_at = None;
    assert!(s.is_in_window(now + Duration::days(30)));

    s.is_active = false;
    assert!(!s.is_in_window(now));
}

#[test]
fn escalation_policy_binding() {
    let policy = EscalationPolicy {
        id: "p1".into(),
        name: "page on-call".into(),
        rule_id: Some("rule-1".into()),
        severities: Some(vec![Severity::High, Severity::Critical]),
        steps: vec![EscalationStep {
            delay_secs: 60,
            channel_ids: vec!["ch-1".into()],
            condition: None,
        }],
        enabled: true,
    };

    assert!(policy.applies_to(&make_alert("rule-1", Severity::High)));
    assert!(!policy.applies_to(&make_alert("rule-1", Severity::Low)));
    assert!(!policy.applies_to(&make_alert("rule-2", Severity::High)));

    let empty = EscalationPolicy {
        steps: vec![],
        ..policy
    };
    assert!(!empty.applies_to(&make_alert("rule-1", Severity::High)));
}
