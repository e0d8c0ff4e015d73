use tripwire_common::types::{AlertRule, CompareOp, MetricSample, Severity};

/// Anomaly scores above this force `critical`.
pub const CRITICAL_ANOMALY_SCORE: f64 = 3.0;
/// Anomaly scores above this force at least `high`.
pub const HIGH_ANOMALY_SCORE: f64 = 2.5;

/// ```
/// use tripwire_alert::rules::threshold::evaluate_threshold;
/// use tripwire_common::types::CompareOp;
///
/// assert!(evaluate_threshold(10.0, CompareOp::Gt, 5.0));
/// assert!(evaluate_threshold(5.0, CompareOp::Gte, 5.0));
/// assert!(evaluate_threshold(4.9995, CompareOp::Eq, 5.0));
/// assert!(!evaluate_threshold(5.01, CompareOp::Eq, 5.0));
/// assert!(evaluate_threshold(4.0, CompareOp::Lt, 5.0));
/// assert!(evaluate_threshold(5.0, CompareOp::Lte, 5.0));
/// ```
pub fn evaluate_threshold(value: f64, op: CompareOp, threshold: f64) -> bool {
    op.check(value, threshold)
}

/// Whether the rule's threshold (if it has one) is breached by `value`.
pub fn threshold_breached(rule: &AlertRule, value: f64) -> bool {
    match (rule.operator, rule.threshold) {
        (Some(op), Some(threshold)) => evaluate_threshold(value, op, threshold),
        _ => false,
    }
}

pub fn threshold_message(rule: &AlertRule, sample: &MetricSample) -> Option<String> {
    let (op, threshold) = (rule.operator?, rule.threshold?);
    Some(format!(
        "{} is {:.4} ({} {:.4}) on {}",
        rule.metric_name,
        sample.value,
        op.symbol(),
        threshold,
        sample.source
    ))
}

/// Severity after an anomaly verdict with `score`. Never lowers `base`.
pub fn escalate_for_anomaly(base: Severity, score: f64) -> Severity {
    if score > CRITICAL_ANOMALY_SCORE {
        Severity::Critical
    } else if score > HIGH_ANOMALY_SCORE {
        base.max(Severity::High)
    } else {
        base
    }
}
