//! Rendering of alerts into provider-neutral messages.

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use std::sync::OnceLock;
use tripwire_common::types::{
    format_labels, AlertInstance, NotificationChannel, NotificationKind, Severity,
};

use crate::channels::cached_regex;

/// Accent color for resolution messages.
pub const RESOLVED_COLOR: u32 = 0x2ECC71;

#[derive(Debug, Clone, PartialEq)]
pub struct MessageField {
    pub name: String,
    pub value: String,
}

/// What a provider formats: a title, a plain-text body and labelled fields.
///
/// `summary` is the short text chat embeds show next to `fields`; `body` is
/// the full plain-text rendering used by email, SMS and webhooks.
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    pub kind: NotificationKind,
    pub severity: Severity,
    pub title: String,
    pub summary: String,
    pub body: String,
    pub fields: Vec<MessageField>,
    /// Link back to the alert when the channel config has a `dashboard_url`.
    pub action_url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl NotificationMessage {
    /// Builds the message for `alert` on `channel`. Channel templates, when
    /// present, replace the generated title and body.
    pub fn build(
        alert: &AlertInstance,
        channel: &NotificationChannel,
        kind: NotificationKind,
        now: DateTime<Utc>,
    ) -> Self {
        let title = match &channel.title_template {
            Some(t) => render_template(t, alert, now),
            None => default_title(alert, kind),
        };
        let fields = build_fields(alert, kind);
        let (summary, body) = match &channel.message_template {
            Some(t) => {
                let rendered = render_template(t, alert, now);
                (rendered.clone(), rendered)
            }
            None => (
                default_summary(alert, kind),
                default_body(alert, kind, &fields),
            ),
        };
        let action_url = channel
            .config
            .get("dashboard_url")
            .and_then(|v| v.as_str())
            .map(|base| format!("{}/alerts/{}", base.trim_end_matches('/'), alert.id));

        Self {
            kind,
            severity: alert.severity,
            title,
            summary,
            body,
            fields,
            action_url,
            timestamp: now,
        }
    }

    /// RGB accent for chat embeds.
    pub fn color(&self) -> u32 {
        if self.kind == NotificationKind::Resolution {
            return RESOLVED_COLOR;
        }
        match self.severity {
            Severity::Low => 0x3498DB,
            Severity::Medium => 0xF1C40F,
            Severity::High => 0xE67E22,
            Severity::Critical => 0xE74C3C,
        }
    }
}

/// Substitutes `{{alert.*}}` and `{{timestamp}}` placeholders. Unknown
/// placeholders are left untouched.
///
/// ```
/// # use chrono::Utc;
/// # use std::collections::HashMap;
/// # use tripwire_common::types::*;
/// # let now = Utc::now();
/// # let alert = AlertInstance {
/// #     id: "42".into(), rule_id: "r".into(), rule_name: "error rate".into(),
/// #     metric_name: "error_rate".into(), category: "system".into(),
/// #     status: AlertStatus::Firing, severity: Severity::High,
/// #     message: "error_rate > 0.3".into(), description: None, metric_value: 0.5,
/// #     threshold: Some(0.3), anomaly_score: None, source: "trading-engine".into(),
/// #     source_id: None, correlation_id: None, escalation_level: 0,
/// #     escalation_policy_id: None, next_escalation_at: None, first_triggered_at: now,
/// #     last_triggered_at: now, last_escalated_at: None, acknowledged_at: None,
/// #     acknowledged_by: None, resolved_at: None, resolved_by: None,
/// #     resolution_notes: None, labels: HashMap::new(), additional_data: None,
/// # };
/// let text = tripwire_notify::message::render_template(
///     "{{alert.severity}} on {{alert.source}}: {{alert.value}} > {{alert.threshold}}",
///     &alert,
///     now,
/// );
/// assert_eq!(text, "high on trading-engine: 0.5 > 0.3");
/// ```
pub fn render_template(template: &str, alert: &AlertInstance, now: DateTime<Utc>) -> String {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    // Single pass: values that contain placeholders are not expanded again.
    cached_regex(&PLACEHOLDER, r"\{\{\s*([a-z_.]+)\s*\}\}")
        .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
            "alert.id" => alert.id.clone(),
            "alert.message" => alert.message.clone(),
            "alert.severity" => alert.severity.as_str().to_string(),
            "alert.source" => alert.source.clone(),
            "alert.value" => alert.metric_value.to_string(),
            "alert.threshold" => alert.threshold.map(|t| t.to_string()).unwrap_or_default(),
            "timestamp" => now.to_rfc3339(),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

fn default_title(alert: &AlertInstance, kind: NotificationKind) -> String {
    let severity = alert.severity.as_str().to_uppercase();
    match kind {
        NotificationKind::Alert => {
            format!("{} [{severity}] {}", alert.severity.emoji(), alert.rule_name)
        }
        NotificationKind::Escalation => format!(
            "{} [ESCALATION L{}] [{severity}] {}",
            alert.severity.emoji(),
            alert.escalation_level + 1,
            alert.rule_name
        ),
        NotificationKind::Resolution => format!("✅ [RESOLVED] {}", alert.rule_name),
        NotificationKind::Test => format!("🧪 [TEST] {}", alert.rule_name),
    }
}

fn build_fields(alert: &AlertInstance, kind: NotificationKind) -> Vec<MessageField> {
    let mut fields = vec![
        field("Source", &alert.source),
        field("Metric", &alert.metric_name),
        field("Value", &format!("{:.4}", alert.metric_value)),
        field("Severity", alert.severity.as_str()),
    ];
    if let Some(t) = alert.threshold {
        fields.push(field("Threshold", &format!("{t:.4}")));
    }
    if let Some(score) = alert.anomaly_score {
        fields.push(field("Anomaly score", &format!("{score:.2}")));
    }
    let labels = format_labels(&alert.labels);
    if !labels.is_empty() {
        fields.push(field("Labels", &labels));
    }
    if let Some(ref c) = alert.correlation_id {
        fields.push(field("Correlation", c));
    }
    match kind {
        NotificationKind::Escalation => {
            fields.push(field(
                "Escalation level",
                &(alert.escalation_level + 1).to_string(),
            ));
        }
        NotificationKind::Resolution => {
            if let Some(ref by) = alert.resolved_by {
                fields.push(field("Resolved by", by));
            }
            if let Some(at) = alert.resolved_at {
                let secs = (at - alert.first_triggered_at).num_seconds().max(0);
                fields.push(field("Duration", &format!("{secs}s")));
            }
            if let Some(ref notes) = alert.resolution_notes {
                fields.push(field("Notes", notes));
            }
        }
        NotificationKind::Alert | NotificationKind::Test => {}
    }
    fields
}

fn default_summary(alert: &AlertInstance, kind: NotificationKind) -> String {
    let headline = match kind {
        NotificationKind::Resolution => format!("Resolved: {}", alert.message),
        NotificationKind::Test => "This is a test notification.".to_string(),
        _ => alert.message.clone(),
    };
    match &alert.description {
        Some(d) if kind != NotificationKind::Test => format!("{headline}\n{d}"),
        _ => headline,
    }
}

fn default_body(alert: &AlertInstance, kind: NotificationKind, fields: &[MessageField]) -> String {
    let mut lines = Vec::with_capacity(fields.len() + 3);
    lines.push(default_summary(alert, kind));
    lines.push(String::new());
    lines.extend(fields.iter().map(|f| format!("{}: {}", f.name, f.value)));
    lines.push(format!(
        "First triggered: {}",
        alert.first_triggered_at.to_rfc3339()
    ));
    lines.join("\n")
}

fn field(name: &str, value: &str) -> MessageField {
    MessageField {
        name: name.to_string(),
        value: value.to_string(),
    }
}
