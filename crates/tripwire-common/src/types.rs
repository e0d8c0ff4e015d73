use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tolerance used by [`CompareOp::Eq`] so that float noise does not hide a match.
pub const EQ_EPSILON: f64 = 0.001;

/// A single metric observation pushed by a producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub source: String,
    #[serde(default)]
    pub source_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub additional_data: Option<serde_json::Value>,
}

/// Alert severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use tripwire_common::types::Severity;
///
/// let sev: Severity = "high".parse().unwrap();
/// assert_eq!(sev, Severity::High);
/// assert_eq!(sev.to_string(), "high");
/// assert!(Severity::Critical > Severity::Low);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Low => "🔵",
            Severity::Medium => "🟡",
            Severity::High => "🟠",
            Severity::Critical => "🔴",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" | "info" => Ok(Severity::Low),
            "medium" | "warning" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Threshold comparison operator of an [`AlertRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

impl CompareOp {
    /// Applies the operator. `Eq` tolerates a difference of [`EQ_EPSILON`].
    ///
    /// ```
    /// use tripwire_common::types::CompareOp;
    ///
    /// assert!(CompareOp::Gt.check(10.0, 5.0));
    /// assert!(CompareOp::Eq.check(4.9995, 5.0));
    /// assert!(!CompareOp::Eq.check(5.01, 5.0));
    /// ```
    pub fn check(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Gte => value >= threshold,
            Self::Lt => value < threshold,
            Self::Lte => value <= threshold,
            Self::Eq => (value - threshold).abs() < EQ_EPSILON,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Eq => "eq",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Eq => "==",
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gt" | "greater_than" | ">" => Ok(Self::Gt),
            "gte" | "greater_equal" | ">=" => Ok(Self::Gte),
            "lt" | "less_than" | "<" => Ok(Self::Lt),
            "lte" | "less_equal" | "<=" => Ok(Self::Lte),
            "eq" | "equal" | "==" => Ok(Self::Eq),
            _ => Err(format!("unknown compare operator: {s}")),
        }
    }
}

/// A configured condition binding a metric name to a threshold and/or anomaly check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub metric_name: String,
    pub operator: Option<CompareOp>,
    pub threshold: Option<f64>,
    pub use_anomaly_detection: bool,
    /// Lookback in seconds for the periodic path.
    pub aggregation_window_secs: u64,
    pub severity: Severity,
    pub category: String,
    /// Maximum alerts this rule may open per hour.
    pub max_alerts_per_hour: u32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Firing => "firing",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "firing" => Ok(AlertStatus::Firing),
            "resolved" => Ok(AlertStatus::Resolved),
            _ => Err(format!("unknown alert status: {s}")),
        }
    }
}

/// One open-to-resolved incident for a (rule, source) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertInstance {
    pub id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub metric_name: String,
    /// Copied from the rule when the alert opens.
    pub category: String,
    pub status: AlertStatus,
    pub severity: Severity,
    pub message: String,
    pub description: Option<String>,
    pub metric_value: f64,
    pub threshold: Option<f64>,
    pub anomaly_score: Option<f64>,
    pub source: String,
    pub source_id: Option<String>,
    pub correlation_id: Option<String>,
    pub escalation_level: u32,
    pub escalation_policy_id: Option<String>,
    /// Persisted escalation schedule; `None` when nothing is due.
    pub next_escalation_at: Option<DateTime<Utc>>,
    pub first_triggered_at: DateTime<Utc>,
    pub last_triggered_at: DateTime<Utc>,
    pub last_escalated_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolution_notes: Option<String>,
    pub labels: HashMap<String, String>,
    pub additional_data: Option<serde_json::Value>,
}

impl AlertInstance {
    pub fn is_firing(&self) -> bool {
        self.status == AlertStatus::Firing
    }
}

/// A configured delivery target bound to one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    /// Provider key (`email`, `slack`, `discord`, `sms`, `webhook`).
    pub channel_type: String,
    pub config: serde_json::Value,
    pub severity_filter: Option<Vec<Severity>>,
    pub category_filter: Option<Vec<String>>,
    pub tag_filter: Option<Vec<String>>,
    pub enabled: bool,
    pub rate_limit_per_hour: u32,
    pub message_template: Option<String>,
    pub title_template: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Sent,
    Failed,
    RateLimited,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Pending => "pending",
            AttemptStatus::Sent => "sent",
            AttemptStatus::Failed => "failed",
            AttemptStatus::RateLimited => "rate_limited",
        }
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AttemptStatus::Pending),
            "sent" => Ok(AttemptStatus::Sent),
            "failed" => Ok(AttemptStatus::Failed),
            "rate_limited" => Ok(AttemptStatus::RateLimited),
            _ => Err(format!("unknown attempt status: {s}")),
        }
    }
}

/// Why a notification was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Alert,
    Escalation,
    Resolution,
    Test,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Alert => "alert",
            NotificationKind::Escalation => "escalation",
            NotificationKind::Resolution => "resolution",
            NotificationKind::Test => "test",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alert" => Ok(NotificationKind::Alert),
            "escalation" => Ok(NotificationKind::Escalation),
            "resolution" => Ok(NotificationKind::Resolution),
            "test" => Ok(NotificationKind::Test),
            _ => Err(format!("unknown notification kind: {s}")),
        }
    }
}

/// Audit record of one delivery to one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationAttempt {
    pub id: String,
    pub alert_id: String,
    pub channel_id: String,
    pub kind: NotificationKind,
    pub status: AttemptStatus,
    pub attempts: u32,
    pub response: Option<String>,
    pub error_message: Option<String>,
    pub message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// A time-boxed filter that silences matching alerts without disabling rules.
///
/// Every filter is optional; an absent filter does not constrain the match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suppression {
    pub id: String,
    pub name: String,
    pub reason: Option<String>,
    pub rule_ids: Option<Vec<String>>,
    pub categories: Option<Vec<String>>,
    pub severities: Option<Vec<Severity>>,
    /// Glob patterns matched against the alert source.
    pub sources: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Suppression {
    pub fn is_in_window(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.starts_at <= now && self.ends_at.map_or(true, |end| now < end)
    }
}

/// Hourly roll-up of alert volume and resolution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsBucket {
    pub id: String,
    pub granularity: String,
    pub bucket_start: DateTime<Utc>,
    pub total_alerts: u64,
    pub by_severity: HashMap<String, u64>,
    pub by_source_category: HashMap<String, u64>,
    pub resolved_alerts: u64,
    /// Mean time-to-resolve in milliseconds.
    pub average_resolution_time_ms: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationCondition {
    Unresolved,
    Unacknowledged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationStep {
    pub delay_secs: u64,
    pub channel_ids: Vec<String>,
    #[serde(default)]
    pub condition: Option<EscalationCondition>,
}

/// Ordered notification steps for alerts that stay unresolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPolicy {
    pub id: String,
    pub name: String,
    /// Binds the policy to a single rule; `None` applies to every rule.
    pub rule_id: Option<String>,
    pub severities: Option<Vec<Severity>>,
    pub steps: Vec<EscalationStep>,
    pub enabled: bool,
}

impl EscalationPolicy {
    pub fn applies_to(&self, alert: &AlertInstance) -> bool {
        if !self.enabled || self.steps.is_empty() {
            return false;
        }
        if let Some(rule_id) = &self.rule_id {
            if rule_id != &alert.rule_id {
                return false;
            }
        }
        self.severities
            .as_ref()
            .map_or(true, |sevs| sevs.contains(&alert.severity))
    }
}

/// Format labels map into a human-readable string.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use tripwire_common::types::format_labels;
///
/// let mut labels = HashMap::new();
/// labels.insert("exchange".to_string(), "binance".to_string());
/// labels.insert("pair".to_string(), "BTC/USDT".to_string());
/// assert_eq!(format_labels(&labels), "exchange=binance, pair=BTC/USDT");
/// ```
pub fn format_labels(labels: &HashMap<String, String>) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let mut pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
    pairs.sort();
    pairs.join(", ")
}
