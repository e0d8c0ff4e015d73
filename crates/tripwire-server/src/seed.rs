//! JSON seed files for rules, channels, suppressions and escalation policies.
//!
//! Seeding is idempotent by name: rules, channels and policies whose name
//! already exists are skipped. Invalid entries are logged and skipped so one
//! bad entry does not block the rest of the file.

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tripwire_common::types::{
    AlertRule, CompareOp, EscalationCondition, EscalationPolicy, EscalationStep, Severity,
};

use crate::service::{AlertingService, ChannelSpec, SuppressionSpec};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub rules: Vec<SeedRule>,
    #[serde(default)]
    pub channels: Vec<ChannelSpec>,
    #[serde(default)]
    pub suppressions: Vec<SuppressionSpec>,
    #[serde(default)]
    pub escalation_policies: Vec<SeedEscalationPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRule {
    pub name: String,
    pub metric_name: String,
    #[serde(default)]
    pub operator: Option<CompareOp>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub use_anomaly_detection: bool,
    #[serde(default = "default_aggregation_window_secs")]
    pub aggregation_window_secs: u64,
    #[serde(default = "default_seed_severity")]
    pub severity: Severity,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_max_alerts_per_hour")]
    pub max_alerts_per_hour: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Steps reference channels by name; the policy may bind to a rule by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedEscalationPolicy {
    pub name: String,
    #[serde(default)]
    pub rule_name: Option<String>,
    #[serde(default)]
    pub severities: Option<Vec<Severity>>,
    pub steps: Vec<SeedEscalationStep>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedEscalationStep {
    pub delay_secs: u64,
    pub channels: Vec<String>,
    #[serde(default)]
    pub condition: Option<EscalationCondition>,
}

fn default_aggregation_window_secs() -> u64 {
    300
}

fn default_seed_severity() -> Severity {
    Severity::Medium
}

fn default_category() -> String {
    "system".to_string()
}

fn default_max_alerts_per_hour() -> u32 {
    10
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub rules_created: u32,
    pub rules_skipped: u32,
    pub channels_created: u32,
    pub channels_skipped: u32,
    pub suppressions_created: u32,
    pub policies_created: u32,
    pub policies_skipped: u32,
}

pub fn load_seed(path: &str) -> Result<SeedFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to read seed file '{}': {}", path, e))?;
    serde_json::from_str(&content).map_err(|e| anyhow!("Failed to parse seed file '{}': {}", path, e))
}

fn validate_rule(rule: &SeedRule) -> Result<()> {
    match (rule.operator, rule.threshold) {
        (Some(_), Some(_)) => Ok(()),
        (None, None) if rule.use_anomaly_detection => Ok(()),
        (None, None) => Err(anyhow!("rule has neither a threshold nor anomaly detection")),
        _ => Err(anyhow!("operator and threshold must be set together")),
    }
}

pub async fn apply_seed(service: &AlertingService, seed: &SeedFile) -> Result<SeedReport> {
    let store = service.store();
    let mut report = SeedReport::default();

    let mut rule_ids: HashMap<String, String> = store
        .list_rules()
        .await?
        .into_iter()
        .map(|r| (r.name, r.id))
        .collect();
    for seed_rule in &seed.rules {
        if rule_ids.contains_key(&seed_rule.name) {
            tracing::warn!(name = %seed_rule.name, "Rule already exists, skipping");
            report.rules_skipped += 1;
            continue;
        }
        if let Err(e) = validate_rule(seed_rule) {
            tracing::error!(name = %seed_rule.name, error = %e, "Invalid rule, skipping");
            report.rules_skipped += 1;
            continue;
        }
        let now = Utc::now();
        let rule = AlertRule {
            id: tripwire_common::id::next_id(),
            name: seed_rule.name.clone(),
            metric_name: seed_rule.metric_name.clone(),
            operator: seed_rule.operator,
            threshold: seed_rule.threshold,
            use_anomaly_detection: seed_rule.use_anomaly_detection,
            aggregation_window_secs: seed_rule.aggregation_window_secs,
            severity: seed_rule.severity,
            category: seed_rule.category.clone(),
            max_alerts_per_hour: seed_rule.max_alerts_per_hour,
            enabled: seed_rule.enabled,
            created_at: now,
            updated_at: now,
        };
        match store.insert_rule(&rule).await {
            Ok(inserted) => {
                tracing::info!(name = %inserted.name, rule_id = %inserted.id, "Rule created");
                rule_ids.insert(inserted.name, inserted.id);
                report.rules_created += 1;
            }
            Err(e) => {
                tracing::error!(name = %seed_rule.name, error = %e, "Failed to create rule");
                report.rules_skipped += 1;
            }
        }
    }

    let mut channel_ids: HashMap<String, String> = store
        .list_channels()
        .await?
        .into_iter()
        .map(|c| (c.name, c.id))
        .collect();
    for spec in &seed.channels {
        if channel_ids.contains_key(&spec.name) {
            tracing::warn!(name = %spec.name, "Channel already exists, skipping");
            report.channels_skipped += 1;
            continue;
        }
        match service.create_channel(spec.clone()).await {
            Ok(created) => {
                channel_ids.insert(created.name, created.id);
                report.channels_created += 1;
            }
            Err(e) => {
                tracing::error!(name = %spec.name, error = %e, "Failed to create channel");
                report.channels_skipped += 1;
            }
        }
    }

    for spec in &seed.suppressions {
        match service.create_suppression(spec.clone()).await {
            Ok(_) => report.suppressions_created += 1,
            Err(e) => tracing::error!(name = %spec.name, error = %e, "Failed to create suppression"),
        }
    }

    for seed_policy in &seed.escalation_policies {
        match build_policy(seed_policy, &rule_ids, &channel_ids) {
            Ok(policy) => match store.insert_escalation_policy(&policy).await {
                Ok(inserted) => {
                    tracing::info!(name = %inserted.name, policy_id = %inserted.id, "Escalation policy created");
                    report.policies_created += 1;
                }
                Err(e) => {
                    tracing::warn!(name = %seed_policy.name, error = %e, "Escalation policy not created");
                    report.policies_skipped += 1;
                }
            },
            Err(e) => {
                tracing::error!(name = %seed_policy.name, error = %e, "Invalid escalation policy, skipping");
                report.policies_skipped += 1;
            }
        }
    }

    tracing::info!(
        rules = report.rules_created,
        channels = report.channels_created,
        suppressions = report.suppressions_created,
        policies = report.policies_created,
        "Seed applied"
    );
    Ok(report)
}

fn build_policy(
    seed: &SeedEscalationPolicy,
    rule_ids: &HashMap<String, String>,
    channel_ids: &HashMap<String, String>,
) -> Result<EscalationPolicy> {
    if seed.steps.is_empty() {
        return Err(anyhow!("policy has no steps"));
    }
    let rule_id = seed
        .rule_name
        .as_ref()
        .map(|name| {
            rule_ids
                .get(name)
                .cloned()
                .ok_or_else(|| anyhow!("unknown rule '{name}'"))
        })
        .transpose()?;

    let steps = seed
        .steps
        .iter()
        .map(|step| {
            let channel_ids = step
                .channels
                .iter()
                .map(|name| {
                    channel_ids
                        .get(name)
                        .cloned()
                        .ok_or_else(|| anyhow!("unknown channel '{name}'"))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(EscalationStep {
                delay_secs: step.delay_secs,
                channel_ids,
                condition: step.condition,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(EscalationPolicy {
        id: tripwire_common::id::next_id(),
        name: seed.name.clone(),
        rule_id,
        severities: seed.severities.clone(),
        steps,
        enabled: seed.enabled,
    })
}
