//! Suppression matching.
//!
//! A suppression constrains a match only through the filters it sets; every
//! set filter must accept. Rule-level checks run before a rule is evaluated
//! and can only see the rule, so suppressions scoped by source or tag are
//! left for the alert-level check made before a new alert is opened.

use glob_match::glob_match;
use std::collections::HashMap;
use tripwire_common::types::{AlertRule, Severity, Suppression};

/// What the alert-level check knows about an alert that is about to open.
pub struct AlertCandidate<'a> {
    pub rule_id: &'a str,
    pub category: &'a str,
    /// Severity after anomaly escalation.
    pub severity: Severity,
    pub source: &'a str,
    pub labels: &'a HashMap<String, String>,
}

fn accepts<T, F>(filter: &Option<Vec<T>>, pred: F) -> bool
where
    F: Fn(&T) -> bool,
{
    filter.as_ref().map_or(true, |items| items.iter().any(pred))
}

fn source_matches(patterns: &Option<Vec<String>>, source: &str) -> bool {
    accepts(patterns, |p| p == source || glob_match(p, source))
}

/// Tags are `key` or `key=value` against the alert labels.
fn tag_matches(tags: &Option<Vec<String>>, labels: &HashMap<String, String>) -> bool {
    accepts(tags, |tag| match tag.split_once('=') {
        Some((k, v)) => labels.get(k).is_some_and(|lv| lv == v),
        None => labels.contains_key(tag.as_str()),
    })
}

pub fn matches_rule(s: &Suppression, rule: &AlertRule) -> bool {
    s.sources.is_none()
        && s.tags.is_none()
        && accepts(&s.rule_ids, |id| id == &rule.id)
        && accepts(&s.categories, |c| c.eq_ignore_ascii_case(&rule.category))
        && accepts(&s.severities, |sev| *sev == rule.severity)
}

pub fn matches_alert(s: &Suppression, alert: &AlertCandidate<'_>) -> bool {
    accepts(&s.rule_ids, |id| id == alert.rule_id)
        && accepts(&s.categories, |c| c.eq_ignore_ascii_case(alert.category))
        && accepts(&s.severities, |sev| *sev == alert.severity)
        && source_matches(&s.sources, alert.source)
        && tag_matches(&s.tags, alert.labels)
}

/// First suppression, in the given order, that silences the rule.
pub fn find_rule_suppression<'a>(
    suppressions: &'a [Suppression],
    rule: &AlertRule,
) -> Option<&'a Suppression> {
    suppressions.iter().find(|s| matches_rule(s, rule))
}

/// First suppression, in the given order, that silences the alert.
pub fn find_alert_suppression<'a>(
    suppressions: &'a [Suppression],
    alert: &AlertCandidate<'_>,
) -> Option<&'a Suppression> {
    suppressions.iter().find(|s| matches_alert(s, alert))
}
