//! SeaORM entities, one per table created by the `migration` crate.

pub mod alert_instance;
pub mod alert_rule;
pub mod analytics_bucket;
pub mod escalation_policy;
pub mod notification_attempt;
pub mod notification_channel;
pub mod suppression;
