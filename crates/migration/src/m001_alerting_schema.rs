use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_alerting_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await?;
        Ok(())
    }
}

const UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS alert_rules (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    metric_name TEXT NOT NULL,
    operator TEXT,
    threshold REAL,
    use_anomaly_detection INTEGER NOT NULL DEFAULT 0,
    aggregation_window_secs INTEGER NOT NULL DEFAULT 300,
    severity TEXT NOT NULL,
    category TEXT NOT NULL,
    max_alerts_per_hour INTEGER NOT NULL DEFAULT 10,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alert_rules_metric ON alert_rules(metric_name);
CREATE INDEX IF NOT EXISTS idx_alert_rules_enabled ON alert_rules(enabled);

CREATE TABLE IF NOT EXISTS alert_instances (
    id TEXT PRIMARY KEY NOT NULL,
    rule_id TEXT NOT NULL,
    rule_name TEXT NOT NULL,
    metric_name TEXT NOT NULL,
    category TEXT NOT NULL,
    status TEXT NOT NULL,
    severity TEXT NOT NULL,
    message TEXT NOT NULL,
    description TEXT,
    metric_value REAL NOT NULL,
    threshold REAL,
    anomaly_score REAL,
    source TEXT NOT NULL,
    source_id TEXT,
    correlation_id TEXT,
    escalation_level INTEGER NOT NULL DEFAULT 0,
    escalation_policy_id TEXT,
    next_escalation_at TEXT,
    first_triggered_at TEXT NOT NULL,
    last_triggered_at TEXT NOT NULL,
    last_escalated_at TEXT,
    acknowledged_at TEXT,
    acknowledged_by TEXT,
    resolved_at TEXT,
    resolved_by TEXT,
    resolution_notes TEXT,
    labels_json TEXT NOT NULL DEFAULT '{}',
    additional_data_json TEXT
);
CREATE INDEX IF NOT EXISTS idx_alert_instances_rule_source ON alert_instances(rule_id, source, status);
CREATE INDEX IF NOT EXISTS idx_alert_instances_status ON alert_instances(status);
CREATE INDEX IF NOT EXISTS idx_alert_instances_first_triggered ON alert_instances(first_triggered_at);
CREATE INDEX IF NOT EXISTS idx_alert_instances_next_escalation ON alert_instances(next_escalation_at);

CREATE TABLE IF NOT EXISTS notification_channels (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL UNIQUE,
    channel_type TEXT NOT NULL,
    config_json TEXT NOT NULL,
    severity_filter TEXT,
    category_filter TEXT,
    tag_filter TEXT,
    enabled INTEGER NOT NULL DEFAULT 1,
    rate_limit_per_hour INTEGER NOT NULL DEFAULT 60,
    message_template TEXT,
    title_template TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_notification_channels_enabled ON notification_channels(enabled);

CREATE TABLE IF NOT EXISTS notification_attempts (
    id TEXT PRIMARY KEY NOT NULL,
    alert_id TEXT NOT NULL,
    channel_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    response TEXT,
    error_message TEXT,
    message_id TEXT,
    created_at TEXT NOT NULL,
    sent_at TEXT,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_notification_attempts_alert ON notification_attempts(alert_id);
CREATE INDEX IF NOT EXISTS idx_notification_attempts_channel_status ON notification_attempts(channel_id, status, created_at);

CREATE TABLE IF NOT EXISTS suppressions (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    reason TEXT,
    rule_ids TEXT,
    categories TEXT,
    severities TEXT,
    sources TEXT,
    tags TEXT,
    starts_at TEXT NOT NULL,
    ends_at TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_by TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_suppressions_active ON suppressions(is_active, starts_at);

CREATE TABLE IF NOT EXISTS analytics_buckets (
    id TEXT PRIMARY KEY NOT NULL,
    bucket_key TEXT NOT NULL UNIQUE,
    granularity TEXT NOT NULL,
    bucket_start TEXT NOT NULL,
    total_alerts INTEGER NOT NULL DEFAULT 0,
    by_severity_json TEXT NOT NULL DEFAULT '{}',
    by_source_category_json TEXT NOT NULL DEFAULT '{}',
    resolved_alerts INTEGER NOT NULL DEFAULT 0,
    average_resolution_time_ms REAL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_analytics_buckets_start ON analytics_buckets(granularity, bucket_start);
";

const DOWN_SQL: &str = "
DROP TABLE IF EXISTS analytics_buckets;
DROP TABLE IF EXISTS suppressions;
DROP TABLE IF EXISTS notification_attempts;
DROP TABLE IF EXISTS notification_channels;
DROP TABLE IF EXISTS alert_instances;
DROP TABLE IF EXISTS alert_rules;
";
