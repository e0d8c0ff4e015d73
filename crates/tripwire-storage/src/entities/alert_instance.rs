use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_instances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub metric_name: String,
    pub category: String,
    pub status: String,
    pub severity: String,
    pub message: String,
    pub description: Option<String>,
    pub metric_value: f64,
    pub threshold: Option<f64>,
    pub anomaly_score: Option<f64>,
    pub source: String,
    pub source_id: Option<String>,
    pub correlation_id: Option<String>,
    pub escalation_level: i32,
    pub escalation_policy_id: Option<String>,
    pub next_escalation_at: Option<DateTimeWithTimeZone>,
    pub first_triggered_at: DateTimeWithTimeZone,
    pub last_triggered_at: DateTimeWithTimeZone,
    pub last_escalated_at: Option<DateTimeWithTimeZone>,
    pub acknowledged_at: Option<DateTimeWithTimeZone>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTimeWithTimeZone>,
    pub resolved_by: Option<String>,
    pub resolution_notes: Option<String>,
    pub labels_json: String,
    pub additional_data_json: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
