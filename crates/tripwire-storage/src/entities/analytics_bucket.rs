use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "analytics_buckets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// `<granularity>:<bucket_start rfc3339>`
    #[sea_orm(unique)]
    pub bucket_key: String,
    pub granularity: String,
    pub bucket_start: DateTimeWithTimeZone,
    pub total_alerts: i64,
    pub by_severity_json: String,
    pub by_source_category_json: String,
    pub resolved_alerts: i64,
    pub average_resolution_time_ms: Option<f64>,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
