use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "notification_channels")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub name: String,
    pub channel_type: String,
    pub config_json: String,
    pub severity_filter: Option<String>,
    pub category_filter: Option<String>,
    pub tag_filter: Option<String>,
    pub enabled: bool,
    pub rate_limit_per_hour: i32,
    pub message_template: Option<String>,
    pub title_template: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
