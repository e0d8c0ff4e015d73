use sea_orm::entity::prelude::*;

/// List filters are JSON arrays stored as TEXT; NULL means unconstrained.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "suppressions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub reason: Option<String>,
    pub rule_ids: Option<String>,
    pub categories: Option<String>,
    pub severities: Option<String>,
    pub sources: Option<String>,
    pub tags: Option<String>,
    pub starts_at: DateTimeWithTimeZone,
    pub ends_at: Option<DateTimeWithTimeZone>,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
