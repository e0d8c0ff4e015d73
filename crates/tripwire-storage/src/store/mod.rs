use chrono::{DateTime, FixedOffset, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::str::FromStr;

use crate::error::{Result, StorageError};

pub mod alert;
pub mod analytics;
pub mod escalation;
pub mod notification;
pub mod rule;
pub mod suppression;

pub use alert::ActiveAlertFilter;

/// Access layer for the alerting database.
///
/// Every method is `async` and backed by SeaORM. Rows are converted to the
/// `tripwire_common::types` domain structs on the way out so callers never see
/// entity models.
#[derive(Clone)]
pub struct AlertStore {
    pub(crate) db: DatabaseConnection,
}

impl AlertStore {
    /// Connects, applies pending migrations and returns the store.
    ///
    /// `db_url` example: `sqlite:///var/lib/tripwire/tripwire.db?mode=rwc`
    pub async fn new(db_url: &str) -> Result<Self> {
        let db = Database::connect(db_url).await?;

        // WAL only applies to file-backed SQLite
        if db_url.starts_with("sqlite://") && !db_url.contains(":memory:") {
            db.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
        }

        Migrator::up(&db, None).await?;
        tracing::info!(db_url = %db_url, "Initialized alert store");

        Ok(Self { db })
    }

    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

pub(crate) fn ts(dt: DateTime<Utc>) -> DateTime<FixedOffset> {
    dt.fixed_offset()
}

pub(crate) fn utc(dt: DateTime<FixedOffset>) -> DateTime<Utc> {
    dt.with_timezone(&Utc)
}

pub(crate) fn parse_column<T: FromStr>(column: &'static str, value: &str) -> Result<T> {
    value.parse().map_err(|_| StorageError::InvalidValue {
        column,
        value: value.to_string(),
    })
}

pub(crate) fn encode_list<T: Serialize>(list: &Option<Vec<T>>) -> Result<Option<String>> {
    list.as_ref()
        .map(|l| serde_json::to_string(l))
        .transpose()
        .map_err(StorageError::from)
}

pub(crate) fn decode_list<T: DeserializeOwned>(raw: Option<&str>) -> Result<Option<Vec<T>>> {
    raw.map(serde_json::from_str).transpose().map_err(StorageError::from)
}
