//! SQLite persistence for the alerting engine.
//!
//! [`AlertStore`] owns a SeaORM connection, runs the `migration` crate on
//! startup and exposes async CRUD for rules, alert instances, channels,
//! notification attempts, suppressions, analytics buckets and escalation
//! policies. All rows are returned as `tripwire_common::types` structs.

pub mod entities;
pub mod error;
pub mod store;


pub use error::{Result, StorageError};
pub use store::notification::AttemptOutcome;
pub use store::{ActiveAlertFilter, AlertStore};
