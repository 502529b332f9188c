//! # Halo Store
//!
//! SQLite persistence for the Halo core: one typed store per logical table,
//! a transactional write path for resolution outcomes, and an append-only
//! audit store that maintains the HMAC hash chain.
//!
//! Stores share one [`HaloDb`] pool. Methods suffixed `_tx` participate in a
//! caller-owned transaction so that resolution side effects (mention update,
//! decision inserts, entity/attribute/identifier inserts, audit entry)
//! commit all-or-nothing.

pub mod audit_store;
pub mod entity_store;
pub mod fact_store;
pub mod mention_store;
pub mod pii;
pub mod provenance_store;
pub mod sqlite;

pub use audit_store::{AuditStore, ChainVerification};
pub use entity_store::EntityStore;
pub use fact_store::FactStore;
pub use mention_store::MentionStore;
pub use pii::PiiCodec;
pub use provenance_store::ProvenanceStore;
pub use sqlite::{HaloDb, SqliteConfig};

use halo_core::HaloError;
use uuid::Uuid;

/// A write transaction shared across stores
pub type SqliteTx<'a> = sqlx::Transaction<'a, sqlx::Sqlite>;

/// Map driver errors onto the engine error kinds
pub fn db_err(e: sqlx::Error) -> HaloError {
    if let sqlx::Error::Database(ref db) = e {
        if db.is_unique_violation() {
            return HaloError::Conflict(db.message().to_string());
        }
    }
    HaloError::Storage(e.to_string())
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, HaloError> {
    Uuid::parse_str(s).map_err(|e| HaloError::Storage(format!("malformed uuid in row: {e}")))
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, HaloError> {
    serde_json::from_str(s).map_err(|e| HaloError::Storage(format!("malformed json in row: {e}")))
}
