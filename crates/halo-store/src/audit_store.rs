//! Append-only audit store maintaining the HMAC hash chain
//!
//! Writes serialize on a single writer lock: sequence ids are computed as
//! `last + 1` inside the lock, so the chain is gap-free by construction.
//! Callers embedding an audit entry in a larger transaction must hold
//! [`AuditStore::writer_lock`] from before the transaction begins until it
//! commits.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use sqlx::FromRow;
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;
use uuid::Uuid;

use halo_core::audit::sanitize_event_data;
use halo_core::{ActorType, AuditEntry, AuditEventInput, AuditEventType, HaloError};
use halo_crypto::{ChainHasher, GENESIS_HASH};

use crate::{db_err, parse_json, HaloDb, SqliteTx};

#[derive(FromRow)]
struct AuditRow {
    seq: i64,
    previous_hash: String,
    entry_hash: String,
    event_type: String,
    actor_type: String,
    actor_id: Option<String>,
    target_type: Option<String>,
    target_id: Option<String>,
    event_data: String,
    request_id: Option<String>,
    ip: Option<String>,
    user_agent: Option<String>,
    created_at: String,
}

impl AuditRow {
    fn into_entry(self) -> Result<AuditEntry, HaloError> {
        Ok(AuditEntry {
            seq: self.seq,
            previous_hash: self.previous_hash,
            entry_hash: self.entry_hash,
            event_type: AuditEventType::parse(&self.event_type),
            actor_type: ActorType::parse(&self.actor_type).ok_or_else(|| {
                HaloError::Storage(format!("unknown actor type {}", self.actor_type))
            })?,
            actor_id: self.actor_id,
            target_type: self.target_type,
            target_id: self.target_id,
            event_data: parse_json(&self.event_data)?,
            request_id: self.request_id,
            ip: self.ip,
            user_agent: self.user_agent,
            created_at: self.created_at,
        })
    }
}

const AUDIT_COLUMNS: &str = "seq, previous_hash, entry_hash, event_type, actor_type, actor_id, \
                             target_type, target_id, event_data, request_id, ip, user_agent, \
                             created_at";

/// Result of a bulk chain verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    pub ok: bool,
    pub first_invalid_seq: Option<i64>,
    pub entries_checked: i64,
}

pub struct AuditStore {
    db: HaloDb,
    hasher: ChainHasher,
    writer: Mutex<()>,
}

impl AuditStore {
    pub fn new(db: HaloDb, hasher: ChainHasher) -> Self {
        Self {
            db,
            hasher,
            writer: Mutex::new(()),
        }
    }

    /// Serialize chain writes; hold across the surrounding transaction
    pub async fn writer_lock(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().await
    }

    /// Append an entry inside a caller-owned transaction
    ///
    /// The caller must hold [`Self::writer_lock`] until that transaction
    /// commits; otherwise a concurrent writer could chain off a hash that
    /// never lands.
    pub async fn append_tx(
        &self,
        tx: &mut SqliteTx<'_>,
        input: &AuditEventInput,
    ) -> Result<AuditEntry, HaloError> {
        let last: Option<(i64, String)> =
            sqlx::query_as("SELECT seq, entry_hash FROM audit_log ORDER BY seq DESC LIMIT 1")
                .fetch_optional(&mut **tx)
                .await
                .map_err(db_err)?;

        let (seq, previous_hash) = match last {
            Some((last_seq, last_hash)) => (last_seq + 1, last_hash),
            None => (1, GENESIS_HASH.to_string()),
        };

        let event_data = sanitize_event_data(input.event_data.clone());
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let body = chain_body(
            seq,
            &previous_hash,
            input.event_type.as_str(),
            input.actor_type.as_str(),
            input.actor_id.as_deref(),
            input.target_type.as_deref(),
            input.target_id.as_deref(),
            &event_data,
            input.request_id.as_deref(),
            input.ip.as_deref(),
            input.user_agent.as_deref(),
            &created_at,
        );
        let entry_hash = self
            .hasher
            .entry_hash(&previous_hash, &body)
            .map_err(|e| HaloError::Crypto(e.to_string()))?;

        sqlx::query(&format!(
            "INSERT INTO audit_log ({AUDIT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(seq)
        .bind(&previous_hash)
        .bind(&entry_hash)
        .bind(input.event_type.as_str())
        .bind(input.actor_type.as_str())
        .bind(&input.actor_id)
        .bind(&input.target_type)
        .bind(&input.target_id)
        .bind(event_data.to_string())
        .bind(&input.request_id)
        .bind(&input.ip)
        .bind(&input.user_agent)
        .bind(&created_at)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;

        Ok(AuditEntry {
            seq,
            previous_hash,
            entry_hash,
            event_type: input.event_type.clone(),
            actor_type: input.actor_type,
            actor_id: input.actor_id.clone(),
            target_type: input.target_type.clone(),
            target_id: input.target_id.clone(),
            event_data,
            request_id: input.request_id.clone(),
            ip: input.ip.clone(),
            user_agent: input.user_agent.clone(),
            created_at,
        })
    }

    /// Standalone append: lock, transact, commit
    pub async fn append(&self, input: &AuditEventInput) -> Result<AuditEntry, HaloError> {
        let _guard = self.writer_lock().await;
        let mut tx = self.db.begin().await?;
        let entry = self.append_tx(&mut tx, input).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(entry)
    }

    pub async fn entries(
        &self,
        from_seq: Option<i64>,
        to_seq: Option<i64>,
    ) -> Result<Vec<AuditEntry>, HaloError> {
        let from = from_seq.unwrap_or(1);
        let to = to_seq.unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, AuditRow>(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log WHERE seq >= ? AND seq <= ? ORDER BY seq ASC"
        ))
        .bind(from)
        .bind(to)
        .fetch_all(self.db.pool())
        .await
        .map_err(db_err)?;
        rows.into_iter().map(AuditRow::into_entry).collect()
    }

    /// Walk the chain: gap-freeness, linkage, and recomputed entry hashes
    ///
    /// Returns the first offending sequence id. Verification is read-only
    /// and never blocks writers.
    pub async fn verify_chain(
        &self,
        from_seq: Option<i64>,
        to_seq: Option<i64>,
    ) -> Result<ChainVerification, HaloError> {
        let rows = sqlx::query_as::<_, AuditRow>(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log WHERE seq >= ? AND seq <= ? ORDER BY seq ASC"
        ))
        .bind(from_seq.unwrap_or(1))
        .bind(to_seq.unwrap_or(i64::MAX))
        .fetch_all(self.db.pool())
        .await
        .map_err(db_err)?;

        let mut expected_previous = match rows.first() {
            None => {
                return Ok(ChainVerification {
                    ok: true,
                    first_invalid_seq: None,
                    entries_checked: 0,
                })
            }
            Some(first) if first.seq == 1 => GENESIS_HASH.to_string(),
            Some(first) => {
                let predecessor: Option<(String,)> =
                    sqlx::query_as("SELECT entry_hash FROM audit_log WHERE seq = ?")
                        .bind(first.seq - 1)
                        .fetch_optional(self.db.pool())
                        .await
                        .map_err(db_err)?;
                match predecessor {
                    Some((hash,)) => hash,
                    None => {
                        warn!(seq = first.seq, "audit chain verification: predecessor missing");
                        return Ok(ChainVerification {
                            ok: false,
                            first_invalid_seq: Some(first.seq),
                            entries_checked: 0,
                        });
                    }
                }
            }
        };

        let mut expected_seq = rows[0].seq;
        let mut checked = 0i64;

        for row in &rows {
            let invalid = |reason: &str| {
                warn!(seq = row.seq, reason, "audit chain verification failed");
                ChainVerification {
                    ok: false,
                    first_invalid_seq: Some(row.seq),
                    entries_checked: checked,
                }
            };

            if row.seq != expected_seq {
                return Ok(invalid("sequence gap"));
            }
            if row.previous_hash != expected_previous {
                return Ok(invalid("previous_hash does not match predecessor"));
            }

            let event_data: Value = parse_json(&row.event_data)?;
            let body = chain_body(
                row.seq,
                &row.previous_hash,
                &row.event_type,
                &row.actor_type,
                row.actor_id.as_deref(),
                row.target_type.as_deref(),
                row.target_id.as_deref(),
                &event_data,
                row.request_id.as_deref(),
                row.ip.as_deref(),
                row.user_agent.as_deref(),
                &row.created_at,
            );
            let matches = self
                .hasher
                .verify_entry(&row.previous_hash, &body, &row.entry_hash)
                .map_err(|e| HaloError::Crypto(e.to_string()))?;
            if !matches {
                return Ok(invalid("entry_hash mismatch"));
            }

            expected_previous = row.entry_hash.clone();
            expected_seq += 1;
            checked += 1;
        }

        Ok(ChainVerification {
            ok: true,
            first_invalid_seq: None,
            entries_checked: checked,
        })
    }

    /// Export the audit trail as JSON Lines for offline compliance review
    pub async fn export_jsonl(&self) -> Result<String, HaloError> {
        let entries = self.entries(None, None).await?;
        Ok(entries
            .iter()
            .filter_map(|e| serde_json::to_string(e).ok())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Record a mutation failure; best-effort, never masks the original error
    pub async fn record_failure(
        &self,
        event_type: AuditEventType,
        target_type: &str,
        target_id: Uuid,
        error: &HaloError,
    ) {
        let input = AuditEventInput::system(
            event_type,
            target_type,
            target_id.to_string(),
            json!({ "error": error.to_string() }),
        );
        if let Err(audit_error) = self.append(&input).await {
            warn!(%target_id, error = %audit_error, "failed to write failure audit entry");
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn chain_body(
    seq: i64,
    previous_hash: &str,
    event_type: &str,
    actor_type: &str,
    actor_id: Option<&str>,
    target_type: Option<&str>,
    target_id: Option<&str>,
    event_data: &Value,
    request_id: Option<&str>,
    ip: Option<&str>,
    user_agent: Option<&str>,
    created_at: &str,
) -> Value {
    json!({
        "seq": seq,
        "previous_hash": previous_hash,
        "event_type": event_type,
        "actor_type": actor_type,
        "actor_id": actor_id,
        "target_type": target_type,
        "target_id": target_id,
        "event_data": event_data,
        "request_id": request_id,
        "ip": ip,
        "user_agent": user_agent,
        "created_at": created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use halo_crypto::{KeySet, MasterKey};

    async fn store() -> AuditStore {
        let db = HaloDb::memory().await.unwrap();
        let keys = KeySet::derive(&MasterKey::from_bytes([4u8; 32])).unwrap();
        AuditStore::new(db, ChainHasher::new(keys.audit_chain()))
    }

    fn event(n: i64) -> AuditEventInput {
        AuditEventInput::system(
            AuditEventType::EntityCreated,
            "entity",
            Uuid::new_v4().to_string(),
            json!({ "n": n }),
        )
    }

    #[tokio::test]
    async fn chain_starts_at_genesis_and_links() {
        let store = store().await;
        let first = store.append(&event(1)).await.unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(first.previous_hash, GENESIS_HASH);

        let second = store.append(&event(2)).await.unwrap();
        assert_eq!(second.seq, 2);
        assert_eq!(second.previous_hash, first.entry_hash);
    }

    #[tokio::test]
    async fn verification_accepts_untouched_chain() {
        let store = store().await;
        for n in 0..10 {
            store.append(&event(n)).await.unwrap();
        }
        let result = store.verify_chain(None, None).await.unwrap();
        assert!(result.ok);
        assert_eq!(result.entries_checked, 10);
    }

    #[tokio::test]
    async fn verification_supports_subranges() {
        let store = store().await;
        for n in 0..10 {
            store.append(&event(n)).await.unwrap();
        }
        let result = store.verify_chain(Some(4), Some(8)).await.unwrap();
        assert!(result.ok);
        assert_eq!(result.entries_checked, 5);
    }

    #[tokio::test]
    async fn tampered_event_data_is_pinpointed() {
        let store = store().await;
        for n in 0..10 {
            store.append(&event(n)).await.unwrap();
        }

        // the append-only triggers hold against the application principal
        let direct = sqlx::query("UPDATE audit_log SET event_data = '{\"n\":99}' WHERE seq = 5")
            .execute(store.db.pool())
            .await;
        assert!(direct.is_err());

        // an attacker with raw DDL access can drop the trigger; the chain
        // still pins the mutation
        sqlx::query("DROP TRIGGER audit_log_no_update")
            .execute(store.db.pool())
            .await
            .unwrap();
        sqlx::query("UPDATE audit_log SET event_data = '{\"n\":99}' WHERE seq = 5")
            .execute(store.db.pool())
            .await
            .unwrap();

        let result = store.verify_chain(None, None).await.unwrap();
        assert!(!result.ok);
        assert_eq!(result.first_invalid_seq, Some(5));
    }

    #[tokio::test]
    async fn sensitive_event_fields_are_redacted_before_hashing() {
        let store = store().await;
        let entry = store
            .append(&AuditEventInput::system(
                AuditEventType::MentionResolved,
                "mention",
                "m-1",
                json!({ "personnummer": "198112189876", "score": 0.99 }),
            ))
            .await
            .unwrap();
        assert_eq!(entry.event_data["personnummer"], "[REDACTED]");
        assert!(store.verify_chain(None, None).await.unwrap().ok);
    }
}
