//! Soft-delete queries: tombstones and the deletion audit trail.
//!
//! Deleting moves the row into `memory_tombstones` with every column kept;
//! restoring moves it back under the same id. Both write an audit row in the
//! same transaction.

use keepsake_models::{timestamp, AuditAction, AuditEntry, MemoryId, MemoryRecord, Tombstone};
use sqlx::FromRow;

use super::{DbPool, MemoryRow};
use crate::{Error, Result};

/// Tombstone row as stored.
#[derive(Debug, Clone, FromRow)]
pub struct TombstoneRow {
    pub memory_id: i64,
    pub text: String,
    pub source: String,
    pub tags: String,
    pub emotion: Option<String>,
    pub intensity: i64,
    pub flagged: bool,
    pub created_at: String,
    pub reason: String,
    pub deleted_at: String,
    pub backup_ref: String,
}

impl TryFrom<TombstoneRow> for Tombstone {
    type Error = Error;

    fn try_from(row: TombstoneRow) -> Result<Self> {
        let record = MemoryRecord::try_from(MemoryRow {
            id: row.memory_id,
            text: row.text,
            source: row.source,
            tags: row.tags,
            emotion: row.emotion,
            intensity: row.intensity,
            flagged: row.flagged,
            created_at: row.created_at,
        })?;

        Ok(Tombstone {
            record,
            reason: row.reason,
            deleted_at: timestamp::decode(&row.deleted_at)?,
            backup_ref: row.backup_ref,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct AuditRow {
    id: i64,
    memory_id: i64,
    action: String,
    reason: Option<String>,
    at: String,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = Error;

    fn try_from(row: AuditRow) -> Result<Self> {
        let action = AuditAction::from_str(&row.action)
            .ok_or_else(|| Error::Internal(format!("Unknown audit action: {}", row.action)))?;

        Ok(AuditEntry {
            id: row.id,
            memory_id: row.memory_id,
            action,
            reason: row.reason,
            at: timestamp::decode(&row.at)?,
        })
    }
}

/// Result of moving a tombstone back.
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    Restored(MemoryRecord),
    /// A live row with that id exists; nothing changed.
    AlreadyLive,
    NoTombstone,
}

/// Move a live memory into the tombstone table.
///
/// Returns `false` when there is no live row with `id`.
pub async fn tombstone_memory(
    pool: &DbPool,
    id: MemoryId,
    reason: &str,
    backup_ref: &str,
) -> Result<bool> {
    let now = timestamp::encode(&keepsake_models::now());
    let mut tx = pool.begin().await?;

    let copied = sqlx::query(
        r#"
        INSERT INTO memory_tombstones (
            memory_id, text, source, tags, emotion, intensity, flagged, created_at,
            reason, deleted_at, backup_ref
        )
        SELECT id, text, source, tags, emotion, intensity, flagged, created_at, ?, ?, ?
        FROM memories WHERE id = ?
        "#,
    )
    .bind(reason)
    .bind(&now)
    .bind(backup_ref)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if copied.rows_affected() == 0 {
        return Ok(false);
    }

    sqlx::query("DELETE FROM memories WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    insert_audit(&mut tx, id, AuditAction::SoftDelete, Some(reason), &now).await?;

    tx.commit().await?;

    Ok(true)
}

/// Move a tombstone back into `memories` under its original id.
pub async fn restore_tombstone(pool: &DbPool, id: MemoryId) -> Result<RestoreOutcome> {
    let mut tx = pool.begin().await?;

    let Some(row) = sqlx::query_as::<_, TombstoneRow>(
        "SELECT * FROM memory_tombstones WHERE memory_id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    else {
        return Ok(RestoreOutcome::NoTombstone);
    };

    let live: Option<i64> = sqlx::query_scalar("SELECT id FROM memories WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    if live.is_some() {
        return Ok(RestoreOutcome::AlreadyLive);
    }

    let restored = sqlx::query_as::<_, MemoryRow>(
        r#"
        INSERT INTO memories (id, text, source, tags, emotion, intensity, flagged, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(row.memory_id)
    .bind(&row.text)
    .bind(&row.source)
    .bind(&row.tags)
    .bind(&row.emotion)
    .bind(row.intensity)
    .bind(row.flagged)
    .bind(&row.created_at)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM memory_tombstones WHERE memory_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let now = timestamp::encode(&keepsake_models::now());
    insert_audit(&mut tx, id, AuditAction::Restore, None, &now).await?;

    // Decode before committing so a bad row rolls the restore back.
    let record = restored.try_into()?;
    tx.commit().await?;

    Ok(RestoreOutcome::Restored(record))
}

async fn insert_audit(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    memory_id: MemoryId,
    action: AuditAction,
    reason: Option<&str>,
    at: &str,
) -> Result<()> {
    sqlx::query("INSERT INTO deletion_audit (memory_id, action, reason, at) VALUES (?, ?, ?, ?)")
        .bind(memory_id)
        .bind(action.as_str())
        .bind(reason)
        .bind(at)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Get a tombstone by memory ID (optional).
pub async fn get_tombstone(pool: &DbPool, id: MemoryId) -> Result<Option<Tombstone>> {
    sqlx::query_as::<_, TombstoneRow>("SELECT * FROM memory_tombstones WHERE memory_id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Tombstone::try_from)
        .transpose()
}

/// All tombstones, most recently deleted first.
pub async fn list_tombstones(pool: &DbPool) -> Result<Vec<Tombstone>> {
    sqlx::query_as::<_, TombstoneRow>(
        "SELECT * FROM memory_tombstones ORDER BY deleted_at DESC, memory_id DESC",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(Tombstone::try_from)
    .collect()
}

/// Audit trail, newest first.
pub async fn list_audit_entries(pool: &DbPool, limit: i64) -> Result<Vec<AuditEntry>> {
    sqlx::query_as::<_, AuditRow>("SELECT * FROM deletion_audit ORDER BY id DESC LIMIT ?")
        .bind(limit)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(AuditEntry::try_from)
        .collect()
}
