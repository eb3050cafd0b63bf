//! Voice log queries.

use keepsake_models::{timestamp, MemoryId, MemoryRecord, NewMemory, Transcript, VoiceLog};
use sqlx::{FromRow, SqliteExecutor};

use super::{insert_memory, DbPool};
use crate::{Error, Result};

#[derive(Debug, Clone, FromRow)]
struct VoiceLogRow {
    id: i64,
    memory_id: i64,
    audio_path: Option<String>,
    language: String,
    duration_seconds: Option<f64>,
    created_at: String,
}

impl TryFrom<VoiceLogRow> for VoiceLog {
    type Error = Error;

    fn try_from(row: VoiceLogRow) -> Result<Self> {
        Ok(VoiceLog {
            id: row.id,
            memory_id: row.memory_id,
            audio_path: row.audio_path,
            language: row.language,
            duration_seconds: row.duration_seconds,
            created_at: timestamp::decode(&row.created_at)?,
        })
    }
}

/// Link transcript audio metadata to a stored memory.
pub async fn insert_voice_log<'e, E>(
    executor: E,
    memory_id: MemoryId,
    transcript: &Transcript,
) -> Result<VoiceLog>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, VoiceLogRow>(
        r#"
        INSERT INTO voice_logs (memory_id, audio_path, language, duration_seconds, created_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(memory_id)
    .bind(&transcript.audio_path)
    .bind(&transcript.language)
    .bind(transcript.duration_seconds)
    .bind(timestamp::encode(&keepsake_models::now()))
    .fetch_one(executor)
    .await?
    .try_into()
}

/// Insert a transcribed memory and its voice log in one transaction.
/// Neither row is kept if either insert fails.
pub async fn insert_voice_memory(
    pool: &DbPool,
    input: &NewMemory,
    transcript: &Transcript,
) -> Result<(MemoryRecord, VoiceLog)> {
    let mut tx = pool.begin().await?;

    let record = insert_memory(&mut *tx, input).await?;
    let log = insert_voice_log(&mut *tx, record.id, transcript).await?;

    tx.commit().await?;
    Ok((record, log))
}

/// Voice logs for one memory, oldest first.
pub async fn list_voice_logs(pool: &DbPool, memory_id: MemoryId) -> Result<Vec<VoiceLog>> {
    sqlx::query_as::<_, VoiceLogRow>("SELECT * FROM voice_logs WHERE memory_id = ? ORDER BY id")
        .bind(memory_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(VoiceLog::try_from)
        .collect()
}
