//! Transcript persistence (one row per homework, replaced wholesale)

use sqlx::{Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use turan_common::{time, Result};

use super::parse_uuid;
use crate::models::Transcript;

/// Replace the transcript for `transcript.homework_id`
pub async fn replace_transcript(conn: &mut SqliteConnection, transcript: &Transcript) -> Result<()> {
    sqlx::query("DELETE FROM homework_transcripts WHERE homework_id = ?")
        .bind(transcript.homework_id.to_string())
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO homework_transcripts (
            homework_id, raw_text, cleaned_text, confidence, language, processing_ms, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(transcript.homework_id.to_string())
    .bind(&transcript.raw_text)
    .bind(&transcript.cleaned_text)
    .bind(transcript.confidence)
    .bind(&transcript.language)
    .bind(i64::try_from(transcript.processing_ms).unwrap_or(i64::MAX))
    .bind(time::to_db(&transcript.created_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn load_transcript<'e, E>(executor: E, homework_id: Uuid) -> Result<Option<Transcript>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        "SELECT homework_id, raw_text, cleaned_text, confidence, language, processing_ms, created_at \
         FROM homework_transcripts WHERE homework_id = ?",
    )
    .bind(homework_id.to_string())
    .fetch_optional(executor)
    .await?;

    match row {
        Some(row) => Ok(Some(Transcript {
            homework_id: parse_uuid(row.get("homework_id"))?,
            raw_text: row.get("raw_text"),
            cleaned_text: row.get("cleaned_text"),
            confidence: row.get("confidence"),
            language: row.get("language"),
            processing_ms: row.get::<i64, _>("processing_ms").max(0) as u64,
            created_at: time::from_db(row.get("created_at"))?,
        })),
        None => Ok(None),
    }
}
