//! Repository implementation over SQLite.

use crate::{AsyncDatabase, StoreError, StoreResult};
use async_trait::async_trait;
use relay_core::{MessageRecord, ProcessedCounts, Repository, RepositoryError, RepositoryResult};
use rusqlite::params;
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

pub const STATUS_IN_PROCESSING: &str = "in_processing";
pub const STATUS_PROCESSED: &str = "processed";

/// Processed rows updated in the last hour, and since the start of the
/// previous day, week and month.
const PROCESSED_COUNT_SQL: &str = "
    SELECT
        COUNT(*) FILTER (WHERE updated_at > datetime('now', '-1 hour')),
        COUNT(*) FILTER (WHERE updated_at > datetime('now', 'start of day', '-1 day')),
        COUNT(*) FILTER (WHERE updated_at > datetime('now', 'start of day', '-7 days')),
        COUNT(*) FILTER (WHERE updated_at > datetime('now', 'start of day', '-1 month'))
    FROM messages
    WHERE status = ?1
";

/// Message repository stored in SQLite.
#[derive(Clone)]
pub struct SqliteRepository {
    db: AsyncDatabase,
}

impl SqliteRepository {
    pub async fn open(path: &Path) -> StoreResult<Self> {
        Ok(Self::new(AsyncDatabase::open(path).await?))
    }

    pub async fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::new(AsyncDatabase::open_in_memory().await?))
    }

    pub fn new(db: AsyncDatabase) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &AsyncDatabase {
        &self.db
    }

    /// Stored payload and status for `id`.
    pub async fn get(&self, id: Uuid) -> StoreResult<Option<(Vec<u8>, String)>> {
        let id_text = id.to_string();
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT message, status FROM messages WHERE id = ?1")?;
                let mut rows = stmt.query(params![id_text])?;
                match rows.next()? {
                    Some(row) => Ok(Some((row.get(0)?, row.get(1)?))),
                    None => Ok(None),
                }
            })
            .await
    }
}

fn is_constraint_violation(e: &StoreError) -> bool {
    matches!(
        e,
        StoreError::Sqlite(rusqlite::Error::SqliteFailure(code, _))
            if code.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn save_message(&self, record: &MessageRecord) -> RepositoryResult<()> {
        let id = record.id;
        let id_text = id.to_string();
        let payload = record.payload.clone();

        let result = self
            .db
            .call_sqlite(move |conn| {
                conn.execute(
                    "INSERT INTO messages (id, message, status) VALUES (?1, ?2, ?3)",
                    params![id_text, payload, STATUS_IN_PROCESSING],
                )
            })
            .await;

        match result {
            Ok(_) => {
                debug!(id = %id, "Message stored");
                Ok(())
            }
            Err(e) if is_constraint_violation(&e) => Err(RepositoryError::DuplicateId(id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_status(&self, id: Uuid) -> RepositoryResult<()> {
        let id_text = id.to_string();

        let updated = self
            .db
            .call_sqlite(move |conn| {
                conn.execute(
                    "UPDATE messages SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
                    params![STATUS_PROCESSED, id_text],
                )
            })
            .await?;

        if updated == 0 {
            warn!(id = %id, "Status update matched no stored message");
        }
        Ok(())
    }

    async fn processed_count(&self) -> RepositoryResult<ProcessedCounts> {
        let counts = self
            .db
            .call_sqlite(|conn| {
                conn.query_row(PROCESSED_COUNT_SQL, params![STATUS_PROCESSED], |row| {
                    Ok(ProcessedCounts {
                        in_hour: to_count(row.get(0)?),
                        in_day: to_count(row.get(1)?),
                        in_week: to_count(row.get(2)?),
                        in_month: to_count(row.get(3)?),
                    })
                })
            })
            .await?;

        Ok(counts)
    }
}
