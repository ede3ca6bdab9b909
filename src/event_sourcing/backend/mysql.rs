use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row;
use uuid::Uuid;

use crate::config::MysqlConfig;
use crate::event_sourcing::core::RecordedEvent;
use crate::event_sourcing::error::StoreError;
use super::EventBackend;

// ============================================================================
// MySQL Backend - Relational Driver
// ============================================================================
//
// Events live in a single `stream_events` table keyed (stream_id, version).
// Append runs in a transaction: lock the stream head with SELECT ... FOR
// UPDATE, compare against the expected version, then insert the new rows.
// The primary key doubles as the conflict net - two writers that somehow
// both pass the check cannot both claim the same (stream_id, version).
//
// ============================================================================

const BACKEND: &str = "mysql";

// The payload is opaque serialized JSON, stored as LONGTEXT: sqlx's checked
// getters refuse to decode a MySQL JSON column into a String.
const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS stream_events (
    stream_id      CHAR(36)     NOT NULL,
    version        BIGINT       NOT NULL,
    event_id       CHAR(36)     NOT NULL,
    event_type     VARCHAR(255) NOT NULL,
    event_version  INT          NOT NULL,
    payload        LONGTEXT     NOT NULL,
    causation_id   CHAR(36)     NULL,
    correlation_id CHAR(36)     NOT NULL,
    recorded_at    TIMESTAMP(6) NOT NULL,
    PRIMARY KEY (stream_id, version)
)";

pub struct MySqlBackend {
    pool: MySqlPool,
}

impl MySqlBackend {
    /// Connect a small pool to the configured MySQL server.
    pub async fn connect(cfg: &MysqlConfig) -> Result<Self, StoreError> {
        let options = MySqlConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .username(&cfg.user)
            .password(&cfg.password)
            .database(&cfg.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::BackendUnavailable {
                backend: BACKEND,
                detail: e.to_string(),
            })?;

        tracing::info!(host = %cfg.host, database = %cfg.database, "Connected to MySQL");
        Ok(Self { pool })
    }

    /// Create the event table if it does not exist yet.
    pub async fn setup(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE_SQL)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        tracing::info!("MySQL stream_events table ready");
        Ok(())
    }
}

#[async_trait]
impl EventBackend for MySqlBackend {
    async fn append(
        &self,
        stream_id: Uuid,
        expected_version: i64,
        events: Vec<RecordedEvent>,
    ) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // Lock the stream head for the duration of the transaction.
        let row = sqlx::query(
            "SELECT CAST(COALESCE(MAX(version), 0) AS SIGNED)
             FROM stream_events WHERE stream_id = ? FOR UPDATE",
        )
        .bind(stream_id.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let actual: i64 = row.get(0);
        if actual != expected_version {
            // Dropping the transaction rolls back the lock.
            return Err(StoreError::ConcurrencyConflict {
                stream_id,
                expected: expected_version,
                actual,
            });
        }

        for event in &events {
            let insert = sqlx::query(
                "INSERT INTO stream_events (
                    stream_id, version, event_id, event_type, event_version,
                    payload, causation_id, correlation_id, recorded_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(event.stream_id.to_string())
            .bind(event.version)
            .bind(event.event_id.to_string())
            .bind(&event.event_type)
            .bind(event.event_version)
            .bind(&event.payload)
            .bind(event.causation_id.map(|id| id.to_string()))
            .bind(event.correlation_id.to_string())
            .bind(event.recorded_at)
            .execute(&mut *tx)
            .await;

            if let Err(e) = insert {
                // A duplicate key means another writer claimed the version
                // between our check and the insert.
                if is_unique_violation(&e) {
                    drop(tx);
                    let actual = self.current_version(stream_id).await?;
                    return Err(StoreError::ConcurrencyConflict {
                        stream_id,
                        expected: expected_version,
                        actual,
                    });
                }
                return Err(map_sqlx_error(e));
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(expected_version + events.len() as i64)
    }

    async fn read_page(
        &self,
        stream_id: Uuid,
        after_version: i64,
        limit: usize,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT stream_id, version, event_id, event_type, event_version,
                    payload, causation_id, correlation_id, recorded_at
             FROM stream_events
             WHERE stream_id = ? AND version > ?
             ORDER BY version ASC
             LIMIT ?",
        )
        .bind(stream_id.to_string())
        .bind(after_version)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(row_to_record).collect()
    }

    async fn current_version(&self, stream_id: Uuid) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "SELECT CAST(COALESCE(MAX(version), 0) AS SIGNED)
             FROM stream_events WHERE stream_id = ?",
        )
        .bind(stream_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.get(0))
    }
}

fn row_to_record(row: MySqlRow) -> Result<RecordedEvent, StoreError> {
    let stream_id: String = row.try_get("stream_id").map_err(map_sqlx_error)?;
    let event_id: String = row.try_get("event_id").map_err(map_sqlx_error)?;
    let causation_id: Option<String> = row.try_get("causation_id").map_err(map_sqlx_error)?;
    let correlation_id: String = row.try_get("correlation_id").map_err(map_sqlx_error)?;
    let recorded_at: DateTime<Utc> = row.try_get("recorded_at").map_err(map_sqlx_error)?;

    Ok(RecordedEvent {
        stream_id: parse_uuid(&stream_id)?,
        version: row.try_get("version").map_err(map_sqlx_error)?,
        event_id: parse_uuid(&event_id)?,
        event_type: row.try_get("event_type").map_err(map_sqlx_error)?,
        event_version: row.try_get("event_version").map_err(map_sqlx_error)?,
        payload: row.try_get("payload").map_err(map_sqlx_error)?,
        causation_id: causation_id.as_deref().map(parse_uuid).transpose()?,
        correlation_id: parse_uuid(&correlation_id)?,
        recorded_at,
    })
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Backend {
        backend: BACKEND,
        detail: format!("malformed uuid column '{s}': {e}"),
    })
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn map_sqlx_error(e: sqlx::Error) -> StoreError {
    let transient = matches!(
        e,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    );

    if transient {
        StoreError::BackendUnavailable {
            backend: BACKEND,
            detail: e.to_string(),
        }
    } else {
        StoreError::Backend {
            backend: BACKEND,
            detail: e.to_string(),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uuid_round_trip() {
        let id = Uuid::new_v4();
        assert_eq!(parse_uuid(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_parse_uuid_rejects_garbage() {
        let err = parse_uuid("not-a-uuid").unwrap_err();
        match err {
            StoreError::Backend { backend, detail } => {
                assert_eq!(backend, "mysql");
                assert!(detail.contains("not-a-uuid"));
            }
            other => panic!("expected backend error, got {other:?}"),
        }
    }

    #[test]
    fn test_payload_column_is_readable_text() {
        // try_get::<String>("payload") in row_to_record only decodes text
        // column types; a JSON column would fail on every populated page.
        assert!(CREATE_TABLE_SQL.contains("payload        LONGTEXT"));
        assert!(!CREATE_TABLE_SQL.contains("JSON"));
    }

    #[test]
    fn test_pool_timeout_maps_to_unavailable() {
        let err = map_sqlx_error(sqlx::Error::PoolTimedOut);
        assert!(err.is_transient());
    }

    #[test]
    fn test_row_not_found_maps_to_backend_error() {
        let err = map_sqlx_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Backend { .. }));
    }

    // The following require a live MySQL server and are exercised through
    // the demo binary rather than unit tests:
    // - append with a successful head lock + insert
    // - append losing the expected-version race (conflict via FOR UPDATE)
    // - append losing the race at the primary key (conflict via duplicate key)
    // - read_page ordering and LIMIT behavior
    // - current_version on empty and populated streams
}
