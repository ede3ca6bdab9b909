use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::response::query_result::QueryResult;
use scylla::serialize::row::{RowSerializationContext, SerializeRow};
use scylla::serialize::writers::RowWriter;
use scylla::serialize::SerializationError;
use scylla::statement::batch::{Batch, BatchType};
use scylla::value::{CqlValue, Row};
use uuid::Uuid;

use crate::event_sourcing::core::RecordedEvent;
use crate::event_sourcing::error::StoreError;
use super::EventBackend;

// ============================================================================
// ScyllaDB Backend - Wide-Column Driver
// ============================================================================
//
// Layout: one partition per stream in `stream_events`, clustered by version,
// with the current head version in a static column of the same partition.
//
// Append is a single-partition conditional batch: a lightweight transaction
// on the static head (IF current_version = NULL for a new stream, IF
// current_version = ? otherwise) plus the event row inserts. The batch
// applies as a unit, so the head and the event rows cannot diverge, and
// losing writers never touch the partition.
//
// ============================================================================

const BACKEND: &str = "scylla";

const CLAIM_NEW_HEAD_CQL: &str =
    "UPDATE stream_events SET current_version = ? WHERE stream_id = ? IF current_version = NULL";

const CLAIM_HEAD_CQL: &str =
    "UPDATE stream_events SET current_version = ? WHERE stream_id = ? IF current_version = ?";

const INSERT_EVENT_CQL: &str = "INSERT INTO stream_events (
    stream_id, version, event_id, event_type, event_version,
    payload, causation_id, correlation_id, recorded_at
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";

pub struct ScyllaBackend {
    session: Arc<Session>,
}

impl ScyllaBackend {
    /// Connect to the cluster and select the event keyspace.
    pub async fn connect(hosts: &[String]) -> Result<Self, StoreError> {
        let session: Session = SessionBuilder::new()
            .known_nodes(hosts)
            .build()
            .await
            .map_err(unavailable)?;

        session
            .query_unpaged(
                "CREATE KEYSPACE IF NOT EXISTS event_store WITH REPLICATION = \
                 {'class': 'SimpleStrategy', 'replication_factor': 1}",
                &[],
            )
            .await
            .map_err(unavailable)?;

        session
            .use_keyspace("event_store", false)
            .await
            .map_err(unavailable)?;

        tracing::info!(hosts = ?hosts, "Connected to ScyllaDB");
        Ok(Self {
            session: Arc::new(session),
        })
    }

    /// Create the event table if it does not exist yet.
    pub async fn setup(&self) -> Result<(), StoreError> {
        self.session
            .query_unpaged(
                "CREATE TABLE IF NOT EXISTS stream_events (
                    stream_id uuid,
                    version bigint,
                    current_version bigint static,
                    event_id uuid,
                    event_type text,
                    event_version int,
                    payload text,
                    causation_id uuid,
                    correlation_id uuid,
                    recorded_at timestamp,
                    PRIMARY KEY (stream_id, version)
                )",
                &[],
            )
            .await
            .map_err(unavailable)?;

        tracing::info!("ScyllaDB stream_events table ready");
        Ok(())
    }
}

/// One bound row of the append batch. The head claim and the event inserts
/// bind different arities, so tuples alone cannot type a single values Vec.
enum AppendRow {
    NewHead(i64, Uuid),
    MovedHead(i64, Uuid, i64),
    Event(
        Uuid,
        i64,
        Uuid,
        String,
        i32,
        String,
        Option<Uuid>,
        Uuid,
        DateTime<Utc>,
    ),
}

impl SerializeRow for AppendRow {
    fn serialize(
        &self,
        ctx: &RowSerializationContext<'_>,
        writer: &mut RowWriter<'_>,
    ) -> Result<(), SerializationError> {
        match self {
            AppendRow::NewHead(next, stream_id) => (next, stream_id).serialize(ctx, writer),
            AppendRow::MovedHead(next, stream_id, expected) => {
                (next, stream_id, expected).serialize(ctx, writer)
            }
            AppendRow::Event(
                stream_id,
                version,
                event_id,
                event_type,
                event_version,
                payload,
                causation_id,
                correlation_id,
                recorded_at,
            ) => (
                stream_id,
                version,
                event_id,
                event_type,
                event_version,
                payload,
                causation_id,
                correlation_id,
                recorded_at,
            )
                .serialize(ctx, writer),
        }
    }

    fn is_empty(&self) -> bool {
        false
    }
}

#[async_trait]
impl EventBackend for ScyllaBackend {
    async fn append(
        &self,
        stream_id: Uuid,
        expected_version: i64,
        events: Vec<RecordedEvent>,
    ) -> Result<i64, StoreError> {
        let new_version = expected_version + events.len() as i64;

        // Head claim and event rows go in one conditional batch against the
        // stream partition, so either all of it lands or none of it does.
        let mut batch = Batch::new(BatchType::Unlogged);
        let mut values = Vec::with_capacity(events.len() + 1);

        if expected_version == 0 {
            batch.append_statement(CLAIM_NEW_HEAD_CQL);
            values.push(AppendRow::NewHead(new_version, stream_id));
        } else {
            batch.append_statement(CLAIM_HEAD_CQL);
            values.push(AppendRow::MovedHead(new_version, stream_id, expected_version));
        }

        for event in &events {
            batch.append_statement(INSERT_EVENT_CQL);
            values.push(AppendRow::Event(
                event.stream_id,
                event.version,
                event.event_id,
                event.event_type.clone(),
                event.event_version,
                event.payload.clone(),
                event.causation_id,
                event.correlation_id,
                event.recorded_at,
            ));
        }

        let result = self
            .session
            .batch(&batch, values)
            .await
            .map_err(unavailable)?;

        if !lwt_applied(result)? {
            let actual = self.current_version(stream_id).await?;
            return Err(StoreError::ConcurrencyConflict {
                stream_id,
                expected: expected_version,
                actual,
            });
        }

        Ok(new_version)
    }

    async fn read_page(
        &self,
        stream_id: Uuid,
        after_version: i64,
        limit: usize,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        let result = self
            .session
            .query_unpaged(
                "SELECT stream_id, version, event_id, event_type, event_version,
                        payload, causation_id, correlation_id, recorded_at
                 FROM stream_events
                 WHERE stream_id = ? AND version > ?
                 ORDER BY version ASC
                 LIMIT ?",
                (stream_id, after_version, limit as i32),
            )
            .await
            .map_err(unavailable)?;

        let mut events = Vec::new();

        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(events), // No rows
        };

        type EventRow = (
            Uuid,
            i64,
            Uuid,
            String,
            i32,
            String,
            Option<Uuid>,
            Uuid,
            DateTime<Utc>,
        );

        for row in rows_result.rows::<EventRow>().map_err(backend_error)? {
            let (
                stream_id,
                version,
                event_id,
                event_type,
                event_version,
                payload,
                causation_id,
                correlation_id,
                recorded_at,
            ) = row.map_err(backend_error)?;

            events.push(RecordedEvent {
                event_id,
                stream_id,
                version,
                event_type,
                event_version,
                payload,
                causation_id,
                correlation_id,
                recorded_at,
            });
        }

        Ok(events)
    }

    async fn current_version(&self, stream_id: Uuid) -> Result<i64, StoreError> {
        let result = self
            .session
            .query_unpaged(
                "SELECT current_version FROM stream_events WHERE stream_id = ? LIMIT 1",
                (stream_id,),
            )
            .await
            .map_err(unavailable)?;

        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(0), // No rows = new stream
        };

        match rows_result.maybe_first_row::<(Option<i64>,)>() {
            Ok(Some((Some(version),))) => Ok(version),
            _ => Ok(0), // No rows = new stream
        }
    }
}

/// Extract the [applied] flag from a conditional batch/statement result.
/// On failure the result also carries the existing row, so decode the row
/// shape-agnostically.
fn lwt_applied(result: QueryResult) -> Result<bool, StoreError> {
    let rows_result = result.into_rows_result().map_err(backend_error)?;
    let row = rows_result
        .maybe_first_row::<Row>()
        .map_err(backend_error)?;
    Ok(row_applied(row))
}

fn row_applied(row: Option<Row>) -> bool {
    match row {
        Some(row) => matches!(row.columns.first(), Some(Some(CqlValue::Boolean(true)))),
        None => false,
    }
}

fn unavailable(e: impl std::fmt::Display) -> StoreError {
    StoreError::BackendUnavailable {
        backend: BACKEND,
        detail: e.to_string(),
    }
}

fn backend_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend {
        backend: BACKEND,
        detail: e.to_string(),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
