use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use uuid::Uuid;

use crate::config::RedisConfig;
use crate::event_sourcing::core::RecordedEvent;
use crate::event_sourcing::error::StoreError;
use super::EventBackend;

// ============================================================================
// Redis Backend - Cache Driver
// ============================================================================
//
// Events live in a native list per stream (`stream:{id}:events`). Because
// versions are contiguous from 1, list index = version - 1 and LLEN is the
// current version. Append is a Lua script that checks the length against
// the expected version and RPUSHes in one atomic step - Redis runs scripts
// single-threaded, which is the per-stream serialization guarantee.
//
// ============================================================================

const BACKEND: &str = "redis";

/// ARGV[1] = expected version, ARGV[2..] = serialized events.
/// Returns {0, current_len} on conflict, {1, new_len} on success.
const APPEND_SCRIPT: &str = r#"
local len = redis.call('LLEN', KEYS[1])
if len ~= tonumber(ARGV[1]) then
  return {0, len}
end
for i = 2, #ARGV do
  redis.call('RPUSH', KEYS[1], ARGV[i])
end
return {1, redis.call('LLEN', KEYS[1])}
"#;

pub struct RedisBackend {
    conn: MultiplexedConnection,
    append_script: Script,
}

impl RedisBackend {
    pub async fn connect(cfg: &RedisConfig) -> Result<Self, StoreError> {
        let url = format!("redis://{}:{}", cfg.host, cfg.port);
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis_error)?;

        tracing::info!(host = %cfg.host, port = cfg.port, "Connected to Redis");
        Ok(Self {
            conn,
            append_script: Script::new(APPEND_SCRIPT),
        })
    }

    fn stream_key(stream_id: Uuid) -> String {
        format!("stream:{stream_id}:events")
    }
}

#[async_trait]
impl EventBackend for RedisBackend {
    async fn append(
        &self,
        stream_id: Uuid,
        expected_version: i64,
        events: Vec<RecordedEvent>,
    ) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();

        let mut invocation = self.append_script.prepare_invoke();
        invocation.key(Self::stream_key(stream_id)).arg(expected_version);
        for event in &events {
            invocation.arg(serde_json::to_string(event)?);
        }

        let (applied, length): (i64, i64) = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        if applied == 0 {
            return Err(StoreError::ConcurrencyConflict {
                stream_id,
                expected: expected_version,
                actual: length,
            });
        }

        Ok(length)
    }

    async fn read_page(
        &self,
        stream_id: Uuid,
        after_version: i64,
        limit: usize,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        let mut conn = self.conn.clone();

        // Events after version v start at list index v.
        let start = after_version.max(0) as isize;
        let stop = start + limit as isize - 1;

        let raw: Vec<String> = conn
            .lrange(Self::stream_key(stream_id), start, stop)
            .await
            .map_err(map_redis_error)?;

        raw.iter()
            .map(|json| serde_json::from_str(json).map_err(StoreError::from))
            .collect()
    }

    async fn current_version(&self, stream_id: Uuid) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        conn.llen(Self::stream_key(stream_id))
            .await
            .map_err(map_redis_error)
    }
}

pub(crate) fn map_redis_error(e: redis::RedisError) -> StoreError {
    let transient = e.is_io_error() || e.is_timeout() || e.is_connection_refusal();

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
