//! Redis backend
//!
//! Renders scripts to Lua and evaluates them with `EVALSHA`, falling back to
//! `EVAL` when the server has not cached the source yet.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, error};

use super::{Backend, Reply};
use crate::error::{StoreError, StoreResult};
use crate::script::{lua, Script};

/// Backend evaluating scripts on a Redis server
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Connects to the server at `url`
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        debug!(event = "REDIS_CONNECTED", url, "connected to redis");
        Ok(Self { conn })
    }

    /// Wraps an existing connection manager
    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend").finish_non_exhaustive()
    }
}

#[async_trait]
impl Backend for RedisBackend {
    async fn execute(&self, script: &Script) -> StoreResult<Reply> {
        let rendered = lua::render(script);
        debug!(
            event = "SCRIPT_RENDERED",
            bytes = rendered.source.len(),
            argv = rendered.args.len(),
            source = %rendered.source,
        );

        let program = redis::Script::new(&rendered.source);
        let mut invocation = program.prepare_invoke();
        for arg in &rendered.args {
            invocation.arg(arg);
        }

        let mut conn = self.conn.clone();
        let value: redis::Value = invocation.invoke_async(&mut conn).await.map_err(|e| {
            error!(event = "SCRIPT_FAILED", error = %e, "redis rejected script");
            StoreError::from(e)
        })?;
        to_reply(value)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

fn to_reply(value: redis::Value) -> StoreResult<Reply> {
    match value {
        redis::Value::Nil => Ok(Reply::Nil),
        redis::Value::Int(i) => Ok(Reply::Int(i)),
        redis::Value::BulkString(bytes) => String::from_utf8(bytes)
            .map(Reply::Bulk)
            .map_err(|_| StoreError::malformed("reply is not valid UTF-8")),
        redis::Value::SimpleString(s) => Ok(Reply::Bulk(s)),
        redis::Value::Okay => Ok(Reply::Bulk("OK".to_string())),
        redis::Value::Array(items) => items
            .into_iter()
            .map(to_reply)
            .collect::<StoreResult<Vec<_>>>()
            .map(Reply::Array),
        other => Err(StoreError::malformed(format!(
            "unexpected reply type {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_conversion() {
        let value = redis::Value::Array(vec![
            redis::Value::Int(2),
            redis::Value::Array(vec![
                redis::Value::BulkString(b"a".to_vec()),
                redis::Value::Nil,
            ]),
        ]);
        assert_eq!(
            to_reply(value).unwrap(),
            Reply::Array(vec![
                Reply::Int(2),
                Reply::Array(vec![Reply::Bulk("a".to_string()), Reply::Nil]),
            ])
        );
        assert_eq!(
            to_reply(redis::Value::Okay).unwrap(),
            Reply::Bulk("OK".to_string())
        );
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let value = redis::Value::BulkString(vec![0xff, 0xfe]);
        assert!(matches!(
            to_reply(value),
            Err(StoreError::MalformedResult(_))
        ));
    }
}
