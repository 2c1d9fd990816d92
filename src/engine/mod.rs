//! Script execution engines
//!
//! The store only needs one capability from its remote engine: run a
//! [`Script`] atomically and hand back the reply. [`RedisBackend`] renders the
//! script to Lua and evaluates it on a Redis server; [`MemoryEngine`]
//! interprets it in-process with the same command semantics.

mod memory;
mod remote;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::script::Script;

pub use memory::MemoryEngine;
pub use remote::RedisBackend;

/// Reply of a script invocation
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Missing value
    Nil,
    /// Integer
    Int(i64),
    /// String
    Bulk(String),
    /// Nested replies
    Array(Vec<Reply>),
}

impl Reply {
    /// Short shape name for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Nil => "nil",
            Reply::Int(_) => "integer",
            Reply::Bulk(_) => "string",
            Reply::Array(_) => "array",
        }
    }
}

/// Runs scripts atomically against a keyspace
#[async_trait]
pub trait Backend: Send + Sync {
    /// Executes the script as one atomic unit
    async fn execute(&self, script: &Script) -> StoreResult<Reply>;

    /// Engine name for logs
    fn name(&self) -> &'static str;
}
