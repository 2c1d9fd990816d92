//! Temporary key generation
//!
//! Intermediate results of a compiled predicate live in temporary keys named
//! `{prefix}:{entity}:{invocation}:{n}`. The invocation id is fresh per
//! compilation so concurrent scripts never share a key.

use uuid::Uuid;

/// Allocates unique temporary keys for one script invocation
#[derive(Debug)]
pub struct TempKeys {
    base: String,
    allocated: Vec<String>,
}

impl TempKeys {
    /// Creates a generator with a fresh invocation id
    pub fn new(prefix: &str, entity: &str) -> Self {
        Self::with_invocation(prefix, entity, Uuid::new_v4())
    }

    /// Creates a generator for a caller-supplied invocation id
    pub fn with_invocation(prefix: &str, entity: &str, invocation: Uuid) -> Self {
        Self {
            base: format!("{}:{}:{}", prefix, entity, invocation.simple()),
            allocated: Vec::new(),
        }
    }

    /// Returns a key no other call has returned
    pub fn next_key(&mut self) -> String {
        let key = format!("{}:{}", self.base, self.allocated.len());
        self.allocated.push(key.clone());
        key
    }

    /// Keys allocated so far, in allocation order
    pub fn allocated(&self) -> &[String] {
        &self.allocated
    }

    /// Consumes the generator, returning every allocated key
    pub fn into_keys(self) -> Vec<String> {
        self.allocated
    }
}
