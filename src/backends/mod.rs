pub mod marker;
pub mod redis_cli;

#[cfg(test)]
pub mod memory;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis-cli not found on PATH")]
    ClientMissing,
    #[error("redis unreachable: {0}")]
    Unreachable(String),
    #[error("redis-cli timed out after {0}s")]
    Timeout(u64),
    #[error("redis-cli failed: {0}")]
    Command(String),
    #[error("unexpected reply to {command}: {reply:?}")]
    Reply { command: &'static str, reply: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Single-key primitives of the shared store. Each call is one blocking round
/// trip; atomicity is whatever the store gives a single command.
pub trait RemoteStore {
    /// Health check; Ok only when the server answers PONG.
    fn ping(&self) -> Result<(), StoreError>;
    /// SET key value EX ttl
    fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;
    fn exists(&self, key: &str) -> Result<bool, StoreError>;
    /// Number of keys removed (0 when it was already absent).
    fn del(&self, key: &str) -> Result<u64, StoreError>;
    /// Every key matching a glob pattern, deduplicated and sorted.
    fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError>;
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Raw TTL reply: seconds left, -1 for no expiry, -2 for no such key.
    fn ttl(&self, key: &str) -> Result<i64, StoreError>;
    /// False when the key does not exist.
    fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError>;
}
