mod memory;

pub use memory::MemoryCache;

use crate::core::{Record, Result};
use std::time::Duration;

/// Default time-to-live for a cached active record.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(900);

/// Cache key under which the active record of a kind is stored.
pub fn active_key(kind: &str) -> String {
    format!("active_{kind}")
}

/// Advisory cache collaborator for active-record lookups.
///
/// Never a source of truth: entries are invalidated before every write of the
/// corresponding kind and expire after their TTL, which bounds staleness even
/// if an invalidation is lost. Operations are synchronous so invalidation can
/// complete before the underlying store write is issued.
pub trait ActiveCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Record>>;
    fn set(&self, key: &str, record: Record, ttl: Duration) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}
