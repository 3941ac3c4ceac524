use crate::cache::ActiveCache;
use crate::core::{Record, Result};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct Slot {
    record: Record,
    expires_at: Instant,
}

/// Bounded in-process [`ActiveCache`] with per-entry TTL.
///
/// Capacity eviction is LRU; expired entries are dropped lazily on read.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, Slot>>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ActiveCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Record>> {
        let mut entries = self.entries.lock()?;
        let expired = match entries.get(key) {
            Some(slot) if slot.expires_at > Instant::now() => {
                return Ok(Some(slot.record.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    fn set(&self, key: &str, record: Record, ttl: Duration) -> Result<()> {
        let slot = Slot {
            record,
            expires_at: Instant::now() + ttl,
        };
        self.entries.lock()?.put(key.to_string(), slot);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock()?.pop(key);
        Ok(())
    }
}
