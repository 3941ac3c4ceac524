// ============================================================================
// activerec Library
// ============================================================================
//
// At most one record of an enrolled kind is active at any time, enforced with
// a single atomic filtered update on every save. Active-record lookups go
// through a TTL-bounded advisory cache, and any record can be deep-cloned
// together with its declared dependent graph into an independent, inactive
// copy. Storage and cache are injectable collaborators; in-memory
// implementations of both are bundled.

pub mod cache;
pub mod core;
pub mod facade;
pub mod registry;
pub mod storage;

// Re-export main types for convenience
pub use cache::{ActiveCache, DEFAULT_CACHE_TTL, MemoryCache, active_key};
pub use core::{CreatedRecord, Record, RecordId, Result, StoreError, Value};
pub use facade::ActiveStore;
pub use registry::{EntityConfig, LinkedRelation, OwnedRelation};
pub use storage::{EntityStore, Filter, Link, MemoryStore, OrderBy, Patch, TxId};
