mod memory;
mod table;

pub use memory::MemoryStore;
pub use table::Table;

use crate::core::{Record, RecordId, Result, StoreError, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Handle for an open store transaction.
pub type TxId = u64;

/// Filter applied to records of one kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    All,
    Active(bool),
    FieldEquals(String, Value),
    IdNot(RecordId),
    And(Vec<Filter>),
}

impl Filter {
    /// Filter matching every other active record, the shape of the atomic
    /// bulk-deactivate issued after an activation.
    pub fn other_actives(id: RecordId) -> Self {
        Self::And(vec![Self::Active(true), Self::IdNot(id)])
    }

    pub fn field(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::FieldEquals(name.into(), value.into())
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::All => true,
            Self::Active(wanted) => record.is_active == *wanted,
            Self::FieldEquals(name, value) => record.field(name) == Some(value),
            Self::IdNot(id) => record.id != Some(*id),
            Self::And(filters) => filters.iter().all(|f| f.matches(record)),
        }
    }
}

/// Result ordering for [`EntityStore::query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderBy {
    Unordered,
    /// Most recently updated first; identity breaks ties.
    UpdatedAtDesc,
    CreatedAtAsc,
}

/// Field assignments applied by [`EntityStore::bulk_update`].
///
/// A bulk update writes fields in place without touching `updated_at`, so a
/// deactivated record keeps its position in recency ordering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    pub is_active: Option<bool>,
    pub fields: BTreeMap<String, Value>,
}

impl Patch {
    pub fn deactivate() -> Self {
        Self {
            is_active: Some(false),
            ..Self::default()
        }
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn apply(&self, record: &mut Record) {
        if let Some(active) = self.is_active {
            record.is_active = active;
        }
        for (name, value) in &self.fields {
            record.fields.insert(name.clone(), value.clone());
        }
    }
}

/// A many-to-many association between an owner record and a target record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Kind of the owning record; the join lives on the owner's side.
    pub kind: String,
    pub owner: RecordId,
    pub relation: String,
    pub target: RecordId,
}

/// Persistence collaborator consumed by the active-singleton controller and
/// the clone engine.
///
/// `bulk_update` must be atomic with respect to concurrent writers of the same
/// kind: it is the primitive that makes the single-active invariant safe
/// against concurrent activations. Stores with transaction support report it
/// through `supports_transactions` and accept a `tx` handle on every mutation.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Persist a new record, assigning a fresh identity. Returns the stored
    /// record with `id` set.
    async fn insert(&self, record: Record, tx: Option<TxId>) -> Result<Record>;

    /// Overwrite an existing record by identity.
    async fn update(&self, record: &Record, tx: Option<TxId>) -> Result<()>;

    async fn get(&self, kind: &str, id: RecordId) -> Result<Option<Record>>;

    /// Filtered, ordered read. A kind with no records yields an empty result.
    async fn query(&self, kind: &str, filter: &Filter, order: OrderBy) -> Result<Vec<Record>>;

    /// Single atomic filtered update. Returns the number of records changed.
    async fn bulk_update(
        &self,
        kind: &str,
        filter: &Filter,
        patch: &Patch,
        tx: Option<TxId>,
    ) -> Result<usize>;

    /// Remove a record. Returns false when the identity was absent.
    async fn delete(&self, kind: &str, id: RecordId, tx: Option<TxId>) -> Result<bool>;

    /// Add a many-to-many association. Returns false when it already existed.
    async fn associate(&self, link: &Link, tx: Option<TxId>) -> Result<bool>;

    /// Identities associated with the owner under the named relation.
    async fn associations(
        &self,
        kind: &str,
        owner: RecordId,
        relation: &str,
    ) -> Result<Vec<RecordId>>;

    fn supports_transactions(&self) -> bool {
        false
    }

    async fn begin(&self) -> Result<TxId> {
        Err(StoreError::Transaction(
            "store does not support transactions".to_string(),
        ))
    }

    async fn commit(&self, _tx: TxId) -> Result<()> {
        Err(StoreError::Transaction(
            "store does not support transactions".to_string(),
        ))
    }

    async fn rollback(&self, _tx: TxId) -> Result<()> {
        Err(StoreError::Transaction(
            "store does not support transactions".to_string(),
        ))
    }
}
