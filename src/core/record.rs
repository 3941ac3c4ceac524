use crate::core::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque store-assigned identity. Absent on a record until its first persist.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted entity record.
///
/// Every record carries the activation flag, timestamps and audit fields, plus
/// a dynamic map of scalar fields. One-to-many children reference their owner
/// through a [`Value::Id`] field named in the owning relation's config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub kind: String,
    pub id: Option<RecordId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    /// New unsaved record of the given kind, inactive by default.
    pub fn new(kind: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            kind: kind.into(),
            id: None,
            is_active: false,
            created_at: now,
            updated_at: now,
            created_by: None,
            updated_by: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Builder shorthand for `is_active = true`.
    pub fn activated(mut self) -> Self {
        self.is_active = true;
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }

    /// Copy of this record with no identity and fresh timestamps, ready to be
    /// persisted as an independent row. Activation and audit fields carry over;
    /// the clone engine forces the top-level copy inactive itself.
    pub(crate) fn detached(&self, now: DateTime<Utc>) -> Record {
        let mut copy = self.clone();
        copy.id = None;
        copy.created_at = now;
        copy.updated_at = now;
        copy
    }
}
