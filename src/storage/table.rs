use crate::core::{Record, RecordId, Result, StoreError};
use crate::storage::{Filter, OrderBy, Patch};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Rows and many-to-many links for a single record kind.
///
/// The table assigns identities monotonically and never reuses them, so a
/// clone always receives a fresh identity distinct from its source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    kind: String,
    rows: BTreeMap<RecordId, Record>,
    /// relation name -> owner id -> associated target ids
    links: BTreeMap<String, BTreeMap<RecordId, BTreeSet<RecordId>>>,
    next_id: u64,
}

impl Table {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            rows: BTreeMap::new(),
            links: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn insert(&mut self, mut record: Record) -> Record {
        let id = RecordId(self.next_id);
        self.next_id += 1;
        record.id = Some(id);
        self.rows.insert(id, record.clone());
        record
    }

    /// Overwrite an existing row, returning the previous version.
    pub fn update(&mut self, record: &Record) -> Result<Record> {
        let id = record.id.ok_or_else(|| {
            StoreError::Invalid(format!("cannot update an unsaved '{}' record", self.kind))
        })?;
        match self.rows.get_mut(&id) {
            Some(row) => Ok(std::mem::replace(row, record.clone())),
            None => Err(StoreError::NotFound {
                kind: self.kind.clone(),
                id,
            }),
        }
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.rows.get(&id)
    }

    pub fn select(&self, filter: &Filter, order: OrderBy) -> Vec<Record> {
        let mut results: Vec<Record> = self
            .rows
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        match order {
            OrderBy::Unordered => {}
            OrderBy::UpdatedAtDesc => {
                results.sort_by(|a, b| (b.updated_at, b.id).cmp(&(a.updated_at, a.id)));
            }
            OrderBy::CreatedAtAsc => {
                results.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
            }
        }
        results
    }

    /// Apply a patch to every matching row in place. Returns the previous
    /// versions of the rows that changed, for transaction undo.
    pub fn bulk_update(&mut self, filter: &Filter, patch: &Patch) -> Vec<Record> {
        let mut previous = Vec::new();
        for row in self.rows.values_mut() {
            if filter.matches(row) {
                previous.push(row.clone());
                patch.apply(row);
            }
        }
        previous
    }

    /// Remove a row together with its outgoing links. Returns the row and the
    /// removed link sets so a rollback can restore both.
    pub fn remove(&mut self, id: RecordId) -> Option<(Record, Vec<(String, Vec<RecordId>)>)> {
        let record = self.rows.remove(&id)?;
        let mut removed_links = Vec::new();
        for (relation, owners) in &mut self.links {
            if let Some(targets) = owners.remove(&id) {
                removed_links.push((relation.clone(), targets.into_iter().collect()));
            }
        }
        Some((record, removed_links))
    }

    pub fn link(&mut self, relation: &str, owner: RecordId, target: RecordId) -> bool {
        self.links
            .entry(relation.to_string())
            .or_default()
            .entry(owner)
            .or_default()
            .insert(target)
    }

    pub fn unlink(&mut self, relation: &str, owner: RecordId, target: RecordId) -> bool {
        self.links
            .get_mut(relation)
            .and_then(|owners| owners.get_mut(&owner))
            .is_some_and(|targets| targets.remove(&target))
    }

    pub fn linked(&self, relation: &str, owner: RecordId) -> Vec<RecordId> {
        self.links
            .get(relation)
            .and_then(|owners| owners.get(&owner))
            .map(|targets| targets.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn restore(&mut self, record: Record) {
        if let Some(id) = record.id {
            self.rows.insert(id, record);
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}
