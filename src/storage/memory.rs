use crate::core::{Record, RecordId, Result, StoreError};
use crate::storage::{EntityStore, Filter, Link, OrderBy, Patch, Table, TxId};
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// One reversible mutation recorded under an open transaction.
#[derive(Debug, Clone)]
enum Undo {
    Insert {
        kind: String,
        id: RecordId,
    },
    Update {
        kind: String,
        previous: Record,
    },
    Bulk {
        kind: String,
        previous: Vec<Record>,
    },
    Delete {
        kind: String,
        previous: Record,
        links: Vec<(String, Vec<RecordId>)>,
    },
    Link(Link),
}

/// In-memory [`EntityStore`] with per-kind tables behind individual locks and
/// undo-log transactions.
///
/// Tables are created on first insert; a kind that was never written behaves
/// as an empty table on reads. Transactional mutations are applied immediately
/// and logged, and `rollback` replays the log in reverse. `bulk_update` holds
/// the table write lock for the whole filtered pass, which is what makes the
/// concurrent-activation race impossible on this store.
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Arc<RwLock<Table>>>>,
    undo: RwLock<HashMap<TxId, Vec<Undo>>>,
    next_tx: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            undo: RwLock::new(HashMap::new()),
            next_tx: AtomicU64::new(1),
        }
    }

    async fn table(&self, kind: &str) -> Option<Arc<RwLock<Table>>> {
        self.tables.read().await.get(kind).cloned()
    }

    async fn table_or_create(&self, kind: &str) -> Arc<RwLock<Table>> {
        if let Some(handle) = self.table(kind).await {
            return handle;
        }
        let mut tables = self.tables.write().await;
        tables
            .entry(kind.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(Table::new(kind))))
            .clone()
    }

    /// Mutations check their handle up front so a write against a finished
    /// transaction fails before touching any table.
    async fn ensure_tx(&self, tx: Option<TxId>) -> Result<()> {
        if let Some(tx) = tx
            && !self.undo.read().await.contains_key(&tx)
        {
            return Err(StoreError::Transaction(format!(
                "transaction {tx} is not active"
            )));
        }
        Ok(())
    }

    /// Record an undo entry; rejects handles that were never begun or are
    /// already finished.
    async fn log_undo(&self, tx: Option<TxId>, op: Undo) -> Result<()> {
        let Some(tx) = tx else {
            return Ok(());
        };
        let mut undo = self.undo.write().await;
        match undo.get_mut(&tx) {
            Some(ops) => {
                ops.push(op);
                Ok(())
            }
            None => Err(StoreError::Transaction(format!(
                "transaction {tx} is not active"
            ))),
        }
    }

    async fn apply_undo(&self, ops: Vec<Undo>) -> Result<()> {
        for op in ops.into_iter().rev() {
            match op {
                Undo::Insert { kind, id } => {
                    if let Some(handle) = self.table(&kind).await {
                        handle.write().await.remove(id);
                    }
                }
                Undo::Update { kind, previous } => {
                    if let Some(handle) = self.table(&kind).await {
                        handle.write().await.restore(previous);
                    }
                }
                Undo::Bulk { kind, previous } => {
                    if let Some(handle) = self.table(&kind).await {
                        let mut table = handle.write().await;
                        for record in previous {
                            table.restore(record);
                        }
                    }
                }
                Undo::Delete {
                    kind,
                    previous,
                    links,
                } => {
                    if let Some(handle) = self.table(&kind).await {
                        let mut table = handle.write().await;
                        let owner = previous.id;
                        table.restore(previous);
                        if let Some(owner) = owner {
                            for (relation, targets) in links {
                                for target in targets {
                                    table.link(&relation, owner, target);
                                }
                            }
                        }
                    }
                }
                Undo::Link(link) => {
                    if let Some(handle) = self.table(&link.kind).await {
                        handle
                            .write()
                            .await
                            .unlink(&link.relation, link.owner, link.target);
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn insert(&self, record: Record, tx: Option<TxId>) -> Result<Record> {
        self.ensure_tx(tx).await?;
        let handle = self.table_or_create(&record.kind).await;
        let stored = handle.write().await.insert(record);
        if let Some(id) = stored.id {
            self.log_undo(
                tx,
                Undo::Insert {
                    kind: stored.kind.clone(),
                    id,
                },
            )
            .await?;
        }
        Ok(stored)
    }

    async fn update(&self, record: &Record, tx: Option<TxId>) -> Result<()> {
        self.ensure_tx(tx).await?;
        let id = record.id.ok_or_else(|| {
            StoreError::Invalid(format!("cannot update an unsaved '{}' record", record.kind))
        })?;
        let Some(handle) = self.table(&record.kind).await else {
            return Err(StoreError::NotFound {
                kind: record.kind.clone(),
                id,
            });
        };
        let previous = handle.write().await.update(record)?;
        self.log_undo(
            tx,
            Undo::Update {
                kind: record.kind.clone(),
                previous,
            },
        )
        .await
    }

    async fn get(&self, kind: &str, id: RecordId) -> Result<Option<Record>> {
        let Some(handle) = self.table(kind).await else {
            return Ok(None);
        };
        let table = handle.read().await;
        Ok(table.get(id).cloned())
    }

    async fn query(&self, kind: &str, filter: &Filter, order: OrderBy) -> Result<Vec<Record>> {
        let Some(handle) = self.table(kind).await else {
            return Ok(Vec::new());
        };
        let table = handle.read().await;
        Ok(table.select(filter, order))
    }

    async fn bulk_update(
        &self,
        kind: &str,
        filter: &Filter,
        patch: &Patch,
        tx: Option<TxId>,
    ) -> Result<usize> {
        self.ensure_tx(tx).await?;
        let Some(handle) = self.table(kind).await else {
            return Ok(0);
        };
        let previous = handle.write().await.bulk_update(filter, patch);
        let changed = previous.len();
        if changed > 0 {
            self.log_undo(
                tx,
                Undo::Bulk {
                    kind: kind.to_string(),
                    previous,
                },
            )
            .await?;
        }
        Ok(changed)
    }

    async fn delete(&self, kind: &str, id: RecordId, tx: Option<TxId>) -> Result<bool> {
        self.ensure_tx(tx).await?;
        let Some(handle) = self.table(kind).await else {
            return Ok(false);
        };
        let removed = handle.write().await.remove(id);
        match removed {
            Some((previous, links)) => {
                self.log_undo(
                    tx,
                    Undo::Delete {
                        kind: kind.to_string(),
                        previous,
                        links,
                    },
                )
                .await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn associate(&self, link: &Link, tx: Option<TxId>) -> Result<bool> {
        self.ensure_tx(tx).await?;
        let handle = self.table_or_create(&link.kind).await;
        let added = handle
            .write()
            .await
            .link(&link.relation, link.owner, link.target);
        if added {
            self.log_undo(tx, Undo::Link(link.clone())).await?;
        }
        Ok(added)
    }

    async fn associations(
        &self,
        kind: &str,
        owner: RecordId,
        relation: &str,
    ) -> Result<Vec<RecordId>> {
        let Some(handle) = self.table(kind).await else {
            return Ok(Vec::new());
        };
        let table = handle.read().await;
        Ok(table.linked(relation, owner))
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    async fn begin(&self) -> Result<TxId> {
        let tx = self.next_tx.fetch_add(1, Ordering::SeqCst);
        self.undo.write().await.insert(tx, Vec::new());
        debug!("began transaction {tx}");
        Ok(tx)
    }

    async fn commit(&self, tx: TxId) -> Result<()> {
        let removed = self.undo.write().await.remove(&tx);
        match removed {
            Some(ops) => {
                debug!("committed transaction {tx} ({} op(s))", ops.len());
                Ok(())
            }
            None => Err(StoreError::Transaction(format!(
                "transaction {tx} is not active"
            ))),
        }
    }

    async fn rollback(&self, tx: TxId) -> Result<()> {
        let removed = self.undo.write().await.remove(&tx);
        match removed {
            Some(ops) => {
                debug!("rolling back transaction {tx} ({} op(s))", ops.len());
                self.apply_undo(ops).await
            }
            None => Err(StoreError::Transaction(format!(
                "transaction {tx} is not active"
            ))),
        }
    }
}
