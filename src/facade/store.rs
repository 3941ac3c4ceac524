use crate::cache::{ActiveCache, MemoryCache, active_key};
use crate::core::{Record, RecordId, Result, StoreError};
use crate::registry::{EntityConfig, Registry};
use crate::storage::{EntityStore, Filter, MemoryStore, OrderBy, Patch, TxId};
use chrono::Utc;
use log::{debug, warn};
use std::sync::Arc;

/// High-level entry point: enrolled record kinds, the single-active
/// invariant on save, cached active-record lookups and deep cloning.
///
/// Collaborators are injected; [`ActiveStore::in_memory`] wires the bundled
/// in-memory store and cache.
///
/// # Examples
///
/// ```
/// use activerec::{ActiveStore, EntityConfig, Record};
///
/// # tokio_test::block_on(async {
/// let hub = ActiveStore::in_memory();
/// hub.enroll(EntityConfig::new("homepage")).unwrap();
///
/// let home = Record::new("homepage").with_field("hero", "<h1>hey</h1>").activated();
/// let home = hub.save(home).await.unwrap();
/// assert_eq!(hub.get_active("homepage").await.unwrap().unwrap().id, home.id);
/// # });
/// ```
pub struct ActiveStore {
    pub(super) store: Arc<dyn EntityStore>,
    pub(super) cache: Arc<dyn ActiveCache>,
    registry: Registry,
}

impl ActiveStore {
    pub fn new(store: Arc<dyn EntityStore>, cache: Arc<dyn ActiveCache>) -> Self {
        Self {
            store,
            cache,
            registry: Registry::new(),
        }
    }

    /// Wire up with the bundled [`MemoryStore`] and [`MemoryCache`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryCache::default()))
    }

    /// The underlying store collaborator, for direct reads or maintenance.
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Register a record kind with the singleton controller and clone engine.
    pub fn enroll(&self, config: EntityConfig) -> Result<()> {
        self.registry.enroll(config)
    }

    pub(crate) fn config_for(&self, kind: &str) -> Result<EntityConfig> {
        self.registry.config_for(kind)
    }

    /// Persist a record, enforcing the single-active invariant.
    ///
    /// The cached active entry for the kind is invalidated before the write.
    /// When the saved record is active, every other record of the kind is
    /// deactivated in one atomic filtered update; on stores with transaction
    /// support both steps commit together.
    pub async fn save(&self, record: Record) -> Result<Record> {
        self.save_by(record, None).await
    }

    /// [`save`](Self::save) with an audit actor recorded on the record.
    pub async fn save_by(&self, record: Record, actor: Option<&str>) -> Result<Record> {
        self.config_for(&record.kind)?;

        // Invalidate before the write so no reader repopulates from pre-write
        // state that outlives it.
        self.cache.delete(&active_key(&record.kind))?;

        let mut record = record;
        let now = Utc::now();
        record.updated_at = now;
        if record.id.is_none() {
            record.created_at = now;
            if record.created_by.is_none() {
                record.created_by = actor.map(str::to_string);
            }
        }
        if let Some(actor) = actor {
            record.updated_by = Some(actor.to_string());
        }

        let tx = self.begin_if_supported().await?;
        match self.persist_and_enforce(record, tx).await {
            Ok(saved) => {
                if let Some(tx) = tx {
                    self.store.commit(tx).await?;
                }
                Ok(saved)
            }
            Err(err) => {
                self.rollback_quietly(tx, "save").await;
                Err(err)
            }
        }
    }

    async fn persist_and_enforce(&self, record: Record, tx: Option<TxId>) -> Result<Record> {
        let saved = if record.id.is_none() {
            self.store.insert(record, tx).await?
        } else {
            self.store.update(&record, tx).await?;
            record
        };

        if saved.is_active {
            let Some(id) = saved.id else {
                return Err(StoreError::Unavailable(
                    "store returned an unsaved record from insert".to_string(),
                ));
            };
            let demoted = self
                .store
                .bulk_update(
                    &saved.kind,
                    &Filter::other_actives(id),
                    &Patch::deactivate(),
                    tx,
                )
                .await?;
            if demoted > 0 {
                debug!("deactivated {demoted} other '{}' record(s)", saved.kind);
            }
        }
        Ok(saved)
    }

    /// The active record of a kind, if any.
    ///
    /// Served from the cache when possible. On a miss the store is queried
    /// for active records, most recently updated first; with
    /// `fallback_to_latest` enabled, a kind with no active record falls back
    /// to its most recently updated record. A kind with no records at all
    /// yields `None`, which is never cached. Store failures propagate.
    pub async fn get_active(&self, kind: &str) -> Result<Option<Record>> {
        let config = self.config_for(kind)?;
        let key = active_key(kind);
        if let Some(hit) = self.cache.get(&key)? {
            return Ok(Some(hit));
        }

        let mut rows = self
            .store
            .query(kind, &Filter::Active(true), OrderBy::UpdatedAtDesc)
            .await?;
        if rows.is_empty() && config.fallback_to_latest {
            rows = self
                .store
                .query(kind, &Filter::All, OrderBy::UpdatedAtDesc)
                .await?;
            if !rows.is_empty() {
                debug!("no active '{kind}' record; serving most recently updated");
            }
        }

        match rows.into_iter().next() {
            Some(found) => {
                self.cache.set(&key, found.clone(), config.cache_ttl)?;
                Ok(Some(found))
            }
            None => Ok(None),
        }
    }

    pub async fn get(&self, kind: &str, id: RecordId) -> Result<Option<Record>> {
        self.store.get(kind, id).await
    }

    /// All active records of a kind, most recently updated first.
    pub async fn active(&self, kind: &str) -> Result<Vec<Record>> {
        self.store
            .query(kind, &Filter::Active(true), OrderBy::UpdatedAtDesc)
            .await
    }

    pub async fn query(&self, kind: &str, filter: &Filter, order: OrderBy) -> Result<Vec<Record>> {
        self.store.query(kind, filter, order).await
    }

    pub(crate) async fn begin_if_supported(&self) -> Result<Option<TxId>> {
        if self.store.supports_transactions() {
            Ok(Some(self.store.begin().await?))
        } else {
            Ok(None)
        }
    }

    pub(crate) async fn rollback_quietly(&self, tx: Option<TxId>, operation: &str) {
        if let Some(tx) = tx
            && let Err(err) = self.store.rollback(tx).await
        {
            warn!("rollback after failed {operation} did not complete: {err}");
        }
    }
}
