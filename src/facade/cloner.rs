use crate::core::{CreatedRecord, Record, RecordId, Result, StoreError, Value};
use crate::facade::ActiveStore;
use crate::registry::EntityConfig;
use crate::storage::{Filter, Link, OrderBy, TxId};
use chrono::Utc;
use log::debug;

/// Deep-clone engine: copies an enrolled record together with its declared
/// dependent graph, never touching the source.
impl ActiveStore {
    /// Produce an independent, inactive copy of `source` and its dependents.
    ///
    /// The copy gets a fresh store-assigned identity and `is_active = false`.
    /// One-to-many children are deep-copied and re-parented onto the copy;
    /// many-to-many links are re-associated with the same targets, unless the
    /// relation is declared `deep_clone`, in which case targets are copied
    /// too. On stores with transaction support the whole walk commits or
    /// rolls back as one unit; without it, a mid-walk failure surfaces as
    /// [`StoreError::PartialClone`] listing every record persisted so far.
    pub async fn clone_record(&self, source: &Record) -> Result<Record> {
        let config = self.config_for(&source.kind)?;
        let Some(source_id) = source.id else {
            return Err(StoreError::Invalid(format!(
                "cannot clone an unsaved '{}' record",
                source.kind
            )));
        };

        let tx = self.begin_if_supported().await?;
        let mut created = Vec::new();
        match self
            .clone_graph(source, source_id, &config, tx, &mut created)
            .await
        {
            Ok(copy) => {
                if let Some(tx) = tx {
                    self.store.commit(tx).await?;
                }
                debug!(
                    "cloned '{}' {source_id} into {} ({} record(s) created)",
                    source.kind,
                    copy.id.map(|id| id.to_string()).unwrap_or_default(),
                    created.len()
                );
                Ok(copy)
            }
            Err(err) => {
                if tx.is_some() {
                    self.rollback_quietly(tx, "clone").await;
                    Err(err)
                } else if created.is_empty() {
                    Err(err)
                } else {
                    Err(StoreError::PartialClone {
                        created,
                        source: Box::new(err),
                    })
                }
            }
        }
    }

    async fn clone_graph(
        &self,
        source: &Record,
        source_id: RecordId,
        config: &EntityConfig,
        tx: Option<TxId>,
        created: &mut Vec<CreatedRecord>,
    ) -> Result<Record> {
        let now = Utc::now();

        let mut copy = source.detached(now);
        copy.is_active = false;
        let copy = self.store.insert(copy, tx).await?;
        let copy_id = Self::persisted_id(&copy)?;
        created.push(CreatedRecord {
            kind: copy.kind.clone(),
            id: copy_id,
        });

        for relation in &config.one_to_many {
            let children = self
                .store
                .query(
                    &relation.child_kind,
                    &Filter::field(relation.owner_field.clone(), Value::Id(source_id)),
                    OrderBy::CreatedAtAsc,
                )
                .await?;
            let count = children.len();
            for child in children {
                let mut duplicate = child.detached(now);
                duplicate.set_field(relation.owner_field.clone(), Value::Id(copy_id));
                let duplicate = self.store.insert(duplicate, tx).await?;
                created.push(CreatedRecord {
                    kind: duplicate.kind.clone(),
                    id: Self::persisted_id(&duplicate)?,
                });
            }
            debug!(
                "re-parented {count} '{}' child(ren) of '{}' {source_id}",
                relation.name, source.kind
            );
        }

        for relation in &config.many_to_many {
            let targets = self
                .store
                .associations(&source.kind, source_id, &relation.name)
                .await?;
            for target_id in targets {
                let linked_target = if relation.deep_clone {
                    let Some(target) = self.store.get(&relation.target_kind, target_id).await?
                    else {
                        return Err(StoreError::NotFound {
                            kind: relation.target_kind.clone(),
                            id: target_id,
                        });
                    };
                    let duplicate = self.store.insert(target.detached(now), tx).await?;
                    let duplicate_id = Self::persisted_id(&duplicate)?;
                    created.push(CreatedRecord {
                        kind: duplicate.kind.clone(),
                        id: duplicate_id,
                    });
                    duplicate_id
                } else {
                    target_id
                };
                self.store
                    .associate(
                        &Link {
                            kind: copy.kind.clone(),
                            owner: copy_id,
                            relation: relation.name.clone(),
                            target: linked_target,
                        },
                        tx,
                    )
                    .await?;
            }
        }

        Ok(copy)
    }

    fn persisted_id(record: &Record) -> Result<RecordId> {
        record.id.ok_or_else(|| {
            StoreError::Unavailable("store returned an unsaved record from insert".to_string())
        })
    }
}
