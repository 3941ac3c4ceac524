/// Clone engine tests
///
/// Cloning must produce an independent, inactive copy of a record and its
/// declared dependent graph without mutating the source.
/// Run with: cargo test --test clone_tests
use activerec::{
    ActiveStore, EntityConfig, EntityStore, Filter, Link, MemoryCache, MemoryStore, OrderBy,
    Patch, Record, RecordId, StoreError, TxId, Value,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

async fn homepage_with_children(hub: &ActiveStore, children: usize) -> Record {
    let home = hub
        .save(Record::new("homepage").with_field("hero", "hey").activated())
        .await
        .unwrap();
    let home_id = home.id.unwrap();
    for n in 0..children {
        hub.store()
            .insert(
                Record::new("post")
                    .with_field("homepage_id", home_id)
                    .with_field("n", n as i64),
                None,
            )
            .await
            .unwrap();
    }
    home
}

fn enrolled_hub() -> ActiveStore {
    let hub = ActiveStore::in_memory();
    hub.enroll(
        EntityConfig::new("homepage")
            .owns("posts", "post", "homepage_id")
            .links("tags", "tag"),
    )
    .unwrap();
    hub
}

#[tokio::test]
async fn test_clone_is_inactive_with_fresh_identity() {
    let hub = enrolled_hub();
    let home = hub.save(Record::new("homepage").activated()).await.unwrap();

    let copy = hub.clone_record(&home).await.unwrap();
    assert!(copy.is_saved());
    assert_ne!(copy.id, home.id);
    assert!(!copy.is_active);

    // the source stays active
    let source = hub.get("homepage", home.id.unwrap()).await.unwrap().unwrap();
    assert!(source.is_active);
}

#[tokio::test]
async fn test_clone_of_inactive_record_is_still_inactive() {
    let hub = enrolled_hub();
    let home = hub.save(Record::new("homepage")).await.unwrap();
    let copy = hub.clone_record(&home).await.unwrap();
    assert!(!copy.is_active);
}

#[tokio::test]
async fn test_clone_deep_copies_children_and_reparents() {
    let hub = enrolled_hub();
    let home = homepage_with_children(&hub, 3).await;
    let home_id = home.id.unwrap();

    // snapshot the source graph before cloning
    let source_before = hub.get("homepage", home_id).await.unwrap().unwrap();
    let children_before = hub
        .query(
            "post",
            &Filter::field("homepage_id", home_id),
            OrderBy::CreatedAtAsc,
        )
        .await
        .unwrap();
    let snapshot_before =
        serde_json::to_string(&(&source_before, &children_before)).unwrap();

    let copy = hub.clone_record(&home).await.unwrap();
    let copy_id = copy.id.unwrap();

    let copied_children = hub
        .query(
            "post",
            &Filter::field("homepage_id", copy_id),
            OrderBy::CreatedAtAsc,
        )
        .await
        .unwrap();
    assert_eq!(copied_children.len(), 3);
    for (n, child) in copied_children.iter().enumerate() {
        assert_eq!(child.field("homepage_id"), Some(&Value::Id(copy_id)));
        assert_eq!(child.field("n"), Some(&Value::Integer(n as i64)));
        assert!(!children_before.iter().any(|c| c.id == child.id));
    }

    // byte-identical source graph after the clone
    let source_after = hub.get("homepage", home_id).await.unwrap().unwrap();
    let children_after = hub
        .query(
            "post",
            &Filter::field("homepage_id", home_id),
            OrderBy::CreatedAtAsc,
        )
        .await
        .unwrap();
    let snapshot_after = serde_json::to_string(&(&source_after, &children_after)).unwrap();
    assert_eq!(snapshot_before, snapshot_after);
}

#[tokio::test]
async fn test_clone_reassociates_many_to_many_without_duplicating() {
    let hub = enrolled_hub();
    let home = hub.save(Record::new("homepage")).await.unwrap();
    let home_id = home.id.unwrap();

    let mut tag_ids = Vec::new();
    for name in ["news", "featured"] {
        let tag = hub
            .store()
            .insert(Record::new("tag").with_field("name", name), None)
            .await
            .unwrap();
        let tag_id = tag.id.unwrap();
        tag_ids.push(tag_id);
        hub.store()
            .associate(
                &Link {
                    kind: "homepage".into(),
                    owner: home_id,
                    relation: "tags".into(),
                    target: tag_id,
                },
                None,
            )
            .await
            .unwrap();
    }

    let copy = hub.clone_record(&home).await.unwrap();
    let copy_id = copy.id.unwrap();

    let mut linked = hub
        .store()
        .associations("homepage", copy_id, "tags")
        .await
        .unwrap();
    linked.sort();
    tag_ids.sort();
    assert_eq!(linked, tag_ids);

    // the tag records themselves were not duplicated
    let tags = hub.query("tag", &Filter::All, OrderBy::Unordered).await.unwrap();
    assert_eq!(tags.len(), 2);
}

#[tokio::test]
async fn test_clone_deep_duplicates_flagged_relation() {
    let hub = ActiveStore::in_memory();
    hub.enroll(EntityConfig::new("homepage").links_deep("banners", "banner"))
        .unwrap();

    let home = hub.save(Record::new("homepage")).await.unwrap();
    let home_id = home.id.unwrap();
    let banner = hub
        .store()
        .insert(Record::new("banner").with_field("alt", "sale"), None)
        .await
        .unwrap();
    hub.store()
        .associate(
            &Link {
                kind: "homepage".into(),
                owner: home_id,
                relation: "banners".into(),
                target: banner.id.unwrap(),
            },
            None,
        )
        .await
        .unwrap();

    let copy = hub.clone_record(&home).await.unwrap();
    let linked = hub
        .store()
        .associations("homepage", copy.id.unwrap(), "banners")
        .await
        .unwrap();
    assert_eq!(linked.len(), 1);
    assert_ne!(linked[0], banner.id.unwrap());

    let banners = hub
        .query("banner", &Filter::All, OrderBy::Unordered)
        .await
        .unwrap();
    assert_eq!(banners.len(), 2);
}

#[tokio::test]
async fn test_clone_mixed_graph_counts() {
    // 3 one-to-many children and 2 many-to-many links: expect one new parent,
    // 3 new children and 2 re-associated (not duplicated) links.
    let hub = enrolled_hub();
    let home = homepage_with_children(&hub, 3).await;
    let home_id = home.id.unwrap();
    for _ in 0..2 {
        let tag = hub.store().insert(Record::new("tag"), None).await.unwrap();
        hub.store()
            .associate(
                &Link {
                    kind: "homepage".into(),
                    owner: home_id,
                    relation: "tags".into(),
                    target: tag.id.unwrap(),
                },
                None,
            )
            .await
            .unwrap();
    }

    let copy = hub.clone_record(&home).await.unwrap();

    let homepages = hub
        .query("homepage", &Filter::All, OrderBy::Unordered)
        .await
        .unwrap();
    let posts = hub.query("post", &Filter::All, OrderBy::Unordered).await.unwrap();
    let tags = hub.query("tag", &Filter::All, OrderBy::Unordered).await.unwrap();
    assert_eq!(homepages.len(), 2);
    assert_eq!(posts.len(), 6);
    assert_eq!(tags.len(), 2);

    let linked = hub
        .store()
        .associations("homepage", copy.id.unwrap(), "tags")
        .await
        .unwrap();
    assert_eq!(linked.len(), 2);
}

#[tokio::test]
async fn test_clone_unsaved_record_is_rejected() {
    let hub = enrolled_hub();
    let err = hub
        .clone_record(&Record::new("homepage"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
}

#[tokio::test]
async fn test_clone_unenrolled_kind_is_rejected() {
    let hub = enrolled_hub();
    let mut stray = Record::new("banner");
    stray.id = Some(RecordId(1));
    assert!(matches!(
        hub.clone_record(&stray).await,
        Err(StoreError::NotEnrolled(_))
    ));
}

/// Store wrapper that fails inserts once its budget is spent, optionally
/// hiding the inner store's transaction support.
struct FlakyStore {
    inner: MemoryStore,
    insert_budget: AtomicI64,
    transactional: bool,
}

impl FlakyStore {
    fn new(insert_budget: i64, transactional: bool) -> Self {
        Self {
            inner: MemoryStore::new(),
            insert_budget: AtomicI64::new(insert_budget),
            transactional,
        }
    }
}

#[async_trait]
impl EntityStore for FlakyStore {
    async fn insert(&self, record: Record, tx: Option<TxId>) -> activerec::Result<Record> {
        if self.insert_budget.fetch_sub(1, Ordering::SeqCst) <= 0 {
            return Err(StoreError::Unavailable("injected insert failure".into()));
        }
        self.inner.insert(record, tx).await
    }

    async fn update(&self, record: &Record, tx: Option<TxId>) -> activerec::Result<()> {
        self.inner.update(record, tx).await
    }

    async fn get(&self, kind: &str, id: RecordId) -> activerec::Result<Option<Record>> {
        self.inner.get(kind, id).await
    }

    async fn query(
        &self,
        kind: &str,
        filter: &Filter,
        order: OrderBy,
    ) -> activerec::Result<Vec<Record>> {
        self.inner.query(kind, filter, order).await
    }

    async fn bulk_update(
        &self,
        kind: &str,
        filter: &Filter,
        patch: &Patch,
        tx: Option<TxId>,
    ) -> activerec::Result<usize> {
        self.inner.bulk_update(kind, filter, patch, tx).await
    }

    async fn delete(&self, kind: &str, id: RecordId, tx: Option<TxId>) -> activerec::Result<bool> {
        self.inner.delete(kind, id, tx).await
    }

    async fn associate(&self, link: &Link, tx: Option<TxId>) -> activerec::Result<bool> {
        self.inner.associate(link, tx).await
    }

    async fn associations(
        &self,
        kind: &str,
        owner: RecordId,
        relation: &str,
    ) -> activerec::Result<Vec<RecordId>> {
        self.inner.associations(kind, owner, relation).await
    }

    fn supports_transactions(&self) -> bool {
        self.transactional
    }

    async fn begin(&self) -> activerec::Result<TxId> {
        self.inner.begin().await
    }

    async fn commit(&self, tx: TxId) -> activerec::Result<()> {
        self.inner.commit(tx).await
    }

    async fn rollback(&self, tx: TxId) -> activerec::Result<()> {
        self.inner.rollback(tx).await
    }
}

fn flaky_hub(insert_budget: i64, transactional: bool) -> ActiveStore {
    let hub = ActiveStore::new(
        Arc::new(FlakyStore::new(insert_budget, transactional)),
        Arc::new(MemoryCache::default()),
    );
    hub.enroll(EntityConfig::new("homepage").owns("posts", "post", "homepage_id"))
        .unwrap();
    hub
}

async fn seed_flaky(hub: &ActiveStore) -> Record {
    let home = hub.save(Record::new("homepage")).await.unwrap();
    let home_id = home.id.unwrap();
    for n in 0..3i64 {
        hub.store()
            .insert(
                Record::new("post")
                    .with_field("homepage_id", home_id)
                    .with_field("n", n),
                None,
            )
            .await
            .unwrap();
    }
    home
}

#[tokio::test]
async fn test_partial_clone_reports_created_records() {
    // budget: 1 homepage + 3 posts seeded, then the clone may insert the new
    // parent and one child before failing
    let hub = flaky_hub(4 + 2, false);
    let home = seed_flaky(&hub).await;

    let err = hub.clone_record(&home).await.unwrap_err();
    let StoreError::PartialClone { created, source } = err else {
        panic!("expected PartialClone, got {err}");
    };
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].kind, "homepage");
    assert_eq!(created[1].kind, "post");
    assert!(matches!(*source, StoreError::Unavailable(_)));

    // the partially cloned records really are in the store, awaiting cleanup
    for orphan in &created {
        assert!(
            hub.get(&orphan.kind, orphan.id).await.unwrap().is_some(),
            "orphan {}/{} missing",
            orphan.kind,
            orphan.id
        );
    }
}

#[tokio::test]
async fn test_clone_failure_rolls_back_on_transactional_store() {
    let hub = flaky_hub(4 + 2, true);
    let home = seed_flaky(&hub).await;

    let err = hub.clone_record(&home).await.unwrap_err();
    // with transactions the failure is not a partial clone: nothing survives
    assert!(matches!(err, StoreError::Unavailable(_)));

    let homepages = hub
        .query("homepage", &Filter::All, OrderBy::Unordered)
        .await
        .unwrap();
    let posts = hub.query("post", &Filter::All, OrderBy::Unordered).await.unwrap();
    assert_eq!(homepages.len(), 1);
    assert_eq!(posts.len(), 3);
}
