use crate::cache::DEFAULT_CACHE_TTL;
use crate::core::{Result, StoreError};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// One-to-many relation: children of `child_kind` hold their owner's identity
/// in the `owner_field` field. Cloning always deep-copies these children and
/// re-points the owner field at the new parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedRelation {
    pub name: String,
    pub child_kind: String,
    pub owner_field: String,
}

/// Many-to-many relation, stored as a join on the owner's side. Cloning
/// duplicates the join entries only, unless `deep_clone` is set, in which case
/// the associated records are copied as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedRelation {
    pub name: String,
    pub target_kind: String,
    pub deep_clone: bool,
}

/// Enrollment of one record kind with the singleton controller and the clone
/// engine.
///
/// The relation lists make the dependent graph explicit: nothing is inferred
/// from the records themselves, and the one-to-many vs. many-to-many clone
/// semantics are declared per relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityConfig {
    pub kind: String,
    pub one_to_many: Vec<OwnedRelation>,
    pub many_to_many: Vec<LinkedRelation>,
    pub cache_ttl: Duration,
    /// When no record of the kind is active, `get_active` falls back to the
    /// most recently updated record. Legacy-compatible behavior; disable for
    /// a strict "no active record means none" reading.
    pub fallback_to_latest: bool,
}

impl EntityConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            one_to_many: Vec::new(),
            many_to_many: Vec::new(),
            cache_ttl: DEFAULT_CACHE_TTL,
            fallback_to_latest: true,
        }
    }

    /// Declare a one-to-many owning relation.
    pub fn owns(
        mut self,
        name: impl Into<String>,
        child_kind: impl Into<String>,
        owner_field: impl Into<String>,
    ) -> Self {
        self.one_to_many.push(OwnedRelation {
            name: name.into(),
            child_kind: child_kind.into(),
            owner_field: owner_field.into(),
        });
        self
    }

    /// Declare a many-to-many relation whose links are re-associated on clone.
    pub fn links(mut self, name: impl Into<String>, target_kind: impl Into<String>) -> Self {
        self.many_to_many.push(LinkedRelation {
            name: name.into(),
            target_kind: target_kind.into(),
            deep_clone: false,
        });
        self
    }

    /// Declare a many-to-many relation whose targets are deep-duplicated on
    /// clone.
    pub fn links_deep(mut self, name: impl Into<String>, target_kind: impl Into<String>) -> Self {
        self.many_to_many.push(LinkedRelation {
            name: name.into(),
            target_kind: target_kind.into(),
            deep_clone: true,
        });
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn fallback_to_latest(mut self, enabled: bool) -> Self {
        self.fallback_to_latest = enabled;
        self
    }
}

/// Enrolled kinds and their configs.
pub(crate) struct Registry {
    configs: RwLock<HashMap<String, EntityConfig>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            configs: RwLock::new(HashMap::new()),
        }
    }

    pub fn enroll(&self, config: EntityConfig) -> Result<()> {
        let mut configs = self.configs.write()?;
        if configs.contains_key(&config.kind) {
            return Err(StoreError::AlreadyEnrolled(config.kind));
        }
        configs.insert(config.kind.clone(), config);
        Ok(())
    }

    pub fn config_for(&self, kind: &str) -> Result<EntityConfig> {
        self.configs
            .read()?
            .get(kind)
            .cloned()
            .ok_or_else(|| StoreError::NotEnrolled(kind.to_string()))
    }
}
