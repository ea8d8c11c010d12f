//! In-memory backend.
//!
//! Holds resources in a map keyed by kind and name, so reconciliation can
//! be exercised end to end without a project. Mutating calls are counted
//! and failures can be injected per resource.

use crate::backend::Provider;
use crate::error::{Error, Result};
use crate::types::{ObservedState, ResourceDeclaration, ResourceKind};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

type Key = (ResourceKind, String);

#[derive(Debug, Default)]
struct Inner {
    resources: BTreeMap<Key, BTreeMap<String, String>>,
    failing: BTreeSet<Key>,
    creates: usize,
    deletes: usize,
}

/// Provider backed by an in-process map.
#[derive(Debug)]
pub struct MemoryProvider {
    project: String,
    inner: Mutex<Inner>,
}

impl MemoryProvider {
    /// Create an empty project.
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Seed an existing resource.
    pub fn insert(&self, declaration: &ResourceDeclaration) {
        self.lock().resources.insert(
            (declaration.kind, declaration.name.clone()),
            declaration.config.clone(),
        );
    }

    /// Make every create of this resource fail with a permission error.
    pub fn fail_create(&self, kind: ResourceKind, name: &str) {
        self.lock().failing.insert((kind, name.to_string()));
    }

    /// Whether a resource exists.
    pub fn contains(&self, kind: ResourceKind, name: &str) -> bool {
        self.lock().resources.contains_key(&(kind, name.to_string()))
    }

    /// Stored configuration of a resource.
    pub fn config(&self, kind: ResourceKind, name: &str) -> Option<BTreeMap<String, String>> {
        self.lock().resources.get(&(kind, name.to_string())).cloned()
    }

    /// Number of resources of a kind.
    pub fn count(&self, kind: ResourceKind) -> usize {
        self.lock().resources.keys().filter(|(k, _)| *k == kind).count()
    }

    /// Number of mutating calls (successful creates plus deletes of present resources).
    pub fn mutations(&self) -> usize {
        let inner = self.lock();
        inner.creates + inner.deletes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Provider for MemoryProvider {
    fn project(&self) -> &str {
        &self.project
    }

    fn describe(&self, kind: ResourceKind, name: &str) -> Result<ObservedState> {
        Ok(match self.lock().resources.get(&(kind, name.to_string())) {
            Some(config) => ObservedState::Present {
                fields: config
                    .iter()
                    .filter(|(k, _)| !matches!(k.as_str(), "data" | "content" | "env"))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            },
            None => ObservedState::Absent,
        })
    }

    fn create(&self, declaration: &ResourceDeclaration) -> Result<()> {
        let key = (declaration.kind, declaration.name.clone());
        let mut inner = self.lock();

        if inner.failing.contains(&key) {
            return Err(Error::Permission {
                message: format!("cannot create {}", declaration.id()),
            });
        }

        let overwrites = declaration.kind.strategy() == crate::Strategy::Overwrite;
        if inner.resources.contains_key(&key) && !overwrites {
            return Err(Error::AlreadyExists {
                name: declaration.name.clone(),
            });
        }

        inner.resources.insert(key, declaration.config.clone());
        inner.creates += 1;
        Ok(())
    }

    fn delete(&self, kind: ResourceKind, name: &str) -> Result<()> {
        let mut inner = self.lock();
        if inner.resources.remove(&(kind, name.to_string())).is_none() {
            return Err(Error::NotFound {
                name: name.to_string(),
            });
        }
        inner.deletes += 1;
        Ok(())
    }

    fn read_secret(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .lock()
            .resources
            .get(&(ResourceKind::Secret, name.to_string()))
            .and_then(|config| config.get("data").cloned()))
    }

    fn add_secret_version(&self, name: &str, data: &str) -> Result<()> {
        let mut inner = self.lock();
        let config = inner
            .resources
            .get_mut(&(ResourceKind::Secret, name.to_string()))
            .ok_or_else(|| Error::NotFound {
                name: name.to_string(),
            })?;
        config.insert("data".to_string(), data.to_string());
        inner.creates += 1;
        Ok(())
    }

    fn list(&self, kind: ResourceKind) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .resources
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, name)| name.clone())
            .collect())
    }

    fn read_object(&self, url: &str) -> Result<Option<String>> {
        Ok(self
            .lock()
            .resources
            .get(&(ResourceKind::Object, url.to_string()))
            .and_then(|c| c.get("content").cloned()))
    }
}
