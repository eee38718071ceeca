//! Read-only access to TFJobs held in the informer's local cache.
//!
//! Lookups never reach the API server, so callers may observe state that is
//! a resync period behind.

use std::sync::Arc;

use kube::api::{ApiResource, DynamicObject};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::ResourceExt;
#[cfg(test)]
use mockall::automock;
use tracing::error;

use crate::codec;
use crate::crd::TFJob;
use crate::{Error, Result};

/// Keyed view over the locally mirrored objects.
#[cfg_attr(test, automock)]
pub trait Indexer: Send + Sync {
    /// `Ok(None)` means the key is not in the cache.
    fn get_by_key(&self, key: &str) -> Result<Option<Arc<DynamicObject>>>;
}

/// Splits a `namespace/name` (or bare `name`) key.
pub fn split_key(key: &str) -> Result<(Option<&str>, &str)> {
    let parts: Vec<&str> = key.split('/').collect();
    match parts.as_slice() {
        [name] if !name.is_empty() => Ok((None, *name)),
        [namespace, name] if !name.is_empty() => Ok((Some(*namespace), *name)),
        _ => Err(Error::InvalidKey(key.to_string())),
    }
}

/// Builds the cache key of an object.
pub fn key_for(obj: &DynamicObject) -> Result<String> {
    let name = obj
        .metadata
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::InvalidKey("object has no name".to_string()))?;
    Ok(match obj.namespace() {
        Some(ns) if !ns.is_empty() => format!("{}/{}", ns, name),
        _ => name.to_string(),
    })
}

/// [`Indexer`] backed by a kube reflector store.
pub struct ReflectorIndexer {
    store: Store<DynamicObject>,
    resource: ApiResource,
}

impl ReflectorIndexer {
    pub fn new(store: Store<DynamicObject>, resource: ApiResource) -> Self {
        Self { store, resource }
    }
}

impl Indexer for ReflectorIndexer {
    fn get_by_key(&self, key: &str) -> Result<Option<Arc<DynamicObject>>> {
        let (namespace, name) = split_key(key)?;
        let mut obj_ref = ObjectRef::<DynamicObject>::new_with(name, self.resource.clone());
        if let Some(ns) = namespace {
            obj_ref = obj_ref.within(ns);
        }
        Ok(self.store.get(&obj_ref))
    }
}

pub struct JobCache {
    indexer: Arc<dyn Indexer>,
}

impl JobCache {
    pub fn new(indexer: Arc<dyn Indexer>) -> Self {
        Self { indexer }
    }

    /// Looks up and decodes the job stored under `key`.
    ///
    /// `NotExists` is expected when a job was deleted after its key was
    /// queued. `GetFromKey` means the cache itself could not be read.
    pub fn get_job_from_key(&self, key: &str) -> Result<TFJob> {
        let obj = match self.indexer.get_by_key(key) {
            Ok(Some(obj)) => obj,
            Ok(None) => return Err(Error::NotExists(key.to_string())),
            Err(e) => {
                error!(key, error = %e, "Failed to get TFJob from informer index");
                return Err(Error::GetFromKey(key.to_string()));
            }
        };
        Ok(codec::decode(&obj)?)
    }

    pub fn get_job_from_name(&self, namespace: &str, name: &str) -> Result<TFJob> {
        self.get_job_from_key(&format!("{}/{}", namespace, name))
    }
}
