use super::collection::Collection;
use crate::error::{CoreError, CoreResult};
use crate::namespace::Namespace;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared, independently locked collection.
pub type CollectionHandle = Arc<RwLock<Collection>>;

/// A named set of collections.
///
/// Collections are created lazily on first write access and locked one at
/// a time, so writers to different collections never contend.
#[derive(Debug)]
pub struct Database {
    name: String,
    collections: RwLock<BTreeMap<String, CollectionHandle>>,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self, name: &str) -> Option<CollectionHandle> {
        self.collections.read().get(name).cloned()
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.read().contains_key(name)
    }

    /// Get a collection, creating it when missing.
    pub fn collection_or_create(&self, name: &str) -> CollectionHandle {
        if let Some(handle) = self.collection(name) {
            return handle;
        }
        self.collections
            .write()
            .entry(name.to_owned())
            .or_insert_with(|| new_handle(Namespace::new(self.name.clone(), name)))
            .clone()
    }

    pub fn create_collection(&self, name: &str) -> CoreResult<CollectionHandle> {
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(CoreError::NamespaceExists(format!("{}.{name}", self.name)));
        }
        let handle = new_handle(Namespace::new(self.name.clone(), name));
        collections.insert(name.to_owned(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Remove a collection, handing back its handle.
    pub fn take_collection(&self, name: &str) -> Option<CollectionHandle> {
        self.collections.write().remove(name)
    }

    pub(crate) fn put_collection(&self, name: &str, handle: CollectionHandle) {
        self.collections.write().insert(name.to_owned(), handle);
    }

    /// Collection names in sorted order.
    pub fn collection_names(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.read().is_empty()
    }
}

fn new_handle(namespace: Namespace) -> CollectionHandle {
    Arc::new(RwLock::new(Collection::new(namespace)))
}
