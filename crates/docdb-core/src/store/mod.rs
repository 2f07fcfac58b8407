//! The in-process document store the command engine runs against.
//!
//! Databases and collections are created lazily. Each collection sits
//! behind its own lock; a bulk execution or multi-document write holds that
//! lock for its whole duration.

mod aggregate;
mod bulk;
mod collection;
mod database;
pub mod geo;
mod index;
pub mod query;
mod registry;
mod result;
pub mod update;

pub use bulk::{evaluate_write_concern, BulkFind, BulkWriteOperation};
pub use collection::{Collection, FindAndModify, FindCursor};
pub use database::{CollectionHandle, Database};
pub use geo::{GeoNear, DEFAULT_GEO_LIMIT};
pub use index::{index_name_from_keys, key_patterns_equal, Index, IndexDefinition, IndexValue};
pub use registry::{IndexRegistry, ID_INDEX_NAME};
pub use result::{
    BulkExecution, NativeBulkResult, NativeUpsert, NativeWriteConcernError, NativeWriteError,
    WriteResult,
};

use crate::error::{CoreError, CoreResult};
use crate::namespace::Namespace;
use crate::write_concern::WriteConcern;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct InMemoryStore {
    databases: RwLock<BTreeMap<String, Arc<Database>>>,
    replica_count: u32,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(1)
    }
}

impl InMemoryStore {
    /// A store emulating `replica_count` data-bearing members for
    /// write-concern evaluation.
    pub fn new(replica_count: u32) -> Self {
        Self {
            databases: RwLock::new(BTreeMap::new()),
            replica_count,
        }
    }

    pub fn replica_count(&self) -> u32 {
        self.replica_count
    }

    pub fn database(&self, name: &str) -> Option<Arc<Database>> {
        self.databases.read().get(name).cloned()
    }

    pub fn database_or_create(&self, name: &str) -> Arc<Database> {
        if let Some(db) = self.database(name) {
            return db;
        }
        self.databases
            .write()
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(Database::new(name)))
            .clone()
    }

    /// Names of databases holding at least one collection.
    pub fn database_names(&self) -> Vec<String> {
        self.databases
            .read()
            .iter()
            .filter(|(_, db)| !db.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Returns whether the database existed.
    pub fn drop_database(&self, name: &str) -> bool {
        let dropped = self.databases.write().remove(name).is_some();
        if dropped {
            tracing::info!(target: "docdb::store", database = name, "dropped database");
        }
        dropped
    }

    pub fn collection(&self, ns: &Namespace) -> Option<CollectionHandle> {
        self.database(ns.database())?.collection(ns.collection())
    }

    pub fn collection_or_create(&self, ns: &Namespace) -> CollectionHandle {
        self.database_or_create(ns.database())
            .collection_or_create(ns.collection())
    }

    /// Returns whether the collection was created. An existing one is left as is.
    pub fn create_collection(&self, ns: &Namespace) -> bool {
        self.database_or_create(ns.database())
            .create_collection(ns.collection())
            .is_ok()
    }

    /// Returns whether the collection existed.
    pub fn drop_collection(&self, ns: &Namespace) -> bool {
        let dropped = self
            .database(ns.database())
            .and_then(|db| db.take_collection(ns.collection()))
            .is_some();
        if dropped {
            tracing::info!(target: "docdb::store", ns = %ns, "dropped collection");
        }
        dropped
    }

    /// Move a collection, optionally replacing an existing target.
    pub fn rename_collection(&self, from: &Namespace, to: &Namespace, drop_target: bool) -> CoreResult<()> {
        if from == to {
            return Err(CoreError::InvalidNamespace(
                "Can't rename a collection to itself".into(),
            ));
        }
        let source_db = self
            .database(from.database())
            .filter(|db| db.has_collection(from.collection()))
            .ok_or_else(|| CoreError::NamespaceNotFound(from.full_name()))?;
        let target_db = self.database_or_create(to.database());
        if target_db.has_collection(to.collection()) {
            if !drop_target {
                return Err(CoreError::NamespaceExists(to.full_name()));
            }
            target_db.take_collection(to.collection());
        }
        let handle = source_db
            .take_collection(from.collection())
            .ok_or_else(|| CoreError::NamespaceNotFound(from.full_name()))?;
        handle.write().set_namespace(to.clone());
        target_db.put_collection(to.collection(), handle);
        tracing::info!(target: "docdb::store", from = %from, to = %to, "renamed collection");
        Ok(())
    }

    /// Run a bulk operation against `ns`, creating the collection if needed.
    pub fn execute(
        &self,
        ns: &Namespace,
        operation: BulkWriteOperation,
        write_concern: &WriteConcern,
    ) -> CoreResult<BulkExecution> {
        let handle = self.collection_or_create(ns);
        let mut collection = handle.write();
        operation.execute(&mut collection, write_concern, self.replica_count)
    }
}
