use super::index::{key_patterns_equal, Index, IndexDefinition};
use crate::error::{codes, CoreError, CoreResult};
use crate::values::{Document, ID_FIELD};
use serde_json::json;

pub const ID_INDEX_NAME: &str = "_id_";

/// Manages all indexes of a single collection, in creation order.
///
/// Always holds the unique `_id_` index; indexes are maintained on every
/// insert, update and remove.
#[derive(Debug, Clone)]
pub struct IndexRegistry {
    indexes: Vec<Index>,
}

impl IndexRegistry {
    pub fn new(namespace: &str) -> Self {
        let mut keys = Document::new();
        keys.insert(ID_FIELD.to_owned(), json!(1));
        Self {
            indexes: vec![Index::new(IndexDefinition {
                name: ID_INDEX_NAME.to_owned(),
                namespace: namespace.to_owned(),
                keys,
                unique: true,
            })],
        }
    }

    /// Add an index over `docs`.
    ///
    /// Re-adding an identical definition is a no-op and returns `false`.
    pub fn add_index<'a>(
        &mut self,
        definition: IndexDefinition,
        docs: impl Iterator<Item = (u64, &'a Document)>,
    ) -> CoreResult<bool> {
        if let Some(existing) = self.find_by_name(&definition.name) {
            if key_patterns_equal(&existing.definition().keys, &definition.keys) {
                return Ok(false);
            }
            return Err(CoreError::Operation {
                code: codes::INDEX_KEY_SPECS_CONFLICT,
                message: format!(
                    "Index with name: {} already exists with different options",
                    definition.name
                ),
            });
        }
        let mut index = Index::new(definition);
        for (seq, doc) in docs {
            if let Some(key) = index.conflict(doc, None) {
                return Err(duplicate_key(&index, &key));
            }
            index.insert(seq, doc);
        }
        self.indexes.push(index);
        Ok(true)
    }

    pub fn remove_index(&mut self, name: &str) -> CoreResult<()> {
        if name == ID_INDEX_NAME {
            return Err(CoreError::Operation {
                code: codes::INVALID_OPTIONS,
                message: "cannot drop _id index".into(),
            });
        }
        let position = self
            .indexes
            .iter()
            .position(|index| index.name() == name)
            .ok_or_else(|| CoreError::IndexNotFound(name.to_owned()))?;
        self.indexes.remove(position);
        Ok(())
    }

    /// Drop every index except `_id_`.
    pub fn remove_all(&mut self) {
        self.indexes.retain(|index| index.name() == ID_INDEX_NAME);
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|index| index.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Index> {
        self.indexes.iter()
    }

    pub fn index_names(&self) -> Vec<&str> {
        self.indexes.iter().map(Index::name).collect()
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// The first index usable for proximity queries.
    pub fn geo_index(&self) -> Option<&Index> {
        self.indexes
            .iter()
            .find(|index| index.definition().geo_field().is_some())
    }

    /// Fail with `DuplicateKey` if `doc` would break a unique index.
    /// `seq` excludes the document being replaced.
    pub fn check_unique(&self, doc: &Document, seq: Option<u64>) -> CoreResult<()> {
        for index in &self.indexes {
            if let Some(key) = index.conflict(doc, seq) {
                return Err(duplicate_key(index, &key));
            }
        }
        Ok(())
    }

    pub fn on_insert(&mut self, seq: u64, doc: &Document) {
        for index in &mut self.indexes {
            index.insert(seq, doc);
        }
    }

    pub fn on_remove(&mut self, seq: u64, doc: &Document) {
        for index in &mut self.indexes {
            index.remove(seq, doc);
        }
    }

    pub fn on_update(&mut self, seq: u64, old: &Document, new: &Document) {
        for index in &mut self.indexes {
            index.remove(seq, old);
            index.insert(seq, new);
        }
    }

    /// Point every index at a new namespace after a rename.
    pub fn set_namespace(&mut self, namespace: &str) {
        for index in &mut self.indexes {
            index.set_namespace(namespace);
        }
    }
}

fn duplicate_key(index: &Index, key: &super::index::IndexValue) -> CoreError {
    CoreError::DuplicateKey {
        namespace: index.definition().namespace.clone(),
        index: index.name().to_owned(),
        key: index.describe_key(key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::store::index::index_name_from_keys;

    fn definition(keys: Document, unique: bool) -> IndexDefinition {
        IndexDefinition {
            name: index_name_from_keys(&keys),
            namespace: "db.users".into(),
            keys,
            unique,
        }
    }

    #[test]
    fn id_index_always_present() {
        let registry = IndexRegistry::new("db.users");
        assert_eq!(registry.index_names(), vec!["_id_"]);
        let mut registry = registry;
        assert_eq!(
            registry.remove_index("_id_").unwrap_err().code(),
            codes::INVALID_OPTIONS
        );
    }

    #[test]
    fn add_is_idempotent_and_builds_over_existing_docs() {
        let mut registry = IndexRegistry::new("db.users");
        let docs = [doc! { "_id" => 1, "email" => "a" }, doc! { "_id" => 2, "email" => "b" }];
        let created = registry
            .add_index(
                definition(doc! { "email" => 1 }, true),
                docs.iter().enumerate().map(|(i, d)| (i as u64, d)),
            )
            .unwrap();
        assert!(created);
        let again = registry
            .add_index(definition(doc! { "email" => 1 }, true), std::iter::empty())
            .unwrap();
        assert!(!again);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn unique_violation_on_existing_data() {
        let mut registry = IndexRegistry::new("db.users");
        let docs = [doc! { "_id" => 1, "email" => "a" }, doc! { "_id" => 2, "email" => "a" }];
        let err = registry
            .add_index(
                definition(doc! { "email" => 1 }, true),
                docs.iter().enumerate().map(|(i, d)| (i as u64, d)),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn check_unique_and_maintenance() {
        let mut registry = IndexRegistry::new("db.users");
        let alice = doc! { "_id" => 1 };
        registry.on_insert(0, &alice);
        let err = registry.check_unique(&doc! { "_id" => 1 }, None).unwrap_err();
        assert!(err.to_string().contains("_id_"));
        assert!(registry.check_unique(&doc! { "_id" => 1 }, Some(0)).is_ok());

        registry.on_remove(0, &alice);
        assert!(registry.check_unique(&doc! { "_id" => 1 }, None).is_ok());
    }

    #[test]
    fn drop_unknown_index() {
        let mut registry = IndexRegistry::new("db.users");
        let err = registry.remove_index("name_1").unwrap_err();
        assert!(matches!(err, CoreError::IndexNotFound(name) if name == "name_1"));
    }
}
