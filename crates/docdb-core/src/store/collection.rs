use super::aggregate::run_pipeline;
use super::bulk::BulkWriteOperation;
use super::geo::{self, GeoNear, DEFAULT_GEO_LIMIT};
use super::index::{index_name_from_keys, IndexDefinition};
use super::query::{compare_by_keys, matches, project, resolve, sort_documents, sort_keys};
use super::registry::IndexRegistry;
use super::result::WriteResult;
use super::update::{apply_replacement, apply_update, is_operator_update, upsert_seed};
use crate::error::{CoreError, CoreResult};
use crate::namespace::Namespace;
use crate::values::{get_path, values_equal, Document, ObjectId, Value, ID_FIELD};
use serde_json::json;
use std::collections::BTreeMap;

/// Arguments of a find-and-modify.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindAndModify {
    pub query: Document,
    pub sort: Option<Document>,
    pub remove: bool,
    pub update: Option<Document>,
    pub return_new: bool,
    pub upsert: bool,
    pub fields: Option<Document>,
}

/// A single collection storing documents in insertion order.
///
/// Documents are keyed by a sequence number so natural order survives
/// updates; every unique index is enforced on each write.
#[derive(Debug)]
pub struct Collection {
    namespace: Namespace,
    docs: BTreeMap<u64, Document>,
    next_seq: u64,
    indexes: IndexRegistry,
}

impl Collection {
    pub fn new(namespace: Namespace) -> Self {
        let indexes = IndexRegistry::new(&namespace.full_name());
        Self {
            namespace,
            docs: BTreeMap::new(),
            next_seq: 0,
            indexes,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub(crate) fn set_namespace(&mut self, namespace: Namespace) {
        self.indexes.set_namespace(&namespace.full_name());
        self.namespace = namespace;
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Iterate over all documents in natural order.
    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.docs.values()
    }

    pub fn initialize_ordered_bulk() -> BulkWriteOperation {
        BulkWriteOperation::new(true)
    }

    pub fn initialize_unordered_bulk() -> BulkWriteOperation {
        BulkWriteOperation::new(false)
    }

    /// Insert a document, generating `_id` when it is missing.
    /// Returns the stored `_id`.
    pub fn insert(&mut self, doc: Document) -> CoreResult<Value> {
        let doc = with_id(doc)?;
        self.indexes.check_unique(&doc, None)?;
        let id = doc.get(ID_FIELD).cloned().unwrap_or(Value::Null);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.indexes.on_insert(seq, &doc);
        self.docs.insert(seq, doc);
        Ok(id)
    }

    fn matching(&self, filter: &Document) -> CoreResult<Vec<u64>> {
        let mut seqs = Vec::new();
        for (seq, doc) in &self.docs {
            if matches(doc, filter)? {
                seqs.push(*seq);
            }
        }
        Ok(seqs)
    }

    pub fn update(
        &mut self,
        filter: &Document,
        update: &Document,
        upsert: bool,
        multi: bool,
    ) -> CoreResult<WriteResult> {
        if multi && !is_operator_update(update) {
            return Err(CoreError::failed_to_parse(
                "multi update is not supported for replacement-style update",
            ));
        }
        let mut targets = self.matching(filter)?;
        if !multi {
            targets.truncate(1);
        }
        if targets.is_empty() {
            if !upsert {
                return Ok(WriteResult::default());
            }
            let id = self.upsert(filter, update)?;
            return Ok(WriteResult {
                n: 1,
                updated_existing: false,
                modified: 0,
                upserted_id: Some(id),
            });
        }
        let mut modified = 0;
        for seq in &targets {
            if self.apply_to(*seq, update)? {
                modified += 1;
            }
        }
        Ok(WriteResult {
            n: targets.len() as u64,
            updated_existing: true,
            modified,
            upserted_id: None,
        })
    }

    /// Update one stored document in place; returns whether it changed.
    fn apply_to(&mut self, seq: u64, update: &Document) -> CoreResult<bool> {
        let Some(current) = self.docs.get(&seq) else {
            return Err(CoreError::Internal(format!("document {seq} vanished during update")));
        };
        let next = if is_operator_update(update) {
            let mut next = current.clone();
            apply_update(&mut next, update, false)?;
            next
        } else {
            apply_replacement(current, update)?
        };
        if next == *current {
            return Ok(false);
        }
        self.indexes.check_unique(&next, Some(seq))?;
        self.indexes.on_update(seq, current, &next);
        self.docs.insert(seq, next);
        Ok(true)
    }

    fn upsert(&mut self, filter: &Document, update: &Document) -> CoreResult<Value> {
        let mut seed = upsert_seed(filter)?;
        let doc = if is_operator_update(update) {
            apply_update(&mut seed, update, true)?;
            seed
        } else {
            let mut doc = Document::new();
            if let Some(id) = update.get(ID_FIELD).or_else(|| seed.get(ID_FIELD)) {
                doc.insert(ID_FIELD.to_owned(), id.clone());
            }
            for (key, value) in update.iter().filter(|(key, _)| *key != ID_FIELD) {
                doc.insert(key.clone(), value.clone());
            }
            doc
        };
        self.insert(doc)
    }

    fn remove_seq(&mut self, seq: u64) -> Option<Document> {
        let doc = self.docs.remove(&seq)?;
        self.indexes.on_remove(seq, &doc);
        Some(doc)
    }

    /// Remove every matching document.
    pub fn remove(&mut self, filter: &Document) -> CoreResult<WriteResult> {
        let targets = self.matching(filter)?;
        let n = targets
            .into_iter()
            .filter_map(|seq| self.remove_seq(seq))
            .count() as u64;
        Ok(WriteResult {
            n,
            ..WriteResult::default()
        })
    }

    /// Remove the first match in natural order.
    pub fn find_and_remove(&mut self, filter: &Document) -> CoreResult<Option<Document>> {
        match self.matching(filter)?.first() {
            Some(seq) => Ok(self.remove_seq(*seq)),
            None => Ok(None),
        }
    }

    pub fn find(&self, filter: Document, projection: Option<Document>) -> FindCursor<'_> {
        FindCursor {
            collection: self,
            filter,
            projection,
            sort: None,
            skip: 0,
            limit: 0,
        }
    }

    /// Count matches after `skip`; a limit of zero or less is unbounded.
    pub fn count(&self, filter: &Document, skip: u64, limit: i64) -> CoreResult<u64> {
        let total = self.matching(filter)?.len() as u64;
        let remaining = total.saturating_sub(skip);
        Ok(if limit > 0 {
            remaining.min(limit as u64)
        } else {
            remaining
        })
    }

    /// Distinct values of `key` among matching documents, first-seen order.
    /// Array values contribute their elements.
    pub fn distinct(&self, key: &str, filter: &Document) -> CoreResult<Vec<Value>> {
        let mut out: Vec<Value> = Vec::new();
        for seq in self.matching(filter)? {
            let Some(doc) = self.docs.get(&seq) else { continue };
            for value in resolve(doc, key) {
                let items = match value {
                    Value::Array(items) => items.iter().collect::<Vec<_>>(),
                    single => vec![single],
                };
                for item in items {
                    if !out.iter().any(|seen| values_equal(seen, item)) {
                        out.push(item.clone());
                    }
                }
            }
        }
        Ok(out)
    }

    pub fn aggregate(&self, pipeline: &[Document]) -> CoreResult<Vec<Document>> {
        run_pipeline(self.docs.values().cloned().collect(), pipeline)
    }

    pub fn find_and_modify(&mut self, request: &FindAndModify) -> CoreResult<Option<Document>> {
        let update = match (&request.update, request.remove) {
            (Some(_), true) => {
                return Err(CoreError::failed_to_parse(
                    "Cannot specify both an update and remove=true",
                ))
            }
            (None, false) => {
                return Err(CoreError::failed_to_parse(
                    "Either an update or remove=true must be specified",
                ))
            }
            (update, _) => update.as_ref(),
        };

        let mut targets = self.matching(&request.query)?;
        if let Some(sort) = &request.sort {
            let keys = sort_keys(sort)?;
            targets.sort_by(|a, b| match (self.docs.get(a), self.docs.get(b)) {
                (Some(a), Some(b)) => compare_by_keys(&keys, a, b),
                _ => std::cmp::Ordering::Equal,
            });
        }
        let target = targets.first().copied();

        let outcome = match (target, update) {
            (Some(seq), None) => self.remove_seq(seq),
            (None, None) => None,
            (Some(seq), Some(update)) => {
                let before = self.docs.get(&seq).cloned();
                self.apply_to(seq, update)?;
                if request.return_new {
                    self.docs.get(&seq).cloned()
                } else {
                    before
                }
            }
            (None, Some(update)) if request.upsert => {
                self.upsert(&request.query, update)?;
                if request.return_new {
                    self.docs.values().next_back().cloned()
                } else {
                    None
                }
            }
            (None, Some(_)) => None,
        };
        match (outcome, &request.fields) {
            (Some(doc), Some(fields)) => Ok(Some(project(&doc, fields)?)),
            (outcome, _) => Ok(outcome),
        }
    }

    /// Create an index over the existing documents. Returns `false` when an
    /// identical index already exists.
    pub fn create_index(
        &mut self,
        keys: Document,
        name: Option<String>,
        unique: bool,
    ) -> CoreResult<bool> {
        if keys.is_empty() {
            return Err(CoreError::bad_value("Index keys cannot be empty."));
        }
        let definition = IndexDefinition {
            name: name.unwrap_or_else(|| index_name_from_keys(&keys)),
            namespace: self.namespace.full_name(),
            keys,
            unique,
        };
        let created = self
            .indexes
            .add_index(definition, self.docs.iter().map(|(seq, doc)| (*seq, doc)))?;
        Ok(created)
    }

    pub fn drop_index(&mut self, name: &str) -> CoreResult<()> {
        self.indexes.remove_index(name)
    }

    pub fn drop_all_indexes(&mut self) {
        self.indexes.remove_all();
    }

    pub fn index_definitions(&self) -> impl Iterator<Item = &IndexDefinition> {
        self.indexes.iter().map(|index| index.definition())
    }

    /// `listIndexes` entries, `_id_` first.
    pub fn indexes(&self) -> Vec<Document> {
        self.index_definitions()
            .map(IndexDefinition::to_document)
            .collect()
    }

    /// Documents nearest to a point, ascending by distance, as `{dis, obj}`.
    pub fn geo_near(&self, request: &GeoNear) -> CoreResult<Vec<Document>> {
        let field = self
            .indexes
            .geo_index()
            .and_then(|index| index.definition().geo_field())
            .ok_or_else(|| CoreError::bad_value("no geo indices for geoNear"))?;
        let mut hits = Vec::new();
        for doc in self.docs.values() {
            if let Some(query) = &request.query {
                if !matches(doc, query)? {
                    continue;
                }
            }
            let Some(location) = get_path(doc, field).and_then(geo::point) else {
                continue;
            };
            let dis = geo::distance(request.near, location, request.spherical);
            if request.max_distance.is_some_and(|max| dis > max) {
                continue;
            }
            hits.push((dis, doc));
        }
        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        hits.truncate(request.limit.unwrap_or(DEFAULT_GEO_LIMIT));
        Ok(hits
            .into_iter()
            .map(|(dis, doc)| {
                let mut out = Document::new();
                out.insert("dis".into(), json!(dis));
                out.insert("obj".into(), Value::Object(doc.clone()));
                out
            })
            .collect())
    }
}

fn with_id(doc: Document) -> CoreResult<Document> {
    match doc.get(ID_FIELD) {
        Some(Value::Array(_)) => Err(CoreError::bad_value("can't use an array for _id")),
        Some(_) => Ok(doc),
        None => {
            let mut out = Document::new();
            out.insert(ID_FIELD.to_owned(), ObjectId::generate().into());
            out.extend(doc);
            Ok(out)
        }
    }
}

/// A lazily evaluated query over one collection.
///
/// Applied in order: filter in natural order, stable sort, skip, limit,
/// projection.
#[derive(Debug)]
pub struct FindCursor<'a> {
    collection: &'a Collection,
    filter: Document,
    projection: Option<Document>,
    sort: Option<Document>,
    skip: usize,
    limit: i64,
}

impl FindCursor<'_> {
    pub fn sort(mut self, spec: Document) -> Self {
        self.sort = Some(spec);
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    /// Zero means unbounded; a negative limit uses its absolute value.
    pub fn limit(mut self, n: i64) -> Self {
        self.limit = n;
        self
    }

    pub fn to_vec(self) -> CoreResult<Vec<Document>> {
        let mut docs = Vec::new();
        for doc in self.collection.iter() {
            if matches(doc, &self.filter)? {
                docs.push(doc.clone());
            }
        }
        if let Some(spec) = &self.sort {
            sort_documents(&mut docs, spec)?;
        }
        let limit = match self.limit.unsigned_abs() {
            0 => usize::MAX,
            n => usize::try_from(n).unwrap_or(usize::MAX),
        };
        docs.into_iter()
            .skip(self.skip)
            .take(limit)
            .map(|doc| match &self.projection {
                Some(projection) => project(&doc, projection),
                None => Ok(doc),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::error::codes;

    fn users() -> Collection {
        let mut collection = Collection::new(Namespace::new("db", "users"));
        for (id, name, age) in [(1, "Alice", 30), (2, "Bob", 25), (3, "Carol", 35)] {
            collection
                .insert(doc! { "_id" => id, "name" => name, "age" => age })
                .unwrap();
        }
        collection
    }

    #[test]
    fn insert_generates_id_first() {
        let mut collection = Collection::new(Namespace::new("db", "c"));
        let id = collection.insert(doc! { "name" => "x" }).unwrap();
        let stored = collection.iter().next().unwrap();
        assert_eq!(stored.keys().next().map(String::as_str), Some("_id"));
        assert_eq!(stored.get("_id"), Some(&id));
        assert_eq!(id.as_str().map(str::len), Some(32));
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut collection = users();
        let err = collection.insert(doc! { "_id" => 1 }).unwrap_err();
        assert_eq!(err.code(), codes::DUPLICATE_KEY);
        assert_eq!(collection.len(), 3);
    }

    #[test]
    fn update_single_and_multi() {
        let mut collection = users();
        let result = collection
            .update(
                &doc! { "age" => json!({"$gte": 30}) },
                &doc! { "$inc" => json!({"age": 1}) },
                false,
                true,
            )
            .unwrap();
        assert_eq!(result.n, 2);
        assert_eq!(result.modified, 2);
        assert!(result.updated_existing);

        let result = collection
            .update(&doc! {}, &doc! { "$set" => json!({"seen": true}) }, false, false)
            .unwrap();
        assert_eq!(result.n, 1);
    }

    #[test]
    fn replacement_upsert_takes_id_from_filter() {
        let mut collection = users();
        let result = collection
            .update(&doc! { "_id" => 10 }, &doc! { "name" => "Dan" }, true, false)
            .unwrap();
        assert_eq!(result.upserted_id, Some(json!(10)));
        assert!(!result.updated_existing);
        let found = collection.find(doc! { "_id" => 10 }, None).to_vec().unwrap();
        assert_eq!(found, vec![doc! { "_id" => 10, "name" => "Dan" }]);
    }

    #[test]
    fn operator_upsert_builds_from_filter() {
        let mut collection = users();
        let result = collection
            .update(
                &doc! { "name" => "Eve" },
                &doc! { "$set" => json!({"age": 40}) },
                true,
                false,
            )
            .unwrap();
        let id = result.upserted_id.unwrap();
        let found = collection.find(doc! { "_id" => id }, None).to_vec().unwrap();
        assert_eq!(found[0]["name"], json!("Eve"));
        assert_eq!(found[0]["age"], json!(40));
    }

    #[test]
    fn unique_index_guards_updates() {
        let mut collection = users();
        collection
            .create_index(doc! { "name" => 1 }, None, true)
            .unwrap();
        let err = collection
            .update(
                &doc! { "_id" => 2 },
                &doc! { "$set" => json!({"name": "Alice"}) },
                false,
                false,
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey { ref index, .. } if index == "name_1"));
    }

    #[test]
    fn remove_and_find_and_remove() {
        let mut collection = users();
        let removed = collection.find_and_remove(&doc! {}).unwrap().unwrap();
        assert_eq!(removed["_id"], json!(1));
        assert_eq!(collection.remove(&doc! {}).unwrap().n, 2);
        assert!(collection.is_empty());
    }

    #[test]
    fn cursor_sort_skip_limit_project() {
        let collection = users();
        let docs = collection
            .find(doc! {}, Some(doc! { "name" => 1, "_id" => 0 }))
            .sort(doc! { "age" => 1 })
            .skip(1)
            .limit(-1)
            .to_vec()
            .unwrap();
        assert_eq!(docs, vec![doc! { "name" => "Alice" }]);
    }

    #[test]
    fn count_and_distinct() {
        let mut collection = users();
        collection
            .insert(doc! { "_id" => 4, "name" => "Alice", "tags" => json!(["a", "b"]) })
            .unwrap();
        collection.insert(doc! { "_id" => 5, "tags" => "a" }).unwrap();
        assert_eq!(collection.count(&doc! {}, 1, 0).unwrap(), 4);
        assert_eq!(collection.count(&doc! {}, 0, 2).unwrap(), 2);
        assert_eq!(
            collection.distinct("name", &doc! {}).unwrap(),
            vec![json!("Alice"), json!("Bob"), json!("Carol")]
        );
        assert_eq!(
            collection.distinct("tags", &doc! {}).unwrap(),
            vec![json!("a"), json!("b")]
        );
    }

    #[test]
    fn find_and_modify_variants() {
        let mut collection = users();
        let old = collection
            .find_and_modify(&FindAndModify {
                query: doc! { "name" => "Bob" },
                update: Some(doc! { "$set" => json!({"age": 26}) }),
                ..FindAndModify::default()
            })
            .unwrap()
            .unwrap();
        assert_eq!(old["age"], json!(25));

        let new = collection
            .find_and_modify(&FindAndModify {
                sort: Some(doc! { "age" => -1 }),
                update: Some(doc! { "$inc" => json!({"age": 1}) }),
                return_new: true,
                fields: Some(doc! { "age" => 1 }),
                ..FindAndModify::default()
            })
            .unwrap()
            .unwrap();
        assert_eq!(new, doc! { "_id" => 3, "age" => 36 });

        let missing = collection
            .find_and_modify(&FindAndModify {
                query: doc! { "name" => "Nobody" },
                remove: true,
                ..FindAndModify::default()
            })
            .unwrap();
        assert!(missing.is_none());

        let err = collection
            .find_and_modify(&FindAndModify::default())
            .unwrap_err();
        assert_eq!(err.code(), codes::FAILED_TO_PARSE);
    }

    #[test]
    fn index_lifecycle() {
        let mut collection = users();
        assert!(collection.create_index(doc! { "age" => -1 }, None, false).unwrap());
        assert!(!collection.create_index(doc! { "age" => -1 }, None, false).unwrap());
        let names: Vec<Value> = collection.indexes().iter().map(|d| d["name"].clone()).collect();
        assert_eq!(names, vec![json!("_id_"), json!("age_-1")]);
        collection.drop_index("age_-1").unwrap();
        assert!(matches!(
            collection.drop_index("age_-1"),
            Err(CoreError::IndexNotFound(_))
        ));
    }

    #[test]
    fn geo_near_orders_by_distance() {
        let mut collection = Collection::new(Namespace::new("db", "places"));
        assert!(collection
            .geo_near(&GeoNear {
                near: (0.0, 0.0),
                query: None,
                limit: None,
                max_distance: None,
                spherical: false,
            })
            .is_err());
        collection.create_index(doc! { "loc" => "2d" }, None, false).unwrap();
        collection.insert(doc! { "_id" => "far", "loc" => json!([10, 0]) }).unwrap();
        collection.insert(doc! { "_id" => "near", "loc" => json!([1, 0]) }).unwrap();
        collection.insert(doc! { "_id" => "none" }).unwrap();
        let results = collection
            .geo_near(&GeoNear {
                near: (0.0, 0.0),
                query: None,
                limit: Some(5),
                max_distance: Some(5.0),
                spherical: false,
            })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["dis"], json!(1.0));
        assert_eq!(results[0]["obj"]["_id"], json!("near"));
    }
}
