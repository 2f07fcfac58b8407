//! Single-operation writes and queries, for callers that predate write
//! commands. Each call touches one collection and returns a
//! getLastError-style outcome.

use crate::command::{DeleteItem, UpdateItem};
use crate::error::CoreResult;
use crate::handlers::write::validate_update;
use crate::namespace::Namespace;
use crate::store::InMemoryStore;
use crate::values::{Document, Value};

pub type UpdateRequest = UpdateItem;
pub type DeleteRequest = DeleteItem;

/// Outcome of one acknowledged legacy write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteConcernResult {
    pub count: u64,
    pub updated_existing: bool,
    pub upserted_id: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub namespace: Namespace,
    pub documents: Vec<Document>,
    /// Always 0: every result is returned in full.
    pub cursor_id: i64,
}

impl QueryResult {
    fn exhausted(namespace: Namespace, documents: Vec<Document>) -> Self {
        Self {
            namespace,
            documents,
            cursor_id: 0,
        }
    }
}

pub fn insert(store: &InMemoryStore, ns: &Namespace, doc: Document) -> CoreResult<WriteConcernResult> {
    store.collection_or_create(ns).write().insert(doc)?;
    Ok(WriteConcernResult {
        count: 1,
        updated_existing: false,
        upserted_id: None,
    })
}

/// Counts the matched documents, or 1 for an upsert.
pub fn update(
    store: &InMemoryStore,
    ns: &Namespace,
    request: &UpdateRequest,
) -> CoreResult<WriteConcernResult> {
    validate_update(request)?;
    let result = store.collection_or_create(ns).write().update(
        &request.filter,
        &request.update,
        request.upsert,
        request.multi,
    )?;
    Ok(match result.upserted_id {
        Some(id) => WriteConcernResult {
            count: 1,
            updated_existing: false,
            upserted_id: Some(id),
        },
        None => WriteConcernResult {
            count: result.n,
            updated_existing: result.updated_existing,
            upserted_id: None,
        },
    })
}

pub fn delete(
    store: &InMemoryStore,
    ns: &Namespace,
    request: &DeleteRequest,
) -> CoreResult<WriteConcernResult> {
    let count = match store.collection(ns) {
        Some(handle) => {
            let mut collection = handle.write();
            if request.multi {
                collection.remove(&request.filter)?.n
            } else {
                u64::from(collection.find_and_remove(&request.filter)?.is_some())
            }
        }
        None => 0,
    };
    Ok(WriteConcernResult {
        count,
        updated_existing: count != 0,
        upserted_id: None,
    })
}

/// Matching documents in natural order. `limit` follows find semantics:
/// zero is unbounded, negative uses the absolute value.
pub fn query(
    store: &InMemoryStore,
    ns: &Namespace,
    filter: Document,
    projection: Option<Document>,
    limit: i64,
    skip: usize,
) -> CoreResult<QueryResult> {
    let documents = match store.collection(ns) {
        Some(handle) => handle
            .read()
            .find(filter, projection)
            .skip(skip)
            .limit(limit)
            .to_vec()?,
        None => Vec::new(),
    };
    Ok(QueryResult::exhausted(ns.clone(), documents))
}

/// Cursors are never left open, so there is nothing more to read.
pub fn get_more(ns: &Namespace, cursor_id: i64) -> QueryResult {
    tracing::debug!(target: "docdb::legacy", ns = %ns, cursor_id, "getMore on exhausted cursor");
    QueryResult::exhausted(ns.clone(), Vec::new())
}

pub fn kill_cursors(cursor_ids: &[i64]) {
    tracing::info!(target: "docdb::legacy", cursors = ?cursor_ids, "killCursors");
}
