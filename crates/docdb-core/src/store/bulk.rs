//! Sub-batch execution against one collection.

use super::collection::Collection;
use super::result::{
    last_error_response, BulkExecution, NativeBulkResult, NativeUpsert, NativeWriteConcernError,
    NativeWriteError,
};
use super::update::is_operator_update;
use crate::error::{codes, CoreError, CoreResult};
use crate::values::Document;
use crate::write_concern::{Acknowledgment, WriteConcern};
use serde_json::json;

#[derive(Debug, Clone, PartialEq)]
enum BulkRequest {
    Insert(Document),
    Replace {
        filter: Document,
        replacement: Document,
        upsert: bool,
    },
    Update {
        filter: Document,
        update: Document,
        upsert: bool,
        multi: bool,
    },
    Remove {
        filter: Document,
        multi: bool,
    },
}

/// A batch of writes executed together under one write concern.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkWriteOperation {
    ordered: bool,
    requests: Vec<BulkRequest>,
}

impl BulkWriteOperation {
    pub fn new(ordered: bool) -> Self {
        Self {
            ordered,
            requests: Vec::new(),
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn insert(&mut self, doc: Document) -> &mut Self {
        self.requests.push(BulkRequest::Insert(doc));
        self
    }

    /// Start a filtered request. The returned builder queues exactly one
    /// request when finished.
    pub fn find(&mut self, filter: Document) -> BulkFind<'_> {
        BulkFind {
            operation: self,
            filter,
            upsert: false,
        }
    }

    /// Apply every request to `collection`, then evaluate `write_concern`
    /// against `replica_count` acknowledging members.
    pub fn execute(
        self,
        collection: &mut Collection,
        write_concern: &WriteConcern,
        replica_count: u32,
    ) -> CoreResult<BulkExecution> {
        let mut result = NativeBulkResult::new(true);
        let mut write_errors = Vec::new();
        for (index, request) in self.requests.into_iter().enumerate() {
            match apply(collection, request, index, &mut result) {
                Ok(()) => {}
                Err(err) if err.is_write_error() => {
                    write_errors.push(NativeWriteError::from_error(index, &err));
                    if self.ordered {
                        break;
                    }
                }
                Err(err) => return Err(err),
            }
        }
        tracing::debug!(
            target: "docdb::store",
            ns = %collection.namespace(),
            inserted = result.inserted_count,
            matched = result.matched_count,
            modified = result.modified_count,
            removed = result.removed_count,
            upserted = result.upserts.len(),
            errors = write_errors.len(),
            "executed bulk operation"
        );

        if !write_concern.is_acknowledged() {
            return Ok(BulkExecution {
                result: NativeBulkResult::new(false),
                write_errors: Vec::new(),
                write_concern_error: None,
            });
        }
        Ok(BulkExecution {
            result,
            write_errors,
            write_concern_error: evaluate_write_concern(write_concern, replica_count),
        })
    }
}

fn apply(
    collection: &mut Collection,
    request: BulkRequest,
    index: usize,
    result: &mut NativeBulkResult,
) -> CoreResult<()> {
    match request {
        BulkRequest::Insert(doc) => {
            collection.insert(doc)?;
            result.inserted_count += 1;
        }
        BulkRequest::Replace {
            filter,
            replacement,
            upsert,
        } => {
            if is_operator_update(&replacement) {
                return Err(CoreError::bad_value(
                    "Replacement document must not contain update operators",
                ));
            }
            record_update(collection.update(&filter, &replacement, upsert, false)?, index, result);
        }
        BulkRequest::Update {
            filter,
            update,
            upsert,
            multi,
        } => {
            if !is_operator_update(&update) {
                return Err(CoreError::failed_to_parse(
                    "Update document requires atomic operators",
                ));
            }
            record_update(collection.update(&filter, &update, upsert, multi)?, index, result);
        }
        BulkRequest::Remove { filter, multi } => {
            let removed = if multi {
                collection.remove(&filter)?.n
            } else {
                u64::from(collection.find_and_remove(&filter)?.is_some())
            };
            result.removed_count += removed;
        }
    }
    Ok(())
}

fn record_update(outcome: super::WriteResult, index: usize, result: &mut NativeBulkResult) {
    match outcome.upserted_id {
        Some(id) => result.upserts.push(NativeUpsert { index, id }),
        None => {
            result.matched_count += outcome.n;
            result.modified_count += outcome.modified;
        }
    }
}

/// The write-concern failure for an applied write, if the requested
/// acknowledgment cannot be met.
pub fn evaluate_write_concern(
    write_concern: &WriteConcern,
    replica_count: u32,
) -> Option<NativeWriteConcernError> {
    match write_concern.w {
        Acknowledgment::Nodes(n) if n > replica_count => {
            Some(match write_concern.wtimeout_ms {
                Some(_) => {
                    let mut response = last_error_response(
                        codes::WRITE_CONCERN_TIMEOUT,
                        "waiting for replication timed out",
                    );
                    response.shift_remove("n");
                    response.insert("wtimeout".into(), json!(true));
                    NativeWriteConcernError {
                        code: codes::WRITE_CONCERN_TIMEOUT,
                        response,
                    }
                }
                None => {
                    let mut response = last_error_response(
                        codes::UNSATISFIABLE_WRITE_CONCERN,
                        "Not enough data-bearing nodes",
                    );
                    response.shift_remove("n");
                    NativeWriteConcernError {
                        code: codes::UNSATISFIABLE_WRITE_CONCERN,
                        response,
                    }
                }
            })
        }
        _ => None,
    }
}

/// Builder for a filtered bulk request.
#[derive(Debug)]
pub struct BulkFind<'a> {
    operation: &'a mut BulkWriteOperation,
    filter: Document,
    upsert: bool,
}

impl BulkFind<'_> {
    pub fn upsert(mut self) -> Self {
        self.upsert = true;
        self
    }

    pub fn replace_one(self, replacement: Document) {
        self.operation.requests.push(BulkRequest::Replace {
            filter: self.filter,
            replacement,
            upsert: self.upsert,
        });
    }

    pub fn update_one(self, update: Document) {
        self.push_update(update, false);
    }

    pub fn update(self, update: Document) {
        self.push_update(update, true);
    }

    pub fn remove_one(self) {
        self.operation.requests.push(BulkRequest::Remove {
            filter: self.filter,
            multi: false,
        });
    }

    pub fn remove(self) {
        self.operation.requests.push(BulkRequest::Remove {
            filter: self.filter,
            multi: true,
        });
    }

    fn push_update(self, update: Document, multi: bool) {
        self.operation.requests.push(BulkRequest::Update {
            filter: self.filter,
            update,
            upsert: self.upsert,
            multi,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::namespace::Namespace;
    use serde_json::json;

    fn users() -> Collection {
        let mut collection = Collection::new(Namespace::new("db", "users"));
        collection.insert(doc! { "_id" => 1, "name" => "Alice" }).unwrap();
        collection.insert(doc! { "_id" => 2, "name" => "Bob" }).unwrap();
        collection
    }

    #[test]
    fn mixed_requests_are_counted() {
        let mut collection = users();
        let mut bulk = Collection::initialize_ordered_bulk();
        bulk.insert(doc! { "_id" => 3, "name" => "Carol" });
        bulk.find(doc! { "_id" => 1 })
            .update_one(doc! { "$set" => json!({"name": "Alicia"}) });
        bulk.find(doc! { "_id" => 9 })
            .upsert()
            .replace_one(doc! { "name" => "Zed" });
        bulk.find(doc! { "name" => "Bob" }).remove_one();

        let execution = bulk
            .execute(&mut collection, &WriteConcern::acknowledged(), 1)
            .unwrap();
        assert!(execution.write_errors.is_empty());
        assert_eq!(execution.result.inserted_count, 1);
        assert_eq!(execution.result.matched_count, 1);
        assert_eq!(execution.result.modified_count, 1);
        assert_eq!(execution.result.removed_count, 1);
        assert_eq!(
            execution.result.upserts,
            vec![NativeUpsert {
                index: 2,
                id: json!(9)
            }]
        );
    }

    #[test]
    fn ordered_stops_unordered_continues() {
        let run = |ordered: bool| {
            let mut collection = users();
            let mut bulk = BulkWriteOperation::new(ordered);
            bulk.insert(doc! { "_id" => 1 });
            bulk.insert(doc! { "_id" => 5 });
            let execution = bulk
                .execute(&mut collection, &WriteConcern::acknowledged(), 1)
                .unwrap();
            (execution, collection.len())
        };

        let (execution, len) = run(true);
        assert_eq!(execution.write_errors.len(), 1);
        assert_eq!(execution.write_errors[0].code, codes::DUPLICATE_KEY);
        assert_eq!(len, 2);

        let (execution, len) = run(false);
        assert_eq!(execution.write_errors[0].index, 0);
        assert_eq!(execution.result.inserted_count, 1);
        assert_eq!(len, 3);
    }

    #[test]
    fn unacknowledged_drops_counts() {
        let mut collection = users();
        let mut bulk = BulkWriteOperation::new(true);
        bulk.insert(doc! { "_id" => 3 });
        let execution = bulk
            .execute(&mut collection, &WriteConcern::unacknowledged(), 1)
            .unwrap();
        assert!(!execution.result.acknowledged);
        assert_eq!(execution.result.inserted_count, 0);
        assert_eq!(collection.len(), 3);
    }

    #[test]
    fn write_concern_evaluation() {
        let mut wc = WriteConcern::acknowledged();
        assert!(evaluate_write_concern(&wc, 1).is_none());

        wc.w = Acknowledgment::Nodes(3);
        let err = evaluate_write_concern(&wc, 1).unwrap();
        assert_eq!(err.code, codes::UNSATISFIABLE_WRITE_CONCERN);
        assert!(!err.is_timeout());

        wc.wtimeout_ms = Some(10);
        let err = evaluate_write_concern(&wc, 1).unwrap();
        assert_eq!(err.code, codes::WRITE_CONCERN_TIMEOUT);
        assert!(err.is_timeout());
        assert_eq!(err.err_message().unwrap(), "waiting for replication timed out");

        wc.w = Acknowledgment::Majority;
        assert!(evaluate_write_concern(&wc, 1).is_none());
    }
}
