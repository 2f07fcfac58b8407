//! Write commands: each outer batch runs as one or more store sub-batches
//! whose outcomes are folded into a single combiner.

use super::Context;
use crate::bulk::translate::{
    to_bulk_result, to_write_concern_error, to_write_error, write_concern_to_write_error,
};
use crate::bulk::{BulkResult, BulkWriteCombiner, WriteKind};
use crate::command::{
    response, DeleteCommand, DeleteItem, InsertCommand, UpdateCommand, UpdateItem, UpdateKind,
};
use crate::error::CoreResult;
use crate::index_map::IndexMap;
use crate::namespace::Namespace;
use crate::store::{BulkExecution, BulkWriteOperation, InMemoryStore};
use crate::validator::{CollectibleDocumentValidator, FieldNameValidator, UpdateValidator};
use crate::values::Document;
use crate::write_concern::WriteConcern;

pub fn insert(ctx: Context<'_>, cmd: InsertCommand) -> CoreResult<Document> {
    ctx.check_namespace(&cmd.namespace)?;
    let write_concern = ctx.write_concern(cmd.write_concern);
    let result = insert_command(
        ctx.store,
        &cmd.namespace,
        cmd.ordered,
        &write_concern,
        cmd.bypass_document_validation,
        cmd.documents,
    )?;
    Ok(response::insert(&result))
}

pub fn update(ctx: Context<'_>, cmd: UpdateCommand) -> CoreResult<Document> {
    ctx.check_namespace(&cmd.namespace)?;
    let write_concern = ctx.write_concern(cmd.write_concern);
    let result = update_command(
        ctx.store,
        &cmd.namespace,
        cmd.ordered,
        &write_concern,
        cmd.bypass_document_validation,
        cmd.updates,
    )?;
    Ok(response::update(&result))
}

pub fn delete(ctx: Context<'_>, cmd: DeleteCommand) -> CoreResult<Document> {
    ctx.check_namespace(&cmd.namespace)?;
    let write_concern = ctx.write_concern(cmd.write_concern);
    let result = delete_command(
        ctx.store,
        &cmd.namespace,
        cmd.ordered,
        &write_concern,
        cmd.deletes,
    )?;
    Ok(response::delete(&result))
}

/// Insert every document through one sub-batch.
///
/// Field names are checked for the whole batch before anything is written.
pub fn insert_command(
    store: &InMemoryStore,
    ns: &Namespace,
    ordered: bool,
    write_concern: &WriteConcern,
    bypass_document_validation: bool,
    documents: Vec<Document>,
) -> CoreResult<BulkResult> {
    if !bypass_document_validation {
        for doc in &documents {
            CollectibleDocumentValidator.validate_document(doc)?;
        }
    }

    let mut combiner = BulkWriteCombiner::new(WriteKind::Insert, ordered, write_concern.clone());
    let index_map = IndexMap::create().add(documents.len(), 0);
    let mut bulk = BulkWriteOperation::new(ordered);
    for doc in documents {
        bulk.insert(doc);
    }
    let execution = store.execute(ns, bulk, write_concern)?;
    fold(&mut combiner, execution, &index_map)?;
    combiner.get_result()
}

/// Run each update as its own single-item sub-batch.
///
/// The next item's outer position is only known once this item has run:
/// an item occupies `max(upserts, 1)` positions.
pub fn update_command(
    store: &InMemoryStore,
    ns: &Namespace,
    ordered: bool,
    write_concern: &WriteConcern,
    bypass_document_validation: bool,
    updates: Vec<UpdateItem>,
) -> CoreResult<BulkResult> {
    if !bypass_document_validation {
        for item in &updates {
            validate_update(item)?;
        }
    }

    let mut combiner = BulkWriteCombiner::new(WriteKind::Update, ordered, write_concern.clone());
    let mut offset = 0;
    for item in updates {
        let index_map = IndexMap::create_at(offset, 1);
        let mut bulk = BulkWriteOperation::new(true);
        let find = bulk.find(item.filter);
        let find = if item.upsert { find.upsert() } else { find };
        match (item.kind, item.multi) {
            (UpdateKind::Replace, _) => find.replace_one(item.update),
            (UpdateKind::Update, true) => find.update(item.update),
            (UpdateKind::Update, false) => find.update_one(item.update),
        }

        let execution = store.execute(ns, bulk, write_concern)?;
        let upserts = execution.result.upserts.len();
        let failed = !execution.write_errors.is_empty();
        fold(&mut combiner, execution, &index_map)?;
        offset += upserts.max(1);
        if failed && ordered {
            break;
        }
    }
    combiner.get_result()
}

/// Remove through one sub-batch. A multi item removes every match, a
/// single item its first match.
pub fn delete_command(
    store: &InMemoryStore,
    ns: &Namespace,
    ordered: bool,
    write_concern: &WriteConcern,
    deletes: Vec<DeleteItem>,
) -> CoreResult<BulkResult> {
    let mut combiner = BulkWriteCombiner::new(WriteKind::Delete, ordered, write_concern.clone());
    let index_map = IndexMap::create().add(deletes.len(), 0);
    let mut bulk = BulkWriteOperation::new(ordered);
    for item in deletes {
        let find = bulk.find(item.filter);
        if item.multi {
            find.remove();
        } else {
            find.remove_one();
        }
    }
    let execution = store.execute(ns, bulk, write_concern)?;
    fold(&mut combiner, execution, &index_map)?;
    combiner.get_result()
}

pub(crate) fn validate_update(item: &UpdateItem) -> CoreResult<()> {
    match item.kind {
        UpdateKind::Replace => CollectibleDocumentValidator.validate_document(&item.update),
        UpdateKind::Update => UpdateValidator.validate_document(&item.update),
    }
}

/// Fold one sub-batch outcome into the combiner.
///
/// A write-concern failure that timed out is reported as such; any other
/// one counts against the sub-batch's first item.
fn fold(
    combiner: &mut BulkWriteCombiner,
    execution: BulkExecution,
    index_map: &IndexMap,
) -> CoreResult<()> {
    let BulkExecution {
        result,
        write_errors,
        write_concern_error,
    } = execution;
    combiner.add_result(to_bulk_result(result), index_map)?;
    for error in &write_errors {
        combiner.add_write_error_result(to_write_error(error, error.index), index_map)?;
    }
    if let Some(error) = write_concern_error {
        if error.is_timeout() {
            combiner.add_write_concern_error_result(to_write_concern_error(&error)?);
        } else {
            combiner.add_write_error_result(write_concern_to_write_error(&error, 0)?, index_map)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::error::{codes, CoreError};
    use crate::write_concern::Acknowledgment;
    use serde_json::json;

    fn ns() -> Namespace {
        Namespace::new("app", "users")
    }

    fn update_item(filter: Document, update: Document, upsert: bool) -> UpdateItem {
        let kind = if update.keys().next().is_some_and(|k| k.starts_with('$')) {
            UpdateKind::Update
        } else {
            UpdateKind::Replace
        };
        UpdateItem {
            filter,
            update,
            kind,
            upsert,
            multi: false,
        }
    }

    fn failure(err: CoreError) -> crate::bulk::BulkWriteFailure {
        match err {
            CoreError::BulkWrite(failure) => *failure,
            other => panic!("expected bulk write failure, got {other:?}"),
        }
    }

    #[test]
    fn insert_counts_whole_batch() {
        let store = InMemoryStore::default();
        let docs = vec![doc! { "_id" => 1 }, doc! { "_id" => 2 }, doc! { "_id" => 3 }];
        let result =
            insert_command(&store, &ns(), true, &WriteConcern::acknowledged(), false, docs)
                .unwrap();
        assert_eq!(result.inserted_count(), 3);
    }

    #[test]
    fn insert_rejects_bad_field_before_writing() {
        let store = InMemoryStore::default();
        let docs = vec![doc! { "_id" => 1 }, doc! { "$x" => 2 }];
        let err = insert_command(&store, &ns(), true, &WriteConcern::acknowledged(), false, docs)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
        assert!(store.collection(&ns()).is_none());
    }

    #[test]
    fn bypass_skips_field_check() {
        let store = InMemoryStore::default();
        let docs = vec![doc! { "a.b" => 1 }];
        let result =
            insert_command(&store, &ns(), true, &WriteConcern::acknowledged(), true, docs)
                .unwrap();
        assert_eq!(result.inserted_count(), 1);
    }

    #[test]
    fn unordered_insert_reports_duplicate_position() {
        let store = InMemoryStore::default();
        let docs = vec![doc! { "_id" => 1 }, doc! { "_id" => 1 }, doc! { "_id" => 2 }];
        let err = insert_command(&store, &ns(), false, &WriteConcern::acknowledged(), false, docs)
            .unwrap_err();
        let failure = failure(err);
        assert_eq!(failure.result.inserted_count(), 2);
        assert_eq!(failure.write_errors.len(), 1);
        assert_eq!(failure.write_errors[0].index, 1);
        assert_eq!(failure.write_errors[0].code, codes::DUPLICATE_KEY);
    }

    #[test]
    fn upsert_advances_outer_offset() {
        let store = InMemoryStore::default();
        insert_command(
            &store,
            &ns(),
            true,
            &WriteConcern::acknowledged(),
            false,
            vec![doc! { "_id" => 7, "n" => 0 }],
        )
        .unwrap();
        let updates = vec![
            update_item(doc! { "_id" => 1 }, doc! { "$set" => json!({"n": 1}) }, true),
            update_item(doc! { "_id" => 2 }, doc! { "$set" => json!({"n": 2}) }, true),
            update_item(doc! { "_id" => 7 }, doc! { "$inc" => json!({"n": 1}) }, false),
        ];
        let result = update_command(
            &store,
            &ns(),
            true,
            &WriteConcern::acknowledged(),
            false,
            updates,
        )
        .unwrap();
        let indexes: Vec<usize> = result.upserts().iter().map(|u| u.index).collect();
        assert_eq!(indexes, vec![0, 1]);
        assert_eq!(result.matched_count(), 1);
        assert_eq!(result.modified_count(), 1);
    }

    #[test]
    fn ordered_update_stops_at_failure() {
        let store = InMemoryStore::default();
        let updates = vec![
            update_item(doc! { "_id" => 1 }, doc! { "$bogus" => json!({"n": 1}) }, true),
            update_item(doc! { "_id" => 2 }, doc! { "$set" => json!({"n": 2}) }, true),
        ];
        let err = update_command(
            &store,
            &ns(),
            true,
            &WriteConcern::acknowledged(),
            false,
            updates.clone(),
        )
        .unwrap_err();
        let ordered = failure(err);
        assert_eq!(ordered.write_errors[0].index, 0);
        assert!(ordered.result.upserts().is_empty());

        let err = update_command(
            &store,
            &ns(),
            false,
            &WriteConcern::acknowledged(),
            false,
            updates,
        )
        .unwrap_err();
        let unordered = failure(err);
        assert_eq!(unordered.result.upserts()[0].index, 1);
    }

    #[test]
    fn update_validator_follows_kind() {
        let replace = update_item(doc! {}, doc! { "$ref" => "x", "a" => 1 }, false);
        assert!(validate_update(&replace).is_ok());
        let mut bad = update_item(doc! {}, doc! { "a.b" => 1 }, false);
        assert!(validate_update(&bad).is_err());
        bad.kind = UpdateKind::Update;
        assert!(validate_update(&bad).is_ok());
    }

    #[test]
    fn delete_applies_limit_per_item() {
        let store = InMemoryStore::default();
        let docs = vec![
            doc! { "_id" => 1, "tag" => "a" },
            doc! { "_id" => 2, "tag" => "a" },
            doc! { "_id" => 3, "tag" => "b" },
            doc! { "_id" => 4, "tag" => "b" },
        ];
        insert_command(&store, &ns(), true, &WriteConcern::acknowledged(), false, docs).unwrap();
        let deletes = vec![
            DeleteItem {
                filter: doc! { "tag" => "a" },
                multi: true,
            },
            DeleteItem {
                filter: doc! { "tag" => "b" },
                multi: false,
            },
        ];
        let result =
            delete_command(&store, &ns(), true, &WriteConcern::acknowledged(), deletes).unwrap();
        assert_eq!(result.removed_count(), 3);
        assert_eq!(store.collection(&ns()).unwrap().read().len(), 1);
    }

    #[test]
    fn write_concern_timeout_is_separate_from_write_errors() {
        let store = InMemoryStore::new(1);
        let write_concern = WriteConcern {
            w: Acknowledgment::Nodes(2),
            wtimeout_ms: Some(100),
            journal: false,
        };
        let err = insert_command(
            &store,
            &ns(),
            true,
            &write_concern,
            false,
            vec![doc! { "_id" => 1 }],
        )
        .unwrap_err();
        let failure = failure(err);
        assert!(failure.write_errors.is_empty());
        assert_eq!(failure.result.inserted_count(), 1);
        let wce = failure.write_concern_error.unwrap();
        assert_eq!(wce.code, codes::WRITE_CONCERN_TIMEOUT);
        assert_eq!(wce.details, doc! { "wtimeout" => true });
    }

    #[test]
    fn unsatisfiable_write_concern_becomes_write_error() {
        let store = InMemoryStore::new(1);
        let write_concern = WriteConcern {
            w: Acknowledgment::Nodes(3),
            wtimeout_ms: None,
            journal: false,
        };
        let err = delete_command(
            &store,
            &ns(),
            true,
            &write_concern,
            vec![DeleteItem {
                filter: doc! {},
                multi: true,
            }],
        )
        .unwrap_err();
        let failure = failure(err);
        assert!(failure.write_concern_error.is_none());
        assert_eq!(failure.write_errors[0].index, 0);
        assert_eq!(failure.write_errors[0].code, codes::UNSATISFIABLE_WRITE_CONCERN);
    }

    #[test]
    fn unacknowledged_insert() {
        let store = InMemoryStore::default();
        let result = insert_command(
            &store,
            &ns(),
            true,
            &WriteConcern::unacknowledged(),
            false,
            vec![doc! { "_id" => 1 }, doc! { "_id" => 1 }],
        )
        .unwrap();
        assert_eq!(result, BulkResult::Unacknowledged);
        assert_eq!(store.collection(&ns()).unwrap().read().len(), 1);
    }
}
