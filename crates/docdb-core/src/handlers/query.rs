use super::Context;
use crate::command::{
    response, AggregateCommand, CountCommand, DistinctCommand, FindAndModifyCommand, FindCommand,
    GeoNearCommand,
};
use crate::error::{CoreError, CoreResult};
use crate::namespace::Namespace;
use crate::store::update::is_operator_update;
use crate::validator::{CollectibleDocumentValidator, FieldNameValidator, UpdateValidator};
use crate::values::Document;

/// The whole result set as one exhausted cursor batch. A missing
/// collection reads as empty.
pub fn find(ctx: Context<'_>, cmd: FindCommand) -> CoreResult<Document> {
    let ns = cmd.namespace.full_name();
    let batch = match ctx.store.collection(&cmd.namespace) {
        Some(handle) => {
            let collection = handle.read();
            let mut cursor = collection.find(cmd.filter, cmd.projection);
            if let Some(sort) = cmd.sort {
                cursor = cursor.sort(sort);
            }
            cursor.skip(cmd.skip).limit(cmd.limit).to_vec()?
        }
        None => Vec::new(),
    };
    Ok(response::cursor(&ns, batch))
}

pub fn count(ctx: Context<'_>, cmd: CountCommand) -> CoreResult<Document> {
    let n = match ctx.store.collection(&cmd.namespace) {
        Some(handle) => handle.read().count(&cmd.query, cmd.skip, cmd.limit)?,
        None => 0,
    };
    Ok(response::count(n))
}

pub fn distinct(ctx: Context<'_>, cmd: DistinctCommand) -> CoreResult<Document> {
    let values = match ctx.store.collection(&cmd.namespace) {
        Some(handle) => handle.read().distinct(&cmd.key, &cmd.query)?,
        None => Vec::new(),
    };
    Ok(response::distinct(values))
}

pub fn aggregate(ctx: Context<'_>, cmd: AggregateCommand) -> CoreResult<Document> {
    let results = match ctx.store.collection(&cmd.namespace) {
        Some(handle) => handle.read().aggregate(&cmd.pipeline)?,
        None => Vec::new(),
    };
    if cmd.cursor {
        Ok(response::cursor(&cmd.namespace.full_name(), results))
    } else {
        Ok(response::aggregate_legacy(results))
    }
}

pub fn list_indexes(ctx: Context<'_>, ns: Namespace) -> CoreResult<Document> {
    let handle = ctx
        .store
        .collection(&ns)
        .ok_or_else(|| CoreError::NamespaceNotFound(ns.full_name()))?;
    let indexes = handle.read().indexes();
    Ok(response::cursor(&ns.full_name(), indexes))
}

/// No match replies `{value: null}`. The collection is only created when
/// the request may upsert.
pub fn find_and_modify(ctx: Context<'_>, cmd: FindAndModifyCommand) -> CoreResult<Document> {
    if let Some(update) = &cmd.request.update {
        if is_operator_update(update) {
            UpdateValidator.validate_document(update)?;
        } else {
            CollectibleDocumentValidator.validate_document(update)?;
        }
    }
    let handle = if cmd.request.upsert {
        ctx.check_namespace(&cmd.namespace)?;
        Some(ctx.store.collection_or_create(&cmd.namespace))
    } else {
        ctx.store.collection(&cmd.namespace)
    };
    let value = match handle {
        Some(handle) => handle.write().find_and_modify(&cmd.request)?,
        None => None,
    };
    Ok(response::find_and_modify(value))
}

/// Store failures are reported in the reply rather than as an error.
pub fn geo_near(ctx: Context<'_>, cmd: GeoNearCommand) -> CoreResult<Document> {
    let outcome = ctx
        .store
        .collection(&cmd.namespace)
        .ok_or_else(|| CoreError::NamespaceNotFound(cmd.namespace.full_name()))
        .and_then(|handle| handle.read().geo_near(&cmd.request));
    match outcome {
        Ok(results) => Ok(response::geo_near(results)),
        Err(err) => {
            tracing::debug!(target: "docdb::dispatcher", ns = %cmd.namespace, error = %err, "geoNear failed");
            Ok(response::geo_near_error(&err))
        }
    }
}
