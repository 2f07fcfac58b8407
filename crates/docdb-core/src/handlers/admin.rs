use super::Context;
use crate::command::{
    response, CreateIndexesCommand, DropIndexesCommand, IndexSelector, ListCollectionsCommand,
    RenameCollectionCommand,
};
use crate::error::{CoreError, CoreResult};
use crate::namespace::Namespace;
use crate::store::query::matches;
use crate::store::{index_name_from_keys, key_patterns_equal, Collection};
use crate::values::{Document, Value, ID_FIELD};
use serde_json::json;

pub fn create_indexes(ctx: Context<'_>, cmd: CreateIndexesCommand) -> CoreResult<Document> {
    let handle = ctx.store.collection_or_create(&cmd.namespace);
    let mut collection = handle.write();
    for spec in cmd.indexes {
        collection.create_index(spec.keys, spec.name, spec.unique)?;
    }
    Ok(response::ok())
}

pub fn drop_indexes(ctx: Context<'_>, cmd: DropIndexesCommand) -> CoreResult<Document> {
    let handle = ctx
        .store
        .collection(&cmd.namespace)
        .ok_or_else(|| CoreError::NamespaceNotFound(cmd.namespace.full_name()))?;
    let mut collection = handle.write();
    match cmd.index {
        IndexSelector::All => collection.drop_all_indexes(),
        IndexSelector::Name(name) => collection.drop_index(&name)?,
        IndexSelector::Keys(keys) => drop_by_keys(&mut collection, &keys)?,
    }
    Ok(response::ok())
}

/// Drop the first index whose pattern equals `keys`, with or without a
/// leading `_id: 0`. With no match, the name derived from `keys` is dropped
/// so the store reports the missing index.
fn drop_by_keys(collection: &mut Collection, keys: &Document) -> CoreResult<()> {
    let with_zero_id = with_zero_for_id(keys);
    let found = collection
        .index_definitions()
        .find(|def| key_patterns_equal(&def.keys, keys) || key_patterns_equal(&def.keys, &with_zero_id))
        .map(|def| def.name.clone());
    let name = found.unwrap_or_else(|| index_name_from_keys(keys));
    collection.drop_index(&name)
}

fn with_zero_for_id(keys: &Document) -> Document {
    let mut pattern = Document::new();
    pattern.insert(ID_FIELD.into(), json!(0));
    for (key, value) in keys {
        pattern.insert(key.clone(), value.clone());
    }
    pattern
}

pub fn list_collections(ctx: Context<'_>, cmd: ListCollectionsCommand) -> CoreResult<Document> {
    let names = ctx
        .store
        .database(&cmd.database)
        .map(|db| db.collection_names())
        .unwrap_or_default();
    let mut entries = Vec::with_capacity(names.len());
    for name in names {
        let mut entry = Document::new();
        entry.insert("name".into(), Value::String(name));
        entry.insert("options".into(), Value::Object(Document::new()));
        if let Some(filter) = &cmd.filter {
            if !matches(&entry, filter)? {
                continue;
            }
        }
        entries.push(entry);
    }
    let ns = format!("{}.$cmd.listCollections", cmd.database);
    Ok(response::cursor(&ns, entries))
}

pub fn create(ctx: Context<'_>, ns: Namespace) -> CoreResult<Document> {
    ctx.check_namespace(&ns)?;
    ctx.store.create_collection(&ns);
    Ok(response::ok())
}

pub fn drop_collection(ctx: Context<'_>, ns: Namespace) -> CoreResult<Document> {
    ctx.store.drop_collection(&ns);
    Ok(response::ok())
}

pub fn drop_database(ctx: Context<'_>, database: String) -> CoreResult<Document> {
    ctx.store.drop_database(&database);
    Ok(response::ok_int())
}

pub fn rename_collection(ctx: Context<'_>, cmd: RenameCollectionCommand) -> CoreResult<Document> {
    ctx.store
        .rename_collection(&cmd.from, &cmd.to, cmd.drop_target)?;
    Ok(response::ok())
}

pub fn list_databases(ctx: Context<'_>) -> CoreResult<Document> {
    Ok(response::list_databases(ctx.store.database_names()))
}

pub fn build_info(ctx: Context<'_>) -> CoreResult<Document> {
    Ok(response::build_info(ctx.config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::doc;
    use crate::store::InMemoryStore;

    #[test]
    fn drop_by_keys_tolerates_identity_prefix() {
        let mut collection = Collection::new(Namespace::new("app", "users"));
        collection
            .create_index(doc! { "_id" => 0, "name" => 1 }, None, false)
            .unwrap();
        drop_by_keys(&mut collection, &doc! { "name" => 1 }).unwrap();
        assert_eq!(collection.indexes().len(), 1);
    }

    #[test]
    fn drop_by_keys_without_match_is_not_found() {
        let mut collection = Collection::new(Namespace::new("app", "users"));
        let err = drop_by_keys(&mut collection, &doc! { "age" => -1 }).unwrap_err();
        assert!(matches!(err, CoreError::IndexNotFound(name) if name == "age_-1"));
    }

    #[test]
    fn list_collections_filter() {
        let store = InMemoryStore::default();
        let config = ServerConfig::default();
        let ctx = Context::new(&store, &config);
        store.collection_or_create(&Namespace::new("app", "a"));
        store.collection_or_create(&Namespace::new("app", "b"));
        let reply = list_collections(
            ctx,
            ListCollectionsCommand {
                database: "app".into(),
                filter: Some(doc! { "name" => "b" }),
            },
        )
        .unwrap();
        assert_eq!(
            reply["cursor"],
            json!({
                "id": 0,
                "ns": "app.$cmd.listCollections",
                "firstBatch": [{"name": "b", "options": {}}],
            })
        );
    }

    #[test]
    fn create_validates_name() {
        let store = InMemoryStore::default();
        let config = ServerConfig::default();
        let ctx = Context::new(&store, &config);
        let err = create(ctx, Namespace::new("app", "system.users")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidNamespace(_)));
    }
}
