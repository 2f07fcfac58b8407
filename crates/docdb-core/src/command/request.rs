use crate::error::{CoreError, CoreResult};
use crate::namespace::Namespace;
use crate::payload::{PayloadKind, SplittablePayload};
use crate::store::geo::point;
use crate::store::update::is_operator_update;
use crate::store::{FindAndModify, GeoNear};
use crate::values::{as_flag, as_integer, type_name, Document, Value};
use crate::write_concern::WriteConcern;

/// How an update item rewrites its matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Update,
    Replace,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertCommand {
    pub namespace: Namespace,
    pub documents: Vec<Document>,
    pub ordered: bool,
    pub write_concern: Option<WriteConcern>,
    pub bypass_document_validation: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateItem {
    pub filter: Document,
    pub update: Document,
    pub kind: UpdateKind,
    pub upsert: bool,
    pub multi: bool,
}

impl UpdateItem {
    /// Read a `{q, u, upsert, multi}` statement. Without an explicit kind the
    /// shape of `u` decides.
    pub fn from_document(doc: &Document, kind: Option<UpdateKind>) -> CoreResult<Self> {
        let filter = required_document(doc, "q", "update.updates")?;
        let update = required_document(doc, "u", "update.updates")?;
        let kind = kind.unwrap_or(if is_operator_update(&update) {
            UpdateKind::Update
        } else {
            UpdateKind::Replace
        });
        let multi = flag(doc, "multi", false)?;
        if multi && kind == UpdateKind::Replace {
            return Err(CoreError::failed_to_parse(
                "multi update is not supported for replacement-style update",
            ));
        }
        Ok(Self {
            filter,
            update,
            kind,
            upsert: flag(doc, "upsert", false)?,
            multi,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCommand {
    pub namespace: Namespace,
    pub updates: Vec<UpdateItem>,
    pub ordered: bool,
    pub write_concern: Option<WriteConcern>,
    pub bypass_document_validation: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteItem {
    pub filter: Document,
    pub multi: bool,
}

impl DeleteItem {
    /// Read a `{q, limit}` statement. `limit` is required and must be 0
    /// (every match) or 1 (first match).
    pub fn from_document(doc: &Document) -> CoreResult<Self> {
        let filter = required_document(doc, "q", "delete.deletes")?;
        let limit = doc
            .get("limit")
            .ok_or_else(|| CoreError::failed_to_parse("missing limit"))?;
        let multi = match as_integer(limit) {
            Some(0) => true,
            Some(1) => false,
            _ => {
                return Err(CoreError::InvalidArgument(format!(
                    "The limit field in delete objects must be 0 or 1. Got {limit}"
                )))
            }
        };
        Ok(Self { filter, multi })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteCommand {
    pub namespace: Namespace,
    pub deletes: Vec<DeleteItem>,
    pub ordered: bool,
    pub write_concern: Option<WriteConcern>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindCommand {
    pub namespace: Namespace,
    pub filter: Document,
    pub sort: Option<Document>,
    pub projection: Option<Document>,
    pub skip: usize,
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountCommand {
    pub namespace: Namespace,
    pub query: Document,
    pub skip: u64,
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistinctCommand {
    pub namespace: Namespace,
    pub key: String,
    pub query: Document,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateCommand {
    pub namespace: Namespace,
    pub pipeline: Vec<Document>,
    /// Reply with a cursor rather than the legacy `result` array.
    pub cursor: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub keys: Document,
    pub name: Option<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexesCommand {
    pub namespace: Namespace,
    pub indexes: Vec<IndexSpec>,
}

/// Which indexes a `dropIndexes` targets.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexSelector {
    Keys(Document),
    Name(String),
    /// `"*"`: every index except `_id_`.
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropIndexesCommand {
    pub namespace: Namespace,
    pub index: IndexSelector,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListCollectionsCommand {
    pub database: String,
    pub filter: Option<Document>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenameCollectionCommand {
    pub from: Namespace,
    pub to: Namespace,
    pub drop_target: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindAndModifyCommand {
    pub namespace: Namespace,
    pub request: FindAndModify,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoNearCommand {
    pub namespace: Namespace,
    pub request: GeoNear,
}

/// A command document parsed into the operation it names.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandRequest {
    Insert(InsertCommand),
    Update(UpdateCommand),
    Delete(DeleteCommand),
    Find(FindCommand),
    Count(CountCommand),
    Distinct(DistinctCommand),
    Aggregate(AggregateCommand),
    CreateIndexes(CreateIndexesCommand),
    DropIndexes(DropIndexesCommand),
    ListIndexes(Namespace),
    ListCollections(ListCollectionsCommand),
    Create(Namespace),
    Drop(Namespace),
    DropDatabase(String),
    RenameCollection(RenameCollectionCommand),
    FindAndModify(FindAndModifyCommand),
    GeoNear(GeoNearCommand),
    Ping,
    BuildInfo,
    ListDatabases,
    Unrecognized(String),
}

impl CommandRequest {
    /// Parse `command` against `database`. The first key names the command.
    ///
    /// Write commands take their items from `payload` when one is given,
    /// consuming it; otherwise from the command's own `documents`,
    /// `updates` or `deletes` array.
    pub fn parse(
        database: &str,
        command: &Document,
        payload: Option<&mut SplittablePayload>,
    ) -> CoreResult<Self> {
        let (name, target) = command
            .iter()
            .next()
            .ok_or_else(|| CoreError::InvalidArgument("empty command document".into()))?;
        let request = match name.as_str() {
            "insert" => Self::Insert(parse_insert(
                namespace(database, name, target)?,
                command,
                payload,
            )?),
            "update" => Self::Update(parse_update(
                namespace(database, name, target)?,
                command,
                payload,
            )?),
            "delete" => Self::Delete(parse_delete(
                namespace(database, name, target)?,
                command,
                payload,
            )?),
            "find" => Self::Find(FindCommand {
                namespace: namespace(database, name, target)?,
                filter: optional_document(command, "filter")?.unwrap_or_default(),
                sort: optional_document(command, "sort")?,
                projection: optional_document(command, "projection")?,
                skip: non_negative(command, "skip")?,
                limit: integer(command, "limit")?.unwrap_or(0),
            }),
            "count" => Self::Count(CountCommand {
                namespace: namespace(database, name, target)?,
                query: optional_document(command, "query")?.unwrap_or_default(),
                skip: non_negative(command, "skip")? as u64,
                limit: integer(command, "limit")?.unwrap_or(0),
            }),
            "distinct" => Self::Distinct(DistinctCommand {
                namespace: namespace(database, name, target)?,
                key: required_string(command, "key", name)?,
                query: optional_document(command, "query")?.unwrap_or_default(),
            }),
            "aggregate" => Self::Aggregate(AggregateCommand {
                namespace: namespace(database, name, target)?,
                pipeline: document_array(command, "pipeline")?
                    .ok_or_else(|| missing_field(name, "pipeline"))?,
                cursor: command.contains_key("cursor"),
            }),
            "createIndexes" => Self::CreateIndexes(CreateIndexesCommand {
                namespace: namespace(database, name, target)?,
                indexes: document_array(command, "indexes")?
                    .ok_or_else(|| missing_field(name, "indexes"))?
                    .iter()
                    .map(parse_index_spec)
                    .collect::<CoreResult<_>>()?,
            }),
            "dropIndexes" | "deleteIndexes" => Self::DropIndexes(DropIndexesCommand {
                namespace: namespace(database, name, target)?,
                index: parse_index_selector(command)?,
            }),
            "listIndexes" => Self::ListIndexes(namespace(database, name, target)?),
            "listCollections" => Self::ListCollections(ListCollectionsCommand {
                database: database.to_owned(),
                filter: optional_document(command, "filter")?,
            }),
            "create" => Self::Create(namespace(database, name, target)?),
            "drop" => Self::Drop(namespace(database, name, target)?),
            "dropDatabase" => Self::DropDatabase(database.to_owned()),
            "renameCollection" => Self::RenameCollection(RenameCollectionCommand {
                from: Namespace::parse(&string_value(target, name)?)?,
                to: Namespace::parse(&required_string(command, "to", name)?)?,
                drop_target: flag(command, "dropTarget", false)?,
            }),
            "findAndModify" | "findandmodify" => Self::FindAndModify(FindAndModifyCommand {
                namespace: namespace(database, name, target)?,
                request: FindAndModify {
                    query: optional_document(command, "query")?.unwrap_or_default(),
                    sort: optional_document(command, "sort")?,
                    remove: flag(command, "remove", false)?,
                    update: optional_document(command, "update")?,
                    return_new: flag(command, "new", false)?,
                    upsert: flag(command, "upsert", false)?,
                    fields: optional_document(command, "fields")?,
                },
            }),
            "geoNear" => Self::GeoNear(GeoNearCommand {
                namespace: namespace(database, name, target)?,
                request: parse_geo_near(command)?,
            }),
            "ping" => Self::Ping,
            "buildInfo" | "buildinfo" => Self::BuildInfo,
            "listDatabases" => Self::ListDatabases,
            other => Self::Unrecognized(other.to_owned()),
        };
        Ok(request)
    }

    /// The command name, for logging.
    pub fn name(&self) -> &str {
        match self {
            Self::Insert(_) => "insert",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
            Self::Find(_) => "find",
            Self::Count(_) => "count",
            Self::Distinct(_) => "distinct",
            Self::Aggregate(_) => "aggregate",
            Self::CreateIndexes(_) => "createIndexes",
            Self::DropIndexes(_) => "dropIndexes",
            Self::ListIndexes(_) => "listIndexes",
            Self::ListCollections(_) => "listCollections",
            Self::Create(_) => "create",
            Self::Drop(_) => "drop",
            Self::DropDatabase(_) => "dropDatabase",
            Self::RenameCollection(_) => "renameCollection",
            Self::FindAndModify(_) => "findAndModify",
            Self::GeoNear(_) => "geoNear",
            Self::Ping => "ping",
            Self::BuildInfo => "buildInfo",
            Self::ListDatabases => "listDatabases",
            Self::Unrecognized(name) => name,
        }
    }

    /// Number of write items carried, if this is a write command.
    pub fn batch_len(&self) -> Option<usize> {
        match self {
            Self::Insert(cmd) => Some(cmd.documents.len()),
            Self::Update(cmd) => Some(cmd.updates.len()),
            Self::Delete(cmd) => Some(cmd.deletes.len()),
            _ => None,
        }
    }
}

fn parse_insert(
    namespace: Namespace,
    command: &Document,
    payload: Option<&mut SplittablePayload>,
) -> CoreResult<InsertCommand> {
    let (documents, _) = batch(command, "insert", "documents", payload, &[PayloadKind::Insert])?;
    Ok(InsertCommand {
        namespace,
        documents,
        ordered: flag(command, "ordered", false)?,
        write_concern: write_concern(command)?,
        bypass_document_validation: flag(command, "bypassDocumentValidation", false)?,
    })
}

fn parse_update(
    namespace: Namespace,
    command: &Document,
    payload: Option<&mut SplittablePayload>,
) -> CoreResult<UpdateCommand> {
    let (documents, kind) = batch(
        command,
        "update",
        "updates",
        payload,
        &[PayloadKind::Update, PayloadKind::Replace],
    )?;
    let kind = kind.map(|kind| match kind {
        PayloadKind::Replace => UpdateKind::Replace,
        _ => UpdateKind::Update,
    });
    let updates = documents
        .iter()
        .map(|doc| UpdateItem::from_document(doc, kind))
        .collect::<CoreResult<_>>()?;
    Ok(UpdateCommand {
        namespace,
        updates,
        ordered: flag(command, "ordered", false)?,
        write_concern: write_concern(command)?,
        bypass_document_validation: flag(command, "bypassDocumentValidation", false)?,
    })
}

fn parse_delete(
    namespace: Namespace,
    command: &Document,
    payload: Option<&mut SplittablePayload>,
) -> CoreResult<DeleteCommand> {
    let (documents, _) = batch(command, "delete", "deletes", payload, &[PayloadKind::Delete])?;
    let deletes = documents
        .iter()
        .map(DeleteItem::from_document)
        .collect::<CoreResult<_>>()?;
    Ok(DeleteCommand {
        namespace,
        deletes,
        ordered: flag(command, "ordered", false)?,
        write_concern: write_concern(command)?,
    })
}

/// Items from the payload if supplied, else from the embedded array.
fn batch(
    command: &Document,
    name: &str,
    key: &str,
    payload: Option<&mut SplittablePayload>,
    accepted: &[PayloadKind],
) -> CoreResult<(Vec<Document>, Option<PayloadKind>)> {
    match payload {
        Some(payload) => {
            let kind = payload.kind();
            if !accepted.contains(&kind) {
                return Err(CoreError::InvalidArgument(format!(
                    "{name} cannot take a {kind:?} payload"
                )));
            }
            Ok((payload.consume(), Some(kind)))
        }
        None => Ok((
            document_array(command, key)?.ok_or_else(|| missing_field(name, key))?,
            None,
        )),
    }
}

fn parse_index_spec(doc: &Document) -> CoreResult<IndexSpec> {
    let keys = required_document(doc, "key", "createIndexes.indexes")?;
    let name = match doc.get("name") {
        None | Some(Value::Null) => None,
        Some(value) => Some(string_value(value, "name")?),
    };
    Ok(IndexSpec {
        keys,
        name,
        unique: flag(doc, "unique", false)?,
    })
}

fn parse_index_selector(command: &Document) -> CoreResult<IndexSelector> {
    match command.get("index") {
        Some(Value::Object(keys)) => Ok(IndexSelector::Keys(keys.clone())),
        Some(Value::String(name)) if name == "*" => Ok(IndexSelector::All),
        Some(Value::String(name)) => Ok(IndexSelector::Name(name.clone())),
        Some(other) => Err(CoreError::InvalidArgument(format!(
            "index must be a document or a string, got {}",
            type_name(other)
        ))),
        None => Err(missing_field("dropIndexes", "index")),
    }
}

fn parse_geo_near(command: &Document) -> CoreResult<GeoNear> {
    let near = command
        .get("near")
        .ok_or_else(|| missing_field("geoNear", "near"))?;
    let near = point(near).ok_or_else(|| {
        CoreError::InvalidArgument(format!("near must be a coordinate pair, got {near}"))
    })?;
    let limit = match integer(command, "limit")?.or(integer(command, "num")?) {
        Some(n) if n > 0 => Some(n as usize),
        Some(n) => {
            return Err(CoreError::InvalidArgument(format!(
                "geoNear limit must be positive, got {n}"
            )))
        }
        None => None,
    };
    let max_distance = match command.get("maxDistance") {
        None | Some(Value::Null) => None,
        Some(value) => Some(value.as_f64().ok_or_else(|| {
            CoreError::InvalidArgument(format!(
                "maxDistance must be a number, got {}",
                type_name(value)
            ))
        })?),
    };
    Ok(GeoNear {
        near,
        query: optional_document(command, "query")?,
        limit,
        max_distance,
        spherical: flag(command, "spherical", false)?,
    })
}

fn namespace(database: &str, command: &str, target: &Value) -> CoreResult<Namespace> {
    Ok(Namespace::new(database, string_value(target, command)?))
}

fn string_value(value: &Value, key: &str) -> CoreResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(CoreError::InvalidArgument(format!(
            "{key} must be a string, got {}",
            type_name(other)
        ))),
    }
}

fn missing_field(context: &str, key: &str) -> CoreError {
    CoreError::failed_to_parse(format!(
        "BSON field '{context}.{key}' is missing but a required field"
    ))
}

fn required_string(doc: &Document, key: &str, context: &str) -> CoreResult<String> {
    string_value(
        doc.get(key).ok_or_else(|| missing_field(context, key))?,
        key,
    )
}

fn flag(doc: &Document, key: &str, default: bool) -> CoreResult<bool> {
    match doc.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => as_flag(value).ok_or_else(|| {
            CoreError::InvalidArgument(format!(
                "{key} must be a boolean, got {}",
                type_name(value)
            ))
        }),
    }
}

fn integer(doc: &Document, key: &str) -> CoreResult<Option<i64>> {
    match doc.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => as_integer(value).map(Some).ok_or_else(|| {
            CoreError::InvalidArgument(format!("{key} must be an integer, got {value}"))
        }),
    }
}

fn non_negative(doc: &Document, key: &str) -> CoreResult<usize> {
    match integer(doc, key)? {
        None => Ok(0),
        Some(n) if n >= 0 => Ok(n as usize),
        Some(n) => Err(CoreError::bad_value(format!("{key} value must be >= 0, got {n}"))),
    }
}

fn optional_document(doc: &Document, key: &str) -> CoreResult<Option<Document>> {
    match doc.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(other) => Err(CoreError::InvalidArgument(format!(
            "{key} must be a document, got {}",
            type_name(other)
        ))),
    }
}

fn required_document(doc: &Document, key: &str, context: &str) -> CoreResult<Document> {
    optional_document(doc, key)?.ok_or_else(|| missing_field(context, key))
}

fn document_array(doc: &Document, key: &str) -> CoreResult<Option<Vec<Document>>> {
    match doc.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map.clone()),
                other => Err(CoreError::InvalidArgument(format!(
                    "{key} entries must be documents, got {}",
                    type_name(other)
                ))),
            })
            .collect::<CoreResult<Vec<_>>>()
            .map(Some),
        Some(other) => Err(CoreError::InvalidArgument(format!(
            "{key} must be an array, got {}",
            type_name(other)
        ))),
    }
}

fn write_concern(command: &Document) -> CoreResult<Option<WriteConcern>> {
    optional_document(command, "writeConcern")?
        .map(|doc| WriteConcern::from_document(&doc))
        .transpose()
}
