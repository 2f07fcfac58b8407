use crate::command::CommandRequest;
use crate::config::ServerConfig;
use crate::error::{CoreError, CoreResult};
use crate::handlers::{admin, query, write, Context};
use crate::payload::SplittablePayload;
use crate::store::InMemoryStore;
use crate::values::Document;
use std::sync::Arc;

/// Entry point for command documents.
///
/// Holds no per-request state; every command builds its own combiner and
/// index maps, so one dispatcher can serve concurrent callers.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    store: Arc<InMemoryStore>,
    config: ServerConfig,
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

impl CommandDispatcher {
    /// A dispatcher over a fresh store sized by `config.replica_count`.
    pub fn new(config: ServerConfig) -> Self {
        let store = Arc::new(InMemoryStore::new(config.replica_count));
        Self::with_store(store, config)
    }

    pub fn with_store(store: Arc<InMemoryStore>, config: ServerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run one command against `database` and return its reply.
    ///
    /// A write command whose items partly failed returns
    /// [`CoreError::BulkWrite`] carrying the partial result and every error.
    pub fn command(
        &self,
        database: &str,
        command: &Document,
        payload: Option<&mut SplittablePayload>,
    ) -> CoreResult<Document> {
        let request = CommandRequest::parse(database, command, payload)?;
        tracing::debug!(
            target: "docdb::dispatcher",
            database,
            command = request.name(),
            "dispatching command"
        );
        if let Some(len) = request.batch_len() {
            if len > self.config.max_write_batch_size {
                return Err(CoreError::InvalidArgument(format!(
                    "Write batch sizes must be between 1 and {}. Got {len} operations.",
                    self.config.max_write_batch_size
                )));
            }
        }

        let ctx = Context::new(&self.store, &self.config);
        match request {
            CommandRequest::Insert(cmd) => write::insert(ctx, cmd),
            CommandRequest::Update(cmd) => write::update(ctx, cmd),
            CommandRequest::Delete(cmd) => write::delete(ctx, cmd),
            CommandRequest::Find(cmd) => query::find(ctx, cmd),
            CommandRequest::Count(cmd) => query::count(ctx, cmd),
            CommandRequest::Distinct(cmd) => query::distinct(ctx, cmd),
            CommandRequest::Aggregate(cmd) => query::aggregate(ctx, cmd),
            CommandRequest::ListIndexes(ns) => query::list_indexes(ctx, ns),
            CommandRequest::FindAndModify(cmd) => query::find_and_modify(ctx, cmd),
            CommandRequest::GeoNear(cmd) => query::geo_near(ctx, cmd),
            CommandRequest::CreateIndexes(cmd) => admin::create_indexes(ctx, cmd),
            CommandRequest::DropIndexes(cmd) => admin::drop_indexes(ctx, cmd),
            CommandRequest::ListCollections(cmd) => admin::list_collections(ctx, cmd),
            CommandRequest::Create(ns) => admin::create(ctx, ns),
            CommandRequest::Drop(ns) => admin::drop_collection(ctx, ns),
            CommandRequest::DropDatabase(name) => admin::drop_database(ctx, name),
            CommandRequest::RenameCollection(cmd) => admin::rename_collection(ctx, cmd),
            CommandRequest::ListDatabases => admin::list_databases(ctx),
            CommandRequest::BuildInfo => admin::build_info(ctx),
            CommandRequest::Ping => Ok(crate::command::response::ok()),
            CommandRequest::Unrecognized(name) => {
                tracing::warn!(target: "docdb::dispatcher", database, command = %name, "command not implemented");
                Err(CoreError::NotImplemented(name))
            }
        }
    }
}
