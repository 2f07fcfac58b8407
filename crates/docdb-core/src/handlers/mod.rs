//! Per-command handlers. Each takes a parsed command and returns the reply
//! document.

pub mod admin;
pub mod query;
pub mod write;

use crate::config::ServerConfig;
use crate::error::CoreResult;
use crate::namespace::Namespace;
use crate::store::InMemoryStore;
use crate::write_concern::WriteConcern;

/// What a handler may touch while serving one command.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub store: &'a InMemoryStore,
    pub config: &'a ServerConfig,
}

impl<'a> Context<'a> {
    pub fn new(store: &'a InMemoryStore, config: &'a ServerConfig) -> Self {
        Self { store, config }
    }

    /// The command's own write concern, else the configured default.
    pub fn write_concern(&self, requested: Option<WriteConcern>) -> WriteConcern {
        requested.unwrap_or_else(|| self.config.default_write_concern.clone())
    }

    pub fn check_namespace(&self, ns: &Namespace) -> CoreResult<()> {
        if self.config.validate_collection_names {
            ns.validate_collection_name()?;
        }
        Ok(())
    }
}
