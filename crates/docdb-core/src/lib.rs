pub mod bulk;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod index_map;
pub mod legacy;
pub mod namespace;
pub mod payload;
pub mod store;
pub mod validator;
pub mod values;
pub mod write_concern;

pub use bulk::{BulkResult, BulkWriteCombiner, BulkWriteFailure, WriteConcernError, WriteError};
pub use command::CommandRequest;
pub use config::ServerConfig;
pub use dispatcher::CommandDispatcher;
pub use error::{codes, CoreError, CoreResult};
pub use index_map::IndexMap;
pub use namespace::Namespace;
pub use payload::{PayloadKind, SplittablePayload};
pub use store::InMemoryStore;
pub use validator::{CollectibleDocumentValidator, FieldNameValidator, UpdateValidator};
pub use values::{Document, ObjectId, Value};
pub use write_concern::{Acknowledgment, WriteConcern};
