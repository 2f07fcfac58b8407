mod request;
pub mod response;

pub use request::{
    AggregateCommand, CommandRequest, CountCommand, CreateIndexesCommand, DeleteCommand,
    DeleteItem, DistinctCommand, DropIndexesCommand, FindAndModifyCommand, FindCommand,
    GeoNearCommand, IndexSelector, IndexSpec, InsertCommand, ListCollectionsCommand,
    RenameCollectionCommand, UpdateCommand, UpdateItem, UpdateKind,
};
