//! Bulk-write reconciliation: canonical result shapes, translation from the
//! store's native results, and the combiner that merges sub-batches.

mod combiner;
mod result;
pub mod translate;

pub use combiner::BulkWriteCombiner;
pub use result::{
    BulkCounts, BulkResult, BulkUpsert, BulkWriteFailure, WriteConcernError, WriteError, WriteKind,
};
