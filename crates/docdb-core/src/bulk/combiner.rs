use super::result::{
    BulkCounts, BulkResult, BulkUpsert, BulkWriteFailure, WriteConcernError, WriteError, WriteKind,
};
use crate::error::{CoreError, CoreResult};
use crate::index_map::IndexMap;
use crate::write_concern::WriteConcern;

/// Folds the results and errors of every sub-batch of one write command.
///
/// Whether further sub-batches run after an error is the caller's decision;
/// the combiner accepts input until [`BulkWriteCombiner::get_result`].
/// When several write-concern errors are reported, the first one is kept.
#[derive(Debug)]
pub struct BulkWriteCombiner {
    kind: WriteKind,
    ordered: bool,
    write_concern: WriteConcern,
    counts: BulkCounts,
    write_errors: Vec<WriteError>,
    write_concern_error: Option<WriteConcernError>,
}

impl BulkWriteCombiner {
    pub fn new(kind: WriteKind, ordered: bool, write_concern: WriteConcern) -> Self {
        Self {
            kind,
            ordered,
            write_concern,
            counts: BulkCounts::default(),
            write_errors: Vec::new(),
            write_concern_error: None,
        }
    }

    pub fn kind(&self) -> WriteKind {
        self.kind
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    pub fn has_write_errors(&self) -> bool {
        !self.write_errors.is_empty()
    }

    pub fn add_result(&mut self, result: BulkResult, index_map: &IndexMap) -> CoreResult<()> {
        let counts = match (self.write_concern.is_acknowledged(), result) {
            (true, BulkResult::Acknowledged(counts)) => counts,
            (false, BulkResult::Unacknowledged) => return Ok(()),
            (acknowledged, _) => {
                return Err(CoreError::Internal(format!(
                    "cannot merge a result whose acknowledgment differs from the write concern (acknowledged: {acknowledged})"
                )))
            }
        };
        self.counts.inserted += counts.inserted;
        self.counts.matched += counts.matched;
        self.counts.modified += counts.modified;
        self.counts.removed += counts.removed;
        for upsert in counts.upserts {
            let index = remap(index_map, upsert.index)?;
            self.counts.upserts.push(BulkUpsert {
                index,
                id: upsert.id,
            });
        }
        Ok(())
    }

    pub fn add_write_error_result(
        &mut self,
        mut error: WriteError,
        index_map: &IndexMap,
    ) -> CoreResult<()> {
        error.index = remap(index_map, error.index)?;
        self.write_errors.push(error);
        Ok(())
    }

    pub fn add_write_concern_error_result(&mut self, error: WriteConcernError) {
        if self.write_concern_error.is_none() {
            self.write_concern_error = Some(error);
        } else {
            tracing::debug!(
                target: "docdb::bulk",
                code = error.code,
                "dropping additional write concern error"
            );
        }
    }

    /// Finalize: the merged result, or the aggregated failure if any error
    /// was recorded.
    pub fn get_result(mut self) -> CoreResult<BulkResult> {
        self.counts.upserts.sort_by_key(|u| u.index);
        if !self.write_errors.is_empty() || self.write_concern_error.is_some() {
            self.write_errors.sort_by_key(|e| e.index);
            let result = if self.write_concern.is_acknowledged() {
                BulkResult::Acknowledged(self.counts)
            } else {
                BulkResult::Unacknowledged
            };
            return Err(CoreError::BulkWrite(Box::new(BulkWriteFailure {
                kind: self.kind,
                result,
                write_errors: self.write_errors,
                write_concern_error: self.write_concern_error,
            })));
        }
        if !self.write_concern.is_acknowledged() {
            return Ok(BulkResult::Unacknowledged);
        }
        Ok(BulkResult::Acknowledged(self.counts))
    }
}

fn remap(index_map: &IndexMap, local: usize) -> CoreResult<usize> {
    index_map.map(local).ok_or_else(|| {
        CoreError::Internal(format!("no outer batch position for sub-batch index {local}"))
    })
}
