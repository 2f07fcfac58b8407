use crate::values::{Document, Value};
use serde_json::json;
use thiserror::Error;

/// The kind of write a batch carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Update,
    Replace,
    Delete,
}

/// An upsert reported at a position of the outer batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkUpsert {
    pub index: usize,
    pub id: Value,
}

/// Counts carried by an acknowledged bulk result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkCounts {
    pub inserted: u64,
    pub matched: u64,
    pub modified: u64,
    pub removed: u64,
    pub upserts: Vec<BulkUpsert>,
}

/// Canonical outcome of a (possibly multi-item) write.
///
/// An unacknowledged write has no counts at all.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkResult {
    Acknowledged(BulkCounts),
    Unacknowledged,
}

impl BulkResult {
    pub fn acknowledged(counts: BulkCounts) -> Self {
        Self::Acknowledged(counts)
    }

    pub fn empty() -> Self {
        Self::Acknowledged(BulkCounts::default())
    }

    pub fn is_acknowledged(&self) -> bool {
        matches!(self, Self::Acknowledged(_))
    }

    pub fn counts(&self) -> Option<&BulkCounts> {
        match self {
            Self::Acknowledged(counts) => Some(counts),
            Self::Unacknowledged => None,
        }
    }

    pub fn inserted_count(&self) -> u64 {
        self.counts().map_or(0, |c| c.inserted)
    }

    pub fn matched_count(&self) -> u64 {
        self.counts().map_or(0, |c| c.matched)
    }

    pub fn modified_count(&self) -> u64 {
        self.counts().map_or(0, |c| c.modified)
    }

    pub fn removed_count(&self) -> u64 {
        self.counts().map_or(0, |c| c.removed)
    }

    pub fn upserts(&self) -> &[BulkUpsert] {
        self.counts().map_or(&[], |c| c.upserts.as_slice())
    }
}

/// A per-item failure, indexed by position in the original batch.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteError {
    pub index: usize,
    pub code: i32,
    pub message: String,
    pub details: Document,
}

/// The write applied but could not be acknowledged as requested.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteConcernError {
    pub code: i32,
    pub message: String,
    pub details: Document,
}

/// The aggregated write exception: partial result plus every recorded error.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("bulk write failed with {} write error(s)", .write_errors.len())]
pub struct BulkWriteFailure {
    pub kind: WriteKind,
    pub result: BulkResult,
    pub write_errors: Vec<WriteError>,
    pub write_concern_error: Option<WriteConcernError>,
}

impl BulkWriteFailure {
    /// Render the server-style reply for a write command that partially failed.
    pub fn to_response(&self) -> Document {
        let n = match self.kind {
            WriteKind::Insert => self.result.inserted_count(),
            WriteKind::Delete => self.result.removed_count(),
            WriteKind::Update | WriteKind::Replace => {
                self.result.matched_count() + self.result.upserts().len() as u64
            }
        };
        let mut reply = Document::new();
        reply.insert("ok".into(), json!(1));
        reply.insert("n".into(), json!(n));
        if matches!(self.kind, WriteKind::Update | WriteKind::Replace) {
            reply.insert("nModified".into(), json!(self.result.modified_count()));
        }
        if !self.write_errors.is_empty() {
            let errors = self
                .write_errors
                .iter()
                .map(|e| {
                    let mut entry = Document::new();
                    entry.insert("index".into(), json!(e.index));
                    entry.insert("code".into(), json!(e.code));
                    entry.insert("errmsg".into(), json!(e.message));
                    if !e.details.is_empty() {
                        entry.insert("errInfo".into(), Value::Object(e.details.clone()));
                    }
                    Value::Object(entry)
                })
                .collect();
            reply.insert("writeErrors".into(), Value::Array(errors));
        }
        if let Some(wce) = &self.write_concern_error {
            let mut entry = Document::new();
            entry.insert("code".into(), json!(wce.code));
            entry.insert("errmsg".into(), json!(wce.message));
            if !wce.details.is_empty() {
                entry.insert("errInfo".into(), Value::Object(wce.details.clone()));
            }
            reply.insert("writeConcernError".into(), Value::Object(entry));
        }
        reply
    }
}
