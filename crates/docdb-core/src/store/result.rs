//! Legacy-style result shapes reported by the store.

use crate::error::{CoreError, CoreResult};
use crate::values::{Document, Value};
use serde_json::json;

/// Outcome of a single legacy `update` or `remove`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteResult {
    /// Documents matched (update) or removed (remove).
    pub n: u64,
    pub updated_existing: bool,
    pub modified: u64,
    pub upserted_id: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NativeUpsert {
    pub index: usize,
    pub id: Value,
}

/// Counts of one executed bulk operation.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeBulkResult {
    pub acknowledged: bool,
    pub inserted_count: u64,
    pub matched_count: u64,
    pub modified_count: u64,
    pub removed_count: u64,
    pub upserts: Vec<NativeUpsert>,
}

impl NativeBulkResult {
    pub fn new(acknowledged: bool) -> Self {
        Self {
            acknowledged,
            inserted_count: 0,
            matched_count: 0,
            modified_count: 0,
            removed_count: 0,
            upserts: Vec::new(),
        }
    }
}

/// A failed request inside a bulk operation.
///
/// `response` is the getLastError-style document for the failure:
/// `{ok, err, code, n, ...diagnostics}`.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeWriteError {
    pub index: usize,
    pub code: i32,
    pub message: String,
    pub response: Document,
}

impl NativeWriteError {
    pub fn from_error(index: usize, error: &CoreError) -> Self {
        let message = error.to_string();
        let mut response = last_error_response(error.code(), &message);
        if let CoreError::DuplicateKey { index: name, .. } = error {
            response.insert("index".into(), json!(name));
        }
        Self {
            index,
            code: error.code(),
            message,
            response,
        }
    }
}

/// A write-concern failure after the write applied.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeWriteConcernError {
    pub code: i32,
    pub response: Document,
}

impl NativeWriteConcernError {
    /// The textual `err` field; its absence is a store defect.
    pub fn err_message(&self) -> CoreResult<&str> {
        self.response
            .get("err")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                CoreError::Internal("write concern error response carries no err".into())
            })
    }

    pub fn is_timeout(&self) -> bool {
        self.response.contains_key("wtimeout")
    }
}

/// Everything one bulk execution produced.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkExecution {
    pub result: NativeBulkResult,
    pub write_errors: Vec<NativeWriteError>,
    pub write_concern_error: Option<NativeWriteConcernError>,
}

pub(crate) fn last_error_response(code: i32, message: &str) -> Document {
    let mut response = Document::new();
    response.insert("ok".into(), json!(1));
    response.insert("err".into(), json!(message));
    response.insert("code".into(), json!(code));
    response.insert("n".into(), json!(0));
    response
}
