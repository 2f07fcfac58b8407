//! Conversion from the store's native write results to canonical bulk shapes.

use super::result::{BulkCounts, BulkResult, BulkUpsert, WriteConcernError, WriteError};
use crate::error::CoreResult;
use crate::store::{NativeBulkResult, NativeUpsert, NativeWriteConcernError, NativeWriteError};
use crate::values::Document;

/// Response keys that are not diagnostic information.
const IGNORED_KEYS: [&str; 3] = ["ok", "err", "code"];

pub fn to_bulk_result(native: NativeBulkResult) -> BulkResult {
    if !native.acknowledged {
        return BulkResult::Unacknowledged;
    }
    BulkResult::acknowledged(BulkCounts {
        inserted: native.inserted_count,
        matched: native.matched_count,
        modified: native.modified_count,
        removed: native.removed_count,
        upserts: to_upserts(native.upserts),
    })
}

pub fn to_upserts(native: Vec<NativeUpsert>) -> Vec<BulkUpsert> {
    native
        .into_iter()
        .map(|u| BulkUpsert {
            index: u.index,
            id: u.id,
        })
        .collect()
}

/// Convert a native item failure, reporting it at local position `index`.
pub fn to_write_error(native: &NativeWriteError, index: usize) -> WriteError {
    WriteError {
        index,
        code: native.code,
        message: native.message.clone(),
        details: error_details(&native.response),
    }
}

pub fn to_write_concern_error(native: &NativeWriteConcernError) -> CoreResult<WriteConcernError> {
    Ok(WriteConcernError {
        code: native.code,
        message: native.err_message()?.to_owned(),
        details: error_details(&native.response),
    })
}

/// A write-concern failure that was not a timeout is reported against the
/// batch as an ordinary write error.
pub fn write_concern_to_write_error(
    native: &NativeWriteConcernError,
    index: usize,
) -> CoreResult<WriteError> {
    Ok(WriteError {
        index,
        code: native.code,
        message: native.err_message()?.to_owned(),
        details: error_details(&native.response),
    })
}

/// Copy a getLastError response without its status keys.
pub fn error_details(response: &Document) -> Document {
    response
        .iter()
        .filter(|(key, _)| !IGNORED_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::error::CoreError;
    use serde_json::json;

    fn native(acknowledged: bool) -> NativeBulkResult {
        NativeBulkResult {
            acknowledged,
            inserted_count: 3,
            matched_count: 1,
            modified_count: 1,
            removed_count: 0,
            upserts: vec![NativeUpsert {
                index: 0,
                id: json!("x"),
            }],
        }
    }

    #[test]
    fn counts_map_one_to_one() {
        let result = to_bulk_result(native(true));
        assert_eq!(result.inserted_count(), 3);
        assert_eq!(result.matched_count(), 1);
        assert_eq!(result.modified_count(), 1);
        assert_eq!(
            result.upserts(),
            &[BulkUpsert {
                index: 0,
                id: json!("x")
            }]
        );
    }

    #[test]
    fn unacknowledged_drops_counts() {
        assert_eq!(to_bulk_result(native(false)), BulkResult::Unacknowledged);
    }

    #[test]
    fn details_strip_status_keys() {
        let response = doc! {
            "ok" => 1,
            "err" => "boom",
            "code" => 11000,
            "n" => 0,
            "index" => "email_1",
        };
        let details = error_details(&response);
        let keys: Vec<&str> = details.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["n", "index"]);
    }

    #[test]
    fn write_error_keeps_code_and_message() {
        let native = NativeWriteError::from_error(0, &CoreError::bad_value("unknown operator: $x"));
        let error = to_write_error(&native, 4);
        assert_eq!(error.index, 4);
        assert_eq!(error.code, 2);
        assert_eq!(error.message, "unknown operator: $x");
        assert!(!error.details.contains_key("err"));
    }

    #[test]
    fn write_concern_error_requires_err() {
        let good = NativeWriteConcernError {
            code: 64,
            response: doc! {
                "ok" => 1,
                "err" => "waiting for replication timed out",
                "code" => 64,
                "wtimeout" => true,
            },
        };
        let wce = to_write_concern_error(&good).unwrap();
        assert_eq!(wce.message, "waiting for replication timed out");
        assert_eq!(wce.details, doc! { "wtimeout" => true });

        let bad = NativeWriteConcernError {
            code: 64,
            response: doc! { "ok" => 1 },
        };
        assert!(to_write_concern_error(&bad).is_err());
    }
}
