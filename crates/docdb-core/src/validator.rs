//! Top-level field-name rules applied to write items before they reach the store.

use crate::error::{CoreError, CoreResult};
use crate::values::Document;

/// A predicate over the top-level keys of a write item.
pub trait FieldNameValidator {
    fn validate(&self, field_name: &str) -> bool;

    /// Check every key, failing on the first invalid one.
    fn validate_document(&self, doc: &Document) -> CoreResult<()> {
        match doc.keys().find(|key| !self.validate(key)) {
            Some(key) => Err(CoreError::InvalidArgument(format!(
                "Invalid BSON field name {key}"
            ))),
            None => Ok(()),
        }
    }
}

/// Names that may never appear in any stored or operator document.
fn is_malformed(field_name: &str) -> bool {
    field_name.is_empty() || field_name.contains('\0')
}

/// Rules for documents stored directly as records (inserts and replacements).
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectibleDocumentValidator;

/// DBRef components are the only `$`-prefixed names a record may carry.
const DBREF_FIELDS: [&str; 3] = ["$ref", "$id", "$db"];

impl FieldNameValidator for CollectibleDocumentValidator {
    fn validate(&self, field_name: &str) -> bool {
        if is_malformed(field_name) || field_name.contains('.') {
            return false;
        }
        !field_name.starts_with('$') || DBREF_FIELDS.contains(&field_name)
    }
}

/// Rules for operator-style update documents (`{$set: {...}}`).
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateValidator;

impl FieldNameValidator for UpdateValidator {
    fn validate(&self, field_name: &str) -> bool {
        !is_malformed(field_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use proptest::prelude::*;

    #[test]
    fn collectible_accepts_ordinary_and_identity_fields() {
        let v = CollectibleDocumentValidator;
        assert!(v.validate("name"));
        assert!(v.validate("_id"));
        assert!(v.validate("$ref"));
    }

    #[test]
    fn collectible_rejects_operators_and_dots() {
        let v = CollectibleDocumentValidator;
        assert!(!v.validate("$set"));
        assert!(!v.validate("a.b"));
        assert!(!v.validate(""));
        assert!(!v.validate("a\0b"));
    }

    #[test]
    fn update_accepts_operators() {
        let v = UpdateValidator;
        assert!(v.validate("$set"));
        assert!(v.validate("$inc"));
        assert!(!v.validate(""));
        assert!(!v.validate("\0"));
    }

    #[test]
    fn validate_document_names_offending_key() {
        let d = doc! { "ok" => 1, "$bad" => 2 };
        let err = CollectibleDocumentValidator.validate_document(&d).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
        assert!(err.to_string().contains("$bad"));
    }

    proptest! {
        #[test]
        fn validators_agree_on_ordinary_names(name in "[a-zA-Z_][a-zA-Z0-9_]{0,24}") {
            prop_assert!(CollectibleDocumentValidator.validate(&name));
            prop_assert!(UpdateValidator.validate(&name));
        }

        #[test]
        fn validators_reject_nul(prefix in "[a-z]{0,8}", suffix in "[a-z]{0,8}") {
            let name = format!("{prefix}\0{suffix}");
            prop_assert!(!CollectibleDocumentValidator.validate(&name));
            prop_assert!(!UpdateValidator.validate(&name));
        }
    }
}
