use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a collection: a (database, collection) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Namespace {
    database: String,
    collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// Parse a full name (`db.collection`). The collection part may itself
    /// contain dots; the split happens at the first one.
    pub fn parse(full_name: &str) -> CoreResult<Self> {
        match full_name.split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() => Ok(Self::new(db, coll)),
            _ => Err(CoreError::InvalidNamespace(full_name.to_owned())),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }

    /// Reject collection names the server would refuse to create.
    pub fn validate_collection_name(&self) -> CoreResult<()> {
        let name = self.collection.as_str();
        if name.is_empty() || name.starts_with("system.") || name.contains('$') || name.contains('\0')
        {
            return Err(CoreError::InvalidNamespace(format!(
                "Invalid collection name {name}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_at_first_dot() {
        let ns = Namespace::parse("app.users.archive").unwrap();
        assert_eq!(ns.database(), "app");
        assert_eq!(ns.collection(), "users.archive");
        assert_eq!(ns.full_name(), "app.users.archive");
    }

    #[test]
    fn parse_rejects_malformed_names() {
        assert!(Namespace::parse("nodot").is_err());
        assert!(Namespace::parse(".users").is_err());
        assert!(Namespace::parse("app.").is_err());
    }

    #[test]
    fn collection_name_rules() {
        assert!(Namespace::new("app", "users").validate_collection_name().is_ok());
        assert!(Namespace::new("app", "").validate_collection_name().is_err());
        assert!(Namespace::new("app", "system.indexes").validate_collection_name().is_err());
        assert!(Namespace::new("app", "a$b").validate_collection_name().is_err());
        assert!(Namespace::new("app", "a\0b").validate_collection_name().is_err());
    }

    #[test]
    fn display_matches_full_name() {
        let ns = Namespace::new("app", "users");
        assert_eq!(ns.to_string(), ns.full_name());
    }
}
