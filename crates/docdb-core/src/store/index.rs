use crate::values::{compare_values, get_path, Document, Value};
use serde_json::json;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Composite index key: one value per field of the key pattern.
#[derive(Debug, Clone)]
pub struct IndexValue(pub Vec<Value>);

impl PartialEq for IndexValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexValue {}

impl PartialOrd for IndexValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexValue {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            let ord = compare_values(a, b);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

/// Defines which fields an index covers.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub name: String,
    pub namespace: String,
    /// Ordered key pattern, e.g. `{name: 1, age: -1}` or `{loc: "2d"}`.
    pub keys: Document,
    pub unique: bool,
}

impl IndexDefinition {
    /// The first field indexed as `2d` or `2dsphere`, if any.
    pub fn geo_field(&self) -> Option<&str> {
        self.keys
            .iter()
            .find(|(_, kind)| matches!(kind.as_str(), Some("2d" | "2dsphere")))
            .map(|(field, _)| field.as_str())
    }

    /// The `listIndexes` entry for this index.
    pub fn to_document(&self) -> Document {
        let mut out = Document::new();
        out.insert("v".into(), json!(2));
        out.insert("key".into(), Value::Object(self.keys.clone()));
        out.insert("name".into(), json!(self.name));
        out.insert("ns".into(), json!(self.namespace));
        if self.unique {
            out.insert("unique".into(), json!(true));
        }
        out
    }
}

/// A single index backed by a BTreeMap.
///
/// Maps composite key values to the set of sequence numbers of the
/// documents holding them.
#[derive(Debug, Clone)]
pub struct Index {
    definition: IndexDefinition,
    entries: BTreeMap<IndexValue, BTreeSet<u64>>,
}

impl Index {
    pub fn new(definition: IndexDefinition) -> Self {
        Self {
            definition,
            entries: BTreeMap::new(),
        }
    }

    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub(crate) fn set_namespace(&mut self, namespace: &str) {
        self.definition.namespace = namespace.to_owned();
    }

    pub fn insert(&mut self, seq: u64, doc: &Document) {
        let key = self.extract_key(doc);
        self.entries.entry(key).or_default().insert(seq);
    }

    pub fn remove(&mut self, seq: u64, doc: &Document) {
        let key = self.extract_key(doc);
        if let Some(seqs) = self.entries.get_mut(&key) {
            seqs.remove(&seq);
            if seqs.is_empty() {
                self.entries.remove(&key);
            }
        }
    }

    /// Would storing `doc` (as `seq`, when replacing) break uniqueness?
    /// Returns the conflicting key.
    pub fn conflict(&self, doc: &Document, seq: Option<u64>) -> Option<IndexValue> {
        if !self.definition.unique {
            return None;
        }
        let key = self.extract_key(doc);
        let taken = self
            .entries
            .get(&key)
            .is_some_and(|seqs| seqs.iter().any(|s| Some(*s) != seq));
        taken.then_some(key)
    }

    pub fn lookup(&self, values: &[Value]) -> Vec<u64> {
        self.entries
            .get(&IndexValue(values.to_vec()))
            .map(|seqs| seqs.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Render a key as the server does in duplicate-key messages:
    /// `{ name: "x" }`.
    pub fn describe_key(&self, key: &IndexValue) -> String {
        let parts: Vec<String> = self
            .definition
            .keys
            .keys()
            .zip(key.0.iter())
            .map(|(field, value)| format!("{field}: {value}"))
            .collect();
        format!("{{ {} }}", parts.join(", "))
    }

    fn extract_key(&self, doc: &Document) -> IndexValue {
        IndexValue(
            self.definition
                .keys
                .keys()
                .map(|field| get_path(doc, field).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }

    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }
}

/// Default index name: each `field_direction` joined by `_`.
pub fn index_name_from_keys(keys: &Document) -> String {
    keys.iter()
        .map(|(field, direction)| match direction {
            Value::String(kind) => format!("{field}_{kind}"),
            other => match crate::values::as_integer(other) {
                Some(n) => format!("{field}_{n}"),
                None => format!("{field}_{other}"),
            },
        })
        .collect::<Vec<_>>()
        .join("_")
}

/// Key-pattern equality that ignores numeric representation (`1` == `1.0`).
pub fn key_patterns_equal(a: &Document, b: &Document) -> bool {
    a.len() == b.len()
        && a.iter().zip(b.iter()).all(|((ka, va), (kb, vb))| {
            ka == kb && crate::values::values_equal(va, vb)
        })
}
