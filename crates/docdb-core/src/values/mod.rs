pub mod id;

pub use id::ObjectId;

use crate::error::{CoreError, CoreResult};
use std::cmp::Ordering;

/// A single document field value.
///
/// Documents cross the engine boundary as JSON trees; the codec that turns
/// them into wire bytes is outside this crate.
pub type Value = serde_json::Value;

/// An ordered mapping of field names to values.
///
/// Key order is preserved (`serde_json` is built with `preserve_order`), which
/// matters for command names, sort specifications and index key patterns.
pub type Document = serde_json::Map<String, Value>;

/// The identity field present on every stored document.
pub const ID_FIELD: &str = "_id";

/// Returns the type name of a value, useful for error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Sort bucket for cross-type ordering.
/// Null < Numbers < String < Object < Array < Boolean, as the server orders BSON types.
fn type_order(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total ordering over values. Integers and floats compare numerically.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let type_ord = type_order(a).cmp(&type_order(b));
    if type_ord != Ordering::Equal {
        return type_ord;
    }
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => compare_documents(x, y),
        _ => Ordering::Equal,
    }
}

/// Field-by-field comparison in key order: key first, then value.
pub fn compare_documents(a: &Document, b: &Document) -> Ordering {
    let mut a_iter = a.iter();
    let mut b_iter = b.iter();
    loop {
        match (a_iter.next(), b_iter.next()) {
            (Some((ka, va)), Some((kb, vb))) => {
                let ord = ka.cmp(kb).then_with(|| compare_values(va, vb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (None, None) => return Ordering::Equal,
        }
    }
}

/// Value equality under the total ordering, so `1` equals `1.0`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Ordering::Equal
}

/// Reads an integer argument. Floats with no fractional part are accepted.
pub fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64)
        }),
        _ => None,
    }
}

/// Reads a boolean argument; numbers count as true when non-zero.
pub fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        _ => None,
    }
}

/// Resolve a dotted path (`a.b.0.c`) against a document.
/// Numeric segments index into arrays.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = doc.get(first)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Set a value at a dotted path, creating intermediate documents as needed.
pub fn set_path(doc: &mut Document, path: &str, value: Value) -> CoreResult<()> {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_owned(), value);
            Ok(())
        }
        Some((head, rest)) => {
            let child = doc
                .entry(head.to_owned())
                .or_insert_with(|| Value::Object(Document::new()));
            match child {
                Value::Object(map) => set_path(map, rest, value),
                Value::Array(items) => {
                    let (segment, tail) = match rest.split_once('.') {
                        Some((segment, tail)) => (segment, Some(tail)),
                        None => (rest, None),
                    };
                    let index = segment.parse::<usize>().map_err(|_| {
                        path_error(path, "cannot index an array with a field name")
                    })?;
                    while items.len() <= index {
                        items.push(Value::Null);
                    }
                    match tail {
                        None => {
                            items[index] = value;
                            Ok(())
                        }
                        Some(tail) => {
                            if !items[index].is_object() {
                                items[index] = Value::Object(Document::new());
                            }
                            match &mut items[index] {
                                Value::Object(map) => set_path(map, tail, value),
                                _ => Err(path_error(path, "cannot traverse element")),
                            }
                        }
                    }
                }
                other => Err(path_error(
                    path,
                    &format!("cannot create field in element of type {}", type_name(other)),
                )),
            }
        }
    }
}

/// Remove the value at a dotted path, returning it if it existed.
pub fn remove_path(doc: &mut Document, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => doc.shift_remove(path),
        Some((head, rest)) => match doc.get_mut(head)? {
            Value::Object(map) => remove_path(map, rest),
            _ => None,
        },
    }
}

fn path_error(path: &str, reason: &str) -> CoreError {
    CoreError::Operation {
        code: 28,
        message: format!("cannot use the part of ({path}): {reason}"),
    }
}

/// Helper macro for constructing a [`Document`] inline.
///
/// # Example
/// ```
/// use docdb_core::doc;
///
/// let d = doc! {
///     "name" => "Alice",
///     "age" => 30,
/// };
/// assert_eq!(d.keys().next().map(String::as_str), Some("name"));
/// ```
#[macro_export]
macro_rules! doc {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut map = $crate::values::Document::new();
        $(
            map.insert($key.to_string(), $crate::values::Value::from($value));
        )*
        map
    }};
}
