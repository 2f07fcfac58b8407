//! Filter matching, sorting and projection over stored documents.

use crate::error::{CoreError, CoreResult};
use crate::values::{as_flag, as_integer, compare_values, values_equal, Document, Value, ID_FIELD};
use std::cmp::Ordering;
use std::mem::discriminant;

/// Does `doc` satisfy `filter`?
pub fn matches(doc: &Document, filter: &Document) -> CoreResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => all_clauses(condition, key)?
                .iter()
                .try_fold(true, |acc, clause| Ok::<_, CoreError>(acc && matches(doc, clause)?))?,
            "$or" => {
                let mut any = false;
                for clause in all_clauses(condition, key)? {
                    if matches(doc, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for clause in all_clauses(condition, key)? {
                    if matches(doc, clause)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            op if op.starts_with('$') => {
                return Err(CoreError::bad_value(format!("unknown top level operator: {op}")))
            }
            path => field_matches(&resolve(doc, path), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn all_clauses<'a>(condition: &'a Value, op: &str) -> CoreResult<Vec<&'a Document>> {
    let Value::Array(items) = condition else {
        return Err(CoreError::bad_value(format!("{op} must be an array")));
    };
    if items.is_empty() {
        return Err(CoreError::bad_value(format!(
            "$and/$or/$nor entries need to be full objects, {op} was empty"
        )));
    }
    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| CoreError::bad_value(format!("{op} entries need to be full objects")))
        })
        .collect()
}

/// Every value reachable at a dotted path. Arrays along the way fan out
/// into their elements unless the segment is a numeric position.
pub fn resolve<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some(first) = doc.get(segments[0]) {
        collect(first, &segments[1..], &mut out);
    }
    out
}

fn collect<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    let Some((segment, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Value::Object(map) => {
            if let Some(child) = map.get(*segment) {
                collect(child, rest, out);
            }
        }
        Value::Array(items) => {
            if let Ok(position) = segment.parse::<usize>() {
                if let Some(child) = items.get(position) {
                    collect(child, rest, out);
                }
            }
            for item in items.iter().filter(|item| item.is_object()) {
                collect(item, segments, out);
            }
        }
        _ => {}
    }
}

fn is_operator_expression(condition: &Value) -> bool {
    condition
        .as_object()
        .and_then(|map| map.keys().next())
        .is_some_and(|key| key.starts_with('$'))
}

fn field_matches(values: &[&Value], condition: &Value) -> CoreResult<bool> {
    match condition {
        Value::Object(ops) if is_operator_expression(condition) => {
            for (op, argument) in ops {
                if !operator_matches(values, op, argument)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(equality_matches(values, condition)),
    }
}

/// Implicit equality: a missing field equals null, and an array matches
/// when any element does.
fn equality_matches(values: &[&Value], expected: &Value) -> bool {
    if values.is_empty() {
        return expected.is_null();
    }
    values.iter().any(|value| {
        values_equal(value, expected)
            || value
                .as_array()
                .is_some_and(|items| items.iter().any(|item| values_equal(item, expected)))
    })
}

fn candidates<'a>(values: &[&'a Value]) -> Vec<&'a Value> {
    let mut out = Vec::new();
    for &value in values {
        out.push(value);
        if let Value::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

fn compare_with(values: &[&Value], bound: &Value, accept: fn(Ordering) -> bool) -> bool {
    candidates(values).into_iter().any(|candidate| {
        discriminant(candidate) == discriminant(bound) && accept(compare_values(candidate, bound))
    })
}

fn operator_matches(values: &[&Value], op: &str, argument: &Value) -> CoreResult<bool> {
    Ok(match op {
        "$eq" => equality_matches(values, argument),
        "$ne" => !equality_matches(values, argument),
        "$gt" => compare_with(values, argument, Ordering::is_gt),
        "$gte" => compare_with(values, argument, Ordering::is_ge),
        "$lt" => compare_with(values, argument, Ordering::is_lt),
        "$lte" => compare_with(values, argument, Ordering::is_le),
        "$in" => in_list(values, argument, op)?,
        "$nin" => !in_list(values, argument, op)?,
        "$exists" => {
            let wanted = as_flag(argument).unwrap_or(true);
            values.is_empty() != wanted
        }
        "$not" => {
            if !is_operator_expression(argument) {
                return Err(CoreError::bad_value("$not needs a regex or a document"));
            }
            !field_matches(values, argument)?
        }
        "$size" => {
            let size = as_integer(argument)
                .ok_or_else(|| CoreError::bad_value("$size needs a number"))?;
            values
                .iter()
                .any(|value| value.as_array().is_some_and(|items| items.len() as i64 == size))
        }
        "$all" => {
            let Value::Array(required) = argument else {
                return Err(CoreError::bad_value("$all needs an array"));
            };
            !required.is_empty()
                && required
                    .iter()
                    .all(|expected| equality_matches(values, expected))
        }
        "$elemMatch" => {
            let Value::Object(criteria) = argument else {
                return Err(CoreError::bad_value("$elemMatch needs an Object"));
            };
            let mut any = false;
            for items in values.iter().filter_map(|value| value.as_array()) {
                for item in items {
                    let hit = if is_operator_expression(argument) {
                        field_matches(&[item], argument)?
                    } else {
                        match item {
                            Value::Object(inner) => matches(inner, criteria)?,
                            _ => false,
                        }
                    };
                    if hit {
                        any = true;
                        break;
                    }
                }
            }
            any
        }
        other => return Err(CoreError::bad_value(format!("unknown operator: {other}"))),
    })
}

fn in_list(values: &[&Value], argument: &Value, op: &str) -> CoreResult<bool> {
    let Value::Array(options) = argument else {
        return Err(CoreError::bad_value(format!("{op} needs an array")));
    };
    Ok(options.iter().any(|option| equality_matches(values, option)))
}

/// Matching used by `$pull`: documents are matched as filters, operator
/// expressions as conditions, everything else by equality.
pub fn element_matches(element: &Value, condition: &Value) -> CoreResult<bool> {
    match (element, condition) {
        (_, Value::Object(_)) if is_operator_expression(condition) => {
            field_matches(&[element], condition)
        }
        (Value::Object(inner), Value::Object(criteria)) => matches(inner, criteria),
        _ => Ok(values_equal(element, condition)),
    }
}

/// Parse a sort specification into `(path, ascending)` pairs.
pub fn sort_keys(spec: &Document) -> CoreResult<Vec<(String, bool)>> {
    spec.iter()
        .map(|(path, direction)| match as_integer(direction) {
            Some(1) => Ok((path.clone(), true)),
            Some(-1) => Ok((path.clone(), false)),
            _ => Err(CoreError::bad_value(format!(
                "bad sort specification for {path}: direction must be 1 or -1"
            ))),
        })
        .collect()
}

/// Stable sort by the given specification; a missing field sorts as null.
pub fn sort_documents(docs: &mut [Document], spec: &Document) -> CoreResult<()> {
    let keys = sort_keys(spec)?;
    if !keys.is_empty() {
        docs.sort_by(|a, b| compare_by_keys(&keys, a, b));
    }
    Ok(())
}

pub fn compare_by_keys(keys: &[(String, bool)], a: &Document, b: &Document) -> Ordering {
    for (path, ascending) in keys {
        let left = crate::values::get_path(a, path).unwrap_or(&Value::Null);
        let right = crate::values::get_path(b, path).unwrap_or(&Value::Null);
        let ord = compare_values(left, right);
        if ord != Ordering::Equal {
            return if *ascending { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

/// Apply an inclusion or exclusion projection. `_id` is kept unless it is
/// explicitly excluded.
pub fn project(doc: &Document, projection: &Document) -> CoreResult<Document> {
    if projection.is_empty() {
        return Ok(doc.clone());
    }
    let mut include_id = true;
    let mut included = Vec::new();
    let mut excluded = Vec::new();
    for (path, flag) in projection {
        let keep = as_flag(flag).unwrap_or(true);
        if path == ID_FIELD {
            include_id = keep;
        } else if keep {
            included.push(path.as_str());
        } else {
            excluded.push(path.as_str());
        }
    }
    if !included.is_empty() && !excluded.is_empty() {
        return Err(CoreError::bad_value(
            "Projection cannot have a mix of inclusion and exclusion.",
        ));
    }

    if included.is_empty() {
        let mut out = doc.clone();
        for path in excluded {
            crate::values::remove_path(&mut out, path);
        }
        if !include_id {
            out.shift_remove(ID_FIELD);
        }
        return Ok(out);
    }

    let mut out = Document::new();
    if include_id {
        if let Some(id) = doc.get(ID_FIELD) {
            out.insert(ID_FIELD.to_owned(), id.clone());
        }
    }
    for path in included {
        if let Some(value) = crate::values::get_path(doc, path) {
            crate::values::set_path(&mut out, path, value.clone())?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use serde_json::json;

    fn filter(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn implicit_equality_and_arrays() {
        let d = doc! { "name" => "Alice", "tags" => json!(["a", "b"]) };
        assert!(matches(&d, &filter(json!({"name": "Alice"}))).unwrap());
        assert!(matches(&d, &filter(json!({"tags": "b"}))).unwrap());
        assert!(!matches(&d, &filter(json!({"tags": "c"}))).unwrap());
        assert!(matches(&d, &filter(json!({"missing": null}))).unwrap());
    }

    #[test]
    fn comparison_operators() {
        let d = doc! { "age" => 30 };
        assert!(matches(&d, &filter(json!({"age": {"$gt": 20, "$lte": 30}}))).unwrap());
        assert!(!matches(&d, &filter(json!({"age": {"$lt": 30}}))).unwrap());
        assert!(!matches(&d, &filter(json!({"age": {"$gt": "20"}}))).unwrap());
        assert!(matches(&d, &filter(json!({"age": {"$in": [1, 30.0]}}))).unwrap());
        assert!(matches(&d, &filter(json!({"age": {"$not": {"$gt": 40}}}))).unwrap());
    }

    #[test]
    fn logical_operators() {
        let d = doc! { "a" => 1, "b" => 2 };
        assert!(matches(&d, &filter(json!({"$or": [{"a": 5}, {"b": 2}]}))).unwrap());
        assert!(!matches(&d, &filter(json!({"$and": [{"a": 1}, {"b": 3}]}))).unwrap());
        assert!(matches(&d, &filter(json!({"$nor": [{"a": 5}]}))).unwrap());
    }

    #[test]
    fn nested_paths_fan_out_over_arrays() {
        let d = doc! { "items" => json!([{"sku": "x", "qty": 1}, {"sku": "y", "qty": 5}]) };
        assert!(matches(&d, &filter(json!({"items.sku": "y"}))).unwrap());
        assert!(matches(&d, &filter(json!({"items.1.qty": 5}))).unwrap());
        assert!(matches(
            &d,
            &filter(json!({"items": {"$elemMatch": {"sku": "x", "qty": {"$lt": 2}}}}))
        )
        .unwrap());
    }

    #[test]
    fn unknown_operator_is_bad_value() {
        let err = matches(&doc! { "a" => 1 }, &filter(json!({"a": {"$bogus": 1}}))).unwrap_err();
        assert_eq!(err.code(), 2);
        assert!(err.to_string().contains("$bogus"));
    }

    #[test]
    fn sort_is_stable_and_directional() {
        let mut docs = vec![
            doc! { "k" => 1, "n" => "a" },
            doc! { "k" => 2, "n" => "b" },
            doc! { "k" => 1, "n" => "c" },
        ];
        sort_documents(&mut docs, &doc! { "k" => -1 }).unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d["n"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn projection_modes() {
        let d = doc! { "_id" => 1, "name" => "Alice", "age" => 30 };
        let inc = project(&d, &doc! { "name" => 1 }).unwrap();
        assert_eq!(inc, doc! { "_id" => 1, "name" => "Alice" });
        let exc = project(&d, &doc! { "age" => 0, "_id" => 0 }).unwrap();
        assert_eq!(exc, doc! { "name" => "Alice" });
        assert!(project(&d, &doc! { "name" => 1, "age" => 0 }).is_err());
    }
}
