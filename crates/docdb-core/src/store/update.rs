//! Update operators, replacements and upsert document construction.

use super::query::element_matches;
use crate::error::{codes, CoreError, CoreResult};
use crate::values::{get_path, remove_path, set_path, values_equal, Document, Value, ID_FIELD};
use serde_json::Number;

/// An update whose first key is an operator (`$set`, `$inc`, ...).
pub fn is_operator_update(update: &Document) -> bool {
    update.keys().next().is_some_and(|key| key.starts_with('$'))
}

/// Apply an operator update to `doc` in place.
///
/// `inserting` enables `$setOnInsert`. Returns whether the document changed.
pub fn apply_update(doc: &mut Document, update: &Document, inserting: bool) -> CoreResult<bool> {
    let original = doc.clone();
    for (op, fields) in update {
        if !op.starts_with('$') {
            return Err(CoreError::failed_to_parse(format!(
                "Unknown modifier: {op}. Expected a valid update modifier or pipeline-style update"
            )));
        }
        let Value::Object(fields) = fields else {
            return Err(CoreError::failed_to_parse(format!(
                "Modifiers operate on fields but we found type {} instead",
                crate::values::type_name(fields)
            )));
        };
        for (path, argument) in fields {
            apply_operator(doc, op, path, argument, inserting)?;
        }
    }
    if let Some(id) = original.get(ID_FIELD) {
        if doc.get(ID_FIELD).map_or(true, |new_id| !values_equal(id, new_id)) {
            return Err(immutable_id());
        }
    }
    Ok(*doc != original)
}

fn apply_operator(
    doc: &mut Document,
    op: &str,
    path: &str,
    argument: &Value,
    inserting: bool,
) -> CoreResult<()> {
    match op {
        "$set" => set_path(doc, path, argument.clone()),
        "$setOnInsert" => {
            if inserting {
                set_path(doc, path, argument.clone())?;
            }
            Ok(())
        }
        "$unset" => {
            remove_path(doc, path);
            Ok(())
        }
        "$inc" | "$mul" => {
            let Value::Number(operand) = argument else {
                return Err(CoreError::Operation {
                    code: codes::TYPE_MISMATCH,
                    message: format!("Cannot {} with non-numeric argument: {path}", &op[1..]),
                });
            };
            let updated = match get_path(doc, path) {
                None => {
                    if op == "$inc" {
                        Value::Number(operand.clone())
                    } else {
                        arithmetic(&Number::from(0), operand, op)
                    }
                }
                Some(Value::Number(current)) => arithmetic(current, operand, op),
                Some(other) => {
                    return Err(CoreError::Operation {
                        code: codes::TYPE_MISMATCH,
                        message: format!(
                            "Cannot apply {op} to a value of non-numeric type {}",
                            crate::values::type_name(other)
                        ),
                    })
                }
            };
            set_path(doc, path, updated)
        }
        "$push" | "$addToSet" => {
            let items: Vec<Value> = match argument {
                Value::Object(spec) if spec.contains_key("$each") => match &spec["$each"] {
                    Value::Array(each) => each.clone(),
                    _ => return Err(CoreError::bad_value("The argument to $each must be an array")),
                },
                single => vec![single.clone()],
            };
            let mut array = existing_array(doc, path, op)?;
            for item in items {
                if op == "$push" || !array.iter().any(|present| values_equal(present, &item)) {
                    array.push(item);
                }
            }
            set_path(doc, path, Value::Array(array))
        }
        "$pull" => {
            let Some(current) = get_path(doc, path) else {
                return Ok(());
            };
            let Value::Array(items) = current else {
                return Err(CoreError::bad_value("Cannot apply $pull to a non-array value"));
            };
            let mut kept = Vec::with_capacity(items.len());
            for item in items {
                if !element_matches(item, argument)? {
                    kept.push(item.clone());
                }
            }
            set_path(doc, path, Value::Array(kept))
        }
        "$rename" => {
            let Value::String(target) = argument else {
                return Err(CoreError::bad_value(format!(
                    "The 'to' field for $rename must be a string: {path}"
                )));
            };
            if let Some(value) = remove_path(doc, path) {
                set_path(doc, target, value)?;
            }
            Ok(())
        }
        other => Err(CoreError::failed_to_parse(format!("Unknown modifier: {other}"))),
    }
}

fn existing_array(doc: &Document, path: &str, op: &str) -> CoreResult<Vec<Value>> {
    match get_path(doc, path) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(CoreError::bad_value(format!(
            "The field '{path}' must be an array but is of type {} for {op}",
            crate::values::type_name(other)
        ))),
    }
}

fn arithmetic(current: &Number, operand: &Number, op: &str) -> Value {
    if let (Some(a), Some(b)) = (current.as_i64(), operand.as_i64()) {
        let exact = if op == "$inc" {
            a.checked_add(b)
        } else {
            a.checked_mul(b)
        };
        if let Some(result) = exact {
            return Value::from(result);
        }
    }
    let a = current.as_f64().unwrap_or(0.0);
    let b = operand.as_f64().unwrap_or(0.0);
    let result = if op == "$inc" { a + b } else { a * b };
    Number::from_f64(result).map_or(Value::Null, Value::Number)
}

/// Full replacement that keeps the existing `_id` in front.
pub fn apply_replacement(existing: &Document, replacement: &Document) -> CoreResult<Document> {
    let mut out = Document::new();
    if let Some(id) = existing.get(ID_FIELD) {
        if let Some(new_id) = replacement.get(ID_FIELD) {
            if !values_equal(id, new_id) {
                return Err(immutable_id());
            }
        }
        out.insert(ID_FIELD.to_owned(), id.clone());
    }
    for (key, value) in replacement {
        if key != ID_FIELD {
            out.insert(key.clone(), value.clone());
        }
    }
    Ok(out)
}

/// The starting document of an upsert: the filter's equality fields.
pub fn upsert_seed(filter: &Document) -> CoreResult<Document> {
    let mut seed = Document::new();
    for (path, condition) in filter {
        if path.starts_with('$') {
            continue;
        }
        match condition {
            Value::Object(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => {
                if let Some(value) = ops.get("$eq") {
                    set_path(&mut seed, path, value.clone())?;
                }
            }
            value => set_path(&mut seed, path, value.clone())?,
        }
    }
    Ok(seed)
}

fn immutable_id() -> CoreError {
    CoreError::Operation {
        code: codes::IMMUTABLE_FIELD,
        message: "Performing an update on the path '_id' would modify the immutable field '_id'"
            .into(),
    }
}
