//! Aggregation pipeline stages.

use super::query::{matches, project, sort_documents};
use crate::error::{CoreError, CoreResult};
use crate::values::{as_flag, as_integer, compare_values, get_path, set_path, values_equal, Document, Value, ID_FIELD};
use serde_json::{json, Number};
use std::cmp::Ordering;

/// Run `pipeline` over `docs` in natural order.
pub fn run_pipeline(mut docs: Vec<Document>, pipeline: &[Document]) -> CoreResult<Vec<Document>> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (Some((name, spec)), None) = (entries.next(), entries.next()) else {
            return Err(CoreError::bad_value(
                "A pipeline stage specification object must contain exactly one field.",
            ));
        };
        docs = match name.as_str() {
            "$match" => {
                let filter = object(spec, name)?;
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$sort" => {
                sort_documents(&mut docs, object(spec, name)?)?;
                docs
            }
            "$skip" => {
                let n = count_argument(spec, name)?;
                docs.into_iter().skip(n).collect()
            }
            "$limit" => {
                let n = count_argument(spec, name)?;
                docs.truncate(n);
                docs
            }
            "$project" => {
                let spec = object(spec, name)?;
                docs.iter()
                    .map(|doc| project_stage(doc, spec))
                    .collect::<CoreResult<_>>()?
            }
            "$group" => group(&docs, object(spec, name)?)?,
            "$count" => {
                let Value::String(field) = spec else {
                    return Err(CoreError::bad_value("the count field must be a non-empty string"));
                };
                if docs.is_empty() {
                    Vec::new()
                } else {
                    let mut out = Document::new();
                    out.insert(field.clone(), json!(docs.len()));
                    vec![out]
                }
            }
            "$unwind" => unwind(docs, spec)?,
            other => {
                return Err(CoreError::NotImplemented(format!(
                    "aggregation stage {other}"
                )))
            }
        };
    }
    Ok(docs)
}

fn object<'a>(spec: &'a Value, stage: &str) -> CoreResult<&'a Document> {
    spec.as_object()
        .ok_or_else(|| CoreError::bad_value(format!("the {stage} stage specification must be an object")))
}

fn count_argument(spec: &Value, stage: &str) -> CoreResult<usize> {
    as_integer(spec)
        .filter(|n| *n >= 0)
        .map(|n| n as usize)
        .ok_or_else(|| CoreError::bad_value(format!("invalid argument to {stage} stage")))
}

/// Evaluate an expression: `"$path"` reads a field, documents evaluate
/// field-wise, anything else is a literal.
fn evaluate(doc: &Document, expr: &Value) -> Value {
    match expr {
        Value::String(s) if s.starts_with('$') => {
            get_path(doc, &s[1..]).cloned().unwrap_or(Value::Null)
        }
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, value)| (key.clone(), evaluate(doc, value)))
                .collect(),
        ),
        literal => literal.clone(),
    }
}

fn project_stage(doc: &Document, spec: &Document) -> CoreResult<Document> {
    let computed = spec
        .values()
        .any(|v| matches!(v, Value::String(_) | Value::Object(_)));
    if !computed {
        return project(doc, spec);
    }
    let mut out = Document::new();
    if spec.get(ID_FIELD).and_then(as_flag) != Some(false) {
        if let Some(id) = doc.get(ID_FIELD) {
            out.insert(ID_FIELD.to_owned(), id.clone());
        }
    }
    for (path, value) in spec {
        match value {
            Value::String(_) | Value::Object(_) => set_path(&mut out, path, evaluate(doc, value))?,
            flag if path != ID_FIELD && as_flag(flag) == Some(true) => {
                if let Some(found) = get_path(doc, path) {
                    set_path(&mut out, path, found.clone())?;
                }
            }
            _ => {}
        }
    }
    Ok(out)
}

fn group(docs: &[Document], spec: &Document) -> CoreResult<Vec<Document>> {
    let key_expr = spec
        .get(ID_FIELD)
        .ok_or_else(|| CoreError::bad_value("a group specification must include an _id"))?;
    let mut accumulators = Vec::new();
    for (field, definition) in spec.iter().filter(|(field, _)| *field != ID_FIELD) {
        let Value::Object(definition) = definition else {
            return Err(CoreError::bad_value(format!("the field '{field}' must be an accumulator object")));
        };
        let mut entries = definition.iter();
        let (Some((op, expr)), None) = (entries.next(), entries.next()) else {
            return Err(CoreError::bad_value(format!(
                "the field '{field}' must specify one accumulator"
            )));
        };
        if !matches!(
            op.as_str(),
            "$sum" | "$avg" | "$min" | "$max" | "$first" | "$last" | "$push" | "$addToSet"
        ) {
            return Err(CoreError::bad_value(format!("unknown group operator '{op}'")));
        }
        accumulators.push((field.clone(), op.clone(), expr.clone()));
    }

    let mut groups: Vec<(Value, Vec<&Document>)> = Vec::new();
    for doc in docs {
        let key = evaluate(doc, key_expr);
        match groups.iter_mut().find(|(k, _)| values_equal(k, &key)) {
            Some((_, members)) => members.push(doc),
            None => groups.push((key, vec![doc])),
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, members)| {
            let mut out = Document::new();
            out.insert(ID_FIELD.to_owned(), key);
            for (field, op, expr) in &accumulators {
                let values: Vec<Value> = members.iter().map(|doc| evaluate(doc, expr)).collect();
                out.insert(field.clone(), accumulate(op, values));
            }
            out
        })
        .collect())
}

fn accumulate(op: &str, values: Vec<Value>) -> Value {
    match op {
        "$sum" => sum(values.iter()),
        "$avg" => {
            let numbers: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                let mean = numbers.iter().sum::<f64>() / numbers.len() as f64;
                Number::from_f64(mean).map_or(Value::Null, Value::Number)
            }
        }
        "$min" | "$max" => {
            let wanted = if op == "$min" { Ordering::Less } else { Ordering::Greater };
            values
                .into_iter()
                .filter(|v| !v.is_null())
                .reduce(|best, v| if compare_values(&v, &best) == wanted { v } else { best })
                .unwrap_or(Value::Null)
        }
        "$first" => values.into_iter().next().unwrap_or(Value::Null),
        "$last" => values.into_iter().last().unwrap_or(Value::Null),
        "$push" => Value::Array(values),
        _ => {
            let mut set: Vec<Value> = Vec::new();
            for value in values {
                if !set.iter().any(|present| values_equal(present, &value)) {
                    set.push(value);
                }
            }
            Value::Array(set)
        }
    }
}

/// Integer sum while every operand is an integer; floats otherwise.
/// Non-numeric values are ignored.
fn sum<'a>(values: impl Iterator<Item = &'a Value>) -> Value {
    let mut int_total: Option<i64> = Some(0);
    let mut float_total = 0.0;
    for value in values {
        let Value::Number(n) = value else { continue };
        float_total += n.as_f64().unwrap_or(0.0);
        int_total = match (int_total, n.as_i64()) {
            (Some(total), Some(x)) => total.checked_add(x),
            _ => None,
        };
    }
    match int_total {
        Some(total) => json!(total),
        None => Number::from_f64(float_total).map_or(Value::Null, Value::Number),
    }
}

fn unwind(docs: Vec<Document>, spec: &Value) -> CoreResult<Vec<Document>> {
    let (path, preserve) = match spec {
        Value::String(path) => (path.as_str(), false),
        Value::Object(options) => (
            options
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| CoreError::bad_value("no path specified to $unwind stage"))?,
            options
                .get("preserveNullAndEmptyArrays")
                .and_then(as_flag)
                .unwrap_or(false),
        ),
        _ => return Err(CoreError::bad_value("expected either a string or an object as specification for $unwind stage")),
    };
    let field = path
        .strip_prefix('$')
        .ok_or_else(|| CoreError::bad_value("path option to $unwind stage should be prefixed with a '$'"))?;

    let mut out = Vec::new();
    for doc in docs {
        match get_path(&doc, field).cloned() {
            Some(Value::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut copy = doc.clone();
                    set_path(&mut copy, field, item)?;
                    out.push(copy);
                }
            }
            Some(Value::Array(_)) | Some(Value::Null) | None => {
                if preserve {
                    out.push(doc);
                }
            }
            Some(_) => out.push(doc),
        }
    }
    Ok(out)
}
