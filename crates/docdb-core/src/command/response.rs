//! Reply documents, one shape per command.

use crate::bulk::BulkResult;
use crate::config::ServerConfig;
use crate::error::CoreError;
use crate::values::{Document, Value};
use serde_json::json;

pub const MAX_BSON_OBJECT_SIZE: i64 = 16 * 1024 * 1024;
const GIT_VERSION: &str = "d0181a711f7e7f39e60b5aeb1dc7097bf6ae5856";
const STORAGE_ENGINES: [&str; 4] = ["devnull", "ephemeralForTest", "mmapv1", "wiredTiger"];

fn single(key: &str, value: Value) -> Document {
    let mut reply = Document::new();
    reply.insert(key.into(), value);
    reply
}

/// `{ok: true}`
pub fn ok() -> Document {
    single("ok", json!(true))
}

/// `{ok: 1}`, the integer form.
pub fn ok_int() -> Document {
    single("ok", json!(1))
}

fn write_reply(n: u64) -> Document {
    let mut reply = ok();
    reply.insert("n".into(), json!(n));
    reply
}

pub fn insert(result: &BulkResult) -> Document {
    write_reply(result.inserted_count())
}

pub fn delete(result: &BulkResult) -> Document {
    write_reply(result.removed_count())
}

/// `n` counts matched plus upserted documents.
pub fn update(result: &BulkResult) -> Document {
    let upserted: Vec<Value> = result
        .upserts()
        .iter()
        .map(|u| json!({ "index": u.index, "_id": u.id }))
        .collect();
    let mut reply = write_reply(result.matched_count() + upserted.len() as u64);
    reply.insert("nModified".into(), json!(result.modified_count()));
    reply.insert("upserted".into(), Value::Array(upserted));
    reply
}

/// A zero-id, exhausted cursor whose first batch is everything.
pub fn cursor(ns: &str, batch: Vec<Document>) -> Document {
    let batch: Vec<Value> = batch.into_iter().map(Value::Object).collect();
    single(
        "cursor",
        json!({ "id": 0, "ns": ns, "firstBatch": batch }),
    )
}

pub fn count(n: u64) -> Document {
    single("n", json!(n as f64))
}

pub fn distinct(values: Vec<Value>) -> Document {
    single("values", Value::Array(values))
}

pub fn aggregate_legacy(results: Vec<Document>) -> Document {
    single(
        "result",
        Value::Array(results.into_iter().map(Value::Object).collect()),
    )
}

pub fn find_and_modify(value: Option<Document>) -> Document {
    single("value", value.map_or(Value::Null, Value::Object))
}

pub fn geo_near(results: Vec<Document>) -> Document {
    let mut reply = single("ok", json!(1.0));
    reply.insert(
        "results".into(),
        Value::Array(results.into_iter().map(Value::Object).collect()),
    );
    reply
}

/// `{ok: 0.0, err: <code>, errmsg}`: geoNear reports failures in-band.
pub fn geo_near_error(error: &CoreError) -> Document {
    let mut reply = single("ok", json!(0.0));
    reply.insert("err".into(), json!(error.code()));
    reply.insert("errmsg".into(), json!(error.to_string()));
    reply
}

pub fn list_databases(names: Vec<String>) -> Document {
    let databases: Vec<Value> = names.into_iter().map(|name| json!({ "name": name })).collect();
    single("databases", Value::Array(databases))
}

pub fn build_info(config: &ServerConfig) -> Document {
    let reply = json!({
        "version": config.server_version,
        "gitVersion": GIT_VERSION,
        "modules": [],
        "allocator": "tcmalloc",
        "javascriptEngine": "mozjs",
        "sysInfo": "deprecated",
        "versionArray": config.version_array(),
        "bits": 64,
        "debug": false,
        "maxBsonObjectSize": MAX_BSON_OBJECT_SIZE,
        "storageEngines": STORAGE_ENGINES,
        "ok": 1,
    });
    match reply {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}
