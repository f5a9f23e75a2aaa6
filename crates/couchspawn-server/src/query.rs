//! Helpers for CouchDB-style query strings, where some values are plain and
//! others (`startkey`, `keys`, `open_revs`, ...) are JSON-encoded.

use std::collections::HashMap;

use couchspawn_core::error::{CouchError, Result};

pub type Params = HashMap<String, String>;

pub fn flag(params: &Params, name: &str) -> bool {
    params.get(name).is_some_and(|v| v == "true")
}

pub fn number(params: &Params, name: &str) -> Result<Option<u64>> {
    params
        .get(name)
        .map(|v| {
            v.parse::<u64>().map_err(|_| {
                CouchError::BadRequest(format!("Invalid value for `{name}`: {v}"))
            })
        })
        .transpose()
}

/// A JSON-encoded string such as `startkey="abc"`. Bare values are accepted
/// as-is. Checks each alias in order (`startkey`, `start_key`, ...).
pub fn json_string(params: &Params, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| params.get(*name)).map(|raw| {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::String(s)) => s,
            _ => raw.clone(),
        }
    })
}

/// A JSON-encoded list of strings such as `keys=["a","b"]`.
pub fn json_list(params: &Params, name: &str) -> Result<Option<Vec<String>>> {
    params
        .get(name)
        .map(|raw| serde_json::from_str::<Vec<String>>(raw).map_err(CouchError::from))
        .transpose()
}

/// Parse a request body, treating an empty body as an empty object.
pub fn body_json(body: &[u8]) -> Result<serde_json::Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::json!({}));
    }
    Ok(serde_json::from_slice(body)?)
}
