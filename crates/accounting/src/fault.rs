//! Error body and query string helpers.

use serde_json::Value;

/// Escapes a value for a single-quoted query literal.
pub(crate) fn escape(s: &str) -> String {
    s.replace('\'', "''")
}

/// Extracts the most specific message from an error body.
pub(crate) fn fault_message(body: &Value, status: u16) -> String {
    body["Fault"]["Error"][0]["Detail"]
        .as_str()
        .or_else(|| body["Fault"]["Error"][0]["Message"].as_str())
        .or_else(|| body["fault"]["error"][0]["detail"].as_str())
        .or_else(|| body["message"].as_str())
        .map_or_else(|| format!("HTTP {status}"), String::from)
}

/// Reads the `Id` of an entity, which the API may send as a string or number.
pub(crate) fn entity_id(entity: &Value) -> Option<String> {
    match &entity["Id"] {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
