//! Shared helper functions for MCP tool implementations.

/// Build a structured error JSON string that LLMs can parse.
pub fn error_json(error_code: &str, message: &str) -> String {
    serde_json::json!({
        "error": error_code,
        "message": message,
    })
    .to_string()
}

pub fn ok_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| error_json("serialization_error", &e.to_string()))
}
