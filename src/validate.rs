//! Pre-dispatch message validation
//!
//! Pure checks, no side effects. Everything here runs before a request can
//! touch the rate limiter's bookkeeping or the worker pool, so a malformed
//! payload never costs more than a parse.

use crate::error::{BridgeError, BridgeResult};
use serde_json::Value;

/// Reject empty, oversized, or control-character-bearing messages.
///
/// Tab, newline and carriage return are the only control characters allowed;
/// DEL (0x7F) is rejected along with the C0 range.
pub fn validate_size(message: &str, max_size: usize) -> BridgeResult<()> {
    if max_size == 0 {
        return Err(BridgeError::invalid_input("max size cannot be 0"));
    }
    if message.is_empty() {
        return Err(BridgeError::invalid_input("message cannot be empty"));
    }
    if message.len() > max_size {
        return Err(BridgeError::invalid_input(format!(
            "message size ({} bytes) exceeds maximum allowed ({max_size} bytes)",
            message.len()
        )));
    }
    if message
        .chars()
        .any(|c| (c.is_control() && c != '\t' && c != '\n' && c != '\r') || c == '\u{7f}')
    {
        return Err(BridgeError::invalid_input(
            "message contains invalid control characters",
        ));
    }
    Ok(())
}

/// Require an object with a `"message"` key; nested objects must satisfy the
/// same rule.
pub fn validate_structure(value: &Value) -> BridgeResult<()> {
    let obj = value
        .as_object()
        .ok_or_else(|| BridgeError::invalid_input("payload must be a JSON object"))?;
    if !obj.contains_key("message") {
        return Err(BridgeError::invalid_input(
            "missing required 'message' field",
        ));
    }
    for nested in obj.values() {
        if nested.is_object() {
            validate_structure(nested)?;
        }
    }
    Ok(())
}

/// Full pre-dispatch gate: UTF-8 decode, size check, JSON parse, structure
/// check. Returns the extracted `message` text on success.
pub fn validate_message(raw: &[u8], max_size: usize) -> BridgeResult<String> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| BridgeError::invalid_input("invalid UTF-8 encoding"))?;
    validate_size(text, max_size)?;

    let parsed: Value = serde_json::from_str(text)
        .map_err(|_| BridgeError::invalid_input("invalid JSON format"))?;
    validate_structure(&parsed)?;

    let message = parsed["message"]
        .as_str()
        .ok_or_else(|| BridgeError::invalid_input("'message' field must be a string"))?;
    Ok(message.to_string())
}
