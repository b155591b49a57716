//! Token endpoint response handling
//!
//! The endpoint answers all three grants with the same JSON shape, but
//! field presence differs: refresh responses may omit `refresh_token`
//! (no rotation) and `expires_in` is optional. Values are read leniently:
//! numbers are accepted where strings are expected and vice versa.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::{Error, Result};

/// Tokens returned to the caller of `exchange_code_for_tokens`.
///
/// `expires_in` is a delta in seconds from the response time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Raw fields of a 2xx token endpoint body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TokenFields {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

impl TokenFields {
    /// Parse a token endpoint body. Anything but a JSON object is malformed.
    pub fn parse(body: &str, what: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| Error::MalformedResponse(format!("invalid {what}: {e}")))?;
        let object = value
            .as_object()
            .ok_or_else(|| Error::MalformedResponse(format!("invalid {what}: not a JSON object")))?;

        // null counts as absent so defaults apply
        let field = |name: &str| object.get(name).filter(|v| !v.is_null());

        Ok(Self {
            access_token: field("access_token").map(as_string).unwrap_or_default(),
            refresh_token: field("refresh_token").map(as_string),
            expires_in: field("expires_in").map(as_int),
        })
    }
}

/// Scalar JSON value as a string; arrays, objects and null become empty.
fn as_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(true) => "1".to_string(),
        _ => String::new(),
    }
}

/// Scalar JSON value as an integer; unparseable values become 0.
fn as_int(value: &serde_json::Value) -> i64 {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        serde_json::Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

/// Current unix time in seconds from the local clock.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
