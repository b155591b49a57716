//! Error types for InPost Buy authentication and API calls
//!
//! `Error` covers the whole auth taxonomy: CSRF state mismatch, missing
//! verifier, token endpoint rejections, malformed token responses and the
//! "re-authorization required" case. Non-success HTTP responses are carried
//! as a structured `ApiError` so callers can inspect the status, raw body,
//! parsed `errorCode` payload and retry hints.

use std::collections::HashMap;
use std::time::Duration;

use crate::http::HttpResponse;

/// Errors from OAuth and API operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid or missing PKCE state: possible CSRF or session mismatch")]
    StateMismatch,

    #[error("missing code_verifier in PKCE state storage")]
    MissingVerifier,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("malformed token response: {0}")]
    MalformedResponse(String),

    #[error("no refresh token available, re-authorization required")]
    NoRefreshToken,

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Whether a retry may succeed (429 or 5xx from the server).
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Api(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Server-suggested delay before retrying, from `Retry-After`.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Api(e) => e.retry_after(),
            _ => None,
        }
    }

    /// HTTP status when the error came from a server response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api(e) => Some(e.status),
            _ => None,
        }
    }
}

/// Result alias for auth and API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// One entry of the `details` array in an API error body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    pub field: Option<String>,
    pub detail: Option<String>,
}

/// Structured API error body (`{"errorCode": ..., "errorMessage": ..., "details": [...]}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error_code: String,
    pub error_message: Option<String>,
    pub details: Vec<ErrorDetail>,
}

/// Status-based classification of an API error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    UnsupportedMediaType,
    UnprocessableEntity,
    TooManyRequests,
    Server,
    Other,
}

/// Non-success response from the token endpoint or the InPost Buy API.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message} (HTTP {status})")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
    pub body: String,
    pub detail: Option<ErrorResponse>,
    /// Lower-cased header names, first value only
    pub headers: HashMap<String, String>,
}

impl ApiError {
    /// Build an error from a response. The parsed `errorMessage` wins over
    /// `context` when the body carries one.
    pub fn from_response(response: &HttpResponse, context: &str) -> Self {
        let detail = parse_error_body(&response.body);
        let message = detail
            .as_ref()
            .and_then(|d| d.error_message.clone())
            .unwrap_or_else(|| context.to_string());
        Self {
            status: response.status,
            message,
            body: response.body.clone(),
            detail,
            headers: response.headers.clone(),
        }
    }

    pub fn kind(&self) -> ApiErrorKind {
        match self.status {
            400 => ApiErrorKind::BadRequest,
            401 => ApiErrorKind::Unauthorized,
            403 => ApiErrorKind::Forbidden,
            404 => ApiErrorKind::NotFound,
            415 => ApiErrorKind::UnsupportedMediaType,
            422 => ApiErrorKind::UnprocessableEntity,
            429 => ApiErrorKind::TooManyRequests,
            s if s >= 500 => ApiErrorKind::Server,
            _ => ApiErrorKind::Other,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.status == 429 || self.status >= 500
    }

    /// `Retry-After` as delta-seconds. HTTP-date values are not interpreted.
    pub fn retry_after(&self) -> Option<Duration> {
        self.headers
            .get("retry-after")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Parse an API error body. Only JSON objects with a non-empty `errorCode`
/// count as structured errors.
fn parse_error_body(body: &str) -> Option<ErrorResponse> {
    if body.is_empty() {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;
    let error_code = match object.get("errorCode")? {
        serde_json::Value::String(s) if !s.is_empty() => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let error_message = object
        .get("errorMessage")
        .and_then(|m| m.as_str())
        .map(str::to_string);
    let details = object
        .get("details")
        .and_then(|d| d.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_object())
                .map(|item| ErrorDetail {
                    field: item.get("field").and_then(|f| f.as_str()).map(str::to_string),
                    detail: item
                        .get("detail")
                        .and_then(|d| d.as_str())
                        .map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default();

    Some(ErrorResponse {
        error_code,
        error_message,
        details,
    })
}
