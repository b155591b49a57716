//! Bearer-authenticated request transport

use std::sync::Arc;

use inpost_auth::{AccessTokenProvider, ApiError, HttpClient, HttpRequest, HttpResponse};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use crate::Result;

const CONTENT_TYPE_JSON: &str = "application/json";
const CONTENT_TYPE_MERGE_PATCH: &str = "application/merge-patch+json";

/// Sends API requests with a fresh bearer token each time.
#[derive(Clone)]
pub struct ApiTransport {
    http: Arc<dyn HttpClient>,
    token_provider: Arc<dyn AccessTokenProvider>,
}

impl ApiTransport {
    pub fn new(http: Arc<dyn HttpClient>, token_provider: Arc<dyn AccessTokenProvider>) -> Self {
        Self {
            http,
            token_provider,
        }
    }

    /// Send one request. `body` is serialised only for POST, PUT and PATCH;
    /// PATCH uses JSON merge-patch.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        let token = self.token_provider.access_token().await?;

        let content_type = if method == Method::PATCH {
            CONTENT_TYPE_MERGE_PATCH
        } else {
            CONTENT_TYPE_JSON
        };
        let sends_body = matches!(method, Method::POST | Method::PUT | Method::PATCH);

        let mut request = HttpRequest::new(method.clone(), url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", content_type);
        if let Some(body) = body.filter(|_| sends_body) {
            request = request.body(body.to_string());
        }

        let response = self.http.send(request).await?;
        if response.is_error() {
            warn!(%method, url, status = response.status, "API request failed");
            let context = format!("API error: {method} {url}");
            return Err(ApiError::from_response(&response, &context).into());
        }

        debug!(%method, url, status = response.status, "API request completed");
        Ok(response)
    }
}

/// Response body as JSON. Empty or non-JSON bodies become an empty object.
pub fn decode(response: &HttpResponse) -> Value {
    if response.body.is_empty() {
        return Value::Object(Default::default());
    }
    match serde_json::from_str::<Value>(&response.body) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => value,
        _ => Value::Object(Default::default()),
    }
}
