//! Resource endpoints of the InPost Buy API
//!
//! Paths:
//! - `/v1/categories`
//! - `/v1/organizations/{org}/offers[/batch|/{offerId}]`
//! - `/v1/organizations/{org}/orders[/{orderId}[/accept|/refuse]]`

use std::sync::Arc;

use inpost_auth::endpoints;
use inpost_auth::{
    AccessTokenProvider, ApiErrorKind, ClientCredentialsTokenProvider, Error, HttpClient,
};
use reqwest::Method;
use serde_json::{Value, json};
use tracing::debug;

use crate::Result;
use crate::transport::{ApiTransport, decode};

/// Filters for listing offers. Unset fields are left out of the query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferQuery {
    /// e.g. `["PENDING", "PUBLISHED"]`
    pub offer_status: Option<Vec<String>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    /// e.g. `["-updatedAt"]`
    pub sort: Option<Vec<String>>,
}

impl OfferQuery {
    /// Query string with array values repeated per element
    /// (`offerStatus=A&offerStatus=B`). Empty when nothing is set.
    fn to_query_string(&self) -> String {
        let mut pairs: Vec<(&str, String)> = Vec::new();
        for status in self.offer_status.iter().flatten() {
            pairs.push(("offerStatus", status.clone()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset", offset.to_string()));
        }
        for sort in self.sort.iter().flatten() {
            pairs.push(("sort", sort.clone()));
        }

        pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// InPost Buy API client returning raw JSON.
#[derive(Clone)]
pub struct InPostBuyClient {
    transport: ApiTransport,
    base_url: String,
    organization_id: String,
}

impl InPostBuyClient {
    pub fn new(
        http: Arc<dyn HttpClient>,
        token_provider: Arc<dyn AccessTokenProvider>,
        organization_id: impl Into<String>,
        sandbox: bool,
    ) -> Self {
        Self {
            transport: ApiTransport::new(http, token_provider),
            base_url: endpoints::base_url(sandbox).to_string(),
            organization_id: organization_id.into(),
        }
    }

    /// Client authenticated with the client-credentials grant against the
    /// environment's token endpoint.
    pub fn with_client_credentials(
        http: Arc<dyn HttpClient>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        organization_id: impl Into<String>,
        sandbox: bool,
    ) -> Self {
        let provider = ClientCredentialsTokenProvider::new(
            http.clone(),
            endpoints::token_url(sandbox),
            client_id,
            client_secret,
        );
        Self::new(http, Arc::new(provider), organization_id, sandbox)
    }

    fn organization_path(&self, resource: &str) -> String {
        format!(
            "{}/v1/organizations/{}/{resource}",
            self.base_url,
            urlencoding::encode(&self.organization_id)
        )
    }

    fn offers_url(&self) -> String {
        self.organization_path("offers")
    }

    fn orders_url(&self) -> String {
        self.organization_path("orders")
    }

    fn order_url(&self, order_id: &str) -> String {
        format!("{}/{}", self.orders_url(), urlencoding::encode(order_id))
    }

    /// Category tree.
    pub async fn categories(&self) -> Result<Value> {
        let url = format!("{}/v1/categories", self.base_url);
        let response = self.transport.request(Method::GET, &url, None).await?;
        Ok(decode(&response))
    }

    /// Categories are a read-only tree on the server side; always fails
    /// without touching the network.
    pub fn put_category(&self, _category: &Value) -> Result<String> {
        Err(Error::Unsupported(
            "InPost Buy API does not support category create/update, the tree is read-only".into(),
        ))
    }

    /// Page of offers: `{ page: {limit, offset, total}, data: [...] }`.
    pub async fn offers(&self, query: &OfferQuery) -> Result<Value> {
        let mut url = self.offers_url();
        let query_string = query.to_query_string();
        if !query_string.is_empty() {
            url.push('?');
            url.push_str(&query_string);
        }
        let response = self.transport.request(Method::GET, &url, None).await?;
        Ok(decode(&response))
    }

    pub async fn create_offer(&self, proposal: &Value) -> Result<Value> {
        let response = self
            .transport
            .request(Method::POST, &self.offers_url(), Some(proposal))
            .await?;
        Ok(decode(&response))
    }

    /// Create several offers in one request. Returns one entry per created
    /// offer; an object response is flattened to its values.
    pub async fn create_offers(&self, proposals: &[Value]) -> Result<Vec<Value>> {
        let url = format!("{}/batch", self.offers_url());
        let body = Value::Array(proposals.to_vec());
        let response = self
            .transport
            .request(Method::POST, &url, Some(&body))
            .await?;

        let created = match decode(&response) {
            Value::Array(items) => items,
            Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
            _ => Vec::new(),
        };
        debug!(requested = proposals.len(), created = created.len(), "batch offer creation");
        Ok(created)
    }

    /// Partial update using JSON merge-patch.
    pub async fn update_offer(&self, offer_id: &str, patch: &Value) -> Result<Value> {
        let url = format!("{}/{}", self.offers_url(), urlencoding::encode(offer_id));
        let response = self
            .transport
            .request(Method::PATCH, &url, Some(patch))
            .await?;
        Ok(decode(&response))
    }

    pub async fn orders(&self, status: Option<&str>) -> Result<Value> {
        let mut url = self.orders_url();
        if let Some(status) = status {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("orderStatus", status)
                .finish();
            url.push('?');
            url.push_str(&query);
        }
        let response = self.transport.request(Method::GET, &url, None).await?;
        Ok(decode(&response))
    }

    /// Single order, `None` when the server answers 404.
    pub async fn order(&self, order_id: &str) -> Result<Option<Value>> {
        match self
            .transport
            .request(Method::GET, &self.order_url(order_id), None)
            .await
        {
            Ok(response) => Ok(Some(decode(&response))),
            Err(Error::Api(e)) if e.kind() == ApiErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn accept_order(&self, order_id: &str) -> Result<()> {
        let url = format!("{}/accept", self.order_url(order_id));
        self.transport
            .request(Method::POST, &url, Some(&json!({})))
            .await?;
        Ok(())
    }

    pub async fn refuse_order(&self, order_id: &str, reason: &str) -> Result<()> {
        let url = format!("{}/refuse", self.order_url(order_id));
        self.transport
            .request(Method::POST, &url, Some(&json!({ "reason": reason })))
            .await?;
        Ok(())
    }
}
