//! InPost Buy REST API client
//!
//! `ApiTransport` attaches a bearer token from an `AccessTokenProvider` to
//! every request and turns non-success responses into `ApiError`s.
//! `InPostBuyClient` knows the resource paths (categories, offers, orders)
//! and returns the decoded JSON as `serde_json::Value`.
//!
//! Errors share the auth crate's taxonomy, so a rejected token request and
//! a rejected API call are handled the same way by callers.

pub mod client;
pub mod transport;

pub use client::{InPostBuyClient, OfferQuery};
pub use inpost_auth::{Error, Result};
pub use transport::{ApiTransport, decode};
