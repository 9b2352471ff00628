//! # HTTP transport
//!
//! The traffic service is reached through an [`HttpClient`] supplied by the caller.
//! Implementations may pool connections and be shared between many mwms,
//! but carry no traffic state of their own.

use async_trait::async_trait;
use http::StatusCode;
use std::collections::BTreeMap;
use thiserror::Error;

/// The conditional request header carrying the last known revision token.
pub const IF_NONE_MATCH: &str = "If-None-Match";

/// The response header carrying the revision token of the returned data.
///
/// Header lookups in [`HttpResponse`] are case-sensitive.
pub const ETAG: &str = "Etag";

/// The request could not be completed (no status code was received).
#[derive(Debug, Error)]
#[error("Request to {url} failed: {message}")]
pub struct TransportError {
    pub url: String,
    pub message: String,
}

impl TransportError {
    pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// A GET request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Looks up a request header by its exact name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A response with any status code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Looks up a response header by its exact name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Performs a GET request.
    ///
    /// Any response received from the server is `Ok`, whatever its status code.
    ///
    /// # Errors
    ///
    /// Fails when no response is received (DNS failure, refused connection, timeout, etc.).
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}
