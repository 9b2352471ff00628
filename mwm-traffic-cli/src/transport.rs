use async_trait::async_trait;
use mwm_traffic::transport::{HttpClient, HttpRequest, HttpResponse, TransportError};
use std::time::Duration;

/// An [`HttpClient`] backed by a pooled `reqwest` client.
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// # Errors
    ///
    /// Fails if the TLS backend can't be initialized.
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mwm-traffic/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::new(&request.url, e.to_string()))?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                Some((canonical_header_name(name.as_str()), value.to_str().ok()?.to_owned()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::new(&request.url, e.to_string()))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Restores the conventional casing of a header name (`etag` -> `Etag`).
///
/// The `http` crate normalizes names to lowercase,
/// but traffic response headers are looked up case-sensitively.
fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_names() {
        assert_eq!(canonical_header_name("etag"), mwm_traffic::transport::ETAG);
        assert_eq!(canonical_header_name("content-length"), "Content-Length");
        assert_eq!(canonical_header_name("x--y"), "X--Y");
    }
}
