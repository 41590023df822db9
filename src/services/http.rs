//! Page fetching for scraping resolvers

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::ResolveError;

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// GET a page as text with extra request headers
    async fn fetch_text(&self, url: &str, headers: &[(&str, String)])
        -> Result<String, ResolveError>;

    /// GET a JSON document
    async fn fetch_json(&self, url: &str) -> Result<Value, ResolveError>;
}

/// `PageFetcher` over the shared reqwest client. Errors never carry the
/// request URL, which may hold a proxy password.
#[derive(Clone)]
pub struct HttpFetcher {
    http: Client,
    upstream: &'static str,
}

impl HttpFetcher {
    pub fn new(http: Client, upstream: &'static str) -> Self {
        Self { http, upstream }
    }

    async fn send(
        &self,
        url: &str,
        headers: &[(&str, String)],
    ) -> Result<reqwest::Response, ResolveError> {
        let mut request = self.http.get(url);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ResolveError::upstream(self.upstream, format!("Network error: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            debug!(upstream = self.upstream, status = status.as_u16(), "Upstream returned error status");
            return Err(ResolveError::upstream(
                self.upstream,
                format!("HTTP error: {}", status.as_u16()),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_text(
        &self,
        url: &str,
        headers: &[(&str, String)],
    ) -> Result<String, ResolveError> {
        self.send(url, headers)
            .await?
            .text()
            .await
            .map_err(|e| ResolveError::upstream(self.upstream, format!("Network error: {}", e.without_url())))
    }

    async fn fetch_json(&self, url: &str) -> Result<Value, ResolveError> {
        self.send(url, &[])
            .await?
            .json()
            .await
            .map_err(|e| ResolveError::upstream(self.upstream, format!("Parse error: {}", e.without_url())))
    }
}
