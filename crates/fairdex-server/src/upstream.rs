use async_trait::async_trait;
use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::time::Duration;

#[derive(Debug)]
pub struct UpstreamError(pub String);

impl Display for UpstreamError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for UpstreamError {}

/// External collaborators reached over HTTP. A trait seam so contract tests
/// can stub both services.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Whether DataCite knows the DOI. `Ok(false)` is a definitive negative
    /// (upstream 404), not a transport failure.
    async fn doi_exists(&self, doi: &str) -> Result<bool, UpstreamError>;

    /// Index series lookup by landing-page URL, proxied verbatim.
    async fn index_series_from_url(
        &self,
        url: &str,
        pubdate: Option<&str>,
        topic_id: Option<&str>,
    ) -> Result<Value, UpstreamError>;
}

pub struct HttpUpstream {
    http: reqwest::Client,
    datacite_base: String,
    sindex_base: String,
}

impl HttpUpstream {
    pub fn new(
        datacite_base: &str,
        sindex_base: &str,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError(e.to_string()))?;
        Ok(Self {
            http,
            datacite_base: datacite_base.trim_end_matches('/').to_string(),
            sindex_base: sindex_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstream {
    async fn doi_exists(&self, doi: &str) -> Result<bool, UpstreamError> {
        let url = format!("{}/dois/{doi}", self.datacite_base);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| UpstreamError(e.to_string()))?;
        match response.status() {
            status if status.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            status => Err(UpstreamError(format!("datacite returned {status}"))),
        }
    }

    async fn index_series_from_url(
        &self,
        url: &str,
        pubdate: Option<&str>,
        topic_id: Option<&str>,
    ) -> Result<Value, UpstreamError> {
        let endpoint = format!("{}/dataset-index-series-from-url", self.sindex_base);
        let mut query: Vec<(&str, &str)> = vec![("url", url)];
        if let Some(pubdate) = pubdate {
            query.push(("pubdate", pubdate));
        }
        if let Some(topic_id) = topic_id {
            query.push(("topic_id", topic_id));
        }
        let response = self
            .http
            .get(&endpoint)
            .query(&query)
            .send()
            .await
            .map_err(|e| UpstreamError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(UpstreamError(format!(
                "index series api returned {}",
                response.status()
            )));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| UpstreamError(e.to_string()))
    }
}
