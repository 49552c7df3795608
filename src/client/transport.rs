//! Transport seam between the executor and the remote service.
//!
//! The executor only needs a status code, headers and a body back, or an
//! error describing why no response arrived. `HttpTransport` provides that
//! over `reqwest`; tests plug in scripted implementations.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, IF_MATCH};
use thiserror::Error;
use url::Url;

use crate::client::request::ApiRequest;
use crate::config::{EndpointConfig, TransportConfig};

/// A raw response from the remote service.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Why a call produced no response.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_builder() {
            TransportError::InvalidRequest(e.to_string())
        } else {
            TransportError::Io(e.to_string())
        }
    }
}

/// Performs one physical call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn perform(&self, request: &ApiRequest) -> Result<RawResponse, TransportError>;
}

/// `reqwest`-backed transport bound to one endpoint base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(
        base_url: &str,
        headers: &BTreeMap<String, String>,
        config: &TransportConfig,
    ) -> Result<Self, TransportError> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        // Without a trailing slash `join` would replace the last path segment.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut default_headers = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::InvalidRequest(format!("header '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::InvalidRequest(format!("header '{name}': {e}")))?;
            default_headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .user_agent(config.user_agent.clone())
            .default_headers(default_headers)
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn from_endpoint(
        endpoint: &EndpointConfig,
        config: &TransportConfig,
    ) -> Result<Self, TransportError> {
        Self::new(&endpoint.base_url, &endpoint.headers, config)
    }

    /// Absolute URL for a request, including its query params.
    pub fn url_for(&self, request: &ApiRequest) -> Result<Url, TransportError> {
        let mut url = self
            .base_url
            .join(request.path.trim_start_matches('/'))
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        if !request.params.is_empty() {
            url.query_pairs_mut().extend_pairs(request.params.iter());
        }
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn perform(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        let url = self.url_for(request)?;
        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(revision) = &request.revision {
            builder = builder.header(IF_MATCH, revision.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(base: &str) -> HttpTransport {
        HttpTransport::new(base, &BTreeMap::new(), &TransportConfig::default()).unwrap()
    }

    #[test]
    fn test_url_joins_under_base_path() {
        let t = transport("https://tracker.example.com/acme/_apis");
        let request = ApiRequest::read("workitem:12", "/wit/workitems/12")
            .with_param("api-version", "7.1")
            .with_param("$expand", "relations");

        let url = t.url_for(&request).unwrap();
        assert_eq!(
            url.as_str(),
            "https://tracker.example.com/acme/_apis/wit/workitems/12?%24expand=relations&api-version=7.1"
        );
    }

    #[test]
    fn test_rejects_bad_base_url_and_headers() {
        assert!(matches!(
            HttpTransport::new("::nope::", &BTreeMap::new(), &TransportConfig::default()),
            Err(TransportError::InvalidRequest(_))
        ));

        let mut headers = BTreeMap::new();
        headers.insert("bad header".to_string(), "x".to_string());
        assert!(HttpTransport::new("http://localhost/", &headers, &TransportConfig::default()).is_err());
    }

    #[test]
    fn test_raw_response_headers_are_case_insensitive() {
        let response = RawResponse::new(429).with_header("Retry-After", "3");
        assert_eq!(response.header("retry-after"), Some("3"));
        assert_eq!(response.header("RETRY-AFTER"), Some("3"));
    }
}
