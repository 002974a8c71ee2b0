use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{FetchError, Fetcher, Transport};

const USER_AGENT: &str = concat!("timelapse/", env!("CARGO_PKG_VERSION"));

/// Opens one reqwest client per fetcher.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Transport for HttpTransport {
    fn open(&self) -> Result<Arc<dyn Fetcher>, FetchError> {
        Ok(Arc::new(HttpFetcher::new(self.timeout)?))
    }
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        debug!(url, size = bytes.len(), "Fetched");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_opens_independent_fetchers() {
        let transport = HttpTransport::new(Duration::from_secs(5));
        let first = transport.open().unwrap();
        let second = transport.open().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_host_is_request_error() {
        let fetcher = HttpFetcher::new(Duration::from_millis(500)).unwrap();
        let result = fetcher.fetch("http://127.0.0.1:1/place").await;
        assert!(matches!(result, Err(FetchError::Request { .. })));
    }
}
