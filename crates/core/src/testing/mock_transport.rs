//! Mock transport for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::canvas::CanvasMetadata;
use crate::transport::{
    canvas_url, metadata_url, placers_url, user_url, FetchError, Fetcher, Transport,
};

/// Canned response for a URL.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Body(Vec<u8>),
    Status(u16),
    Unreachable,
}

#[derive(Debug, Default)]
struct Shared {
    responses: RwLock<HashMap<String, MockResponse>>,
    requests: RwLock<Vec<String>>,
    opened: AtomicUsize,
    refuse_open: AtomicBool,
}

/// Mock implementation of the Transport trait.
///
/// Every fetcher it opens serves the same canned responses and records
/// requested URLs. Unknown URLs answer HTTP 404.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    shared: Arc<Shared>,
}

impl MockTransport {
    /// Create a new mock transport with no responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    pub async fn set_response(&self, url: impl Into<String>, body: Vec<u8>) {
        self.shared
            .responses
            .write()
            .await
            .insert(url.into(), MockResponse::Body(body));
    }

    /// Answer `url` with an HTTP status.
    pub async fn set_status(&self, url: impl Into<String>, status: u16) {
        self.shared
            .responses
            .write()
            .await
            .insert(url.into(), MockResponse::Status(status));
    }

    /// Fail requests to `url` at the connection level.
    pub async fn set_unreachable(&self, url: impl Into<String>) {
        self.shared
            .responses
            .write()
            .await
            .insert(url.into(), MockResponse::Unreachable);
    }

    /// Serve a full snapshot for a commit: metadata, canvas and placer map.
    pub async fn add_snapshot(
        &self,
        download_base_url: &str,
        commit_hash: &str,
        metadata: &CanvasMetadata,
        canvas: Vec<u8>,
        placers: &[u32],
    ) {
        let palette: Vec<u32> = metadata.palette.iter().map(|c| c.to_packed()).collect();
        let metadata_json = serde_json::json!({
            "palette": palette,
            "width": metadata.width,
            "height": metadata.height,
        });
        self.set_response(
            metadata_url(download_base_url, commit_hash),
            metadata_json.to_string().into_bytes(),
        )
        .await;
        self.set_response(canvas_url(download_base_url, commit_hash), canvas)
            .await;
        let placer_bytes = placers.iter().flat_map(|id| id.to_be_bytes()).collect();
        self.set_response(placers_url(download_base_url, commit_hash), placer_bytes)
            .await;
    }

    /// Serve user info for a placer.
    pub async fn add_user(&self, game_server_base_url: &str, int_id: u32, chat_name: &str) {
        let user = serde_json::json!({
            "chatName": chat_name,
            "lastJoined": 1704298864,
            "pixelsPlaced": 1000,
            "playTimeSeconds": 3600,
        });
        self.set_response(
            user_url(game_server_base_url, int_id),
            user.to_string().into_bytes(),
        )
        .await;
    }

    /// All requested URLs, in order.
    pub async fn requests(&self) -> Vec<String> {
        self.shared.requests.read().await.clone()
    }

    /// How many times `url` was requested.
    pub async fn request_count(&self, url: &str) -> usize {
        self.shared
            .requests
            .read()
            .await
            .iter()
            .filter(|r| *r == url)
            .count()
    }

    /// Make every later `open` fail, as if no HTTP client could be built.
    pub fn refuse_open(&self) {
        self.shared.refuse_open.store(true, Ordering::SeqCst);
    }

    /// Number of fetchers opened.
    pub fn opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn open(&self) -> Result<Arc<dyn Fetcher>, FetchError> {
        if self.shared.refuse_open.load(Ordering::SeqCst) {
            return Err(FetchError::Client("client construction refused".to_string()));
        }
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockFetcher {
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// Fetcher handed out by [`MockTransport`].
#[derive(Debug)]
pub struct MockFetcher {
    shared: Arc<Shared>,
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.shared.requests.write().await.push(url.to_string());
        let response = self.shared.responses.read().await.get(url).cloned();
        match response {
            Some(MockResponse::Body(body)) => Ok(body),
            Some(MockResponse::Status(status)) => Err(FetchError::Status {
                url: url.to_string(),
                status,
            }),
            Some(MockResponse::Unreachable) => Err(FetchError::Request {
                url: url.to_string(),
                message: "connection refused".to_string(),
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}
