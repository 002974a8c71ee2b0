//! HTTP access to snapshot downloads and the game server.

mod http;

pub use http::{HttpFetcher, HttpTransport};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read body of {url}: {message}")]
    Body { url: String, message: String },

    #[error("failed to create HTTP client: {0}")]
    Client(String),
}

/// Fetches whole response bodies.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url`. Non-2xx responses are errors.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Creates fetchers. Each download worker opens its own.
pub trait Transport: Send + Sync {
    fn open(&self) -> Result<Arc<dyn Fetcher>, FetchError>;
}

fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

pub fn canvas_url(download_base_url: &str, commit_hash: &str) -> String {
    join(download_base_url, &format!("{}/place", commit_hash))
}

pub fn placers_url(download_base_url: &str, commit_hash: &str) -> String {
    join(download_base_url, &format!("{}/placers", commit_hash))
}

pub fn metadata_url(download_base_url: &str, commit_hash: &str) -> String {
    join(download_base_url, &format!("{}/metadata.json", commit_hash))
}

pub fn user_url(game_server_base_url: &str, int_id: u32) -> String {
    join(game_server_base_url, &format!("users/{}", int_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        assert_eq!(
            canvas_url("https://raw.example.com/canvas/", "abc123"),
            "https://raw.example.com/canvas/abc123/place"
        );
        assert_eq!(
            placers_url("https://raw.example.com/canvas", "abc123"),
            "https://raw.example.com/canvas/abc123/placers"
        );
        assert_eq!(
            metadata_url("https://raw.example.com/canvas", "abc123"),
            "https://raw.example.com/canvas/abc123/metadata.json"
        );
        assert_eq!(
            user_url("https://game.example.com", 42),
            "https://game.example.com/users/42"
        );
    }
}
