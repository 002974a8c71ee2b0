//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the pipeline's collaborator
//! traits, allowing the whole generator to run without a database, network
//! or font stack.
//!
//! # Example
//!
//! ```rust,ignore
//! use timelapse_core::testing::{fixtures, MockPersistence, MockRenderer, MockTransport};
//!
//! let transport = MockTransport::new();
//! transport
//!     .add_snapshot(fixtures::DOWNLOAD_BASE, "abc123", &fixtures::metadata(), fixtures::canvas(), &fixtures::placers())
//!     .await;
//!
//! let deps = Dependencies::new(
//!     Arc::new(MockPersistence::new()),
//!     Arc::new(transport),
//!     Arc::new(MockRenderer::new()),
//! );
//! ```

mod mock_persistence;
mod mock_renderer;
mod mock_transport;

pub use mock_persistence::{MockPersistence, RecordedArtifact};
pub use mock_renderer::MockRenderer;
pub use mock_transport::{MockFetcher, MockResponse, MockTransport};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;

    use crate::canvas::{CanvasMetadata, Colour};
    use crate::pipeline::GenerationConfig;

    pub const REPO_URL: &str = "https://github.com/example/canvas-history";
    pub const DOWNLOAD_BASE: &str = "https://raw.example.com/canvas";
    pub const GAME_SERVER: &str = "https://game.example.com";

    /// A 4x2 canvas with a three colour palette.
    pub fn metadata() -> CanvasMetadata {
        CanvasMetadata::new(
            4,
            2,
            vec![
                Colour::from_packed(0xFFFFFFFF),
                Colour::from_packed(0x000000FF),
                Colour::from_packed(0xFF4500FF),
            ],
        )
    }

    /// Canvas bytes matching [`metadata`].
    pub fn canvas() -> Vec<u8> {
        vec![0, 1, 2, 0, 1, 1, 2, 0]
    }

    /// Placer map matching [`metadata`]: user 7 owns four pixels, 9 owns three.
    pub fn placers() -> Vec<u32> {
        vec![7, 7, 9, 7, 9, 9, 7, 3]
    }

    /// Run config pointing at the fixture URLs.
    pub fn generation_config(commit_log: &Path, output_dir: &Path) -> GenerationConfig {
        GenerationConfig::new(REPO_URL, DOWNLOAD_BASE, GAME_SERVER, commit_log)
            .with_output_dir(output_dir)
            .with_max_top_placers(2)
    }

    /// A commit log record.
    pub fn commit_log_entry(hash: &str, author: Option<&str>, date: i64) -> String {
        match author {
            Some(author) => format!("Commit: {}\nAuthor: {}\nDate: {}\n", hash, author, date),
            None => format!("Commit: {}\nDate: {}\n", hash, date),
        }
    }
}
