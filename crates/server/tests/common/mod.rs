//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with a real generator wired to mock persistence, transport and renderer,
//! enabling API testing without network or database access.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use timelapse_core::{
    config::{DatabaseConfig, GenerationSection, ServerConfig},
    testing::{MockPersistence, MockRenderer, MockTransport},
    Config, Dependencies, Generator, GeneratorHandle, PipelineConfig,
};

/// Re-export fixtures for test convenience
pub use timelapse_core::testing::fixtures;

/// Test fixture with an in-process router and controllable mocks.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_start() {
///     let fixture = TestFixture::new().await;
///     let response = fixture.post("/api/v1/generation/start", None).await;
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Handle of the generator behind the router
    pub generator: GeneratorHandle,
    /// Mock persistence - inspect recorded artifacts
    pub persistence: MockPersistence,
    /// Mock transport - serve snapshots
    pub transport: MockTransport,
    /// Temporary directory for the commit log and output
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    /// Create a fixture whose configured commit log holds one commit.
    pub async fn new() -> Self {
        Self::with_log(&[fixtures::commit_log_entry("abc123", None, 1704298864)]).await
    }

    /// Create a fixture whose configured commit log holds `entries`.
    pub async fn with_log(entries: &[String]) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let commit_log = temp_dir.path().join("commits.txt");
        std::fs::write(&commit_log, entries.concat()).expect("Failed to write commit log");

        let persistence = MockPersistence::new();
        let transport = MockTransport::new();

        let pipeline = PipelineConfig::default().with_stats_interval_ms(20);
        let config = Config {
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
            },
            database: DatabaseConfig {
                path: temp_dir.path().join("test.db"),
            },
            pipeline: pipeline.clone(),
            generation: Some(GenerationSection {
                autostart: false,
                run: fixtures::generation_config(&commit_log, &temp_dir.path().join("out")),
            }),
        };

        let (generator, _task) = Generator::spawn(
            pipeline,
            Dependencies::new(
                Arc::new(persistence.clone()),
                Arc::new(transport.clone()),
                Arc::new(MockRenderer::new()),
            ),
        );

        let state = Arc::new(timelapse_server::state::AppState::new(
            config,
            generator.clone(),
        ));
        let router = timelapse_server::api::create_router(state);

        Self {
            router,
            generator,
            persistence,
            transport,
            temp_dir,
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.temp_dir.path().join("out")
    }

    /// Start the configured generation and wait until it runs.
    pub async fn start(&self) {
        let response = self.post("/api/v1/generation/start", None).await;
        assert_eq!(response.status, StatusCode::ACCEPTED, "{}", response.text);
        self.wait_until(|| self.generator.is_running()).await;
    }

    /// Poll `condition` until it holds, failing the test after a few seconds.
    pub async fn wait_until(&self, condition: impl Fn() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with an optional JSON body.
    pub async fn post(&self, path: &str, body: Option<Value>) -> TestResponse {
        self.request("POST", path, body).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}
