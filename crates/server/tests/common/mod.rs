//! Common test utilities for API testing with a mock transformer.
//!
//! This module provides a test fixture that builds the router in-process
//! over temporary input, output and scratch directories, with a
//! `MockTransformer` standing in for the external collaborator.

#![allow(dead_code)]

use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use streambatch_core::{
    testing::MockTransformer, BatchConfig, BatchOrchestrator, Config, ServerConfig, SinkConfig,
    SourceConfig, Transformer, TransformerConfig, TransformerGateway,
};
use streambatch_server::registry::BatchRegistry;
use streambatch_server::state::AppState;

/// Test fixture with a mock transformer and temporary directories.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_preflight() {
///     let fixture = TestFixture::new().await;
///     fixture.write_input("study/a.dcm", b"AAA");
///
///     let response = fixture.post("/api/v1/batches/preflight", json!({
///         "input_dir": "study"
///     })).await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock transformer - script outputs, errors, delays
    pub transformer: MockTransformer,
    /// Temporary directory holding input, output and scratch
    pub temp_dir: TempDir,
    /// Source root batches are resolved against
    pub input_dir: PathBuf,
    /// Directory file-mode archives land in
    pub output_dir: PathBuf,
    /// Registry shared with the router, for driving shutdown
    pub batches: BatchRegistry,
}

/// Response from a JSON test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Response whose body is kept as raw bytes (streamed archives)
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Configuration for test fixture.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Batch settings (filters, limits)
    pub batch: BatchConfig,
    /// Transformer used by the orchestrator; cloned handles share state
    pub transformer: MockTransformer,
    /// Server settings (retention)
    pub server: ServerConfig,
}

impl TestConfig {
    /// Create config with batch size limits.
    pub fn with_limits(max_items: Option<usize>, max_total_bytes: Option<u64>) -> Self {
        Self {
            batch: BatchConfig::default().with_limits(max_items, max_total_bytes),
            ..Default::default()
        }
    }

    /// Create config keeping at most `retained` finished batches.
    pub fn with_retained_batches(retained: usize) -> Self {
        Self {
            server: ServerConfig::default().with_retained_batches(retained),
            ..Default::default()
        }
    }

    /// Create config around a scripted transformer.
    pub fn with_transformer(transformer: MockTransformer) -> Self {
        Self {
            transformer,
            ..Default::default()
        }
    }
}

impl TestFixture {
    /// Create a new test fixture with default settings.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let input_dir = temp_dir.path().join("input");
        let output_dir = temp_dir.path().join("output");
        let scratch_dir = temp_dir.path().join("scratch");
        std::fs::create_dir_all(&input_dir).expect("Failed to create input dir");
        std::fs::create_dir_all(&scratch_dir).expect("Failed to create scratch dir");

        let config = Config {
            server: test_config.server,
            source: SourceConfig {
                root_dir: input_dir.clone(),
            },
            batch: test_config.batch,
            transformer: TransformerConfig::default()
                .with_scratch_dir(scratch_dir)
                .with_timeout(10),
            sink: SinkConfig::default()
                .with_output_dir(&output_dir)
                .with_stream_buffer(2),
            ..Default::default()
        };

        let transformer: Arc<dyn Transformer> = Arc::new(test_config.transformer.clone());
        let gateway = TransformerGateway::new(transformer, config.transformer.clone());
        let orchestrator =
            BatchOrchestrator::new(config.batch.clone(), config.archive.clone(), gateway);

        let state = Arc::new(AppState::new(config, orchestrator));
        let batches = state.batches().clone();
        let router = streambatch_server::api::create_router(state);

        Self {
            router,
            transformer: test_config.transformer,
            temp_dir,
            input_dir,
            output_dir,
            batches,
        }
    }

    /// Write a file below the source root.
    pub fn write_input(&self, relative: &str, content: &[u8]) {
        let path = self.input_dir.join(relative);
        std::fs::create_dir_all(path.parent().expect("input path has a parent"))
            .expect("Failed to create input subdirectory");
        std::fs::write(path, content).expect("Failed to write input file");
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a GET request and keep the body as raw bytes.
    pub async fn get_raw(&self, path: &str) -> RawResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send_raw(request).await
    }

    /// Send a POST request and collect the raw body, however it is streamed.
    pub async fn post_raw(&self, path: &str, body: Value) -> RawResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        self.send_raw(request).await
    }

    async fn send_raw(&self, request: Request<Body>) -> RawResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes()
            .to_vec();

        RawResponse {
            status,
            headers,
            body,
        }
    }

    /// Poll a batch until it reaches `done` or `aborted`.
    pub async fn wait_for_batch(&self, batch_id: &str) -> Value {
        for _ in 0..200 {
            let response = self.get(&format!("/api/v1/batches/{batch_id}")).await;
            let state = response.body["state"].as_str().unwrap_or_default();
            if (state == "done" || state == "aborted") && !response.body["summary"].is_null() {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("Batch {batch_id} did not finish in time");
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

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Read every entry of a ZIP archive with an independent decoder.
pub fn read_archive(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).expect("valid zip");
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let mut content = Vec::new();
            file.read_to_end(&mut content).unwrap();
            (file.name().to_string(), content)
        })
        .collect()
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
