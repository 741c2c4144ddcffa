//! Common test utilities for API testing.
//!
//! This module provides a test fixture that builds the router in-process
//! with a temp database, temp file areas and the in-memory broker, so the
//! HTTP surface can be exercised without external infrastructure.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use imgpipe_core::{
    Config, ImageService, InMemoryBroker, LocalFileArea, SqliteTaskStore, TaskStatus, TaskStore,
    WorkerConfig, WorkerPool,
};
use imgpipe_server::state::AppState;

/// Re-export fixtures for test convenience
pub use imgpipe_core::testing::fixtures;

const BOUNDARY: &str = "imgpipe-test-boundary";

/// Test fixture wiring the real service around temp storage.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_upload() {
///     let fixture = TestFixture::new();
///
///     let response = fixture
///         .upload(&Upload::file("cat.png", fixtures::png_bytes(10, 10)))
///         .await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub store: Arc<SqliteTaskStore>,
    pub broker: InMemoryBroker,
    pub files: Arc<LocalFileArea>,
    pool: Option<WorkerPool>,
    /// Temporary directory for the database and file areas
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub body: Value,
}

/// Multipart upload form
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub file: Option<(String, Vec<u8>)>,
    pub watermark: Option<String>,
    pub resize: Option<String>,
    pub mini: Option<String>,
}

impl Upload {
    pub fn file(name: &str, bytes: Vec<u8>) -> Self {
        Self {
            file: Some((name.to_string(), bytes)),
            ..Self::default()
        }
    }

    pub fn watermark(mut self, text: &str) -> Self {
        self.watermark = Some(text.to_string());
        self
    }

    pub fn resize(mut self, resize: &str) -> Self {
        self.resize = Some(resize.to_string());
        self
    }

    pub fn mini(mut self, value: &str) -> Self {
        self.mini = Some(value.to_string());
        self
    }

    fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some((name, bytes)) = &self.file {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    BOUNDARY, name
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        for (name, value) in [
            ("watermark", &self.watermark),
            ("resize", &self.resize),
            ("mini", &self.mini),
        ] {
            if let Some(value) = value {
                body.extend_from_slice(
                    format!(
                        "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                        BOUNDARY, name, value
                    )
                    .as_bytes(),
                );
            }
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }
}

impl TestFixture {
    /// Create a new test fixture with default configuration.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a test fixture after adjusting the configuration.
    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let mut config = Config::default();
        config.database.path = temp_dir.path().join("test.db");
        config.storage.input_dir = temp_dir.path().join("input");
        config.storage.output_dir = temp_dir.path().join("output");
        config.retry = fixtures::fast_retry();
        adjust(&mut config);

        let store = Arc::new(
            SqliteTaskStore::new(&config.database.path).expect("Failed to create task store"),
        );
        let broker = InMemoryBroker::new(config.broker.topic.clone());
        let files = Arc::new(LocalFileArea::new(
            config.storage.input_dir.clone(),
            config.storage.output_dir.clone(),
        ));

        let service = Arc::new(
            ImageService::new(
                store.clone(),
                Arc::new(broker.clone()),
                files.clone(),
                config.formats.to_set(),
                config.retry.clone(),
            )
            .with_max_resize_side(config.server.max_resize_side),
        );

        let state = Arc::new(AppState::new(config, service, store.clone()));
        let router = imgpipe_server::api::create_router(state);

        Self {
            router,
            store,
            broker,
            files,
            pool: None,
            temp_dir,
        }
    }

    /// Start a worker pool consuming the fixture's broker.
    pub async fn start_workers(&mut self) {
        let pool = WorkerPool::start(
            WorkerConfig {
                count: 2,
                ..WorkerConfig::default()
            },
            Arc::new(self.broker.consumer().await),
            self.store.clone(),
            self.files.clone(),
            fixtures::fast_retry(),
        );
        self.pool = Some(pool);
    }

    pub async fn stop_workers(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.shutdown().await;
        }
    }

    pub fn status(&self, id: &str) -> TaskStatus {
        self.store.get(id).unwrap().unwrap().status
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(Request::get(path).body(Body::empty()).unwrap())
            .await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.send(Request::delete(path).body(Body::empty()).unwrap())
            .await
    }

    /// POST a multipart form to the upload endpoint.
    pub async fn upload(&self, form: &Upload) -> TestResponse {
        let request = Request::post("/api/v1/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(form.encode()))
            .unwrap();
        self.send(request).await
    }

    /// Poll the image endpoint until it stops answering 202.
    pub async fn wait_for_image(&self, id: &str) -> TestResponse {
        let path = format!("/api/v1/image/{}", id);
        for _ in 0..250 {
            let response = self.get(&path).await;
            if response.status != StatusCode::ACCEPTED {
                return response;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("image {} still pending", id);
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes()
            .to_vec();

        let body: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            content_type,
            bytes,
            body,
        }
    }
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
