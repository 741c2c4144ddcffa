//! HTTP API tests driven through the router in-process.

mod common;

use axum::http::StatusCode;
use common::{fixtures, TestFixture, Upload};
use imgpipe_core::{TaskStatus, TaskStore};

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/v1/health").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_endpoint() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/v1/config").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["broker"]["topic"], "image-tasks");
    assert_eq!(response.body["broker"]["backend"], "memory");
}

#[tokio::test]
async fn test_upload_returns_created_task() {
    let fixture = TestFixture::new();

    let response = fixture
        .upload(
            &Upload::file("photo.PNG", fixtures::png_bytes(64, 48))
                .watermark("WM")
                .resize("32x24")
                .mini("1"),
        )
        .await;
    assert_status!(response, StatusCode::CREATED);

    let id = response.body["id"].as_str().unwrap().to_string();
    assert_eq!(response.body["status"], "created");
    assert_eq!(response.body["name"], format!("{}.png", id));
    assert_eq!(response.body["url"], format!("/api/v1/image/{}", id));

    let task = fixture.store.get(&id).unwrap().unwrap();
    assert_eq!(task.format, "png");
    assert_eq!(task.watermark, "WM");
    assert_eq!((task.resize.width, task.resize.height), (32, 24));
    assert!(task.mini);

    assert_eq!(fixture.broker.published_keys().await, vec![id]);
}

#[tokio::test]
async fn test_mini_accepts_true() {
    let fixture = TestFixture::new();
    let response = fixture
        .upload(&Upload::file("a.gif", fixtures::png_bytes(8, 8)).mini("true"))
        .await;
    assert_status!(response, StatusCode::CREATED);

    let id = response.body["id"].as_str().unwrap();
    assert!(fixture.store.get(id).unwrap().unwrap().mini);
}

#[tokio::test]
async fn test_upload_rejects_bad_input() {
    let fixture = TestFixture::new();
    let png = fixtures::png_bytes(8, 8);

    let cases = [
        ("no file", Upload::default().watermark("WM")),
        ("unsupported format", Upload::file("a.bmp", png.clone())),
        ("no extension", Upload::file("image", png.clone())),
        (
            "watermark too long",
            Upload::file("a.png", png.clone()).watermark("123456789012345678901"),
        ),
        ("bad resize", Upload::file("a.png", png.clone()).resize("big")),
        ("half resize", Upload::file("a.png", png.clone()).resize("100x0")),
        (
            "resize too large",
            Upload::file("a.png", png.clone()).resize("100000x100000"),
        ),
    ];

    for (name, form) in cases {
        let response = fixture.upload(&form).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "case: {}", name);
        assert!(response.body["error"].is_string(), "case: {}", name);
    }

    assert!(fixture.broker.is_empty().await);
}

#[tokio::test]
async fn test_resize_bound_follows_config() {
    let fixture = TestFixture::with_config(|config| config.server.max_resize_side = 64);
    let png = fixtures::png_bytes(8, 8);

    let response = fixture
        .upload(&Upload::file("a.png", png.clone()).resize("65x10"))
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);

    let response = fixture
        .upload(&Upload::file("a.png", png).resize("64x64"))
        .await;
    assert_status!(response, StatusCode::CREATED);
}

#[tokio::test]
async fn test_upload_over_body_limit_is_rejected() {
    let fixture = TestFixture::with_config(|config| config.server.max_upload_bytes = 1024);
    let response = fixture
        .upload(&Upload::file("big.png", vec![0u8; 8 * 1024]))
        .await;
    assert_status!(response, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(fixture.broker.is_empty().await);
}

#[tokio::test]
async fn test_pending_image_returns_accepted_status() {
    let fixture = TestFixture::new();
    let upload = fixture
        .upload(&Upload::file("a.png", fixtures::png_bytes(8, 8)))
        .await;
    let id = upload.body["id"].as_str().unwrap();

    let response = fixture.get(&format!("/api/v1/image/{}", id)).await;
    assert_status!(response, StatusCode::ACCEPTED);
    assert_eq!(response.body["id"], id);
    assert_eq!(response.body["status"], "created");
    assert!(response.body["resize"].is_null());
}

#[tokio::test]
async fn test_unknown_and_malformed_ids() {
    let fixture = TestFixture::new();

    let response = fixture
        .get("/api/v1/image/550e8400-e29b-41d4-a716-446655440000")
        .await;
    assert_status!(response, StatusCode::NOT_FOUND);

    let response = fixture.get("/api/v1/image/not-a-uuid").await;
    assert_status!(response, StatusCode::BAD_REQUEST);

    let response = fixture.delete("/api/v1/image/not-a-uuid").await;
    assert_status!(response, StatusCode::BAD_REQUEST);

    let response = fixture
        .delete("/api/v1/image/550e8400-e29b-41d4-a716-446655440000")
        .await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_then_fetch_is_gone() {
    let fixture = TestFixture::new();
    let upload = fixture
        .upload(&Upload::file("a.jpg", fixtures::png_bytes(8, 8)))
        .await;
    let id = upload.body["id"].as_str().unwrap();
    let path = format!("/api/v1/image/{}", id);

    let response = fixture.delete(&path).await;
    assert_status!(response, StatusCode::NO_CONTENT);
    assert!(response.bytes.is_empty());

    // Deleting again is not an error.
    let response = fixture.delete(&path).await;
    assert_status!(response, StatusCode::NO_CONTENT);

    let response = fixture.get(&path).await;
    assert_status!(response, StatusCode::GONE);
    assert_eq!(response.body["status"], "deleted");
    assert_eq!(fixture.status(id), TaskStatus::Deleted);
}

#[tokio::test]
async fn test_upload_is_processed_and_served() {
    let mut fixture = TestFixture::new();
    fixture.start_workers().await;

    let upload = fixture
        .upload(
            &Upload::file("photo.png", fixtures::png_bytes(800, 600))
                .watermark("WM")
                .resize("500x500")
                .mini("1"),
        )
        .await;
    assert_status!(upload, StatusCode::CREATED);
    let id = upload.body["id"].as_str().unwrap().to_string();

    let response = fixture.wait_for_image(&id).await;
    fixture.stop_workers().await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.content_type.as_deref(), Some("image/png"));
    let img = image::load_from_memory(&response.bytes).unwrap();
    assert!(img.width() <= 300 && img.height() <= 300);
    assert_eq!(fixture.status(&id), TaskStatus::Processed);
}

#[tokio::test]
async fn test_jpeg_served_with_jpeg_content_type() {
    let mut fixture = TestFixture::new();
    fixture.start_workers().await;

    let upload = fixture
        .upload(&Upload::file("photo.jpeg", fixtures::jpeg_bytes(300, 200)).resize("150x100"))
        .await;
    let id = upload.body["id"].as_str().unwrap().to_string();

    let response = fixture.wait_for_image(&id).await;
    fixture.stop_workers().await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.content_type.as_deref(), Some("image/jpeg"));
    let img = image::load_from_memory(&response.bytes).unwrap();
    assert_eq!((img.width(), img.height()), (150, 100));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new();
    let upload = fixture
        .upload(&Upload::file("a.png", fixtures::png_bytes(8, 8)))
        .await;
    let id = upload.body["id"].as_str().unwrap();
    fixture.get(&format!("/api/v1/image/{}", id)).await;

    let response = fixture.get("/metrics").await;
    assert_status!(response, StatusCode::OK);
    let text = String::from_utf8(response.bytes).unwrap();
    assert!(text.contains("imgpipe_tasks_by_status"));
    assert!(text.contains("imgpipe_intake_total"));
    assert!(text.contains("imgpipe_http_requests_total"));
    assert!(text.contains("imgpipe_image_fetches_total"));
    assert!(text.contains("path=\"/api/v1/image/{id}\""));
    assert!(!text.contains(id));
}
