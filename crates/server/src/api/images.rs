//! Image upload, fetch and delete handlers.

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};

use imgpipe_core::{format_from_filename, ImageView, NewTask, ServiceError, Task, TaskStatus};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response for a successful upload
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: String,
    /// Storage name of the original and the result.
    pub name: String,
    pub status: TaskStatus,
    /// Where to poll for the result.
    pub url: String,
}

/// Status payload for a task that has no file to serve
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: String,
    pub status: TaskStatus,
    pub format: String,
    pub name: String,
    pub watermark: String,
    pub resize: Option<String>,
    pub mini: bool,
    pub created_at: String,
}

impl From<&Task> for TaskResponse {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            status: task.status,
            format: task.format.clone(),
            name: task.storage_name.clone(),
            watermark: task.watermark.clone(),
            resize: task.resize.is_requested().then(|| task.resize.to_string()),
            mini: task.mini,
            created_at: task.created_at.to_rfc3339(),
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn service_error(err: ServiceError) -> ApiError {
    let status = match &err {
        ServiceError::Validation(_) | ServiceError::InvalidId(_) => StatusCode::BAD_REQUEST,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => {
            error!(error = %err, "Request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    api_error(status, err.to_string())
}

fn image_url(id: &str) -> String {
    format!("/api/v1/image/{}", id)
}

fn content_type(format: &str) -> &'static str {
    match format {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/upload
///
/// Multipart form: `file` (required), `watermark`, `resize` (`WxH`), `mini`
/// (`1` or `true`). The target format is the file name's extension.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut data: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut request = NewTask::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(api_error(e.status(), e.body_text())),
        };

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                filename = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| api_error(e.status(), format!("Failed to read file: {}", e)))?;
                data = Some(bytes.to_vec());
            }
            "watermark" => {
                request.watermark = field
                    .text()
                    .await
                    .map_err(|e| api_error(e.status(), e.body_text()))?;
            }
            "resize" => {
                request.resize = field
                    .text()
                    .await
                    .map_err(|e| api_error(e.status(), e.body_text()))?;
            }
            "mini" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| api_error(e.status(), e.body_text()))?;
                request.mini = text == "1" || text.eq_ignore_ascii_case("true");
            }
            _ => {}
        }
    }

    let data = match data {
        Some(d) if !d.is_empty() => d,
        _ => return Err(api_error(StatusCode::BAD_REQUEST, "No image file provided")),
    };
    let filename =
        filename.ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Missing file name"))?;
    request.format = format_from_filename(&filename).map_err(service_error)?;

    let task = state
        .service()
        .intake(request, &data)
        .await
        .map_err(service_error)?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            url: image_url(&task.id),
            id: task.id,
            name: task.storage_name,
            status: task.status,
        }),
    ))
}

/// GET /api/v1/image/{id}
///
/// The transformed file once processed; otherwise the task status, with a
/// status code telling the client whether polling is worthwhile.
pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let view = state.service().fetch(&id).await.map_err(service_error)?;

    let response = match view {
        ImageView::Ready { task, path } => {
            let bytes = tokio::fs::read(&path).await.map_err(|e| {
                warn!(task_id = %task.id, path = ?path, error = %e, "Failed to read output");
                api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read image")
            })?;
            (
                [(header::CONTENT_TYPE, content_type(&task.format))],
                bytes,
            )
                .into_response()
        }
        ImageView::Pending { task } => {
            (StatusCode::ACCEPTED, Json(TaskResponse::from(&task))).into_response()
        }
        ImageView::Failed { task } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(TaskResponse::from(&task)),
        )
            .into_response(),
        ImageView::Gone { task } => {
            (StatusCode::GONE, Json(TaskResponse::from(&task))).into_response()
        }
    };

    Ok(response)
}

/// DELETE /api/v1/image/{id}
pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.service().delete(&id).map_err(service_error)?;
    Ok(StatusCode::NO_CONTENT)
}
