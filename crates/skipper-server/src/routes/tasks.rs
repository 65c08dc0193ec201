//! Task management endpoints

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use skipper_core::model::{TaskExecution, TaskStatus};
use skipper_core::TaskOptions;

use crate::error::AppError;
use crate::types::{CdpUrlResponse, CreateTaskRequest, StopResponse, TaskListResponse};
use crate::AppState;

/// Build the tasks router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route("/:id", get(get_task))
        .route("/:id/stop", post(stop_task))
        .route("/:id/screenshot", get(get_screenshot))
        .route("/:id/cdp-url", get(get_cdp_url))
}

/// Submit a task; returns the initial execution snapshot.
async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskExecution>), AppError> {
    if req.description.trim().is_empty() {
        return Err(AppError::BadRequest("description must not be empty".into()));
    }

    let options = TaskOptions {
        headless: req.headless,
        ..Default::default()
    };
    let execution = state.registry.create(&req.description, options)?;
    Ok((StatusCode::CREATED, Json(execution)))
}

/// List all executions, most recently started first.
async fn list_tasks(State(state): State<AppState>) -> Json<TaskListResponse> {
    Json(TaskListResponse {
        tasks: state.registry.list(),
    })
}

/// Get one execution snapshot.
async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskExecution>, AppError> {
    state
        .registry
        .get(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Task {id} not found")))
}

/// Request cooperative cancellation.
async fn stop_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StopResponse>, AppError> {
    if state.registry.get(&id).is_none() {
        return Err(AppError::NotFound(format!("Task {id} not found")));
    }
    state.registry.stop(&id);
    Ok(Json(StopResponse { ok: true }))
}

/// Latest screenshot for a task, as raw PNG bytes.
async fn get_screenshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    if state.registry.get(&id).is_none() {
        return Err(AppError::NotFound(format!("Task {id} not found")));
    }
    let Some(path) = state.registry.latest_screenshot(&id) else {
        return Err(AppError::NotFound(format!(
            "Task {id} has no screenshot yet"
        )));
    };

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| AppError::Internal(format!("cannot read screenshot: {e}")))?;
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/png")
        .body(Body::from(bytes))
        .map_err(|e| AppError::Internal(e.to_string()))
        .map(IntoResponse::into_response)
}

/// DevTools URL for the live browser view, with a readiness tag.
async fn get_cdp_url(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CdpUrlResponse>, AppError> {
    let Some((url, status)) = state.registry.cdp_status(&id) else {
        return Err(AppError::NotFound(format!("Task {id} not found")));
    };

    let response = if status.is_terminal() {
        CdpUrlResponse {
            url: None,
            status: "completed",
            message: Some("task finished; the browser session was released".into()),
        }
    } else if let Some(url) = url {
        CdpUrlResponse {
            url: Some(url),
            status: "ready",
            message: None,
        }
    } else {
        let message = if status == TaskStatus::Idle {
            "browser session not yet acquired"
        } else {
            "browser collaborator does not expose a DevTools URL"
        };
        CdpUrlResponse {
            url: None,
            status: "waiting",
            message: Some(message.into()),
        }
    };
    Ok(Json(response))
}
