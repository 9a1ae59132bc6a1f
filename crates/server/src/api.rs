//! HTTP file API: workspace listing plus plain file read/write.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::{error, info};

use pairpad_protocol::{ApiError, ServiceInfo, WriteFileRequest, WriteFileResponse};

use crate::state::AppState;
use crate::workspace::WorkspaceError;

pub const ROUTES: &[&str] = &[
    "GET /health",
    "GET /ws?room=<id>",
    "GET /term",
    "GET /workspaces",
    "GET /projects/{project}/files",
    "GET /projects/{project}/file?path=<path>",
    "POST /projects/{project}/file",
];

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    #[serde(default)]
    pub path: Option<String>,
}

/// Error response body `{error}` with a status code.
#[derive(Debug)]
pub struct ApiFailure {
    status: StatusCode,
    message: String,
}

impl ApiFailure {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<WorkspaceError> for ApiFailure {
    fn from(err: WorkspaceError) -> Self {
        match err {
            WorkspaceError::InvalidName(_) | WorkspaceError::InvalidPath(_) => {
                Self::bad_request(err.to_string())
            }
            WorkspaceError::NotFound(_) | WorkspaceError::FileNotFound(_) => Self {
                status: StatusCode::NOT_FOUND,
                message: "not found".to_string(),
            },
            WorkspaceError::Io(e) => {
                error!(
                    component = "api",
                    event = "api.io_failed",
                    error = %e,
                    "Workspace I/O failed"
                );
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: e.to_string(),
                }
            }
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiError {
                error: self.message,
            }),
        )
            .into_response()
    }
}

pub async fn health_handler() -> impl IntoResponse {
    "OK"
}

pub async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        ok: true,
        service: "pairpad".to_string(),
        routes: ROUTES.iter().map(|route| route.to_string()).collect(),
    })
}

pub async fn list_workspaces(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, ApiFailure> {
    Ok(Json(state.workspaces().list_workspaces()?))
}

/// Lists a project's entries, creating the project on first access.
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
) -> Result<Json<Vec<String>>, ApiFailure> {
    Ok(Json(state.workspaces().list_files(&project)?))
}

pub async fn read_file(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    Query(query): Query<FileQuery>,
) -> Result<Response, ApiFailure> {
    let path = query
        .path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiFailure::bad_request("path required"))?;
    let content = state.workspaces().read_file(&project, &path)?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], content).into_response())
}

pub async fn write_file(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    Json(body): Json<WriteFileRequest>,
) -> Result<Json<WriteFileResponse>, ApiFailure> {
    let path = body
        .path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiFailure::bad_request("path required"))?;
    let content = body.content.unwrap_or_default();
    state.workspaces().write_file(&project, &path, &content)?;
    info!(
        component = "api",
        event = "api.file.written",
        project = %project,
        path = %path,
        bytes = content.len(),
        "Wrote file"
    );
    Ok(Json(WriteFileResponse { ok: true }))
}
