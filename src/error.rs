use std::{io, path::PathBuf, process::ExitStatus};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::api::cors_headers;

/// Startup failures. Any of these keeps the service from serving.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("failed to download installer from {url}: {source}")]
    Download { url: String, source: reqwest::Error },
    #[error("failed to download installer from {url}: HTTP {status}")]
    DownloadStatus { url: String, status: u16 },
    #[error("failed to save installer to {}: {source}", path.display())]
    WriteInstaller { path: PathBuf, source: io::Error },
    #[error("failed to set executable permission on {}: {source}", path.display())]
    Permissions { path: PathBuf, source: io::Error },
    #[error("downloaded installer verification failed: {source}")]
    Verify { source: io::Error },
    #[error("failed to launch installer {}: {source}", path.display())]
    InstallerSpawn { path: PathBuf, source: io::Error },
    #[error("toolchain installer exited with {status}\nOutput: {output}")]
    InstallerFailed { status: ExitStatus, output: String },
    #[error("build tool missing after install: {}", path.display())]
    BuildToolMissing { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Failed to create temp projects directory: {0}")]
    CreateRoot(#[source] io::Error),
    #[error("Failed to create temp directory: {0}")]
    CreateDir(#[source] io::Error),
    #[error("Failed to initialize Cargo project: {0}")]
    InitSpawn(#[source] io::Error),
    #[error("Failed to initialize Cargo project: {status}: {stderr}")]
    InitFailed { status: ExitStatus, stderr: String },
    #[error("Failed to write code file: {0}")]
    WriteSource(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to start program: {0}")]
    Spawn(#[source] io::Error),
    #[error("Failed to start program: missing {0} pipe")]
    MissingPipe(&'static str),
    #[error("Failed to wait for program: {0}")]
    Wait(#[source] io::Error),
}

/// Any stage of one execution; always mapped onto a failed outcome.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Process(#[from] SupervisorError),
}

/// Rejections raised before the pipeline runs.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid JSON")]
    InvalidJson(#[source] serde_json::Error),
    #[error("Code cannot be empty")]
    EmptyCode,
    #[error("toolchain unavailable at {}", path.display())]
    ToolchainUnavailable { path: PathBuf },
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidJson(_) | ApiError::EmptyCode => StatusCode::BAD_REQUEST,
            ApiError::ToolchainUnavailable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (self.status(), cors_headers(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::{ApiError, ExecutionError, SupervisorError, WorkspaceError};
    use axum::http::StatusCode;

    #[test]
    fn stage_errors_render_user_facing_messages() {
        let err: ExecutionError = WorkspaceError::WriteSource(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "permission denied",
        ))
        .into();
        assert_eq!(err.to_string(), "Failed to write code file: permission denied");

        let err: ExecutionError =
            SupervisorError::Spawn(io::Error::new(io::ErrorKind::NotFound, "no such file"))
                .into();
        assert_eq!(err.to_string(), "Failed to start program: no such file");
    }

    #[test]
    fn transport_rejections_are_bad_requests() {
        assert_eq!(ApiError::EmptyCode.status(), StatusCode::BAD_REQUEST);
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(ApiError::InvalidJson(parse).status(), StatusCode::BAD_REQUEST);
    }
}
