use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    response::IntoResponse,
    routing::{get, post},
};
use bytes::Bytes;
use http::{HeaderName, HeaderValue, StatusCode, header};

use crate::{
    config::ToolchainConfig,
    error::ApiError,
    models::{ExecutionOutcome, ExecutionRequest},
    sandbox::CodeRunner,
};

#[derive(Clone)]
pub struct AppState {
    runner: Arc<dyn CodeRunner>,
    toolchain: Arc<ToolchainConfig>,
}

impl AppState {
    pub fn new(runner: Arc<dyn CodeRunner>, toolchain: Arc<ToolchainConfig>) -> Self {
        Self { runner, toolchain }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(status_page))
        .route("/execute", post(execute).options(preflight))
        // Snippets of any size are accepted.
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

pub fn cors_headers() -> [(HeaderName, HeaderValue); 3] {
    [
        (
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ),
        (
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS"),
        ),
        (
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ),
    ]
}

async fn preflight() -> impl IntoResponse {
    (StatusCode::OK, cors_headers())
}

async fn execute(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: ExecutionRequest = serde_json::from_slice(&body).map_err(|err| {
        tracing::warn!(error = %err, "invalid execute payload");
        ApiError::InvalidJson(err)
    })?;
    tracing::info!(
        code_len = request.code.len(),
        version = %request.version,
        edition = %request.edition,
        "execute request parsed"
    );
    validate_request(&request)?;

    // Detached so a dropped connection does not cancel an in-flight build.
    let runner = state.runner.clone();
    let handle = tokio::spawn(async move { runner.execute(request).await });
    let outcome = match handle.await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(runner = state.runner.name(), error = %err, "execution task aborted");
            ExecutionOutcome::failure(format!("Execution task failed: {err}"))
        }
    };
    tracing::info!(success = outcome.success, "execute request finished");

    Ok((StatusCode::OK, cors_headers(), Json(outcome)))
}

async fn status_page(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    if !state.toolchain.is_installed() {
        tracing::error!(
            cargo = %state.toolchain.cargo_path.display(),
            "toolchain disappeared after startup"
        );
        return Err(ApiError::ToolchainUnavailable {
            path: state.toolchain.cargo_path.clone(),
        });
    }

    let body = format!(
        "Local Rust Playground Server\nPOST /execute to run Rust code\n\nUsing local Rust toolchain at: {}\n",
        state.toolchain.rustup_home.display()
    );
    Ok((
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))],
        body,
    ))
}

fn validate_request(request: &ExecutionRequest) -> Result<(), ApiError> {
    if request.code.trim().is_empty() {
        return Err(ApiError::EmptyCode);
    }
    Ok(())
}
