//! HTTP control surface: `POST /deploy` and `DELETE /destroy`
//!
//! Both routes require an `X-API-Key` header matching the configured
//! secret. Runs are serialized in-process and execute on the blocking pool.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, post},
};
use reconcile::{CancelToken, NoProgress, Reconciler, RunOutcome};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Header carrying the shared secret
pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared application state
pub struct AppState {
    pub reconciler: Arc<Reconciler>,
    /// Desired-state document read on every deploy
    pub desired: PathBuf,
    /// Expected `X-API-Key`; `None` rejects every request
    pub api_key: Option<String>,
    /// Raised on shutdown so in-flight runs stop after the current resource
    pub cancel: CancelToken,
    run_lock: Mutex<()>,
}

impl AppState {
    pub fn new(reconciler: Reconciler, desired: PathBuf, api_key: Option<String>) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            desired,
            api_key,
            cancel: CancelToken::new(),
            run_lock: Mutex::new(()),
        }
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip)]
    pub status: StatusCode,
}

impl ApiError {
    fn internal(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn unauthorized() -> Self {
        Self {
            error: "Unauthorized. Please provide a valid X-API-Key header.".to_string(),
            status: StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self)).into_response()
    }
}

/// Body of `POST /deploy`
#[derive(Debug, Serialize)]
pub struct DeployResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub deployed: Vec<String>,
    pub updated: Vec<String>,
}

/// Body of `DELETE /destroy`
#[derive(Debug, Serialize)]
pub struct DestroyResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub destroyed: Vec<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/deploy", post(deploy))
        .route("/destroy", delete(destroy))
        .with_state(state)
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(secret) = state.api_key.as_deref() else {
        log::error!("Rejecting request: no API key configured");
        return Err(ApiError::internal(
            "Server configuration error: API Key not set.",
        ));
    };

    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    if provided != Some(secret) {
        log::warn!("Rejecting request with missing or invalid API key");
        return Err(ApiError::unauthorized());
    }
    Ok(())
}

/// Split a finished run into status code and save error
fn run_status(outcome: &RunOutcome) -> (StatusCode, Option<String>) {
    for (name, error) in &outcome.report.errors {
        log::error!("{} failed for {name}: {error}", outcome.report.operation);
    }
    match &outcome.save_error {
        Some(err) => {
            log::error!("Failed to save state: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Some("Failed to save remote state".to_string()),
            )
        }
        None => (StatusCode::OK, None),
    }
}

async fn deploy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<DeployResponse>), ApiError> {
    authorize(&state, &headers)?;
    let _guard = state.run_lock.lock().await;

    let reconciler = Arc::clone(&state.reconciler);
    let desired_path = state.desired.clone();
    let cancel = state.cancel.clone();

    let result = tokio::task::spawn_blocking(move || {
        // State is loaded before the desired document is parsed
        let loaded = reconciler.load_state().map_err(|err| {
            log::error!("{err}");
            "Failed to load remote state"
        })?;
        let desired = manifest::load(&desired_path).map_err(|err| {
            log::error!("{}: {err}", desired_path.display());
            "Failed to parse desired-state document"
        })?;
        Ok::<_, &'static str>(reconciler.deploy_loaded(
            loaded,
            &desired,
            &cancel,
            &mut NoProgress,
        ))
    })
    .await
    .map_err(|err| ApiError::internal(format!("Deploy aborted: {err}")))?;

    let outcome = result.map_err(ApiError::internal)?;
    let (status, error) = run_status(&outcome);
    let body = DeployResponse {
        status: error.is_none().then_some("Success"),
        error,
        deployed: outcome.report.deployed,
        updated: outcome.report.updated,
    };
    Ok((status, Json(body)))
}

async fn destroy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<DestroyResponse>), ApiError> {
    authorize(&state, &headers)?;
    let _guard = state.run_lock.lock().await;

    let reconciler = Arc::clone(&state.reconciler);
    let cancel = state.cancel.clone();

    let outcome = tokio::task::spawn_blocking(move || reconciler.destroy(&cancel, &mut NoProgress))
        .await
        .map_err(|err| ApiError::internal(format!("Destroy aborted: {err}")))?
        .map_err(|err| {
            log::error!("{err}");
            ApiError::internal("Failed to load remote state")
        })?;

    let (status, error) = run_status(&outcome);
    let body = DestroyResponse {
        status: error.is_none().then_some("Success"),
        error,
        destroyed: outcome.report.destroyed,
    };
    Ok((status, Json(body)))
}

/// Serve until Ctrl-C
pub async fn serve(state: Arc<AppState>, bind: &str) -> anyhow::Result<()> {
    use anyhow::Context;

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    log::info!("Listening on http://{bind}");

    let cancel = state.cancel.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Shutting down");
            cancel.cancel();
        })
        .await
        .context("Server error")
}
