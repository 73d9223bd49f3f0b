use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::{
    error::ScanError,
    profiles::ScanProfile,
    scanner::Scanner,
    types::{OpenPort, ScanRequest, TargetInfo},
};

#[derive(Clone)]
pub struct AppState {
    scanner: Arc<Scanner>,
}

impl AppState {
    pub fn new(scanner: Scanner) -> Self {
        Self {
            scanner: Arc::new(scanner),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => {
                error!(details = %msg, "scan request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

impl From<ScanError> for ApiError {
    fn from(e: ScanError) -> Self {
        if e.is_client_error() {
            ApiError::BadRequest(e.to_string())
        } else {
            ApiError::Internal(e.to_string())
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(%rejection, "unreadable scan request body");
        ApiError::BadRequest("No JSON data provided".into())
    }
}

/// `null`, `false`, `0`, `""`, `[]` and `{}` carry no request at all.
fn is_blank(body: &Value) -> bool {
    match body {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Decode a scan request, telling an empty body apart from an incomplete one.
pub fn parse_scan_request(body: Value) -> Result<(TargetInfo, String), ApiError> {
    if is_blank(&body) {
        return Err(ApiError::BadRequest("No JSON data provided".into()));
    }
    let missing = || ApiError::BadRequest("Missing required parameters".into());
    let req: ScanRequest = serde_json::from_value(body).map_err(|_| missing())?;
    match (req.info_dict, req.scan_type) {
        (Some(target), Some(scan_type)) if !scan_type.is_empty() => Ok((target, scan_type)),
        _ => Err(missing()),
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/scan_types", get(scan_types))
        .route("/perform_nmap_scan", post(perform_nmap_scan))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `bind` until `shutdown` is cancelled.
pub async fn spawn_server(bind: &str, scanner: Scanner, shutdown: CancellationToken) -> Result<()> {
    info!(program = scanner.program(), "using scanner");
    let app = build_router(AppState::new(scanner));
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("server shut down");
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn scan_types(State(app): State<AppState>) -> Json<Vec<ScanProfile>> {
    Json(app.scanner.profiles().iter().cloned().collect())
}

async fn perform_nmap_scan(
    State(app): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Vec<OpenPort>>, ApiError> {
    let Json(body) = body?;
    let (target, scan_type) = parse_scan_request(body)?;

    info!(hostname = %target.hostname, ip = %target.ip, scan_type = %scan_type, force = target.force, "scan requested");
    let ports = app.scanner.run_scan(&target, &scan_type).await?;
    info!(hostname = %target.hostname, open = ports.len(), "scan finished");
    Ok(Json(ports))
}
