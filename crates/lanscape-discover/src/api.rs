//! HTTP interface: trigger a scan, read the stored topology.
//!
//! ```text
//! POST /scan      {"ip_range": "192.168.1.0/24"}
//! GET  /topology
//! ```
//!
//! Each request opens its own store connections and drops them when done.

use std::net::Ipv4Addr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use lanscape_core::{ScanReport, TopologyView};
use lanscape_graph::GraphConfig;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::DiscoverConfig;
use crate::error::DiscoverError;
use crate::persist::{PersistError, StoreSink};
use crate::range;

pub struct AppState {
    pub discover: DiscoverConfig,
    pub graph: GraphConfig,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub ip_range: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub message: String,
    pub scan_id: Uuid,
    pub subnet: String,
    pub total_ips: u64,
    pub used_ips: u64,
    pub available_ips: u64,
    pub available_percentage: f64,
    pub open_ports: usize,
    /// The scanned subnet as it now appears in `GET /topology`.
    pub topology: TopologyView,
}

impl ScanResponse {
    pub fn from_report(report: &ScanReport) -> Self {
        Self {
            message: "Scan completed successfully".to_string(),
            scan_id: report.scan_id,
            subnet: report.subnet.cidr.clone(),
            total_ips: report.subnet.total_usable_hosts,
            used_ips: report.used_count(),
            available_ips: report.available_count(),
            available_percentage: report.available_percentage(),
            open_ports: report.open_port_count(),
            topology: TopologyView::from_report(report),
        }
    }
}

/// Error body: `{"error": ..., "details": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    details: Option<String>,
}

impl ApiError {
    fn bad_request(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
            details: None,
        }
    }

    fn internal(error: impl Into<String>, details: impl ToString) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: error.into(),
            details: Some(details.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<DiscoverError> for ApiError {
    fn from(e: DiscoverError) -> Self {
        if e.is_client_error() {
            Self::bad_request(e.to_string())
        } else {
            Self::internal("Scan failed", e)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({ "error": self.error });
        if let Some(details) = self.details {
            body["details"] = serde_json::Value::String(details);
        }
        (self.status, Json(body)).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/scan", post(scan))
        .route("/topology", get(topology))
        .layer(cors)
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(state: Arc<AppState>, listen: &str) -> Result<(), DiscoverError> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!(listen = %listen, "HTTP API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;
    Ok(())
}

async fn open_stores(
    state: &AppState,
    local_address: Option<Ipv4Addr>,
) -> Result<StoreSink, ApiError> {
    StoreSink::connect(&state.graph, &state.discover.document_dir, local_address)
        .await
        .map_err(|e: PersistError| {
            tracing::error!(error = %e, "Store connection failed");
            ApiError::internal("Failed to connect to stores", e)
        })
}

pub async fn scan(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ScanRequest>, JsonRejection>,
) -> Result<Json<ScanResponse>, ApiError> {
    let Json(request) =
        payload.map_err(|e| ApiError::bad_request(format!("Invalid request body: {e}")))?;
    let ip_range = match request.ip_range.as_deref().map(str::trim) {
        Some(r) if !r.is_empty() => r.to_string(),
        _ => return Err(ApiError::bad_request("ip_range is a required field.")),
    };

    // Reject malformed or oversized input before touching the stores.
    range::parse_bounded(&ip_range, state.discover.max_hosts)?;

    let sink = open_stores(&state, state.discover.effective_local_address()).await?;
    let scanner = state.discover.build_scanner()?;
    let report = scanner
        .scan_and_persist(&ip_range, &sink)
        .await
        .map_err(|e| {
            tracing::error!(ip_range = %ip_range, error = %e, "Scan request failed");
            ApiError::from(e)
        })?;

    Ok(Json(ScanResponse::from_report(&report)))
}

pub async fn topology(State(state): State<Arc<AppState>>) -> Result<Json<TopologyView>, ApiError> {
    let sink = open_stores(&state, state.discover.local_address).await?;
    let view = sink.load_topology().await.map_err(|e| {
        tracing::error!(error = %e, "Topology read failed");
        ApiError::internal("Failed to read topology", e)
    })?;
    Ok(Json(view))
}
