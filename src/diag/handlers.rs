//! Diagnostics API handlers

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::diag::server::DiagState;
use crate::engine::stats::{EngineState, StatsSnapshot};

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Renderer status
#[derive(serde::Serialize)]
pub struct SystemStatus {
    pub name: String,
    pub state: EngineState,
    pub ring_capacity: usize,
    pub ring_available: usize,
    pub uptime_seconds: u64,
}

/// Get renderer status
pub async fn get_status(State(state): State<Arc<DiagState>>) -> Json<ApiResponse<SystemStatus>> {
    let status = SystemStatus {
        name: state.name.clone(),
        state: state.stats.state(),
        ring_capacity: state.ring.size(),
        ring_available: state.ring.available(),
        uptime_seconds: state.started.elapsed().as_secs(),
    };

    Json(ApiResponse::ok(status))
}

/// Get engine statistics
pub async fn get_stats(State(state): State<Arc<DiagState>>) -> Json<ApiResponse<StatsSnapshot>> {
    Json(ApiResponse::ok(state.stats.snapshot()))
}
