//! Diagnostics HTTP server

use std::sync::Arc;
use std::time::Instant;

use axum::{routing::get, Router};

use crate::audio::ring::SharedAudioRing;
use crate::config::DiagConfig;
use crate::diag::handlers;
use crate::engine::stats::EngineStats;

/// Shared state behind the diagnostics handlers
pub struct DiagState {
    pub name: String,
    pub stats: Arc<EngineStats>,
    pub ring: SharedAudioRing,
    pub started: Instant,
}

/// Diagnostics HTTP server
pub struct DiagServer {
    config: DiagConfig,
    state: Arc<DiagState>,
}

impl DiagServer {
    pub fn new(config: DiagConfig, name: String, stats: Arc<EngineStats>, ring: SharedAudioRing) -> Self {
        Self {
            config,
            state: Arc::new(DiagState {
                name,
                stats,
                ring,
                started: Instant::now(),
            }),
        }
    }

    /// Serve in a background task on the current tokio runtime. Bind
    /// failure is logged, not fatal: the audio path does not depend on
    /// diagnostics.
    pub fn start_background(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if !self.config.enabled {
                return;
            }

            let app = Router::new()
                .route("/api/status", get(handlers::get_status))
                .route("/api/stats", get(handlers::get_stats))
                .with_state(self.state);

            let addr = format!("{}:{}", self.config.bind_address, self.config.http_port);
            match tokio::net::TcpListener::bind(&addr).await {
                Ok(listener) => {
                    tracing::info!("diagnostics server listening on http://{addr}");
                    if let Err(e) = axum::serve(listener, app).await {
                        tracing::error!("diagnostics server failed: {e}");
                    }
                }
                Err(e) => {
                    tracing::error!("diagnostics server bind failed on {addr}: {e}");
                }
            }
        })
    }
}
