//! HTTPサーバー
//!
//! - `POST /api/detect`  画像から栄養成分を返す
//! - `GET  /api/history` 保存済みの履歴
//! - `GET  /health`

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use state::{build_pipeline, AppState};

use crate::config::Config;
use crate::error::Result;
use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    routing::{get, post},
    Router,
};
use routes::{detect_handler, health_handler, history_handler};
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

pub fn router(state: Arc<AppState>) -> Router {
    // どのオリジンからも許可
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/detect", post(detect_handler))
        .route("/api/history", get(history_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(config: &Config) -> Result<()> {
    info!("Initializing state...");
    let state = AppState::from_config(config)?;
    state.workspace.ensure_root()?;

    let app = router(Arc::new(state));

    let address = config.bind_address();
    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
