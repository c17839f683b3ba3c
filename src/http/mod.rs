//! HTTP transport: JSON API under `/api`, room pages under `/salles`.

pub mod api;
mod pages;
pub mod views;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{any, get},
    Router,
};
use tokio::{net::TcpListener, signal, sync::Mutex};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::Config;
use crate::db;
use crate::ipc::AppState;

pub type SharedState = Arc<Mutex<AppState>>;

fn cors(origin: Option<&str>) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
    ];
    match origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(methods)
            .allow_headers([AUTHORIZATION, CONTENT_TYPE]),
        Some(Err(e)) => {
            warn!(error = %e, "ignoring unparsable CORS origin, allowing any");
            CorsLayer::new().allow_origin(Any).allow_methods(methods).allow_headers(Any)
        }
        None => CorsLayer::new().allow_origin(Any).allow_methods(methods).allow_headers(Any),
    }
}

pub fn app(state: SharedState, config: &Config) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/api/*rest", any(api::entry))
        .merge(views::routes())
        .layer(cors(config.cors_origin.as_deref()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Opens the configured workspace and wraps it for the router.
pub fn open_state(config: Config) -> anyhow::Result<SharedState> {
    let conn = db::open_db(&config.workspace)
        .with_context(|| format!("failed to open workspace {}", config.workspace.display()))?;
    let mut state = AppState::new(config.clone());
    state.workspace = Some(config.workspace);
    state.db = Some(conn);
    Ok(Arc::new(Mutex::new(state)))
}

pub async fn serve(config: Config) -> anyhow::Result<()> {
    let bind = config.bind.clone();
    let state = open_state(config.clone())?;
    let router = app(state, &config);

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
