use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{ConnectInfo, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use presenter_core::Presenter;
use serde::Deserialize;
use shared::{
    domain::DisplayMode,
    error::{ApiError, ErrorCode},
    protocol::ServerInfo,
};
use storage::ScriptureDb;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod sockets;

use app_state::{detect_lan_ip, AppState};
use config::{load_settings, prepare_database_url};

#[derive(Debug, Deserialize)]
struct DisplayQuery {
    mode: DisplayMode,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let database_url = prepare_database_url(&settings.scripture_db);
    let scripture = ScriptureDb::open(&database_url).await.map_err(|error| {
        error!(
            database_url = %database_url,
            %error,
            "failed to open scripture database; verify the path and permissions"
        );
        error
    })?;
    let scripture = Arc::new(scripture);
    let presenter = Presenter::spawn(scripture.clone(), settings.presenter_config());

    let addr: SocketAddr = settings.bind_addr.parse()?;
    let host = match settings.public_host.clone() {
        Some(host) => host,
        None => detect_lan_ip()
            .await
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| addr.ip().to_string()),
    };
    let state = AppState::new(presenter, scripture, host, addr.port());
    let app = build_router(Arc::new(state));

    info!(%addr, "presenter server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/server-info", get(server_info))
        .route("/display", get(display_handler))
        .route("/mobile", get(mobile_handler))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    match state.scripture.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(error) => {
            warn!(error = %format!("{error:#}"), "scripture database health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "scripture database unavailable")
        }
    }
}

async fn server_info(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ServerInfo>, (StatusCode, Json<ApiError>)> {
    let devices = state.presenter.server_devices().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Internal, e.to_string())),
        )
    })?;
    Ok(Json(ServerInfo {
        ip: state.host.clone(),
        port: state.port,
        devices,
    }))
}

async fn display_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<DisplayQuery>,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> impl IntoResponse {
    let peer = peer.map(|ConnectInfo(addr)| addr);
    ws.on_upgrade(move |socket| sockets::display_connection(state, socket, q.mode, peer))
}

async fn mobile_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> impl IntoResponse {
    let address = peer
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    ws.on_upgrade(move |socket| sockets::mobile_connection(state, socket, address))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
