use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::{
        Router,
        extract::{Path, State, WebSocketUpgrade},
        response::{IntoResponse, Json},
        routing::get,
    },
    tokio::net::TcpListener,
    tower_http::cors::{Any, CorsLayer},
    tracing::info,
};

use {
    vstatus_config::StatusConfig,
    vstatus_protocol::{PROTOCOL_VERSION, STATUS_ROUTE},
    vstatus_sessions::{SessionRegistry, SessionToken},
};

use crate::{state::GatewayState, ws::handle_status_socket};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
struct AppState {
    gateway: Arc<GatewayState>,
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route(STATUS_ROUTE, get(status_socket_handler))
        .layer(cors)
        .with_state(AppState { gateway: state })
}

/// Start the gateway HTTP + WebSocket server on the configured address.
///
/// `registry` is the same instance the verification flow registers sessions in.
pub async fn start_gateway(
    config: &StatusConfig,
    registry: Arc<SessionRegistry>,
) -> anyhow::Result<()> {
    let state = GatewayState::new(registry, config.channels.clone());
    let app = build_gateway_app(Arc::clone(&state));

    let addr: SocketAddr = config.server.addr().parse()?;
    let listener = TcpListener::bind(addr).await?;

    let lines = [
        format!("vstatus gateway v{}", state.version),
        format!("protocol v{PROTOCOL_VERSION}, listening on {addr}"),
        format!("status route {STATUS_ROUTE}"),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    if config.server.report_interval_secs > 0 {
        let report_state = Arc::clone(&state);
        let period = Duration::from_secs(config.server.report_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                report_state.registry.log_active();
            }
        });
    }

    axum::serve(listener, app).await?;
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.gateway.version,
        "protocol": PROTOCOL_VERSION,
        "sessions": state.gateway.registry.len(),
        "channels": state.gateway.open_channel_count(),
    }))
}

async fn status_socket_handler(
    ws: WebSocketUpgrade,
    Path(token): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let token = SessionToken::from(token);
    ws.on_upgrade(move |socket| handle_status_socket(socket, token, state.gateway))
}
