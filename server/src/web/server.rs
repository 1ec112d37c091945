//! Dashboard HTTP router + probe WebSocket endpoint. Routes are grouped by
//! domain: probes, monitors, alerts, tokens.

use std::net::SocketAddr;

use anyhow::Result;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::web::{handlers, ws, AppState};

pub async fn start_web_server(state: AppState) -> Result<()> {
    let app = create_router(state.clone());
    let addr: SocketAddr = format!("{}:{}", state.config.host, state.config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Dashboard + probe endpoint listening on http://{}", addr);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

/// Builds the router without binding a socket, so integration tests can
/// drive it directly with `tower::ServiceExt::oneshot` instead of going
/// over a real TCP connection.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // === PROBE WEBSOCKET ===
        .route("/ws", get(ws::ws_handler))
        // === PROBE (AGENT) ROUTES ===
        .route("/api/probes", get(handlers::list_probes))
        .route("/api/probes/{agent_id}", get(handlers::get_probe).delete(handlers::delete_probe))
        .route("/api/probes/{agent_id}/metrics/{metric_type}", get(handlers::get_probe_metrics))
        .route("/api/probes/{agent_id}/network-interfaces", get(handlers::get_network_interfaces))
        .route("/api/probes/{agent_id}/ssh-login-config", put(handlers::update_ssh_login_config))
        .route("/api/probes/{agent_id}/tamper-protect", put(handlers::update_tamper_protect))
        .route(
            "/api/probes/{agent_id}/ssh-login-events",
            get(handlers::get_ssh_login_events).delete(handlers::delete_ssh_login_events),
        )
        .route("/api/probes/{agent_id}/tamper-events", get(handlers::get_tamper_events))
        .route("/api/probes/{agent_id}/tamper-alerts", get(handlers::get_tamper_alerts))
        .route("/api/probes/{agent_id}/traffic-config", put(handlers::update_traffic_config))
        // === MONITOR ROUTES ===
        .route("/api/monitors", get(handlers::list_monitors_overview).post(handlers::create_monitor))
        .route(
            "/api/monitors/{monitor_id}",
            get(handlers::get_monitor).put(handlers::update_monitor).delete(handlers::delete_monitor),
        )
        .route("/api/monitors/{monitor_id}/history", get(handlers::get_monitor_history))
        // === ALERT ROUTES ===
        .route("/api/alerts", get(handlers::list_alert_records))
        .route("/api/alerts/clear-all", post(handlers::clear_all_alerts))
        .route("/api/alerts/probes/{agent_id}", get(handlers::list_alert_records_for_agent))
        .route("/api/alert-config", get(handlers::get_alert_config).put(handlers::set_alert_config))
        // === API TOKEN ROUTES ===
        .route("/api/tokens", get(handlers::list_tokens).post(handlers::create_token))
        .route(
            "/api/tokens/{token}",
            put(handlers::set_token_enabled).delete(handlers::delete_token),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
