//! Probe (agent) dashboard endpoints: list/detail/delete, per-probe metric
//! history, SSH-login and tamper-protect config + event/alert logs, and
//! traffic policy (§6 "Dashboard-facing contracts").

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::database::{AgentRecord, Visibility};
use crate::web::auth::is_authenticated;
use crate::web::handlers::common::{
    bad_request, internal_error, not_found, parse_time_range, ApiResponse, ApiResult, MetricsQuery, PaginationQuery,
};
use crate::web::AppState;

#[derive(Deserialize)]
pub struct ProbeFilter {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

fn redact_for_view(mut agent: AgentRecord, authenticated: bool) -> Option<AgentRecord> {
    if !authenticated && matches!(agent.visibility, Visibility::Private) {
        return None;
    }
    if !authenticated {
        agent.ssh_login_allowlist = vec![];
        agent.tamper_paths = vec![];
    }
    Some(agent)
}

#[derive(Serialize)]
pub struct ProbeListResponse {
    pub items: Vec<AgentRecord>,
    pub total: usize,
}

pub async fn list_probes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<ProbeFilter>,
    Query(pagination): Query<PaginationQuery>,
) -> ApiResult<ProbeListResponse> {
    let authenticated = is_authenticated(&state.database, &headers).await;
    let agents = state
        .database
        .get_all_agents()
        .await
        .map_err(|e| internal_error(e.to_string()))?;

    let filtered: Vec<AgentRecord> = agents
        .into_iter()
        .filter_map(|a| redact_for_view(a, authenticated))
        .filter(|a| filter.name.as_deref().map(|n| a.name.contains(n)).unwrap_or(true))
        .filter(|a| filter.hostname.as_deref().map(|h| a.hostname.contains(h)).unwrap_or(true))
        .filter(|a| filter.ip.as_deref().map(|ip| a.last_ip.as_deref() == Some(ip)).unwrap_or(true))
        .filter(|a| match filter.status.as_deref() {
            Some("online") => a.online,
            Some("offline") => !a.online,
            _ => true,
        })
        .collect();

    let total = filtered.len();
    let offset = pagination.offset_or_zero() as usize;
    let limit = pagination.limit_or(50) as usize;
    let page: Vec<AgentRecord> = filtered.into_iter().skip(offset).take(limit).collect();

    Ok(axum::Json(ApiResponse::success(ProbeListResponse { items: page, total })))
}

pub async fn get_probe(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(agent_id): Path<String>,
) -> ApiResult<AgentRecord> {
    let authenticated = is_authenticated(&state.database, &headers).await;
    let agent = state
        .database
        .get_agent_by_id(&agent_id)
        .await
        .map_err(|e| internal_error(e.to_string()))?
        .ok_or_else(|| not_found(format!("probe '{agent_id}' not found")))?;

    match redact_for_view(agent, authenticated) {
        Some(agent) => Ok(axum::Json(ApiResponse::success(agent))),
        None => Err(not_found(format!("probe '{agent_id}' not found"))),
    }
}

pub async fn delete_probe(State(state): State<AppState>, Path(agent_id): Path<String>) -> ApiResult<bool> {
    let deleted = state
        .agent_service
        .delete(&agent_id)
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    Ok(axum::Json(ApiResponse::success(deleted)))
}

#[derive(Serialize)]
pub struct MetricHistoryResponse {
    pub series: Vec<crate::tsdb::Series>,
}

pub async fn get_probe_metrics(
    State(state): State<AppState>,
    Path((agent_id, metric_type)): Path<(String, String)>,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<MetricHistoryResponse> {
    let (start_ms, end_ms) = parse_time_range(query.range.as_deref());
    let series = state
        .query
        .get_metrics(&agent_id, &metric_type, start_ms, end_ms, query.iface.as_deref())
        .await
        .map_err(|e| bad_request(e.to_string()))?;
    Ok(axum::Json(ApiResponse::success(MetricHistoryResponse { series })))
}

pub async fn get_network_interfaces(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> ApiResult<Vec<String>> {
    let ifaces = state
        .query
        .get_network_interfaces(&agent_id)
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    Ok(axum::Json(ApiResponse::success(ifaces)))
}

#[derive(Deserialize)]
pub struct SshLoginConfigUpdate {
    pub enabled: bool,
    #[serde(default)]
    pub allowlist: Vec<String>,
}

pub async fn update_ssh_login_config(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    axum::Json(body): axum::Json<SshLoginConfigUpdate>,
) -> ApiResult<AgentRecord> {
    let agent = state
        .agent_service
        .update_ssh_login_config(&agent_id, body.enabled, body.allowlist)
        .await
        .map_err(|e| internal_error(e.to_string()))?
        .ok_or_else(|| not_found(format!("probe '{agent_id}' not found")))?;
    Ok(axum::Json(ApiResponse::success(agent)))
}

#[derive(Deserialize)]
pub struct TamperProtectUpdate {
    pub enabled: bool,
    #[serde(default)]
    pub paths: Vec<String>,
}

pub async fn update_tamper_protect(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    axum::Json(body): axum::Json<TamperProtectUpdate>,
) -> ApiResult<AgentRecord> {
    let agent = state
        .agent_service
        .update_tamper_paths(&agent_id, body.enabled, body.paths)
        .await
        .map_err(|e| internal_error(e.to_string()))?
        .ok_or_else(|| not_found(format!("probe '{agent_id}' not found")))?;
    Ok(axum::Json(ApiResponse::success(agent)))
}

pub async fn get_ssh_login_events(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Query(pagination): Query<PaginationQuery>,
) -> ApiResult<Vec<crate::database::SshLoginEventRecord>> {
    let events = state
        .database
        .get_ssh_login_events_for_agent(&agent_id, pagination.limit_or(50), pagination.offset_or_zero())
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    Ok(axum::Json(ApiResponse::success(events)))
}

pub async fn delete_ssh_login_events(State(state): State<AppState>, Path(agent_id): Path<String>) -> ApiResult<u64> {
    let deleted = state
        .database
        .delete_ssh_login_events_for_agent(&agent_id)
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    Ok(axum::Json(ApiResponse::success(deleted)))
}

pub async fn get_tamper_events(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Query(pagination): Query<PaginationQuery>,
) -> ApiResult<Vec<crate::database::TamperEventRecord>> {
    let events = state
        .database
        .get_tamper_events_for_agent(&agent_id, pagination.limit_or(50), pagination.offset_or_zero())
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    Ok(axum::Json(ApiResponse::success(events)))
}

pub async fn get_tamper_alerts(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Query(pagination): Query<PaginationQuery>,
) -> ApiResult<Vec<crate::database::TamperAlertRecord>> {
    let alerts = state
        .database
        .get_tamper_alerts_for_agent(&agent_id, pagination.limit_or(50), pagination.offset_or_zero())
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    Ok(axum::Json(ApiResponse::success(alerts)))
}

#[derive(Deserialize)]
pub struct TrafficConfigUpdate {
    #[serde(default)]
    pub limit_bytes: Option<i64>,
    #[serde(default)]
    pub reset_day: i32,
}

pub async fn update_traffic_config(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    axum::Json(body): axum::Json<TrafficConfigUpdate>,
) -> ApiResult<()> {
    state
        .traffic
        .update_traffic_config(&agent_id, body.limit_bytes, body.reset_day)
        .await
        .map_err(|e| bad_request(e.to_string()))?;
    Ok(axum::Json(ApiResponse::success(())))
}
