//! Synthetic-monitor dashboard endpoints: CRUD, overview, and history
//! (§4.3, §6 "Dashboard-facing contracts").

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use serde::Deserialize;

use crate::database::{MonitorTaskRecord, MonitorType, Visibility};
use crate::scheduler::MonitorOverviewItem;
use crate::services::NewMonitor;
use crate::web::auth::is_authenticated;
use crate::web::handlers::common::{bad_request, internal_error, not_found, parse_time_range, ApiResponse, ApiResult, MetricsQuery};
use crate::web::AppState;

pub async fn list_monitors_overview(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Vec<MonitorOverviewItem>> {
    let authenticated = is_authenticated(&state.database, &headers).await;
    let items = state
        .monitor_service
        .overview(authenticated)
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    Ok(axum::Json(ApiResponse::success(items)))
}

pub async fn get_monitor(State(state): State<AppState>, Path(monitor_id): Path<String>) -> ApiResult<MonitorTaskRecord> {
    let monitor = state
        .monitor_service
        .get(&monitor_id)
        .await
        .map_err(|e| internal_error(e.to_string()))?
        .ok_or_else(|| not_found(format!("monitor '{monitor_id}' not found")))?;
    Ok(axum::Json(ApiResponse::success(monitor)))
}

#[derive(Deserialize)]
pub struct CreateMonitorRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub monitor_type: String,
    pub target: String,
    #[serde(default = "default_config")]
    pub config: serde_json::Value,
    #[serde(default)]
    pub visibility: String,
    pub interval_seconds: i64,
    #[serde(default)]
    pub agent_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub show_target_public: bool,
}

fn default_config() -> serde_json::Value {
    serde_json::json!({})
}

pub async fn create_monitor(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<CreateMonitorRequest>,
) -> ApiResult<MonitorTaskRecord> {
    let monitor_type = MonitorType::parse(&body.monitor_type)
        .ok_or_else(|| bad_request(format!("unsupported monitor type '{}'", body.monitor_type)))?;

    let monitor = state
        .monitor_service
        .create(NewMonitor {
            name: body.name,
            monitor_type,
            target: body.target,
            config: body.config,
            visibility: Visibility::parse(&body.visibility),
            interval_seconds: body.interval_seconds,
            agent_ids: body.agent_ids,
            tags: body.tags,
            show_target_public: body.show_target_public,
        })
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    Ok(axum::Json(ApiResponse::success(monitor)))
}

pub async fn update_monitor(
    State(state): State<AppState>,
    Path(monitor_id): Path<String>,
    axum::Json(mut monitor): axum::Json<MonitorTaskRecord>,
) -> ApiResult<MonitorTaskRecord> {
    monitor.id = monitor_id;
    state
        .monitor_service
        .update(monitor.clone())
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    Ok(axum::Json(ApiResponse::success(monitor)))
}

pub async fn delete_monitor(State(state): State<AppState>, Path(monitor_id): Path<String>) -> ApiResult<bool> {
    let deleted = state
        .monitor_service
        .delete(&monitor_id)
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    Ok(axum::Json(ApiResponse::success(deleted)))
}

pub async fn get_monitor_history(
    State(state): State<AppState>,
    Path(monitor_id): Path<String>,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<Vec<crate::tsdb::Series>> {
    let (start_ms, end_ms) = parse_time_range(query.range.as_deref());
    let series = state
        .query
        .get_monitor_history(&monitor_id, start_ms, end_ms)
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    Ok(axum::Json(ApiResponse::success(series)))
}
