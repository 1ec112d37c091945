//! Alert record / alert-config dashboard endpoints (§4.4, §6).

use axum::extract::{Path, Query, State};

use crate::alert::AlertConfig;
use crate::database::AlertRecordRow;
use crate::web::handlers::common::{internal_error, ApiResponse, ApiResult, PaginationQuery};
use crate::web::AppState;

pub async fn list_alert_records(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationQuery>,
) -> ApiResult<Vec<AlertRecordRow>> {
    let records = state
        .database
        .get_all_alert_records(pagination.limit_or(50), pagination.offset_or_zero())
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    Ok(axum::Json(ApiResponse::success(records)))
}

pub async fn list_alert_records_for_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Query(pagination): Query<PaginationQuery>,
) -> ApiResult<Vec<AlertRecordRow>> {
    let records = state
        .database
        .get_alert_records_for_agent(&agent_id, pagination.limit_or(50), pagination.offset_or_zero())
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    Ok(axum::Json(ApiResponse::success(records)))
}

pub async fn clear_all_alerts(State(state): State<AppState>) -> ApiResult<()> {
    state.alert.clear_all().await.map_err(|e| internal_error(e.to_string()))?;
    Ok(axum::Json(ApiResponse::success(())))
}

pub async fn get_alert_config(State(state): State<AppState>) -> ApiResult<AlertConfig> {
    Ok(axum::Json(ApiResponse::success(state.alert.get_config().await)))
}

pub async fn set_alert_config(
    State(state): State<AppState>,
    axum::Json(config): axum::Json<AlertConfig>,
) -> ApiResult<()> {
    state
        .alert
        .set_config(config)
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    Ok(axum::Json(ApiResponse::success(())))
}
