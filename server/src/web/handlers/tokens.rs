//! API token dashboard endpoints (§6 "API-token list").

use axum::extract::{Path, State};
use chrono::Utc;
use serde::Deserialize;

use crate::database::ApiTokenRecord;
use crate::web::handlers::common::{internal_error, not_found, ApiResponse, ApiResult};
use crate::web::AppState;

pub async fn list_tokens(State(state): State<AppState>) -> ApiResult<Vec<ApiTokenRecord>> {
    let tokens = state
        .database
        .get_all_tokens()
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    Ok(axum::Json(ApiResponse::success(tokens)))
}

#[derive(Deserialize)]
pub struct CreateTokenRequest {
    pub token: String,
    pub name: String,
}

pub async fn create_token(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<CreateTokenRequest>,
) -> ApiResult<ApiTokenRecord> {
    let record = ApiTokenRecord {
        token: body.token,
        name: body.name,
        enabled: true,
        created_at: Utc::now(),
    };
    state
        .database
        .insert_token(&record)
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    Ok(axum::Json(ApiResponse::success(record)))
}

#[derive(Deserialize)]
pub struct SetTokenEnabledRequest {
    pub enabled: bool,
}

pub async fn set_token_enabled(
    State(state): State<AppState>,
    Path(token): Path<String>,
    axum::Json(body): axum::Json<SetTokenEnabledRequest>,
) -> ApiResult<bool> {
    let updated = state
        .database
        .set_token_enabled(&token, body.enabled)
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    if !updated {
        return Err(not_found(format!("token '{token}' not found")));
    }
    Ok(axum::Json(ApiResponse::success(true)))
}

pub async fn delete_token(State(state): State<AppState>, Path(token): Path<String>) -> ApiResult<bool> {
    let deleted = state
        .database
        .delete_token(&token)
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    Ok(axum::Json(ApiResponse::success(deleted)))
}
