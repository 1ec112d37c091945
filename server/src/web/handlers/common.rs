//! Common types shared by every dashboard handler: the response envelope,
//! pagination, and the `{15m,30m,...}` time-range shorthand from §6.

use axum::http::StatusCode;
use axum::response::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

pub fn not_found(message: impl Into<String>) -> (StatusCode, Json<ApiResponse<()>>) {
    (StatusCode::NOT_FOUND, Json(ApiResponse::error(message.into())))
}

pub fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ApiResponse<()>>) {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::error(message.into())))
}

pub fn internal_error(message: impl Into<String>) -> (StatusCode, Json<ApiResponse<()>>) {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ApiResponse::error(message.into())))
}

#[derive(Deserialize)]
pub struct PaginationQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

impl PaginationQuery {
    pub fn limit_or(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, 1000)
    }

    pub fn offset_or_zero(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[derive(Deserialize)]
pub struct MetricsQuery {
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default)]
    pub iface: Option<String>,
}

/// Parses the dashboard's `{15m,30m,1h,3h,6h,12h,1d,3d,7d}` shorthand into a
/// `(start_ms, end_ms)` window ending now. Unknown or missing values fall
/// back to `1h`, the way a chart that hasn't loaded its range picker yet
/// still needs something to query.
pub fn parse_time_range(range: Option<&str>) -> (i64, i64) {
    let now_ms = Utc::now().timestamp_millis();
    let seconds = match range.unwrap_or("1h") {
        "15m" => 15 * 60,
        "30m" => 30 * 60,
        "1h" => 60 * 60,
        "3h" => 3 * 60 * 60,
        "6h" => 6 * 60 * 60,
        "12h" => 12 * 60 * 60,
        "1d" => 24 * 60 * 60,
        "3d" => 3 * 24 * 60 * 60,
        "7d" => 7 * 24 * 60 * 60,
        _ => 60 * 60,
    };
    (now_ms - seconds * 1000, now_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_range_falls_back_to_one_hour() {
        let (start, end) = parse_time_range(Some("nonsense"));
        assert_eq!(end - start, 60 * 60 * 1000);
    }

    #[test]
    fn seven_day_range_spans_a_week() {
        let (start, end) = parse_time_range(Some("7d"));
        assert_eq!(end - start, 7 * 24 * 60 * 60 * 1000);
    }

    #[test]
    fn pagination_clamps_limit() {
        let q = PaginationQuery {
            limit: Some(5000),
            offset: Some(-10),
        };
        assert_eq!(q.limit_or(50), 1000);
        assert_eq!(q.offset_or_zero(), 0);
    }
}
