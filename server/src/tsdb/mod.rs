//! PromQL-compatible time-series adapter.
//!
//! The core never talks to a concrete TSDB type directly — everything goes
//! through the `TsdbClient` trait so the HTTP implementation can be swapped
//! for a test double (`wiremock`, see `tests/common/fixtures`).

mod http;

pub use http::HttpTsdbClient;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

/// One labelled time series as the core expects it: the TSDB's
/// `{ metric: {...}, values: [[ts_secs, value_str], ...] }` shape flattened
/// into millisecond timestamps and parsed floats.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub labels: HashMap<String, String>,
    pub points: Vec<(i64, f64)>,
}

#[derive(Debug, Clone)]
pub struct Sample {
    pub labels: HashMap<String, String>,
    pub value: f64,
    pub ts_ms: i64,
}

#[async_trait]
pub trait TsdbClient: Send + Sync {
    async fn write(&self, samples: &[Sample]) -> Result<()>;
    async fn query_instant(&self, promql: &str) -> Result<Vec<Series>>;
    async fn query_range(&self, promql: &str, start_ms: i64, end_ms: i64, step_secs: u64) -> Result<Vec<Series>>;
    async fn get_label_values(&self, label: &str, matches: &[&str]) -> Result<Vec<String>>;
    async fn delete_series(&self, matches: &[&str]) -> Result<()>;
}
