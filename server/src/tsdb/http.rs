//! PromQL-over-HTTP implementation of `TsdbClient`.
//!
//! Speaks the query surface common to Prometheus-compatible stores
//! (`/api/v1/query`, `/api/v1/query_range`, `/api/v1/label/{name}/values`)
//! plus a remote-write-style `write` and a delete-by-match endpoint. Talks
//! the wire shape described in the design notes: instant/range results are
//! `{ metric: {...}, values: [[ts_secs, value_str], ...] }` or, for instant
//! vectors, a single `value` pair per series.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, warn};

use super::{Sample, Series, TsdbClient};
use crate::constants::http::{CONNECT_TIMEOUT, TSDB_REQUEST_TIMEOUT};

pub struct HttpTsdbClient {
    client: Client,
    base_url: String,
}

impl HttpTsdbClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(TSDB_REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| anyhow!("failed to build TSDB HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn parse_result_vector(value: &Value, auto_step_hint: bool) -> Vec<Series> {
        let result = match value.get("data").and_then(|d| d.get("result")).and_then(|r| r.as_array()) {
            Some(arr) => arr,
            None => return Vec::new(),
        };

        let mut series = Vec::with_capacity(result.len());
        for entry in result {
            let labels: HashMap<String, String> = entry
                .get("metric")
                .and_then(|m| m.as_object())
                .map(|m| {
                    m.iter()
                        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                        .collect()
                })
                .unwrap_or_default();

            let name = labels.get("__name__").cloned().unwrap_or_default();

            let mut points = Vec::new();
            if let Some(values) = entry.get("values").and_then(|v| v.as_array()) {
                for pair in values {
                    if let Some(point) = Self::parse_point(pair) {
                        points.push(point);
                    }
                }
            } else if let Some(pair) = entry.get("value") {
                if let Some(point) = Self::parse_point(pair) {
                    points.push(point);
                }
            }

            let _ = auto_step_hint;
            series.push(Series { name, labels, points });
        }
        series
    }

    fn parse_point(pair: &Value) -> Option<(i64, f64)> {
        let arr = pair.as_array()?;
        let ts_secs = arr.first()?.as_f64()?;
        let value_str = arr.get(1)?.as_str()?;
        match value_str.parse::<f64>() {
            Ok(value) => Some(((ts_secs * 1000.0) as i64, value)),
            Err(_) => {
                warn!("skipping unparsable TSDB sample value: {:?}", value_str);
                None
            }
        }
    }
}

#[async_trait]
impl TsdbClient for HttpTsdbClient {
    async fn write(&self, samples: &[Sample]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let payload: Vec<Value> = samples
            .iter()
            .map(|s| {
                serde_json::json!({
                    "labels": s.labels,
                    "value": s.value,
                    "ts_ms": s.ts_ms,
                })
            })
            .collect();

        let url = format!("{}/api/v1/write", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "samples": payload }))
            .send()
            .await
            .map_err(|e| anyhow!("TSDB write request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            error!("TSDB write returned HTTP {}", status);
            return Err(anyhow!("TSDB write returned HTTP {}", status));
        }
        Ok(())
    }

    async fn query_instant(&self, promql: &str) -> Result<Vec<Series>> {
        let url = format!("{}/api/v1/query", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("query", promql)])
            .send()
            .await
            .map_err(|e| anyhow!("TSDB instant query failed for {:?}: {}", promql, e))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "TSDB instant query {:?} returned HTTP {}",
                promql,
                response.status()
            ));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| anyhow!("failed to parse TSDB instant query response: {}", e))?;

        Ok(Self::parse_result_vector(&json, false))
    }

    async fn query_range(
        &self,
        promql: &str,
        start_ms: i64,
        end_ms: i64,
        step_secs: u64,
    ) -> Result<Vec<Series>> {
        let step = if step_secs == 0 {
            // auto: aim for ~300 points over the range, minimum 15s
            let span_secs = ((end_ms - start_ms).max(0) / 1000).max(1) as u64;
            (span_secs / 300).max(15)
        } else {
            step_secs
        };

        let url = format!("{}/api/v1/query_range", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("query", promql.to_string()),
                ("start", (start_ms as f64 / 1000.0).to_string()),
                ("end", (end_ms as f64 / 1000.0).to_string()),
                ("step", step.to_string()),
            ])
            .send()
            .await
            .map_err(|e| anyhow!("TSDB range query failed for {:?}: {}", promql, e))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "TSDB range query {:?} returned HTTP {}",
                promql,
                response.status()
            ));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| anyhow!("failed to parse TSDB range query response: {}", e))?;

        Ok(Self::parse_result_vector(&json, true))
    }

    async fn get_label_values(&self, label: &str, matches: &[&str]) -> Result<Vec<String>> {
        let url = format!("{}/api/v1/label/{}/values", self.base_url, label);
        let mut query: Vec<(&str, &str)> = Vec::new();
        for m in matches {
            query.push(("match[]", m));
        }

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| anyhow!("TSDB label-values request failed for {}: {}", label, e))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "TSDB label-values request for {} returned HTTP {}",
                label,
                response.status()
            ));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| anyhow!("failed to parse TSDB label-values response: {}", e))?;

        let values = json
            .get("data")
            .and_then(|d| d.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        Ok(values)
    }

    async fn delete_series(&self, matches: &[&str]) -> Result<()> {
        if matches.is_empty() {
            return Ok(());
        }

        let url = format!("{}/api/v1/admin/tsdb/delete_series", self.base_url);
        let mut query: Vec<(&str, &str)> = Vec::new();
        for m in matches {
            query.push(("match[]", m));
        }

        let response = self
            .client
            .post(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| anyhow!("TSDB delete_series request failed: {}", e))?;

        // Idempotent: treat 404 (nothing to delete) as success.
        if !response.status().is_success() && response.status().as_u16() != 404 {
            return Err(anyhow!("TSDB delete_series returned HTTP {}", response.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn query_instant_parses_vector_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "data": {
                    "resultType": "vector",
                    "result": [{
                        "metric": {"__name__": "pika_cpu_usage_percent", "agent_id": "a1"},
                        "value": [1700000000.0, "42.5"]
                    }]
                }
            })))
            .mount(&server)
            .await;

        let client = HttpTsdbClient::new(server.uri()).unwrap();
        let series = client.query_instant("pika_cpu_usage_percent{agent_id=\"a1\"}").await.unwrap();

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].name, "pika_cpu_usage_percent");
        assert_eq!(series[0].points, vec![(1700000000000, 42.5)]);
    }

    #[tokio::test]
    async fn query_instant_skips_unparsable_values() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "data": {
                    "result": [{
                        "metric": {"__name__": "pika_cpu_usage_percent"},
                        "value": [1700000000.0, "NaN garbage"]
                    }]
                }
            })))
            .mount(&server)
            .await;

        let client = HttpTsdbClient::new(server.uri()).unwrap();
        let series = client.query_instant("whatever").await.unwrap();
        assert_eq!(series[0].points.len(), 0);
    }

    #[tokio::test]
    async fn delete_series_treats_404_as_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/admin/tsdb/delete_series"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpTsdbClient::new(server.uri()).unwrap();
        client.delete_series(&["{agent_id=\"gone\"}"]).await.unwrap();
    }
}
