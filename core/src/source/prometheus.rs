use std::collections::HashMap;

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::PrometheusConfig;
use crate::errors::SourceError;
use crate::source::{MetricsSource, Sample};
use crate::window::TimeWindow;

const QUERY_RANGE_PATH: &str = "/api/v1/query_range";

/// Range-query client for the Prometheus HTTP API.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct QueryRangeResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryRangeData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryRangeData {
    #[serde(rename = "resultType")]
    result_type: String,
    #[serde(default)]
    result: Vec<RangeSeries>,
}

#[derive(Debug, Deserialize)]
struct RangeSeries {
    #[serde(default)]
    metric: HashMap<String, String>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

impl PrometheusClient {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &PrometheusConfig, client: reqwest::Client) -> Self {
        Self::new(client, config.endpoint.clone())
    }
}

impl MetricsSource for PrometheusClient {
    async fn query_range(
        &self,
        expression: &str,
        window: &TimeWindow,
        step_seconds: u32,
    ) -> Result<Vec<Sample>, SourceError> {
        let url = format!("{}{}", self.endpoint, QUERY_RANGE_PATH);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("query", expression.to_string()),
                ("start", window.start.timestamp().to_string()),
                ("end", window.end.timestamp().to_string()),
                ("step", step_seconds.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::Transport {
                status: Some(status.as_u16()),
                reason: body,
            });
        }

        // Prometheus reports bad queries as 4xx with a JSON error body.
        let parsed: QueryRangeResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(SourceError::Query {
                    status: status.as_u16(),
                    reason: body,
                });
            }
            Err(e) => {
                return Err(SourceError::Decode {
                    reason: e.to_string(),
                });
            }
        };

        if !status.is_success() || parsed.status != "success" {
            return Err(SourceError::Query {
                status: status.as_u16(),
                reason: format!(
                    "{}: {}",
                    parsed.error_type.as_deref().unwrap_or("error"),
                    parsed.error.as_deref().unwrap_or("no error message")
                ),
            });
        }

        let data = parsed.data.ok_or_else(|| SourceError::Decode {
            reason: "successful response without data".to_string(),
        })?;
        if data.result_type != "matrix" {
            return Err(SourceError::Decode {
                reason: format!("expected a matrix result, got {}", data.result_type),
            });
        }

        let series_count = data.result.len();
        let Some(series) = data.result.into_iter().next() else {
            debug!(query = expression, %window, "Range query returned no series");
            return Ok(Vec::new());
        };
        if series_count > 1 {
            warn!(
                query = expression,
                series_count,
                labels = ?series.metric,
                "Range query returned several series, using the first"
            );
        }

        // Prometheus includes the end instant; windows here are half-open.
        let samples: Vec<Sample> = series
            .values
            .into_iter()
            .map(|(timestamp, value)| Sample::new(timestamp.trunc() as i64, value))
            .filter(|sample| window.contains_timestamp(sample.timestamp))
            .collect();

        debug!(query = expression, %window, samples = samples.len(), "Range query completed");
        Ok(samples)
    }
}
