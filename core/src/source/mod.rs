pub mod prometheus;

use crate::errors::SourceError;
use crate::window::TimeWindow;

/// A raw sample from the metrics source. The value is kept as the source
/// encoded it and is only parsed by the mapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Unix seconds.
    pub timestamp: i64,
    pub value: String,
}

impl Sample {
    pub fn new(timestamp: i64, value: impl Into<String>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }
}

/// A time-series store that answers range queries, e.g. Prometheus.
#[allow(async_fn_in_trait)]
pub trait MetricsSource {
    /// Evaluates `expression` over the half-open `window` at `step_seconds`
    /// resolution.
    ///
    /// Samples come back in ascending timestamp order. A query that matches
    /// nothing yields an empty vector, not an error.
    async fn query_range(
        &self,
        expression: &str,
        window: &TimeWindow,
        step_seconds: u32,
    ) -> Result<Vec<Sample>, SourceError>;
}

impl<T: MetricsSource + ?Sized> MetricsSource for &T {
    async fn query_range(
        &self,
        expression: &str,
        window: &TimeWindow,
        step_seconds: u32,
    ) -> Result<Vec<Sample>, SourceError> {
        (**self).query_range(expression, window, step_seconds).await
    }
}
