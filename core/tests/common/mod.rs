#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use sli_ingest_core::config::{
    BlamelessConfig, HttpConfig, IngestConfig, IngestSettings, PrometheusConfig, RetryConfig,
};
use sli_ingest_core::errors::{BackendError, SourceError};
use sli_ingest_core::model::{
    MetricQuery, PostManyAck, PostSliRequest, RawDataRecord, SliRecord, SliType,
};
use sli_ingest_core::sink::{RawDataSink, SliCatalog};
use sli_ingest_core::source::{MetricsSource, Sample};
use sli_ingest_core::window::TimeWindow;

pub const ORG_ID: i64 = 7;

/// 2024-06-30T17:42:00Z; backfills from here start at 2024-06-02T00:00:00Z.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 30, 17, 42, 0).unwrap()
}

pub fn backfill_origin() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap()
}

pub fn test_config(concurrency: usize) -> IngestConfig {
    IngestConfig {
        prometheus: PrometheusConfig {
            endpoint: "http://prometheus.test".to_string(),
        },
        blameless: BlamelessConfig {
            endpoint: "http://backend.test".to_string(),
            auth_token: "token".to_string(),
            org_id: ORG_ID,
        },
        ingest: IngestSettings {
            backfill_days: 1,
            period_seconds: 300,
            step_seconds: 60,
            concurrency,
        },
        http: HttpConfig::default(),
        retry: RetryConfig {
            max_retries: 3,
            retry_delay_ms: 0,
        },
    }
}

pub fn sli_record(id: i64, query: &MetricQuery) -> SliRecord {
    SliRecord {
        org_id: ORG_ID,
        id,
        name: format!("sli-{id}"),
        description: "test SLI".to_string(),
        data_source_id: 5,
        sli_type_id: query.sli_type().id(),
        service_id: 3,
        metric_path: Some(serde_json::to_string(&query.to_metric_path()).unwrap()),
        ..Default::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryCall {
    pub expression: String,
    pub window: TimeWindow,
    pub step_seconds: u32,
}

/// Metrics source double that records every query.
///
/// Fixed series are filtered to the queried window, like a real range query.
/// Generated series yield one sample per step across the whole window.
#[derive(Default)]
pub struct RecordingSource {
    series: HashMap<String, Vec<Sample>>,
    generated: HashMap<String, String>,
    transient_failures: Mutex<usize>,
    fail_at: Option<(DateTime<Utc>, SourceError)>,
    calls: Mutex<Vec<QueryCall>>,
}

impl RecordingSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, expression: &str, samples: Vec<Sample>) -> Self {
        self.series.insert(expression.to_string(), samples);
        self
    }

    pub fn with_sample_every_step(mut self, expression: &str, value: &str) -> Self {
        self.generated
            .insert(expression.to_string(), value.to_string());
        self
    }

    pub fn with_transient_failures(self, count: usize) -> Self {
        *self.transient_failures.lock().unwrap() = count;
        self
    }

    pub fn failing_at(mut self, start: DateTime<Utc>, error: SourceError) -> Self {
        self.fail_at = Some((start, error));
        self
    }

    pub fn calls(&self) -> Vec<QueryCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl MetricsSource for RecordingSource {
    async fn query_range(
        &self,
        expression: &str,
        window: &TimeWindow,
        step_seconds: u32,
    ) -> Result<Vec<Sample>, SourceError> {
        self.calls.lock().unwrap().push(QueryCall {
            expression: expression.to_string(),
            window: *window,
            step_seconds,
        });

        {
            let mut remaining = self.transient_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SourceError::Transport {
                    status: Some(503),
                    reason: "unavailable".to_string(),
                });
            }
        }
        if let Some((start, error)) = &self.fail_at {
            if *start == window.start {
                return Err(error.clone());
            }
        }

        if let Some(value) = self.generated.get(expression) {
            let step = i64::from(step_seconds);
            return Ok((window.start.timestamp()..window.end.timestamp())
                .step_by(step as usize)
                .map(|ts| Sample::new(ts, value.clone()))
                .collect());
        }

        Ok(self
            .series
            .get(expression)
            .map(|samples| {
                samples
                    .iter()
                    .filter(|s| window.contains_timestamp(s.timestamp))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedBatch {
    pub org_id: i64,
    pub sli_type: SliType,
    pub records: Vec<RawDataRecord>,
}

/// Backend double that deduplicates records by `(sliId, start, end)`.
#[derive(Default)]
pub struct DedupBackend {
    stored: Mutex<BTreeMap<(i64, i64, i64), RawDataRecord>>,
    batches: Mutex<Vec<SubmittedBatch>>,
    attempts: Mutex<usize>,
    transient_failures: Mutex<usize>,
    reject_with: Option<u16>,
}

impl DedupBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transient_failures(self, count: usize) -> Self {
        *self.transient_failures.lock().unwrap() = count;
        self
    }

    pub fn rejecting(mut self, status: u16) -> Self {
        self.reject_with = Some(status);
        self
    }

    pub fn batches(&self) -> Vec<SubmittedBatch> {
        self.batches.lock().unwrap().clone()
    }

    pub fn stored(&self) -> Vec<RawDataRecord> {
        self.stored.lock().unwrap().values().copied().collect()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

impl RawDataSink for DedupBackend {
    async fn submit_many(
        &self,
        org_id: i64,
        sli_type: SliType,
        records: &[RawDataRecord],
    ) -> Result<PostManyAck, BackendError> {
        *self.attempts.lock().unwrap() += 1;

        {
            let mut remaining = self.transient_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BackendError::Transport {
                    status: Some(502),
                    reason: "bad gateway".to_string(),
                });
            }
        }
        if let Some(status) = self.reject_with {
            return Err(BackendError::Rejected {
                status,
                body: "malformed body".to_string(),
            });
        }

        let mut stored = self.stored.lock().unwrap();
        for record in records {
            stored.insert((record.sli_id, record.start, record.end), *record);
        }
        self.batches.lock().unwrap().push(SubmittedBatch {
            org_id,
            sli_type,
            records: records.to_vec(),
        });
        Ok(PostManyAck {
            records: records.to_vec(),
        })
    }
}

/// Catalog double holding SLIs in memory.
#[derive(Default)]
pub struct MemoryCatalog {
    slis: HashMap<i64, SliRecord>,
    transient_failures: Mutex<usize>,
    get_sli_calls: Mutex<usize>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sli(mut self, sli: SliRecord) -> Self {
        self.slis.insert(sli.id, sli);
        self
    }

    pub fn with_transient_failures(self, count: usize) -> Self {
        *self.transient_failures.lock().unwrap() = count;
        self
    }

    pub fn get_sli_calls(&self) -> usize {
        *self.get_sli_calls.lock().unwrap()
    }
}

impl SliCatalog for MemoryCatalog {
    async fn get_sli(&self, _org_id: i64, id: i64) -> Result<SliRecord, BackendError> {
        *self.get_sli_calls.lock().unwrap() += 1;
        {
            let mut remaining = self.transient_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BackendError::Transport {
                    status: None,
                    reason: "connection reset".to_string(),
                });
            }
        }
        self.slis
            .get(&id)
            .cloned()
            .ok_or(BackendError::NotFound { kind: "SLI", id })
    }

    async fn get_sli_type(&self, type_id: i64) -> Result<SliType, BackendError> {
        SliType::from_id(type_id).ok_or(BackendError::NotFound {
            kind: "SLI type",
            id: type_id,
        })
    }

    async fn create_sli(&self, request: &PostSliRequest) -> Result<SliRecord, BackendError> {
        Ok(SliRecord {
            org_id: request.org_id,
            id: 1,
            name: request.model.name.clone(),
            description: request.model.description.clone(),
            data_source_id: request.model.data_source_id,
            sli_type_id: request.model.sli_type_id,
            service_id: request.model.service_id,
            metric_path: Some(request.model.metric_path.clone()),
            ..Default::default()
        })
    }
}
