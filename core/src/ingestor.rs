use std::pin::pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use futures::{StreamExt, stream};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::{IngestConfig, IngestSettings};
use crate::errors::{ConfigError, IngestError, Result, SliceError, SourceError};
use crate::mapper::{map_availability, map_samples};
use crate::model::{MetricQuery, PostManyAck, SliRecord};
use crate::retry::{RetryPolicy, retry};
use crate::sink::blameless::BlamelessClient;
use crate::sink::{BatchSubmitter, RawDataSink, SliCatalog};
use crate::source::prometheus::PrometheusClient;
use crate::source::{MetricsSource, Sample};
use crate::telemetry::IngestMetrics;
use crate::window::{TimeWindow, backfill_origin, hourly_slices};

/// Source of the current instant. Windows are always derived from it, never
/// from the system clock directly.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A frozen clock.
impl Clock for DateTime<Utc> {
    fn now(&self) -> DateTime<Utc> {
        *self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    /// Hourly slices over the configured number of days, starting 28 days ago.
    Backfill,
    /// One slice covering the most recent polling period.
    Regular,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Backfill(BackfillReport),
    Regular(PostManyAck),
}

/// Totals of a completed backfill.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub slices: usize,
    pub empty_slices: usize,
    pub records_submitted: usize,
    pub records_accepted: usize,
}

struct SliceResult {
    submitted: usize,
    ack: PostManyAck,
}

/// The ingestor drives samples from a metrics source into the SLI backend.
///
/// Every slice is queried, mapped and submitted as one unit: its records are
/// either all computed and submitted in a single batch or not submitted at
/// all. Slices already submitted stay submitted when a later one fails.
pub struct Ingestor<S, K, C> {
    settings: IngestSettings,
    source: S,
    submitter: BatchSubmitter<K>,
    catalog: C,
    retry: RetryPolicy,
    clock: Box<dyn Clock>,
    metrics: Mutex<IngestMetrics>,
}

impl Ingestor<PrometheusClient, BlamelessClient, BlamelessClient> {
    /// Builds the HTTP clients once and wires them into an ingestor. The
    /// backend client serves as both catalog and sink and shares the
    /// connection pool with the metrics client.
    pub fn from_config(config: &IngestConfig) -> std::result::Result<Self, ConfigError> {
        let http = config.build_http_client()?;
        let source = PrometheusClient::from_config(&config.prometheus, http.clone());
        let backend = BlamelessClient::from_config(&config.blameless, http);
        Ok(Self::new(config, source, backend.clone(), backend))
    }
}

impl<S, K, C> Ingestor<S, K, C>
where
    S: MetricsSource,
    K: RawDataSink,
    C: SliCatalog,
{
    pub fn new(config: &IngestConfig, source: S, sink: K, catalog: C) -> Self {
        let retry = RetryPolicy::from(&config.retry);
        Self {
            settings: config.ingest.clone(),
            source,
            submitter: BatchSubmitter::new(sink, retry),
            catalog,
            retry,
            clock: Box::new(SystemClock),
            metrics: Mutex::new(IngestMetrics::default()),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Snapshot of the counters accumulated so far.
    pub fn metrics(&self) -> IngestMetrics {
        self.lock_metrics().clone()
    }

    /// Looks up an SLI and runs the requested ingestion with the configured
    /// days, period and step.
    pub async fn ingest_sli(
        &self,
        org_id: i64,
        sli_id: i64,
        mode: IngestMode,
    ) -> Result<IngestOutcome> {
        let (sli, query) = self.resolve(org_id, sli_id).await?;
        let step = self.settings.step_seconds;
        match mode {
            IngestMode::Backfill => {
                let report = self
                    .backfill(&sli, &query, self.settings.backfill_days, step)
                    .await?;
                Ok(IngestOutcome::Backfill(report))
            }
            IngestMode::Regular => {
                let ack = self
                    .regular(&sli, &query, self.settings.period_seconds, step)
                    .await?;
                Ok(IngestOutcome::Regular(ack))
            }
        }
    }

    /// Fetches the SLI and its type, and checks that the stored query matches
    /// the type.
    pub async fn resolve(&self, org_id: i64, sli_id: i64) -> Result<(SliRecord, MetricQuery)> {
        let mut sli = retry(&self.retry, "get_sli", || self.catalog.get_sli(org_id, sli_id))
            .await
            .map_err(IngestError::Catalog)?;
        if sli.org_id == 0 {
            sli.org_id = org_id;
        }

        let type_id = sli.sli_type_id;
        let sli_type = retry(&self.retry, "get_sli_type", || {
            self.catalog.get_sli_type(type_id)
        })
        .await
        .map_err(IngestError::Catalog)?;

        let query = sli
            .metric_query()
            .map_err(|e| IngestError::InvalidMetricPath {
                sli_id,
                reason: e.to_string(),
            })?;
        if query.sli_type() != sli_type {
            return Err(IngestError::QueryMismatch {
                sli_id,
                sli_type,
                query_type: query.sli_type(),
            });
        }

        debug!(sli_id, %sli_type, "Resolved SLI");
        Ok((sli, query))
    }

    /// Ingests `backfill_days` days of hourly slices starting at midnight UTC
    /// 28 days ago.
    ///
    /// Slices run through a pool of `ingest.concurrency` workers. The first
    /// failing slice ends the run and in-flight slices are dropped; slices
    /// submitted before it are not rolled back.
    pub async fn backfill(
        &self,
        sli: &SliRecord,
        query: &MetricQuery,
        backfill_days: u32,
        step_seconds: u32,
    ) -> Result<BackfillReport> {
        let origin = backfill_origin(self.clock.now());
        let slices = hourly_slices(origin, backfill_days);
        info!(
            sli_id = sli.id,
            %origin,
            backfill_days,
            slices = slices.len(),
            concurrency = self.settings.concurrency,
            "Starting backfill"
        );

        let mut results = pin!(
            stream::iter(slices)
                .map(move |window| self.process_slice(sli, query, window, step_seconds))
                .buffer_unordered(self.settings.concurrency.max(1))
        );

        let mut report = BackfillReport::default();
        while let Some(result) = results.next().await {
            let slice = result?;
            report.slices += 1;
            if slice.submitted == 0 {
                report.empty_slices += 1;
            }
            report.records_submitted += slice.submitted;
            report.records_accepted += slice.ack.accepted();
        }

        info!(
            sli_id = sli.id,
            slices = report.slices,
            empty_slices = report.empty_slices,
            records_submitted = report.records_submitted,
            records_accepted = report.records_accepted,
            "Backfill completed"
        );
        Ok(report)
    }

    /// Ingests the trailing `period_seconds` and returns the backend's
    /// acknowledgment. A period with no samples yields an empty one.
    pub async fn regular(
        &self,
        sli: &SliRecord,
        query: &MetricQuery,
        period_seconds: u32,
        step_seconds: u32,
    ) -> Result<PostManyAck> {
        let window = TimeWindow::trailing(
            self.clock.now(),
            TimeDelta::seconds(i64::from(period_seconds)),
        );
        let slice = self.process_slice(sli, query, window, step_seconds).await?;
        Ok(slice.ack)
    }

    async fn process_slice(
        &self,
        sli: &SliRecord,
        query: &MetricQuery,
        window: TimeWindow,
        step_seconds: u32,
    ) -> Result<SliceResult> {
        info!(
            sli_id = sli.id,
            from = %window.start,
            to = %window.end,
            query = %query,
            "Processing slice"
        );

        let outcome = self.run_slice(sli, query, &window, step_seconds).await;

        let mut metrics = self.lock_metrics();
        match outcome {
            Ok(slice) => {
                metrics.slices_processed += 1;
                if slice.submitted == 0 {
                    metrics.empty_slices += 1;
                }
                metrics.records_submitted += slice.submitted;
                metrics.records_accepted += slice.ack.accepted();
                debug!(
                    sli_id = sli.id,
                    from = %window.start,
                    submitted = slice.submitted,
                    accepted = slice.ack.accepted(),
                    "Slice submitted"
                );
                Ok(slice)
            }
            Err(source) => {
                metrics.failed_slices += 1;
                let err = IngestError::Slice {
                    sli_id: sli.id,
                    window,
                    query: query.to_string(),
                    source,
                };
                error!(error = %err, "Slice failed");
                Err(err)
            }
        }
    }

    async fn run_slice(
        &self,
        sli: &SliRecord,
        query: &MetricQuery,
        window: &TimeWindow,
        step_seconds: u32,
    ) -> std::result::Result<SliceResult, SliceError> {
        let records = match query {
            MetricQuery::Availability {
                good_request,
                valid_request,
            } => {
                let good = self.query_range(good_request, window, step_seconds).await?;
                let valid = self.query_range(valid_request, window, step_seconds).await?;
                map_availability(sli.id, &good, &valid, step_seconds)?
            }
            MetricQuery::Latency(expression)
            | MetricQuery::Throughput(expression)
            | MetricQuery::Saturation(expression)
            | MetricQuery::Durability(expression)
            | MetricQuery::Correctness(expression) => {
                let samples = self.query_range(expression, window, step_seconds).await?;
                map_samples(sli.id, &samples, query.sli_type(), step_seconds)?
            }
        };

        if records.is_empty() {
            debug!(sli_id = sli.id, %window, "No samples in slice, nothing to submit");
            return Ok(SliceResult {
                submitted: 0,
                ack: PostManyAck::default(),
            });
        }

        let ack = self
            .submitter
            .submit(sli.org_id, query.sli_type(), &records)
            .await
            .map_err(SliceError::Submit)?;
        Ok(SliceResult {
            submitted: records.len(),
            ack,
        })
    }

    async fn query_range(
        &self,
        expression: &str,
        window: &TimeWindow,
        step_seconds: u32,
    ) -> std::result::Result<Vec<Sample>, SourceError> {
        self.lock_metrics().queries_issued += 1;
        retry(&self.retry, "query_range", || {
            self.source.query_range(expression, window, step_seconds)
        })
        .await
    }

    fn lock_metrics(&self) -> MutexGuard<'_, IngestMetrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
