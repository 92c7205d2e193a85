use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sli_ingest=info,sli_ingest_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Counters accumulated by an [`crate::Ingestor`] over its lifetime.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IngestMetrics {
    pub queries_issued: usize,
    pub slices_processed: usize,
    pub empty_slices: usize,
    pub failed_slices: usize,
    pub records_submitted: usize,
    pub records_accepted: usize,
}
