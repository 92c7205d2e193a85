pub mod config;
pub mod errors;
pub mod ingestor;
pub mod mapper;
pub mod model;
pub mod retry;
pub mod sink;
pub mod source;
pub mod telemetry;
pub mod window;

pub use config::IngestConfig;
pub use errors::{IngestError, Result};
pub use ingestor::{BackfillReport, IngestMode, IngestOutcome, Ingestor};
