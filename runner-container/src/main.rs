use std::pin::pin;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use sli_ingest_core::config::load_config;
use sli_ingest_core::ingestor::Ingestor;
use sli_ingest_core::model::{MetricQuery, SliFields, SliType, build_sli_creation_request};
use sli_ingest_core::retry::Retryable;
use sli_ingest_core::sink::SliCatalog;
use sli_ingest_core::sink::blameless::BlamelessClient;
use sli_ingest_core::source::prometheus::PrometheusClient;
use sli_ingest_core::telemetry::init_tracing;
use sli_ingest_core::{IngestMode, IngestOutcome};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

type Engine = Ingestor<PrometheusClient, BlamelessClient, BlamelessClient>;

/// Ingests SLI time series from Prometheus into the SLO backend.
///
/// Configuration is read from `--config` when given, otherwise the whole YAML
/// document is taken from the `INGEST_CONFIG` environment variable.
#[derive(Parser, Debug)]
#[command(name = "sli-ingest", version, about)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "SLI_INGEST_CONFIG", global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect or create SLI definitions
    #[command(subcommand)]
    Sli(SliCommand),

    /// Run one ingestion for an SLI
    Ingest {
        #[command(flatten)]
        target: Target,

        /// Backfill hourly slices starting 28 days ago instead of ingesting
        /// the latest period
        #[arg(long)]
        backfill: bool,
    },

    /// Ingest the latest period of an SLI every `period_seconds` until stopped
    Run {
        #[command(flatten)]
        target: Target,
    },
}

#[derive(Subcommand, Debug)]
enum SliCommand {
    /// Print an SLI as JSON
    Get {
        #[command(flatten)]
        target: Target,
    },

    /// Create an SLI
    Create {
        #[arg(long)]
        name: String,

        #[arg(long)]
        description: String,

        #[arg(long)]
        service_id: i64,

        /// availability, latency, throughput, saturation, durability or correctness
        #[arg(long)]
        sli_type: SliType,

        /// Query expression for single-series types
        #[arg(long, conflicts_with_all = ["good_query", "valid_query"])]
        query: Option<String>,

        /// Good request query, availability only
        #[arg(long, requires = "valid_query")]
        good_query: Option<String>,

        /// Valid request query, availability only
        #[arg(long, requires = "good_query")]
        valid_query: Option<String>,

        /// Organization id; defaults to `blameless.org_id`
        #[arg(long)]
        org_id: Option<i64>,
    },
}

#[derive(Args, Debug)]
struct Target {
    #[arg(long)]
    sli_id: i64,

    /// Organization id; defaults to `blameless.org_id`
    #[arg(long)]
    org_id: Option<i64>,
}

/// Entry point for running ingestion jobs on container hosting services like
/// AWS EKS, ECS, etc. The configuration and HTTP clients are built once and
/// shared by every command.
#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    let default_org = config.blameless.org_id;
    let engine = Ingestor::from_config(&config).context("Failed to build clients")?;

    match cli.command {
        Command::Sli(SliCommand::Get { target }) => {
            let org_id = target.org_id.unwrap_or(default_org);
            let sli = engine
                .catalog()
                .get_sli(org_id, target.sli_id)
                .await
                .with_context(|| format!("Failed to fetch SLI {}", target.sli_id))?;
            println!("{}", serde_json::to_string_pretty(&sli)?);
        }
        Command::Sli(SliCommand::Create {
            name,
            description,
            service_id,
            sli_type,
            query,
            good_query,
            valid_query,
            org_id,
        }) => {
            let query = match (sli_type, query, good_query, valid_query) {
                (SliType::Availability, None, Some(good), Some(valid)) => {
                    MetricQuery::availability(good, valid)?
                }
                (SliType::Availability, ..) => {
                    bail!("availability SLIs need --good-query and --valid-query")
                }
                (sli_type, Some(expression), None, None) => {
                    MetricQuery::single(sli_type, expression)?
                }
                (sli_type, ..) => bail!("{sli_type} SLIs need exactly one --query"),
            };
            let fields = SliFields {
                name,
                description,
                service_id,
                query,
            };
            let request = build_sli_creation_request(org_id.unwrap_or(default_org), fields)?;
            let sli = engine
                .catalog()
                .create_sli(&request)
                .await
                .context("Failed to create SLI")?;
            println!("{}", serde_json::to_string_pretty(&sli)?);
        }
        Command::Ingest { target, backfill } => {
            let org_id = target.org_id.unwrap_or(default_org);
            let mode = if backfill {
                IngestMode::Backfill
            } else {
                IngestMode::Regular
            };
            let outcome = engine
                .ingest_sli(org_id, target.sli_id, mode)
                .await
                .with_context(|| format!("Ingestion of SLI {} failed", target.sli_id))?;
            print_outcome(&outcome);
            info!(metrics = %serde_json::to_string(&engine.metrics())?, "Ingestion finished");
        }
        Command::Run { target } => {
            let org_id = target.org_id.unwrap_or(default_org);
            run_forever(&engine, org_id, target.sli_id).await?;
        }
    }

    Ok(())
}

/// Main loop runs until a shutdown signal is received:
///     - wait for the next polling tick
///     - ingest the latest period of the SLI
///
/// Retryable failures are logged and the next tick tries again; anything else
/// stops the loop. Ctrl-C also interrupts an in-flight cycle, whose already
/// submitted batch stays submitted.
async fn run_forever(engine: &Engine, org_id: i64, sli_id: i64) -> Result<()> {
    let period = Duration::from_secs(u64::from(engine.settings().period_seconds));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut shutdown = pin!(tokio::signal::ctrl_c());

    info!(sli_id, org_id, ?period, "Starting polling loop");
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = &mut shutdown => break,
            result = engine.ingest_sli(org_id, sli_id, IngestMode::Regular) => result,
        };

        match result {
            Ok(outcome) => print_outcome(&outcome),
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "A transient error occurred, will retry next period");
            }
            Err(e) => {
                error!(error = %e, "A fatal error occurred");
                return Err(e).context("Ingestion cycle failed");
            }
        }
        info!(metrics = %serde_json::to_string(&engine.metrics())?, "Ingestion cycle finished");
    }

    info!("Shutdown signal received, polling loop stopped");
    Ok(())
}

fn print_outcome(outcome: &IngestOutcome) {
    match outcome {
        IngestOutcome::Backfill(report) => info!(
            slices = report.slices,
            empty_slices = report.empty_slices,
            records_submitted = report.records_submitted,
            records_accepted = report.records_accepted,
            "Backfill done"
        ),
        IngestOutcome::Regular(ack) => {
            info!(accepted = ack.accepted(), "Regular ingestion done")
        }
    }
}
