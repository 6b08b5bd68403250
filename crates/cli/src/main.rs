//! gapfill: satellite scene gap reports, backfill and dead-letter inspection.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use gapfill_catalog::ObjectStoreCatalog;
use gapfill_cli::cli::{CliArgs, Command, DeadLetterArgs, GapReportArgs, RunMode};
use gapfill_cli::output::write_json;
use gapfill_cli::{Components, GapReportRequest, Pipeline, RunOutcome, EXIT_INVALID_CONFIG, EXIT_RUN_FAILED};
use gapfill_core::config::load_dotenv;
use gapfill_core::{Config, DateRange, Region, SceneQuery};
use gapfill_provider::HttpProvider;
use gapfill_queue::SqsTransport;
use gapfill_report::{ObjectStoreSink, ReportSink, WebhookSink};
use gapfill_storage::StorageBackend;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the JSON report.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    load_dotenv();
    let config = Config::from_env();

    if let Command::Config = args.command {
        if let Err(e) = config.validate() {
            warn!(error = %e, "Configuration is incomplete");
        }
        write_json(None, &config.redacted_summary())?;
        return Ok(());
    }

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        std::process::exit(EXIT_INVALID_CONFIG);
    }
    config.log_summary();

    let pipeline = match build_components(&config).and_then(|c| Ok(Pipeline::new(config, c)?)) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "Failed to initialize");
            std::process::exit(EXIT_INVALID_CONFIG);
        }
    };

    match args.command {
        Command::GapReport(gap) => {
            let request = match gap_request(&pipeline, &gap) {
                Ok(request) => request,
                Err(e) => {
                    error!(error = %e, "Invalid arguments");
                    std::process::exit(EXIT_INVALID_CONFIG);
                }
            };
            let outcome = pipeline.gap_report(&request).await;
            finish(outcome, gap.output.as_deref())
        }
        Command::DeadLetter(DeadLetterArgs { queue, output }) => {
            let queue = queue.unwrap_or_else(|| pipeline.config().queue.ingest_queue.clone());
            if queue.is_empty() {
                error!("No queue given: pass --queue or set INGEST_QUEUE");
                std::process::exit(EXIT_INVALID_CONFIG);
            }
            let outcome = pipeline.dead_letter(&queue).await;
            finish(outcome, output.as_deref())
        }
        Command::Config => Ok(()),
    }
}

fn build_components(config: &Config) -> Result<Components> {
    let catalog_backend =
        StorageBackend::for_catalog(&config.aws, &config.catalog).context("catalog storage")?;
    let provider = HttpProvider::new(&config.provider, config.retry.clone()).context("provider client")?;

    let mut sinks: Vec<Box<dyn ReportSink>> = Vec::new();
    if let Some(backend) = StorageBackend::for_reports(&config.aws, &config.report).context("report storage")? {
        sinks.push(Box::new(ObjectStoreSink::new(backend, config.report.prefix.clone())));
    }
    if let Some(ref url) = config.report.webhook_url {
        let sink = WebhookSink::new(url.clone(), config.report.notify_on, config.provider.timeout())
            .context("report webhook")?;
        sinks.push(Box::new(sink));
    }

    Ok(Components {
        catalog: Arc::new(ObjectStoreCatalog::new(catalog_backend)),
        provider: Arc::new(provider),
        queue: Arc::new(SqsTransport::new(&config.aws, &config.queue)),
        sinks,
    })
}

fn gap_request(pipeline: &Pipeline, args: &GapReportArgs) -> Result<GapReportRequest> {
    let range = DateRange::new(args.from, args.to)?;
    let mut region = Region::named(args.region.clone());
    if let Some(ref path) = args.region_tiles {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        region = region.with_tiles(Region::parse_tile_list(&text)?);
    }

    let dispatch = args.mode == RunMode::Dispatch;
    if dispatch && pipeline.config().queue.ingest_queue.is_empty() {
        anyhow::bail!("--mode dispatch needs INGEST_QUEUE");
    }

    Ok(GapReportRequest {
        query: SceneQuery::new(args.product, range, region),
        today: args.today.unwrap_or_else(|| chrono::Utc::now().date_naive()),
        dispatch,
        force: args.force,
        include_unclassifiable: args.include_unclassifiable,
    })
}

fn finish(outcome: Result<RunOutcome, gapfill_cli::RunError>, output: Option<&std::path::Path>) -> Result<()> {
    match outcome {
        Ok(outcome) => {
            if !outcome.summary.is_empty() {
                info!("\n{}", outcome.summary);
            }
            for failed in outcome.deliveries.iter().filter(|d| !d.success) {
                warn!(sink = %failed.sink, error = ?failed.error, "Report sink failed");
            }
            write_json(output, &outcome.report.to_json()?).context("writing report")?;
            Ok(())
        }
        Err(e) => {
            error!(
                stage = %e.stage,
                kind = %e.kind,
                computed = e.computed,
                message = %e.message,
                "Run failed"
            );
            std::process::exit(EXIT_RUN_FAILED);
        }
    }
}
