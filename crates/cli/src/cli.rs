use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use gapfill_core::Product;

/// Reconcile satellite scene archives against the provider record.
///
/// Reports gaps and orphans, optionally re-drives ingestion for the gaps,
/// and inspects the ingestion queue for dead-letter messages. Configuration
/// comes from the environment (and `.env`); see `gapfill config`.
#[derive(Parser, Debug)]
#[command(name = "gapfill", version, about)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compare provider and catalog inventories and report the gaps.
    GapReport(GapReportArgs),
    /// Inspect the ingestion queue for dead-letter messages.
    DeadLetter(DeadLetterArgs),
    /// Print the effective configuration with secrets redacted.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    /// Report only.
    Report,
    /// Report, then publish a backfill request per gap.
    Dispatch,
}

#[derive(Args, Debug)]
pub struct GapReportArgs {
    /// Product to reconcile: landsat_5, landsat_7, landsat_8, landsat_9, sentinel_2
    #[arg(long)]
    pub product: Product,

    /// First acquisition date (inclusive), YYYY-MM-DD
    #[arg(long)]
    pub from: NaiveDate,

    /// Last acquisition date (inclusive), YYYY-MM-DD
    #[arg(long)]
    pub to: NaiveDate,

    /// Region label passed to the provider
    #[arg(long, env = "GAPFILL_REGION", default_value = "africa")]
    pub region: String,

    /// File listing the tiles of the region (path/row or MGRS, one per line)
    #[arg(long)]
    pub region_tiles: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "report")]
    pub mode: RunMode,

    /// Treat every provider scene as a gap (full re-drive)
    #[arg(long)]
    pub force: bool,

    /// Also dispatch gaps that have no acquisition date
    #[arg(long)]
    pub include_unclassifiable: bool,

    /// Write the JSON report here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Reference date for gap ages (default: today, UTC)
    #[arg(long)]
    pub today: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub struct DeadLetterArgs {
    /// Queue name or URL (default: INGEST_QUEUE)
    #[arg(long)]
    pub queue: Option<String>,

    /// Write the JSON report here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gap_report() {
        let args = CliArgs::try_parse_from([
            "gapfill",
            "gap-report",
            "--product",
            "landsat_8",
            "--from",
            "2023-01-01",
            "--to",
            "2023-01-31",
            "--mode",
            "dispatch",
            "--force",
        ])
        .unwrap();
        let Command::GapReport(gap) = args.command else {
            panic!("expected gap-report");
        };
        assert_eq!(gap.product, Product::Landsat8);
        assert_eq!(gap.mode, RunMode::Dispatch);
        assert!(gap.force);
        assert!(!gap.include_unclassifiable);
        assert_eq!(gap.today, None);
    }

    #[test]
    fn rejects_bad_dates_and_products() {
        assert!(CliArgs::try_parse_from(["gapfill", "gap-report", "--product", "landsat_8", "--from", "01/01/2023", "--to", "2023-01-31"]).is_err());
        assert!(CliArgs::try_parse_from(["gapfill", "gap-report", "--product", "modis", "--from", "2023-01-01", "--to", "2023-01-31"]).is_err());
    }

    #[test]
    fn parses_dead_letter_and_config() {
        let args = CliArgs::try_parse_from(["gapfill", "dead-letter", "--queue", "ingest"]).unwrap();
        assert!(matches!(args.command, Command::DeadLetter(DeadLetterArgs { queue: Some(ref q), .. }) if q == "ingest"));
        let args = CliArgs::try_parse_from(["gapfill", "config"]).unwrap();
        assert!(matches!(args.command, Command::Config));
    }
}
