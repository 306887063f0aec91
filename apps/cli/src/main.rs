//! lapscope: GT7 lap telemetry, live from the console or replayed from captures.

mod live;
mod replay;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use lapscope_ingest_gt7::LayoutKind;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lapscope", version, about = "Lap telemetry for Gran Turismo 7")]
struct Cli {
    /// Default to debug logging when RUST_LOG is unset
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a console and print lap summaries until interrupted
    Live(LiveArgs),
    /// Analyze one or two recorded capture files
    Analyze(AnalyzeArgs),
}

#[derive(clap::Args)]
pub struct LiveArgs {
    /// Console host name or IP
    #[arg(long)]
    pub host: Option<String>,
    /// Lap whose trajectory is kept
    #[arg(long, default_value_t = 1)]
    pub lap: i16,
    /// Record decoded frames to a capture file (`.gz` compresses)
    #[arg(long)]
    pub record: Option<PathBuf>,
    /// JSON session config; flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct AnalyzeArgs {
    /// Reference capture
    pub file: PathBuf,
    #[arg(long)]
    pub lap: i16,
    /// Comparison capture
    #[arg(long)]
    pub compare: Option<PathBuf>,
    /// Lap to keep from the comparison capture, defaults to --lap
    #[arg(long, requires = "compare")]
    pub compare_lap: Option<i16>,
    #[arg(long, value_enum, default_value_t = LayoutArg::Compact)]
    pub layout: LayoutArg,
    /// Write lap summaries of every dataset as CSV
    #[arg(long)]
    pub csv: Option<PathBuf>,
    /// Write the reference trajectory as CSV
    #[arg(long)]
    pub points: Option<PathBuf>,
    /// Write every dataset as one JSON object per line
    #[arg(long)]
    pub ndjson: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    /// 296-byte frames
    Compact,
    /// 304-byte frames
    Padded,
}

impl From<LayoutArg> for LayoutKind {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Compact => LayoutKind::Compact,
            LayoutArg::Padded => LayoutKind::Padded,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Live(args) => live::run(args).await,
        Commands::Analyze(args) => replay::run(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_flags_parse() {
        let cli = Cli::try_parse_from([
            "lapscope", "analyze", "ref.bin.gz", "--lap", "3", "--compare", "other.bin",
            "--layout", "padded", "--csv", "laps.csv",
        ])
        .unwrap();
        let Commands::Analyze(args) = cli.command else { panic!("expected analyze") };
        assert_eq!(args.lap, 3);
        assert_eq!(args.compare_lap, None);
        assert_eq!(LayoutKind::from(args.layout), LayoutKind::Padded);
        assert_eq!(args.csv, Some(PathBuf::from("laps.csv")));
    }

    #[test]
    fn compare_lap_needs_compare_file() {
        assert!(Cli::try_parse_from([
            "lapscope", "analyze", "ref.bin", "--lap", "1", "--compare-lap", "2",
        ])
        .is_err());
    }

    #[test]
    fn live_defaults() {
        let cli = Cli::try_parse_from(["lapscope", "live", "--host", "10.0.0.5"]).unwrap();
        let Commands::Live(args) = cli.command else { panic!("expected live") };
        assert_eq!(args.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(args.lap, 1);
        assert!(args.record.is_none());
    }
}
