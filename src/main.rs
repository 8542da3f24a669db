//! EdgePulse ML jobs entrypoint: one batch invocation per run
//! (features, train, score or ingest), driven by an external scheduler.

mod output;

use clap::{Parser, Subcommand};
use edgepulse_ml::{
    config::PipelineConfig,
    error::{PipelineError, Result},
    features::FeatureMatrix,
    ingest::{ingest, IngestRequest},
    logging::StructuredLogger,
    pipeline::{Lookback, Pipeline},
};
use output::OutputFormat;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// EdgePulse ML jobs (features/train/score)
#[derive(Parser)]
#[command(name = "edgepulse-ml")]
#[command(author, version, about = "EdgePulse ML jobs (features/train/score)", long_about = None)]
struct Cli {
    /// Data-store connection string (overrides DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Feature window length in seconds (overrides FEATURE_WINDOW_SEC)
    #[arg(long, global = true)]
    window_sec: Option<u64>,

    /// JSON configuration file layered under the environment
    #[arg(long, global = true, env = "EDGEPULSE_CONFIG_PATH", default_value = "edgepulse.json")]
    config: PathBuf,

    /// Output format
    #[arg(long, short, global = true, value_enum, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute window features for a metric over the last N hours
    Features {
        tenant: String,
        metric: String,
        #[arg(long, default_value_t = 24)]
        since_hours: u32,
        /// Number of trailing windows to print
        #[arg(long, default_value_t = 10)]
        tail: usize,
    },

    /// Train (or refresh) an isolation forest model for a metric
    Train {
        tenant: String,
        metric: String,
        #[arg(long, default_value_t = 30)]
        lookback_days: u32,
    },

    /// Score windows and persist anomaly scores
    Score {
        tenant: String,
        metric: String,
        #[arg(long, default_value_t = 24)]
        since_hours: u32,
        /// Score a JSON array of feature records instead of reading samples
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Load a device ingest payload (JSON) into the sample store
    Ingest { tenant: String, file: PathBuf },
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::from_file_and_env(&cli.config)?;
    if let Some(url) = &cli.database_url {
        config.database_url = Some(url.clone());
    }
    if let Some(w) = cli.window_sec {
        config.feature_window_secs = w;
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: Cli, config: PipelineConfig) -> Result<()> {
    let pipeline = Pipeline::connect(config)?;
    let config = pipeline.config();
    info!(
        window_secs = config.feature_window_secs,
        score_interval_secs = config.score_interval_secs,
        model_dir = %config.model_dir.display(),
        "edgepulse-ml starting"
    );
    let stdout = std::io::stdout();
    dispatch(&pipeline, cli.command, cli.format, &mut stdout.lock())
}

/// Execute one command against `pipeline`, writing user-facing output to `out`.
fn dispatch(pipeline: &Pipeline, command: Commands, format: OutputFormat, out: &mut impl Write) -> Result<()> {
    match command {
        Commands::Features {
            tenant,
            metric,
            since_hours,
            tail,
        } => {
            let vectors = pipeline.compute_features(&tenant, &metric, Lookback::hours(since_hours))?;
            if vectors.is_empty() {
                return Err(PipelineError::NoData { tenant, metric });
            }
            output::print_features(&vectors, tail, format, out)?;
        }
        Commands::Train {
            tenant,
            metric,
            lookback_days,
        } => {
            let outcome = pipeline.train(&tenant, &metric, Lookback::days(lookback_days))?;
            writeln!(out, "Model saved: {}", outcome.artefact_path.display())?;
        }
        Commands::Score {
            tenant,
            metric,
            since_hours,
            input,
        } => {
            let outcome = match input {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)?;
                    let records: Vec<serde_json::Value> = serde_json::from_str(&raw)?;
                    let matrix = FeatureMatrix::from_records(&records)?;
                    pipeline.score_matrix(&tenant, &metric, &matrix)?
                }
                None => pipeline.score(&tenant, &metric, Lookback::hours(since_hours))?,
            };
            if outcome.rows_written == 0 {
                writeln!(out, "No feature windows to score.")?;
            } else {
                output::print_scores(&outcome.scores, format, out)?;
                if matches!(format, OutputFormat::Table) {
                    writeln!(out, "Inserted/updated {} anomaly score rows.", outcome.rows_written)?;
                }
            }
        }
        Commands::Ingest { tenant, file } => {
            let raw = std::fs::read_to_string(&file)?;
            let request = IngestRequest::from_json(&raw)?;
            let receipt = ingest(pipeline.store(), &tenant, &request)?;
            writeln!(
                out,
                "Ingested {} points across {} metrics (batch {}).",
                receipt.points, receipt.metrics, receipt.batch_id
            )?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(e.exit_code() as u8);
        }
    };
    StructuredLogger::init(config.log.json, &config.log.level);

    match run(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, exit_code = e.exit_code(), "invocation failed");
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
