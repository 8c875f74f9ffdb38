//! Bronze CLI: ingest, validate and partition listing.
//!
//! Commands:
//! - `ingest`: fetch all pages from the upstream API and write one Parquet file
//! - `validate`: run the rule engine (and optionally the profiler) over a file
//! - `partitions`: list the partitions under an output directory
//!
//! Each command prints a single JSON document on stdout; logs go to stderr.

use anyhow::{Context, Result};
use bronze_core::partition::list_partitions;
use bronze_core::pipeline::ErrorReport;
use bronze_core::{
    run_ingest, run_validate, HttpPageSource, IngestOutcome, IngestRequest, PipelineConfig,
    ValidateOutcome, ValidateRequest,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const DEFAULT_API_URL: &str = "https://jsonplaceholder.typicode.com/posts";
const DEFAULT_OUTPUT_DIR: &str = "./data/bronze";

#[derive(Parser)]
#[command(name = "bronze", about = "Bronze-layer ingestion and validation")]
struct Cli {
    /// TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all pages and write them to the start date's partition.
    Ingest {
        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start_date: String,

        /// End date (YYYY-MM-DD).
        #[arg(long)]
        end_date: String,

        /// Root of the partitioned output.
        #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,

        /// Upstream endpoint.
        #[arg(long, default_value = DEFAULT_API_URL)]
        api_url: String,

        /// Records requested per page.
        #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..))]
        page_size: u32,

        /// Stop after this many pages.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        max_pages: Option<u32>,
    },
    /// Validate a Parquet file or partition directory.
    Validate {
        /// Parquet file or partition directory.
        #[arg(long)]
        input_file: PathBuf,

        /// JSON rules file.
        #[arg(long)]
        rules_file: Option<PathBuf>,

        /// Include a data profile in the report.
        #[arg(long, default_value_t = false)]
        profile: bool,

        /// Stop at the first failing rule.
        #[arg(long, default_value_t = false)]
        strict: bool,
    },
    /// List partitions with file counts and sizes.
    Partitions {
        /// Root of the partitioned output.
        #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .json()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            start_date,
            end_date,
            output_dir,
            api_url,
            page_size,
            max_pages,
        } => {
            let req = IngestRequest {
                start_date,
                end_date,
                output_dir,
                page_size,
                max_pages,
            };
            let outcome = ingest_cmd(cli.config.as_deref(), &api_url, &req);
            println!("{}", serde_json::to_string(&outcome)?);
            Ok(ExitCode::from(outcome.exit_code()))
        }
        Commands::Validate {
            input_file,
            rules_file,
            profile,
            strict,
        } => {
            let req = ValidateRequest {
                input: input_file,
                rules_file,
                profile,
                strict,
            };
            let outcome = validate_cmd(cli.config.as_deref(), &req);
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(ExitCode::from(outcome.exit_code()))
        }
        Commands::Partitions { output_dir } => run_partitions(&output_dir),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, bronze_core::ConfigError> {
    match path {
        Some(path) => PipelineConfig::from_file(path),
        None => Ok(PipelineConfig::default()),
    }
}

fn ingest_cmd(config_path: Option<&Path>, api_url: &str, req: &IngestRequest) -> IngestOutcome {
    let setup = load_config(config_path)
        .map_err(|e| e.to_string())
        .and_then(|config| {
            HttpPageSource::new(api_url, &config.http)
                .map(|source| (config, source))
                .map_err(|e| e.to_string())
        });

    match setup {
        Ok((config, source)) => run_ingest(source, &config, req),
        Err(error) => {
            tracing::error!(error = error.as_str(), "ingestion setup failed");
            IngestOutcome::Error {
                error,
                start_date: req.start_date.clone(),
                end_date: req.end_date.clone(),
            }
        }
    }
}

fn validate_cmd(config_path: Option<&Path>, req: &ValidateRequest) -> ValidateOutcome {
    // The config has no validation section; loading it only surfaces a bad --config.
    if let Err(e) = load_config(config_path) {
        tracing::error!(error = %e, "validation setup failed");
        return ValidateOutcome::Error(ErrorReport {
            status: "error".into(),
            error: e.to_string(),
            file: req.input.display().to_string(),
        });
    }
    run_validate(req)
}

fn run_partitions(output_dir: &Path) -> Result<ExitCode> {
    let partitions = list_partitions(output_dir)
        .with_context(|| format!("failed to list partitions in {}", output_dir.display()))?;

    let rows: Vec<serde_json::Value> = partitions
        .iter()
        .map(|p| {
            serde_json::json!({
                "partition_date": p.partition_date.to_string(),
                "files": p.files,
                "bytes": p.bytes,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(ExitCode::SUCCESS)
}
