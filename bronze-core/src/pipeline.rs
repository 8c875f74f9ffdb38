//! Command orchestration: ingest and validate.
//!
//! Both entry points never fail: every error is folded into an outcome value
//! that serializes to the JSON object printed on stdout, and each outcome
//! maps to a process exit code.

use crate::config::{ConfigError, PipelineConfig};
use crate::fetch::{FetchError, Fetcher, PageSource, Paginator};
use crate::partition::{read_table, PartitionWriter, StorageError};
use crate::profile::{profile, DataProfile};
use crate::table::column_names;
use crate::transform::{format_timestamp, Transformer};
use crate::validate::{validate, validate_strict, RuleSet, ValidateError, ValidationStatus};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const EXIT_OK: u8 = 0;
pub const EXIT_VALIDATION_FAILED: u8 = 1;
pub const EXIT_INGEST_FAILED: u8 = 1;
pub const EXIT_EXECUTION_ERROR: u8 = 2;

/// Any failure that aborts a command.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid date '{value}': expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("end date {end} is before start date {start}")]
    DateRange { start: NaiveDate, end: NaiveDate },

    #[error("File not found: {0}")]
    InputNotFound(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validate(#[from] ValidateError),
}

fn parse_date(value: &str) -> Result<NaiveDate, PipelineError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| PipelineError::InvalidDate {
        value: value.to_string(),
    })
}

// ── Ingest ───────────────────────────────────────────────────────────

/// Parameters of one ingestion run. Dates stay as given so they can be echoed
/// back even when they fail to parse.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub start_date: String,
    pub end_date: String,
    pub output_dir: PathBuf,
    pub page_size: u32,
    pub max_pages: Option<u32>,
}

/// JSON result of an ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IngestOutcome {
    Success {
        records_count: usize,
        output_file: Option<String>,
        start_date: String,
        end_date: String,
        ingestion_timestamp: String,
    },
    Error {
        error: String,
        start_date: String,
        end_date: String,
    },
}

impl IngestOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            IngestOutcome::Success { .. } => EXIT_OK,
            IngestOutcome::Error { .. } => EXIT_INGEST_FAILED,
        }
    }
}

/// Fetch → transform → write. The partition written is the start date's.
pub fn run_ingest<S: PageSource>(
    source: S,
    config: &PipelineConfig,
    req: &IngestRequest,
) -> IngestOutcome {
    tracing::info!(
        start_date = req.start_date.as_str(),
        end_date = req.end_date.as_str(),
        output_dir = %req.output_dir.display(),
        "starting ingestion"
    );

    match ingest(source, config, req) {
        Ok((records_count, output_file)) => IngestOutcome::Success {
            records_count,
            output_file: output_file.map(|p| p.display().to_string()),
            start_date: req.start_date.clone(),
            end_date: req.end_date.clone(),
            ingestion_timestamp: format_timestamp(Utc::now()),
        },
        Err(e) => {
            tracing::error!(error = %e, "ingestion failed");
            IngestOutcome::Error {
                error: e.to_string(),
                start_date: req.start_date.clone(),
                end_date: req.end_date.clone(),
            }
        }
    }
}

fn ingest<S: PageSource>(
    source: S,
    config: &PipelineConfig,
    req: &IngestRequest,
) -> Result<(usize, Option<PathBuf>), PipelineError> {
    let start = parse_date(&req.start_date)?;
    let end = parse_date(&req.end_date)?;
    if end < start {
        return Err(PipelineError::DateRange { start, end });
    }

    let fetcher = Fetcher::new(source, config.retry.policy());
    let paginator = Paginator::new(fetcher, req.page_size, req.max_pages);
    let fetched = paginator.fetch_all()?;

    let transformer = Transformer::new(config.transform.clone(), Utc::now());
    let records = transformer.transform(&fetched.records);

    let writer = PartitionWriter::new(&req.output_dir, &config.output);
    let output_file = writer.write(&records, start)?;

    Ok((records.len(), output_file))
}

// ── Validate ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ValidateRequest {
    /// A Parquet file or a partition directory.
    pub input: PathBuf,
    /// JSON rules file; the default rule set applies when absent.
    pub rules_file: Option<PathBuf>,
    pub profile: bool,
    /// Stop at the first failing rule.
    pub strict: bool,
}

/// JSON report of a validation run that reached the rule engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub file: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub column_count: usize,
    pub validation: ValidationStatus,
    pub errors: Vec<String>,
    pub error_count: usize,
    pub validated_at: String,
    pub rules_applied: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<DataProfile>,
}

/// JSON report of an execution error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub status: String,
    pub error: String,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ValidateOutcome {
    Report(ValidationReport),
    Error(ErrorReport),
}

impl ValidateOutcome {
    /// 0 passed, 1 validation failed, 2 execution error.
    pub fn exit_code(&self) -> u8 {
        match self {
            ValidateOutcome::Report(r) if r.validation == ValidationStatus::Passed => EXIT_OK,
            ValidateOutcome::Report(_) => EXIT_VALIDATION_FAILED,
            ValidateOutcome::Error(_) => EXIT_EXECUTION_ERROR,
        }
    }
}

/// Load rules and table, validate, optionally profile.
pub fn run_validate(req: &ValidateRequest) -> ValidateOutcome {
    let file = req.input.display().to_string();
    match validate_file(req) {
        Ok(report) => {
            if report.validation == ValidationStatus::Passed {
                tracing::info!(file = file.as_str(), "validation passed");
            } else {
                tracing::warn!(
                    file = file.as_str(),
                    error_count = report.error_count,
                    "validation failed"
                );
            }
            ValidateOutcome::Report(report)
        }
        Err(e) => {
            tracing::error!(file = file.as_str(), error = %e, "validation could not run");
            ValidateOutcome::Error(ErrorReport {
                status: "error".into(),
                error: e.to_string(),
                file,
            })
        }
    }
}

fn load_rules(path: Option<&Path>) -> Result<RuleSet, PipelineError> {
    match path {
        Some(path) => {
            let rules = RuleSet::from_file(path)?;
            tracing::info!(path = %path.display(), "loaded rules");
            Ok(rules)
        }
        None => {
            tracing::info!("using default validation rules");
            Ok(RuleSet::default())
        }
    }
}

fn validate_file(req: &ValidateRequest) -> Result<ValidationReport, PipelineError> {
    if !req.input.exists() {
        return Err(PipelineError::InputNotFound(req.input.display().to_string()));
    }
    let rules = load_rules(req.rules_file.as_deref())?;

    let df = read_table(&req.input)?;
    tracing::info!(rows = df.height(), columns = df.width(), "loaded table");

    let result = if req.strict {
        validate_strict(&df, &rules)?
    } else {
        validate(&df, &rules)?
    };
    let profile = if req.profile { Some(profile(&df)?) } else { None };

    Ok(ValidationReport {
        file: req.input.display().to_string(),
        rows: df.height(),
        columns: column_names(&df),
        column_count: df.width(),
        validation: result.status,
        errors: result.errors,
        error_count: result.error_count,
        validated_at: format_timestamp(Utc::now()),
        rules_applied: result.rules_applied,
        profile,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_outcome_serializes_status_first() {
        let outcome = IngestOutcome::Error {
            error: "boom".into(),
            start_date: "2024-01-01".into(),
            end_date: "2024-01-02".into(),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.starts_with(r#"{"status":"error""#));
        assert_eq!(outcome.exit_code(), EXIT_INGEST_FAILED);
    }

    #[test]
    fn validate_error_report_shape() {
        let outcome = ValidateOutcome::Error(ErrorReport {
            status: "error".into(),
            error: "File not found: x".into(),
            file: "x".into(),
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["file"], "x");
        assert_eq!(outcome.exit_code(), EXIT_EXECUTION_ERROR);
    }

    #[test]
    fn missing_input_is_execution_error() {
        let outcome = run_validate(&ValidateRequest {
            input: PathBuf::from("/nonexistent/data.parquet"),
            rules_file: None,
            profile: false,
            strict: false,
        });
        match &outcome {
            ValidateOutcome::Error(e) => {
                assert_eq!(e.error, "File not found: /nonexistent/data.parquet")
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(outcome.exit_code(), 2);
    }

    #[test]
    fn bad_dates_are_reported_not_panicked() {
        assert!(matches!(
            parse_date("2024-13-01"),
            Err(PipelineError::InvalidDate { .. })
        ));
        assert!(parse_date("2024-01-31").is_ok());
    }
}
