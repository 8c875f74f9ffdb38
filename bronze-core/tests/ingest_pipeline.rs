//! End-to-end ingestion tests against in-memory page sources.

use bronze_core::config::PipelineConfig;
use bronze_core::fetch::{FetchError, PageResult, PageSource, RawRecord};
use bronze_core::partition::{partition_files, read_table, PARTITION_DATE_COLUMN};
use bronze_core::pipeline::{
    run_ingest, run_validate, IngestOutcome, IngestRequest, ValidateOutcome, ValidateRequest,
};
use bronze_core::validate::ValidationStatus;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

// ── Fakes ────────────────────────────────────────────────────────────

fn post(id: u32) -> RawRecord {
    match json!({
        "id": id,
        "userId": id % 10 + 1,
        "title": format!("title {id}"),
        "body": format!("body {id}"),
    }) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// Serves `total` posts with ids 1..=total.
struct Posts {
    total: u32,
    requests: AtomicU32,
}

impl Posts {
    fn new(total: u32) -> Self {
        Self {
            total,
            requests: AtomicU32::new(0),
        }
    }
}

impl PageSource for Posts {
    fn name(&self) -> &str {
        "posts"
    }

    fn fetch_page(&self, page: u32, page_size: u32) -> Result<PageResult, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let start = (page - 1) * page_size + 1;
        let end = (start + page_size).min(self.total + 1);
        let records = (start..end).map(post).collect();
        Ok(PageResult::new(records, page, page_size))
    }
}

/// Always returns a full page.
struct Endless;

impl PageSource for Endless {
    fn name(&self) -> &str {
        "endless"
    }

    fn fetch_page(&self, page: u32, page_size: u32) -> Result<PageResult, FetchError> {
        let start = (page - 1) * page_size + 1;
        let records = (start..start + page_size).map(post).collect();
        Ok(PageResult::new(records, page, page_size))
    }
}

/// Fails every request with a transient error.
struct Down {
    attempts: AtomicU32,
}

impl PageSource for Down {
    fn name(&self) -> &str {
        "down"
    }

    fn fetch_page(&self, page: u32, _page_size: u32) -> Result<PageResult, FetchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(FetchError::Transient {
            page,
            reason: "HTTP 503 Service Unavailable".into(),
        })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn fast_config() -> PipelineConfig {
    PipelineConfig::from_toml(
        r#"
[retry]
max_attempts = 3
min_delay_secs = 0.0
max_delay_secs = 0.0
multiplier = 0.0
"#,
    )
    .unwrap()
}

fn request(output_dir: &Path, page_size: u32, max_pages: Option<u32>) -> IngestRequest {
    IngestRequest {
        start_date: "2024-03-01".into(),
        end_date: "2024-03-02".into(),
        output_dir: output_dir.to_path_buf(),
        page_size,
        max_pages,
    }
}

fn partition_of(output_dir: &Path) -> PathBuf {
    output_dir.join("partition_date=2024-03-01")
}

// ── Tests ────────────────────────────────────────────────────────────

#[test]
fn ingest_writes_all_pages_to_start_date_partition() {
    let dir = tempfile::tempdir().unwrap();
    let source = Posts::new(25);

    let outcome = run_ingest(&source, &fast_config(), &request(dir.path(), 10, None));

    let IngestOutcome::Success {
        records_count,
        output_file,
        start_date,
        ..
    } = &outcome
    else {
        panic!("expected success, got {outcome:?}");
    };
    assert_eq!(*records_count, 25);
    assert_eq!(start_date, "2024-03-01");
    assert_eq!(source.requests.load(Ordering::SeqCst), 3);

    let file = PathBuf::from(output_file.as_ref().unwrap());
    assert!(file.is_absolute());
    assert!(file.starts_with(partition_of(dir.path()).canonicalize().unwrap()));

    let df = read_table(&file).unwrap();
    assert_eq!(df.height(), 25);
    for col in [
        "id",
        "userId",
        "title",
        "body",
        "_ingested_at",
        "_source",
        "_schema_version",
        PARTITION_DATE_COLUMN,
    ] {
        assert!(df.column(col).is_ok(), "missing column {col}");
    }
}

#[test]
fn exactly_full_last_page_costs_one_empty_request() {
    let dir = tempfile::tempdir().unwrap();
    let source = Posts::new(20);

    let outcome = run_ingest(&source, &fast_config(), &request(dir.path(), 10, None));

    assert!(matches!(outcome, IngestOutcome::Success { records_count: 20, .. }));
    assert_eq!(source.requests.load(Ordering::SeqCst), 3);
}

#[test]
fn transient_failures_exhaust_attempts_then_report_error() {
    let dir = tempfile::tempdir().unwrap();
    let source = Down {
        attempts: AtomicU32::new(0),
    };

    let outcome = run_ingest(&source, &fast_config(), &request(dir.path(), 10, None));

    assert_eq!(source.attempts.load(Ordering::SeqCst), 3);
    assert_ne!(outcome.exit_code(), 0);
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["status"], "error");
    assert_eq!(json["start_date"], "2024-03-01");
    assert!(json["error"].as_str().unwrap().contains("503"));
    assert!(!partition_of(dir.path()).exists());
}

#[test]
fn max_pages_truncates_without_error() {
    let dir = tempfile::tempdir().unwrap();

    let outcome = run_ingest(Endless, &fast_config(), &request(dir.path(), 5, Some(2)));

    assert!(matches!(outcome, IngestOutcome::Success { records_count: 10, .. }));
    assert_eq!(outcome.exit_code(), 0);
}

#[test]
fn empty_upstream_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();

    let outcome = run_ingest(Posts::new(0), &fast_config(), &request(dir.path(), 10, None));

    match outcome {
        IngestOutcome::Success {
            records_count,
            output_file,
            ..
        } => {
            assert_eq!(records_count, 0);
            assert_eq!(output_file, None);
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert!(!partition_of(dir.path()).exists());
}

#[test]
fn reversed_dates_are_rejected_before_fetching() {
    let dir = tempfile::tempdir().unwrap();
    let source = Posts::new(5);
    let mut req = request(dir.path(), 10, None);
    req.end_date = "2024-02-01".into();

    let outcome = run_ingest(&source, &fast_config(), &req);

    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(source.requests.load(Ordering::SeqCst), 0);
}

#[test]
fn repeated_runs_add_files_and_validation_sees_the_union() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config();
    let req = request(dir.path(), 10, None);

    let first = run_ingest(Posts::new(12), &config, &req);
    let second = run_ingest(Posts::new(12), &config, &req);

    let (
        IngestOutcome::Success {
            output_file: Some(a),
            ..
        },
        IngestOutcome::Success {
            output_file: Some(b),
            ..
        },
    ) = (&first, &second)
    else {
        panic!("expected two written files: {first:?} {second:?}");
    };
    assert_ne!(a, b);

    let partition = partition_of(dir.path());
    assert_eq!(partition_files(&partition).unwrap().len(), 2);

    // Each file on its own is clean.
    let single = run_validate(&ValidateRequest {
        input: PathBuf::from(a),
        rules_file: None,
        profile: false,
        strict: false,
    });
    assert_eq!(single.exit_code(), 0);

    // The partition as a whole repeats every id once.
    let whole = run_validate(&ValidateRequest {
        input: partition,
        rules_file: None,
        profile: true,
        strict: false,
    });
    let ValidateOutcome::Report(report) = &whole else {
        panic!("expected report, got {whole:?}");
    };
    assert_eq!(report.rows, 24);
    assert_eq!(report.validation, ValidationStatus::Failed);
    assert_eq!(report.errors, vec!["Column 'id' has 12 duplicate values"]);
    assert_eq!(report.profile.as_ref().unwrap().row_count, 24);
    assert_eq!(whole.exit_code(), 1);
}
