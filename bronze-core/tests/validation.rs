//! Validation engine and `run_validate` against on-disk Parquet files.

use bronze_core::pipeline::{run_validate, ValidateOutcome, ValidateRequest};
use bronze_core::validate::{
    validate, validate_strict, RuleSet, Threshold, ValidationRule, ValidationStatus,
};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

fn write_parquet(dir: &Path, name: &str, mut df: DataFrame) -> PathBuf {
    let path = dir.join(name);
    let file = File::create(&path).unwrap();
    ParquetWriter::new(file).finish(&mut df).unwrap();
    path
}

fn posts() -> DataFrame {
    DataFrame::new(vec![
        Column::new("id".into(), vec![Some(1i64), Some(2), Some(3), Some(4)]),
        Column::new("userId".into(), vec![Some(1i64), Some(1), None, Some(12)]),
        Column::new("title".into(), vec![Some("a"), None, Some("c"), Some("d")]),
        Column::new(
            "_ingested_at".into(),
            vec!["2024-03-01T00:00:00.000000Z"; 4],
        ),
    ])
    .unwrap()
}

fn request(input: PathBuf, rules_file: Option<PathBuf>, strict: bool) -> ValidateRequest {
    ValidateRequest {
        input,
        rules_file,
        profile: false,
        strict,
    }
}

#[test]
fn duplicate_ids_fail_default_rules() {
    let df = DataFrame::new(vec![
        Column::new("id".into(), vec![1i64, 1]),
        Column::new("_ingested_at".into(), vec!["t1", "t2"]),
    ])
    .unwrap();

    let result = validate(&df, &RuleSet::default()).unwrap();

    assert_eq!(result.status, ValidationStatus::Failed);
    assert_eq!(result.errors, vec!["Column 'id' has 1 duplicate values"]);
    assert!(!result.errors.iter().any(|e| e.contains("null") || e.contains("Missing")));
}

#[test]
fn empty_table_fails_min_rows_only() {
    let df = DataFrame::new(vec![
        Column::new("id".into(), Vec::<i64>::new()),
        Column::new("_ingested_at".into(), Vec::<String>::new()),
    ])
    .unwrap();
    let rules = RuleSet::new(vec![ValidationRule::MinRows(1)]);

    let result = validate(&df, &rules).unwrap();

    assert_eq!(result.errors, vec!["Expected at least 1 rows, got 0"]);
    assert_eq!(result.error_count, 1);
    assert_eq!(result.rules_applied, vec!["min_rows"]);
}

#[test]
fn value_range_ignores_nulls() {
    let mut ranges = BTreeMap::new();
    ranges.insert("userId".to_string(), [Threshold::from(1), Threshold::from(10)]);
    let rules = RuleSet::new(vec![ValidationRule::ValueRange(ranges)]);

    let result = validate(&posts(), &rules).unwrap();

    assert_eq!(
        result.errors,
        vec!["Column 'userId' has 1 values out of range [1, 10]"]
    );
}

#[test]
fn strict_mode_stops_at_first_failing_rule() {
    let rules = RuleSet::new(vec![
        ValidationRule::NotNull(vec!["title".into()]),
        ValidationRule::MinRows(100),
    ]);

    let lenient = validate(&posts(), &rules).unwrap();
    let strict = validate_strict(&posts(), &rules).unwrap();

    assert_eq!(lenient.error_count, 2);
    assert_eq!(strict.errors, vec!["Column 'title' has 1 null values"]);
    assert_eq!(strict.status, ValidationStatus::Failed);
}

#[test]
fn report_from_file_with_rules_and_profile() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_parquet(dir.path(), "posts.parquet", posts());
    let rules_path = dir.path().join("rules.json");
    std::fs::write(
        &rules_path,
        r#"{
            "required_columns": ["id", "title", "body"],
            "max_null_percentage": {"title": 10.0},
            "not_a_rule": true
        }"#,
    )
    .unwrap();

    let outcome = run_validate(&ValidateRequest {
        input: input.clone(),
        rules_file: Some(rules_path),
        profile: true,
        strict: false,
    });

    let ValidateOutcome::Report(report) = &outcome else {
        panic!("expected report, got {outcome:?}");
    };
    assert_eq!(report.file, input.display().to_string());
    assert_eq!(report.rows, 4);
    assert_eq!(report.column_count, 4);
    assert_eq!(report.columns, vec!["id", "userId", "title", "_ingested_at"]);
    assert_eq!(
        report.errors,
        vec![
            "Missing required columns: ['body']",
            "Column 'title' has 25.0% null values (max allowed: 10.0%)",
        ]
    );
    assert_eq!(
        report.rules_applied,
        vec!["required_columns", "max_null_percentage"]
    );
    assert_eq!(outcome.exit_code(), 1);

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["validation"], "failed");
    assert_eq!(json["profile"]["null_counts"]["userId"], 1);
    assert_eq!(json["profile"]["numeric_stats"]["id"]["count"], 4);
}

#[test]
fn passing_file_exits_zero_without_profile_key() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_parquet(dir.path(), "posts.parquet", posts());

    let outcome = run_validate(&request(input, None, false));

    assert_eq!(outcome.exit_code(), 0);
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["validation"], "passed");
    assert_eq!(json["error_count"], 0);
    assert!(json.get("profile").is_none());
}

#[test]
fn range_on_text_column_is_execution_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_parquet(dir.path(), "posts.parquet", posts());
    let rules_path = dir.path().join("rules.json");
    std::fs::write(&rules_path, r#"{"value_ranges": {"title": [0, 1]}}"#).unwrap();

    let outcome = run_validate(&request(input.clone(), Some(rules_path), false));

    assert_eq!(outcome.exit_code(), 2);
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["status"], "error");
    assert_eq!(json["file"], input.display().to_string());
}

#[test]
fn malformed_rules_file_is_execution_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_parquet(dir.path(), "posts.parquet", posts());
    let rules_path = dir.path().join("rules.json");
    std::fs::write(&rules_path, "{ not json").unwrap();

    let outcome = run_validate(&request(input, Some(rules_path), false));

    assert!(matches!(outcome, ValidateOutcome::Error(_)));
    assert_eq!(outcome.exit_code(), 2);
}

#[test]
fn unreadable_parquet_is_execution_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.parquet");
    std::fs::write(&input, b"not parquet").unwrap();

    let outcome = run_validate(&request(input, None, false));

    assert_eq!(outcome.exit_code(), 2);
}
