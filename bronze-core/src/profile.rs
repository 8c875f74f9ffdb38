//! Descriptive statistics over a loaded table.
//!
//! Read-only; has no effect on validation. Summary statistics are computed
//! for integer and float columns only.

use crate::table::{column_names, is_numeric, missing_count, numeric_values};
use crate::validate::ValidateError;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataProfile {
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<String>,
    pub null_counts: BTreeMap<String, usize>,
    pub dtypes: BTreeMap<String, String>,
    /// Absent when the table has no numeric columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_stats: Option<BTreeMap<String, NumericSummary>>,
}

/// count/mean/std/min/quartiles/max of a numeric column. Statistics are
/// `None` when the column has no values; `std` is the sample deviation and
/// needs at least two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    #[serde(rename = "25%")]
    pub p25: Option<f64>,
    #[serde(rename = "50%")]
    pub p50: Option<f64>,
    #[serde(rename = "75%")]
    pub p75: Option<f64>,
    pub max: Option<f64>,
}

impl NumericSummary {
    pub fn from_values(mut values: Vec<f64>) -> Self {
        let count = values.len();
        if count == 0 {
            return Self {
                count,
                mean: None,
                std: None,
                min: None,
                p25: None,
                p50: None,
                p75: None,
                max: None,
            };
        }

        values.sort_by(f64::total_cmp);
        let n = count as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = (count > 1).then(|| {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1.0)).sqrt()
        });

        Self {
            count,
            mean: Some(mean),
            std,
            min: values.first().copied(),
            p25: Some(quantile(&values, 0.25)),
            p50: Some(quantile(&values, 0.50)),
            p75: Some(quantile(&values, 0.75)),
            max: values.last().copied(),
        }
    }
}

/// Linear-interpolated quantile of non-empty sorted values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Profile a table. An empty table is valid and yields `row_count` 0.
pub fn profile(df: &DataFrame) -> Result<DataProfile, ValidateError> {
    let table_err = |e: PolarsError| ValidateError::Table(e.to_string());

    let columns = column_names(df);
    let mut null_counts = BTreeMap::new();
    let mut dtypes = BTreeMap::new();
    let mut numeric = BTreeMap::new();

    for col in df.get_columns() {
        let name = col.name().to_string();
        null_counts.insert(name.clone(), missing_count(col).map_err(table_err)?);
        dtypes.insert(name.clone(), col.dtype().to_string());
        if is_numeric(col.dtype()) {
            let values = numeric_values(col).map_err(table_err)?;
            numeric.insert(name, NumericSummary::from_values(values));
        }
    }

    Ok(DataProfile {
        row_count: df.height(),
        column_count: df.width(),
        columns,
        null_counts,
        dtypes,
        numeric_stats: (!numeric.is_empty()).then_some(numeric),
    })
}
