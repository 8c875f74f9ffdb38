//! Column helpers shared by the validation engine and the profiler.
//!
//! "Missing" follows the usual dataframe convention: nulls, plus NaN in
//! float columns.

use polars::prelude::*;

/// Column names in table order.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|s| s.to_string()).collect()
}

/// Integer and float columns count as numeric; booleans do not.
pub fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int32
            | DataType::Int64
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

fn is_float(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Float32 | DataType::Float64)
}

/// Number of nulls, plus NaNs for float columns.
pub fn missing_count(col: &Column) -> PolarsResult<usize> {
    let nulls = col.null_count();
    if !is_float(col.dtype()) {
        return Ok(nulls);
    }
    let series = col.as_materialized_series().cast(&DataType::Float64)?;
    let nans = series
        .f64()?
        .into_iter()
        .filter(|v| v.is_some_and(f64::is_nan))
        .count();
    Ok(nulls + nans)
}

/// Non-missing values of a numeric column as f64, in row order.
pub fn numeric_values(col: &Column) -> PolarsResult<Vec<f64>> {
    let series = col.as_materialized_series().cast(&DataType::Float64)?;
    Ok(series
        .f64()?
        .into_iter()
        .flatten()
        .filter(|v| !v.is_nan())
        .collect())
}

/// Rows beyond the first occurrence of each value. Missing values compare
/// equal to each other.
pub fn duplicate_count(col: &Column) -> PolarsResult<usize> {
    let unique = col.as_materialized_series().n_unique()?;
    Ok(col.len().saturating_sub(unique))
}
