//! Column-wise cleaning of a raw batch
//!
//! Every rule here is evaluated over the whole batch: medians and quartiles
//! come from the rows submitted together, not from training statistics.

use super::stats::{clamp_outliers, median};
use super::{ColumnPolicy, Correction};
use crate::error::{ChurnError, Result};
use crate::models::{Column, RawBatch, OVER_LIMIT_LEVELS};
use tracing::debug;

/// Highest valid `download_over_limit` value
const MAX_OVER_LIMIT: f64 = (OVER_LIMIT_LEVELS - 1) as f64;

/// Fully repaired numeric columns of one batch
#[derive(Debug, Clone)]
pub(crate) struct CleanColumns {
    pub is_tv_subscriber: Vec<f64>,
    pub is_movie_package_subscriber: Vec<f64>,
    pub subscription_age: Vec<f64>,
    pub remaining_contract: Vec<f64>,
    pub service_failure_count: Vec<f64>,
    pub download_avg: Vec<f64>,
    pub upload_avg: Vec<f64>,
    pub download_over_limit: Vec<usize>,
}

/// Apply the column policy, coerce every feature column and repair values
pub(crate) fn clean(
    batch: &RawBatch,
    policy: ColumnPolicy,
    corrections: &mut Vec<Correction>,
) -> Result<CleanColumns> {
    let missing = batch.missing_required();
    if !missing.is_empty() {
        match policy {
            ColumnPolicy::Strict => {
                return Err(ChurnError::MissingFeature {
                    columns: missing.iter().map(|c| c.name().to_string()).collect(),
                });
            }
            ColumnPolicy::Lenient => {
                for column in &missing {
                    corrections.push(Correction::ColumnFilled {
                        column: *column,
                        value: 0.0,
                    });
                }
            }
        }
    }

    let remaining_contract = coerce(batch, Column::RemainingContract)?;
    let download_avg = coerce(batch, Column::DownloadAvg)?;
    let upload_avg = coerce(batch, Column::UploadAvg)?;
    let subscription_age = coerce(batch, Column::SubscriptionAge)?;
    let is_tv_subscriber = coerce(batch, Column::IsTvSubscriber)?;
    let is_movie_package_subscriber = coerce(batch, Column::IsMoviePackageSubscriber)?;
    let service_failure_count = coerce(batch, Column::ServiceFailureCount)?;
    let over_limit = coerce(batch, Column::DownloadOverLimit)?;

    let remaining_contract = fill_constant(Column::RemainingContract, &remaining_contract, 0.0, corrections);
    let download_avg = fill_median(Column::DownloadAvg, &download_avg, corrections);
    let upload_avg = fill_median(Column::UploadAvg, &upload_avg, corrections);
    let subscription_age = repair_negative(Column::SubscriptionAge, &subscription_age, corrections)?;

    let download_avg = clamp(Column::DownloadAvg, download_avg, corrections);
    let upload_avg = clamp(Column::UploadAvg, upload_avg, corrections);

    let is_tv_subscriber = fill_constant(Column::IsTvSubscriber, &is_tv_subscriber, 0.0, corrections);
    let is_movie_package_subscriber = fill_constant(
        Column::IsMoviePackageSubscriber,
        &is_movie_package_subscriber,
        0.0,
        corrections,
    );
    let service_failure_count =
        fill_constant(Column::ServiceFailureCount, &service_failure_count, 0.0, corrections);
    let over_limit = fill_constant(Column::DownloadOverLimit, &over_limit, 0.0, corrections);
    let download_over_limit = clip_over_limit(&over_limit, corrections);

    Ok(CleanColumns {
        is_tv_subscriber,
        is_movie_package_subscriber,
        subscription_age,
        remaining_contract,
        service_failure_count,
        download_avg,
        upload_avg,
        download_over_limit,
    })
}

/// Numeric values of one column; an absent column reads as all zeros
fn coerce(batch: &RawBatch, column: Column) -> Result<Vec<Option<f64>>> {
    if !batch.has_column(column) {
        return Ok(vec![Some(0.0); batch.len()]);
    }
    batch
        .records()
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let cell = record.get(column).cloned().unwrap_or_default();
            cell.to_number().map_err(|value| ChurnError::Coercion {
                column: column.name().to_string(),
                row: i + 1,
                value,
            })
        })
        .collect()
}

fn fill(values: &[Option<f64>], with: f64) -> (Vec<f64>, usize) {
    let mut filled = 0;
    let out = values
        .iter()
        .map(|v| match v {
            Some(x) => *x,
            None => {
                filled += 1;
                with
            }
        })
        .collect();
    (out, filled)
}

fn fill_constant(
    column: Column,
    values: &[Option<f64>],
    with: f64,
    corrections: &mut Vec<Correction>,
) -> Vec<f64> {
    let (out, rows) = fill(values, with);
    if rows > 0 {
        corrections.push(Correction::NullsFilled { column, rows, value: with });
    }
    out
}

fn fill_median(column: Column, values: &[Option<f64>], corrections: &mut Vec<Correction>) -> Vec<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    // An entirely null column has no median; fall back to zero.
    let with = median(&present).unwrap_or(0.0);
    fill_constant(column, values, with, corrections)
}

/// Replace negative or missing values with the median of the non-negative ones
fn repair_negative(
    column: Column,
    values: &[Option<f64>],
    corrections: &mut Vec<Correction>,
) -> Result<Vec<f64>> {
    let valid: Vec<f64> = values.iter().flatten().copied().filter(|v| *v >= 0.0).collect();
    let needs_repair = values.iter().filter(|v| !matches!(v, Some(x) if *x >= 0.0)).count();
    if needs_repair == 0 {
        return Ok(values.iter().flatten().copied().collect());
    }
    let Some(with) = median(&valid) else {
        return Err(ChurnError::Data(format!(
            "column '{}' has no non-negative values to repair {} row(s) from",
            column, needs_repair
        )));
    };
    let out = values
        .iter()
        .map(|v| match v {
            Some(x) if *x >= 0.0 => *x,
            _ => with,
        })
        .collect();
    corrections.push(Correction::NegativesReplaced {
        column,
        rows: needs_repair,
        value: with,
    });
    Ok(out)
}

fn clamp(column: Column, mut values: Vec<f64>, corrections: &mut Vec<Correction>) -> Vec<f64> {
    if let Some(summary) = clamp_outliers(&mut values) {
        debug!(
            column = %column,
            lower = summary.lower,
            upper = summary.upper,
            "Computed outlier fences"
        );
        if summary.clamped > 0 {
            corrections.push(Correction::OutliersClamped {
                column,
                rows: summary.clamped,
                lower: summary.lower,
                upper: summary.upper,
            });
        }
    }
    values
}

/// Truncate to an integer level and clip into `0..=7`
fn clip_over_limit(values: &[f64], corrections: &mut Vec<Correction>) -> Vec<usize> {
    let mut clipped = 0;
    let levels = values
        .iter()
        .map(|v| {
            let level = v.trunc();
            let bounded = level.clamp(0.0, MAX_OVER_LIMIT);
            if bounded != level {
                clipped += 1;
            }
            bounded as usize
        })
        .collect();
    if clipped > 0 {
        corrections.push(Correction::OverLimitClipped { rows: clipped });
    }
    levels
}
