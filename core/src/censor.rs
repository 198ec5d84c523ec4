//! Right-censor and continuity enforcement.
//!
//! A cell is observed when its calendar month (cohort + months_since_first)
//! is at or before the observation watermark. Unobserved metrics are missing,
//! never zero.
//!
//! Continuity: within one cohort series ordered by month, once a value is
//! missing every later value is missing too. A gap followed by a value
//! cannot happen under a monotonic watermark, so it is forced away here and
//! treated as a breach when found after enforcement.

use crate::{
    error::{RetentionError, RetentionResult},
    order_lines::OrderLine,
    types::YearMonth,
};
use serde::{Deserialize, Serialize};
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationWindow {
    pub max_observed_month: YearMonth,
}

impl ObservationWindow {
    pub fn new(max_observed_month: YearMonth) -> Self {
        Self { max_observed_month }
    }

    /// Watermark at the month of the latest line timestamp.
    pub fn from_lines(lines: &[OrderLine]) -> Option<Self> {
        lines.iter().map(|l| l.order_ts).max().map(|ts| Self::new(YearMonth::of(&ts)))
    }

    pub fn is_observed(&self, cohort_month: YearMonth, months_since_first: u32) -> bool {
        cohort_month.plus_months(months_since_first) <= self.max_observed_month
    }

    /// The whole horizon after `cohort_month` lies inside the window.
    pub fn covers_horizon(&self, cohort_month: YearMonth, horizon_h: u32) -> bool {
        self.is_observed(cohort_month, horizon_h)
    }

    pub fn mask(&self, cohort_month: YearMonth, months_since_first: u32, value: Option<f64>) -> Option<f64> {
        if self.is_observed(cohort_month, months_since_first) {
            value
        } else {
            None
        }
    }
}

/// Force every value after the first missing one to missing.
/// Returns how many present values were cleared.
pub fn enforce_continuity<T>(series: &mut [Option<T>]) -> usize {
    let Some(first_missing) = series.iter().position(Option::is_none) else {
        return 0;
    };
    let mut cleared = 0;
    for value in &mut series[first_missing..] {
        if value.take().is_some() {
            cleared += 1;
        }
    }
    cleared
}

pub fn is_continuous<T>(series: &[Option<T>]) -> bool {
    match series.iter().position(Option::is_none) {
        Some(first_missing) => series[first_missing..].iter().all(Option::is_none),
        None => true,
    }
}

/// A row of a per-cohort metric series.
pub trait CohortSeriesRow {
    fn series_key(&self) -> String;
    fn months_since_first(&self) -> u32;
    fn metric(&self) -> Option<f64>;
    fn set_metric(&mut self, value: Option<f64>);
}

/// Contiguous index ranges sharing a series key. Rows must already be
/// ordered by (key, month).
fn series_ranges<R: CohortSeriesRow>(rows: &[R]) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    for i in 1..=rows.len() {
        if i == rows.len() || rows[i].series_key() != rows[start].series_key() {
            if start < i {
                ranges.push(start..i);
            }
            start = i;
        }
    }
    ranges
}

fn check_full_horizon<R: CohortSeriesRow>(series: &[R], expected: &[u32]) -> RetentionResult<()> {
    let months: Vec<u32> = series.iter().map(R::months_since_first).collect();
    if months != expected {
        return Err(RetentionError::ContinuityBreach {
            cohort: series.first().map(R::series_key).unwrap_or_default(),
            months,
            expected: expected.to_vec(),
        });
    }
    Ok(())
}

/// Require the full horizon per series, then enforce continuity in place.
/// Never creates rows. Returns the number of values cleared.
pub fn apply_continuity_rule<R: CohortSeriesRow>(rows: &mut [R], expected: &[u32]) -> RetentionResult<usize> {
    let mut cleared = 0;
    for range in series_ranges(rows) {
        let series = &mut rows[range];
        check_full_horizon(series, expected)?;

        let mut values: Vec<Option<f64>> = series.iter().map(R::metric).collect();
        let forced = enforce_continuity(&mut values);
        if forced > 0 {
            log::warn!(
                "continuity: cohort={} cleared {forced} values after first missing month",
                series[0].series_key()
            );
            for (row, value) in series.iter_mut().zip(values) {
                row.set_metric(value);
            }
        }
        cleared += forced;
    }
    Ok(cleared)
}

/// Post-condition check: full horizon per series and no value after a gap.
pub fn check_continuity<R: CohortSeriesRow>(rows: &[R], expected: &[u32]) -> RetentionResult<()> {
    for range in series_ranges(rows) {
        let series = &rows[range];
        check_full_horizon(series, expected)?;

        let values: Vec<Option<f64>> = series.iter().map(R::metric).collect();
        if !is_continuous(&values) {
            let months: Vec<u32> = series
                .iter()
                .filter(|r| r.metric().is_some())
                .map(R::months_since_first)
                .collect();
            let expected_prefix: Vec<u32> = (0..months.len() as u32).collect();
            return Err(RetentionError::ContinuityBreach {
                cohort: series[0].series_key(),
                months,
                expected: expected_prefix,
            });
        }
    }
    Ok(())
}
