//! Cohort-level aggregation and the eligibility gate.
//!
//! A cohort is eligible iff n_customers_m0 >= min_cohort_n, its month-0
//! valid gross is positive, and its full horizon lies inside the
//! observation window. The net retention proxy is defined only for
//! eligible cohorts on observed cells.

use crate::{
    activity_grid::ActivityGrid,
    censor::{apply_continuity_rule, CohortSeriesRow, ObservationWindow},
    config::PolicyConfig,
    error::RetentionResult,
    types::YearMonth,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Month-0 population and denominator for one cohort.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CohortBaseline {
    pub cohort_month:             YearMonth,
    pub n_customers_m0:           u64,
    pub denom_month0_gross_valid: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortAggregate {
    pub cohort_month:             YearMonth,
    pub months_since_first:       u32,
    pub n_customers_m0:           u64,
    pub denom_month0_gross_valid: f64,
    pub net_revenue_proxy_total:  f64,
    pub net_retention_proxy:      Option<f64>,
    pub is_observed:              bool,
    pub eligible_cohort:          bool,
    pub selected_for_plot:        bool,
}

impl CohortSeriesRow for CohortAggregate {
    fn series_key(&self) -> String {
        self.cohort_month.label()
    }
    fn months_since_first(&self) -> u32 {
        self.months_since_first
    }
    fn metric(&self) -> Option<f64> {
        self.net_retention_proxy
    }
    fn set_metric(&mut self, value: Option<f64>) {
        self.net_retention_proxy = value;
    }
}

/// Input row for the cohort selector: one per cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibleCohort {
    pub cohort_month:             YearMonth,
    pub n0:                       u64,
    pub denom_month0_gross_valid: f64,
    pub eligible_cohort:          bool,
    /// Missing when the month-2 cell is not observed.
    pub m2_logo_retention:        Option<f64>,
}

pub fn cohort_baselines(grid: &ActivityGrid) -> BTreeMap<YearMonth, CohortBaseline> {
    let mut out: BTreeMap<YearMonth, CohortBaseline> = BTreeMap::new();
    for cell in grid.at_month(0) {
        let entry = out.entry(cell.cohort_month).or_insert(CohortBaseline {
            cohort_month:             cell.cohort_month,
            n_customers_m0:           0,
            denom_month0_gross_valid: 0.0,
        });
        entry.n_customers_m0 += 1;
        entry.denom_month0_gross_valid += cell.gross_revenue_valid;
    }
    out
}

pub fn is_eligible(baseline: &CohortBaseline, window: &ObservationWindow, policy: &PolicyConfig) -> bool {
    baseline.n_customers_m0 >= policy.min_cohort_n
        && baseline.denom_month0_gross_valid > 0.0
        && window.covers_horizon(baseline.cohort_month, policy.horizon_h)
}

/// Per-(cohort, month) aggregates with censoring and continuity applied.
/// Ordered by (cohort_month, months_since_first).
pub fn aggregate_cohorts(
    grid: &ActivityGrid,
    window: &ObservationWindow,
    policy: &PolicyConfig,
) -> RetentionResult<Vec<CohortAggregate>> {
    let baselines = cohort_baselines(grid);

    let mut net_by_cell: BTreeMap<(YearMonth, u32), f64> = BTreeMap::new();
    for cell in &grid.cells {
        *net_by_cell.entry((cell.cohort_month, cell.months_since_first)).or_insert(0.0) +=
            cell.net_revenue_proxy_total;
    }

    let mut rows = Vec::with_capacity(net_by_cell.len());
    for ((cohort_month, m), net_total) in net_by_cell {
        let Some(baseline) = baselines.get(&cohort_month) else {
            continue;
        };
        let eligible = is_eligible(baseline, window, policy);
        let observed = window.is_observed(cohort_month, m);
        let net_retention_proxy = if eligible && observed {
            Some(net_total / baseline.denom_month0_gross_valid)
        } else {
            None
        };
        rows.push(CohortAggregate {
            cohort_month,
            months_since_first: m,
            n_customers_m0: baseline.n_customers_m0,
            denom_month0_gross_valid: baseline.denom_month0_gross_valid,
            net_revenue_proxy_total: net_total,
            net_retention_proxy,
            is_observed: observed,
            eligible_cohort: eligible,
            selected_for_plot: false,
        });
    }

    apply_continuity_rule(&mut rows, &policy.horizon_months())?;

    let eligible_count = baselines.values().filter(|b| is_eligible(b, window, policy)).count();
    let zero_denominator = baselines.values().filter(|b| b.denom_month0_gross_valid <= 0.0).count();
    log::info!(
        "cohort aggregates: cohorts={} eligible={} zero_denominator={} max_observed_month={}",
        baselines.len(),
        eligible_count,
        zero_denominator,
        window.max_observed_month
    );
    Ok(rows)
}

/// Month-2 logo retention per cohort. Missing when month 2 is unobserved.
pub fn m2_logo_retention(grid: &ActivityGrid, window: &ObservationWindow) -> BTreeMap<YearMonth, Option<f64>> {
    let mut tallies: BTreeMap<YearMonth, (u64, u64)> = BTreeMap::new();
    for cell in grid.at_month(2) {
        let t = tallies.entry(cell.cohort_month).or_insert((0, 0));
        t.0 += 1;
        if cell.is_retained_logo {
            t.1 += 1;
        }
    }
    tallies
        .into_iter()
        .map(|(cohort, (n, retained))| {
            let value = (n > 0 && window.is_observed(cohort, 2)).then(|| retained as f64 / n as f64);
            (cohort, value)
        })
        .collect()
}

/// One selector input row per cohort, joining month-0 aggregates with month-2
/// logo retention.
pub fn eligible_cohorts(
    aggregates: &[CohortAggregate],
    m2_logo: &BTreeMap<YearMonth, Option<f64>>,
) -> Vec<EligibleCohort> {
    aggregates
        .iter()
        .filter(|a| a.months_since_first == 0)
        .map(|a| EligibleCohort {
            cohort_month:             a.cohort_month,
            n0:                       a.n_customers_m0,
            denom_month0_gross_valid: a.denom_month0_gross_valid,
            eligible_cohort:          a.eligible_cohort,
            m2_logo_retention:        m2_logo.get(&a.cohort_month).copied().flatten(),
        })
        .collect()
}

pub fn mark_selected(aggregates: &mut [CohortAggregate], selected: &[YearMonth]) {
    let selected: BTreeSet<&YearMonth> = selected.iter().collect();
    for row in aggregates.iter_mut() {
        row.selected_for_plot = selected.contains(&row.cohort_month);
    }
}
