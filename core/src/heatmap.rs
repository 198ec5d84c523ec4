//! Heatmap tables: logo retention (chart 1) and net retention proxy (chart 2).
//!
//! Both are full-horizon grids per cohort with right-censored cells missing.
//! The net heatmap additionally suppresses cells with fewer than
//! `min_cohort_n` active customers and carries an `ALL_WEIGHTED` summary row
//! weighted by month-0 gross.

use crate::{
    activity_grid::ActivityGrid,
    censor::{apply_continuity_rule, CohortSeriesRow, ObservationWindow},
    config::PolicyConfig,
    eligibility::cohort_baselines,
    error::RetentionResult,
    types::{YearMonth, ALL_WEIGHTED},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogoHeatmapCell {
    pub cohort_month:       YearMonth,
    pub months_since_first: u32,
    pub n_customers:        u64,
    pub is_observed:        bool,
    pub logo_retention:     Option<f64>,
}

impl CohortSeriesRow for LogoHeatmapCell {
    fn series_key(&self) -> String {
        self.cohort_month.label()
    }
    fn months_since_first(&self) -> u32 {
        self.months_since_first
    }
    fn metric(&self) -> Option<f64> {
        self.logo_retention
    }
    fn set_metric(&mut self, value: Option<f64>) {
        self.logo_retention = value;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetHeatmapCell {
    /// `YYYY-MM`, or `ALL_WEIGHTED` for the summary row.
    pub cohort_month:        String,
    pub months_since_first:  u32,
    pub net_retention_proxy: Option<f64>,
    /// Customers with any activity signal in the month. Zero on the summary row.
    pub n_customers:         u64,
    pub n_customers_m0:      u64,
}

impl CohortSeriesRow for NetHeatmapCell {
    fn series_key(&self) -> String {
        self.cohort_month.clone()
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

pub fn build_logo_heatmap(
    grid: &ActivityGrid,
    window: &ObservationWindow,
    policy: &PolicyConfig,
) -> RetentionResult<Vec<LogoHeatmapCell>> {
    let mut tallies: BTreeMap<(YearMonth, u32), (u64, u64)> = BTreeMap::new();
    for cell in &grid.cells {
        let t = tallies.entry((cell.cohort_month, cell.months_since_first)).or_insert((0, 0));
        t.0 += 1;
        if cell.is_retained_logo {
            t.1 += 1;
        }
    }

    let mut rows: Vec<LogoHeatmapCell> = tallies
        .into_iter()
        .map(|((cohort_month, m), (n, retained))| {
            let observed = window.is_observed(cohort_month, m);
            LogoHeatmapCell {
                cohort_month,
                months_since_first: m,
                n_customers: n,
                is_observed: observed,
                logo_retention: observed.then(|| retained as f64 / n as f64),
            }
        })
        .collect();
    apply_continuity_rule(&mut rows, &policy.horizon_months())?;
    Ok(rows)
}

#[derive(Default, Clone, Copy)]
struct NetTotals {
    net:    f64,
    active: u64,
}

pub fn build_net_heatmap(
    grid: &ActivityGrid,
    window: &ObservationWindow,
    policy: &PolicyConfig,
) -> RetentionResult<Vec<NetHeatmapCell>> {
    let baselines = cohort_baselines(grid);

    let mut totals: BTreeMap<(YearMonth, u32), NetTotals> = BTreeMap::new();
    for cell in &grid.cells {
        let t = totals.entry((cell.cohort_month, cell.months_since_first)).or_default();
        t.net += cell.net_revenue_proxy_total;
        if cell.orders_count_valid > 0 || cell.net_revenue_proxy_total != 0.0 {
            t.active += 1;
        }
    }

    // Summary row: sum(net) / sum(month-0 gross) over cells that survive
    // masking and suppression, taken before the per-cohort continuity pass.
    let mut weighted: BTreeMap<u32, (f64, f64)> =
        policy.horizon_months().into_iter().map(|m| (m, (0.0, 0.0))).collect();
    let mut rows = Vec::with_capacity(totals.len());
    for ((cohort_month, m), t) in &totals {
        let Some(baseline) = baselines.get(cohort_month) else {
            continue;
        };
        let reportable = window.is_observed(*cohort_month, *m)
            && baseline.denom_month0_gross_valid > 0.0
            && t.active >= policy.min_cohort_n;
        if reportable {
            if let Some(w) = weighted.get_mut(m) {
                w.0 += t.net;
                w.1 += baseline.denom_month0_gross_valid;
            }
        }
        rows.push(NetHeatmapCell {
            cohort_month:        cohort_month.label(),
            months_since_first:  *m,
            net_retention_proxy: reportable.then(|| t.net / baseline.denom_month0_gross_valid),
            n_customers:         t.active,
            n_customers_m0:      baseline.n_customers_m0,
        });
    }
    apply_continuity_rule(&mut rows, &policy.horizon_months())?;

    let total_m0: u64 = baselines.values().map(|b| b.n_customers_m0).sum();
    let summary: Vec<NetHeatmapCell> = weighted
        .into_iter()
        .map(|(m, (net, denom))| NetHeatmapCell {
            cohort_month:        ALL_WEIGHTED.to_string(),
            months_since_first:  m,
            net_retention_proxy: (denom > 0.0).then(|| net / denom),
            n_customers:         0,
            n_customers_m0:      total_m0,
        })
        .collect();
    rows.extend(summary);
    rows.sort_by(|a, b| {
        a.cohort_month
            .cmp(&b.cohort_month)
            .then(a.months_since_first.cmp(&b.months_since_first))
    });
    log::debug!("net heatmap: {} rows ({} cohorts + summary)", rows.len(), baselines.len());
    Ok(rows)
}
