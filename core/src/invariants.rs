//! Run-wide invariant checks.
//!
//! Every check fails fast with a diagnostic naming the observed and expected
//! values. A failed check aborts the run before any artifact is written.

use crate::{
    activity_grid::ActivityGrid,
    censor::check_continuity,
    cohort::Customer,
    config::PolicyConfig,
    eligibility::CohortAggregate,
    error::{RetentionError, RetentionResult},
    order_lines::Product,
    selection::{CohortSelection, SelectionReason},
    transactions::{check_transactions, Transaction},
    types::{YearMonth, GUEST},
    validity_gate::Order,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Summary of the checks that passed, carried into the receipt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QaSummary {
    pub orders_unique:         bool,
    pub products_unique:       bool,
    pub customers_unique:      bool,
    pub id_hygiene_ok:         bool,
    pub full_grid_ok:          bool,
    pub month0_retention_pct:  f64,
    pub credit_alignment_ok:   bool,
    pub right_censor_ok:       bool,
    pub eligible_cohorts:      usize,
    pub zero_baseline_cohorts: usize,
    pub selection_ok:          bool,
}

pub fn check_unique<'a, I>(table: &'static str, ids: I) -> RetentionResult<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for id in ids {
        *counts.entry(id).or_insert(0) += 1;
    }
    if let Some((id, count)) = counts.into_iter().find(|(_, n)| *n > 1) {
        return Err(RetentionError::DuplicateId { table, id: id.to_string(), count });
    }
    Ok(())
}

/// Customer ids never keep a float-like fractional suffix, and the guest
/// sentinel never becomes a customer.
pub fn check_id_hygiene(customers: &[Customer]) -> RetentionResult<()> {
    for c in customers {
        if c.customer_id == GUEST {
            return Err(RetentionError::DataQuality("GUEST sentinel present in customers".into()));
        }
        if let Some((head, tail)) = c.customer_id.rsplit_once('.') {
            let numeric = !head.is_empty() && head.chars().all(|ch| ch.is_ascii_digit());
            if numeric && !tail.is_empty() && tail.chars().all(|ch| ch == '0') {
                return Err(RetentionError::DataQuality(format!(
                    "customer_id '{}' kept a float-like suffix",
                    c.customer_id
                )));
            }
        }
    }
    Ok(())
}

/// Exactly H+1 cells per customer with months 0..=H in order, and every
/// customer in the grid.
pub fn check_dense_grid(grid: &ActivityGrid, customers: &[Customer], policy: &PolicyConfig) -> RetentionResult<()> {
    let expected = policy.horizon_months();
    let mut months: HashMap<&str, Vec<u32>> = HashMap::new();
    for cell in &grid.cells {
        months.entry(cell.customer_id.as_str()).or_default().push(cell.months_since_first);
    }
    for c in customers {
        let got = months.remove(c.customer_id.as_str()).unwrap_or_default();
        if got != expected {
            return Err(RetentionError::NonDenseGrid {
                customer_id: c.customer_id.clone(),
                months:      got,
                expected:    expected.clone(),
            });
        }
    }
    if let Some((customer_id, got)) = months.into_iter().next() {
        return Err(RetentionError::NonDenseGrid {
            customer_id: customer_id.to_string(),
            months:      got,
            expected,
        });
    }
    Ok(())
}

/// Month-0 logo retention is 100% by construction; returns the percentage.
pub fn check_month0_retention(grid: &ActivityGrid) -> RetentionResult<f64> {
    let mut n = 0usize;
    for cell in grid.at_month(0) {
        n += 1;
        if !cell.is_retained_logo {
            return Err(RetentionError::DataQuality(format!(
                "month-0 cell not retained: customer={} cohort={}",
                cell.customer_id, cell.cohort_month
            )));
        }
    }
    Ok(if n == 0 { 0.0 } else { 100.0 })
}

/// Unobserved cells carry no metric, and every series is continuous.
pub fn check_right_censor(aggregates: &[CohortAggregate], policy: &PolicyConfig) -> RetentionResult<()> {
    if let Some(row) = aggregates.iter().find(|a| !a.is_observed && a.net_retention_proxy.is_some()) {
        return Err(RetentionError::PolicyViolation(format!(
            "right-censor mask: cohort={} month={} is unobserved but has net_retention_proxy={:?}",
            row.cohort_month, row.months_since_first, row.net_retention_proxy
        )));
    }
    check_continuity(aggregates, &policy.horizon_months())
}

/// Selected cohorts are eligible, 1..=3 of them, labelled consistently, and
/// clear the plot floor unless the selector fell back.
pub fn check_selection(
    selection: &CohortSelection,
    aggregates: &[CohortAggregate],
    policy: &PolicyConfig,
) -> RetentionResult<()> {
    let count = selection.selected.len();
    if !(1..=3).contains(&count) {
        return Err(RetentionError::PolicyViolation(format!(
            "selection count {count} outside [1,3]"
        )));
    }

    let eligible: HashSet<YearMonth> = aggregates
        .iter()
        .filter(|a| a.eligible_cohort)
        .map(|a| a.cohort_month)
        .collect();
    if let Some(bad) = selection.selected.iter().find(|c| !eligible.contains(c)) {
        return Err(RetentionError::PolicyViolation(format!(
            "selection subset breach: cohort={bad} is not eligible"
        )));
    }

    let flagged: Vec<YearMonth> = selection
        .candidates
        .iter()
        .filter(|c| c.selected_for_plot)
        .map(|c| c.cohort_month)
        .collect();
    let mut picked = selection.selected.clone();
    picked.sort();
    let mut flagged_sorted = flagged.clone();
    flagged_sorted.sort();
    if picked != flagged_sorted {
        return Err(RetentionError::PolicyViolation(format!(
            "selection audit mismatch: selected={:?} flagged={:?}",
            selection.selected_labels(),
            flagged.iter().map(YearMonth::label).collect::<Vec<_>>()
        )));
    }
    if let Some(c) = selection
        .candidates
        .iter()
        .find(|c| c.selected_for_plot == (c.selection_reason == SelectionReason::NotSelected))
    {
        return Err(RetentionError::PolicyViolation(format!(
            "selection reason mismatch: cohort={} selected={} reason={:?}",
            c.cohort_month, c.selected_for_plot, c.selection_reason
        )));
    }

    if !selection.used_fallback {
        if let Some(c) = selection
            .candidates
            .iter()
            .find(|c| c.selected_for_plot && c.n0 < policy.min_plot_cohort_n)
        {
            return Err(RetentionError::PolicyViolation(format!(
                "plot floor breach without fallback: cohort={} n0={} min_plot_cohort_n={}",
                c.cohort_month, c.n0, policy.min_plot_cohort_n
            )));
        }
    }

    let marked: HashSet<YearMonth> = aggregates
        .iter()
        .filter(|a| a.selected_for_plot)
        .map(|a| a.cohort_month)
        .collect();
    let selected: HashSet<YearMonth> = selection.selected.iter().copied().collect();
    if marked != selected {
        return Err(RetentionError::PolicyViolation(
            "selected_for_plot on cohort aggregates disagrees with the selection".into(),
        ));
    }
    Ok(())
}

/// Table-level checks on the built tables. The selection check runs separately
/// once cohorts have been picked.
pub fn check_tables(
    orders: &[Order],
    transactions: &[Transaction],
    products: &[Product],
    customers: &[Customer],
    grid: &ActivityGrid,
    aggregates: &[CohortAggregate],
    policy: &PolicyConfig,
) -> RetentionResult<QaSummary> {
    check_unique("orders", orders.iter().map(|o| o.order_id.as_str()))?;
    check_unique("products", products.iter().map(|p| p.sku.as_str()))?;
    check_unique("customers", customers.iter().map(|c| c.customer_id.as_str()))?;
    check_id_hygiene(customers)?;
    check_transactions(orders, transactions)?;
    check_dense_grid(grid, customers, policy)?;
    let month0_retention_pct = check_month0_retention(grid)?;
    check_right_censor(aggregates, policy)?;

    let month0: Vec<&CohortAggregate> = aggregates.iter().filter(|a| a.months_since_first == 0).collect();
    Ok(QaSummary {
        orders_unique: true,
        products_unique: true,
        customers_unique: true,
        id_hygiene_ok: true,
        full_grid_ok: true,
        month0_retention_pct,
        credit_alignment_ok: true,
        right_censor_ok: true,
        eligible_cohorts: month0.iter().filter(|a| a.eligible_cohort).count(),
        zero_baseline_cohorts: month0.iter().filter(|a| a.denom_month0_gross_valid <= 0.0).count(),
        selection_ok: false,
    })
}
