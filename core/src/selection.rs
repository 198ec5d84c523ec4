//! Cohort selector: bottom / mid / top by month-2 logo retention.
//!
//! Ranking is ascending by (m2_logo_retention, cohort label) with a stable
//! sort. The plot pool keeps ranked cohorts with n0 >= min_plot_cohort_n;
//! with fewer than three in the pool the whole ranked list is used instead
//! and `used_fallback` is set.

use crate::{
    config::PolicyConfig,
    eligibility::EligibleCohort,
    error::{RetentionError, RetentionResult},
    types::YearMonth,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    Bottom,
    Mid,
    Top,
    NotSelected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionCandidate {
    pub cohort_month:             YearMonth,
    pub n0:                       u64,
    pub denom_month0_gross_valid: f64,
    pub m2_logo_retention:        f64,
    pub plot_floor_pass:          bool,
    pub eligible_cohort:          bool,
    pub selected_for_plot:        bool,
    pub selection_reason:         SelectionReason,
    /// 1-based.
    pub rank_logo_m2:             u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSelection {
    /// In pick order: bottom, mid, top.
    pub selected:        Vec<YearMonth>,
    /// Every ranked cohort, in rank order.
    pub candidates:      Vec<SelectionCandidate>,
    pub plot_pool_count: usize,
    pub used_fallback:   bool,
    pub eligible_count:  usize,
    pub selected_min_n0: Option<u64>,
}

impl CohortSelection {
    pub fn selected_labels(&self) -> Vec<String> {
        self.selected.iter().map(YearMonth::label).collect()
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }
}

/// First, floor(len/2) and last, deduplicated in first-seen order, then
/// filled forward through the list up to three.
pub fn pick_bottom_mid_top<T: PartialEq + Clone>(ordered: &[T]) -> Vec<T> {
    if ordered.is_empty() {
        return Vec::new();
    }
    let mut picked: Vec<T> = Vec::with_capacity(3);
    for idx in [0, ordered.len() / 2, ordered.len() - 1] {
        if !picked.contains(&ordered[idx]) {
            picked.push(ordered[idx].clone());
        }
    }
    for item in ordered {
        if picked.len() >= 3 {
            break;
        }
        if !picked.contains(item) {
            picked.push(item.clone());
        }
    }
    picked
}

pub fn reason_for(position: usize, picked: usize) -> SelectionReason {
    match (picked, position) {
        (_, 0) => SelectionReason::Bottom,
        (2, 1) => SelectionReason::Top,
        (3, 1) => SelectionReason::Mid,
        (3, 2) => SelectionReason::Top,
        _ => SelectionReason::NotSelected,
    }
}

pub fn select_cohorts(cohorts: &[EligibleCohort], policy: &PolicyConfig) -> RetentionResult<CohortSelection> {
    // Cohorts with a missing month-2 metric are excluded, not ranked last.
    let mut ranked: Vec<(&EligibleCohort, f64)> = cohorts
        .iter()
        .filter(|c| c.eligible_cohort && c.n0 >= policy.min_cohort_n && c.denom_month0_gross_valid > 0.0)
        .filter_map(|c| c.m2_logo_retention.map(|r| (c, r)))
        .collect();
    ranked.sort_by(|(a, ra), (b, rb)| {
        ra.total_cmp(rb).then_with(|| a.cohort_month.label().cmp(&b.cohort_month.label()))
    });

    if ranked.is_empty() {
        return Err(RetentionError::PolicyViolation(format!(
            "selection: no eligible cohorts with a month-2 logo retention (cohorts_in={})",
            cohorts.len()
        )));
    }

    let order: Vec<YearMonth> = ranked.iter().map(|(c, _)| c.cohort_month).collect();
    let pool: Vec<YearMonth> = ranked
        .iter()
        .filter(|(c, _)| c.n0 >= policy.min_plot_cohort_n)
        .map(|(c, _)| c.cohort_month)
        .collect();
    let used_fallback = pool.len() < 3;
    let base = if used_fallback { &order } else { &pool };
    let selected = pick_bottom_mid_top(base);

    if used_fallback {
        log::warn!(
            "selection: plot floor met by {} cohorts (min_plot_cohort_n={}), falling back to all {} ranked cohorts",
            pool.len(),
            policy.min_plot_cohort_n,
            order.len()
        );
    }
    if ranked.len() < 3 {
        log::warn!("selection: only {} ranked cohorts, selecting all of them", ranked.len());
    }

    let candidates: Vec<SelectionCandidate> = ranked
        .iter()
        .enumerate()
        .map(|(i, (c, r))| {
            let position = selected.iter().position(|s| *s == c.cohort_month);
            SelectionCandidate {
                cohort_month:             c.cohort_month,
                n0:                       c.n0,
                denom_month0_gross_valid: c.denom_month0_gross_valid,
                m2_logo_retention:        *r,
                plot_floor_pass:          c.n0 >= policy.min_plot_cohort_n,
                eligible_cohort:          c.eligible_cohort,
                selected_for_plot:        position.is_some(),
                selection_reason:         position
                    .map_or(SelectionReason::NotSelected, |p| reason_for(p, selected.len())),
                rank_logo_m2:             i as u32 + 1,
            }
        })
        .collect();

    let selected_min_n0 = candidates.iter().filter(|c| c.selected_for_plot).map(|c| c.n0).min();

    log::info!(
        "selection: selected={:?} eligible_count={} plot_pool_count={} used_fallback={}",
        selected.iter().map(YearMonth::label).collect::<Vec<_>>(),
        ranked.len(),
        pool.len(),
        used_fallback
    );

    Ok(CohortSelection {
        selected,
        candidates,
        plot_pool_count: pool.len(),
        used_fallback,
        eligible_count: ranked.len(),
        selected_min_n0,
    })
}
