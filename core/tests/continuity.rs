//! Eligibility, right-censoring and the continuity rule on a hand-built grid.
//!
//! Observation ends 2011-06. With a 6-month horizon only cohorts up to
//! 2010-12 can be eligible.

use retention_core::{
    activity_grid::{ActivityCell, ActivityGrid},
    censor::{apply_continuity_rule, check_continuity, ObservationWindow},
    config::PolicyConfig,
    eligibility::{aggregate_cohorts, cohort_baselines, eligible_cohorts, m2_logo_retention, CohortAggregate},
    error::RetentionError,
    heatmap::{build_logo_heatmap, build_net_heatmap, NetHeatmapCell},
    invariants::check_right_censor,
    types::{YearMonth, ALL_WEIGHTED},
};

fn ym(label: &str) -> YearMonth {
    label.parse().expect("valid month label")
}

fn policy() -> PolicyConfig {
    PolicyConfig { min_cohort_n: 3, ..PolicyConfig::default() }
}

fn window() -> ObservationWindow {
    ObservationWindow::new(ym("2011-06"))
}

/// `retained[m]` of the cohort's customers order in month `m` (10.0 each).
/// Month 0 always counts every customer, at `m0_gross` apiece.
fn cohort_cells(cohort: &str, customers: usize, m0_gross: f64, retained: [usize; 7]) -> Vec<ActivityCell> {
    let cohort_month = ym(cohort);
    let mut cells = Vec::new();
    for i in 0..customers {
        for m in 0..7u32 {
            let active = m == 0 || i < retained[m as usize];
            let gross = match (active, m) {
                (false, _) => 0.0,
                (true, 0) => m0_gross,
                (true, _) => 10.0,
            };
            cells.push(ActivityCell {
                customer_id:             format!("{cohort}-{i}"),
                cohort_month,
                activity_month:          cohort_month.plus_months(m),
                months_since_first:      m,
                orders_count_valid:      u32::from(active),
                gross_revenue_valid:     gross,
                net_revenue_proxy_total: gross,
                is_retained_logo:        active,
                first_product_family:    "Home_Decor".into(),
                is_wholesale_like:       false,
            });
        }
    }
    cells
}

fn grid() -> ActivityGrid {
    let mut cells = Vec::new();
    cells.extend(cohort_cells("2010-10", 3, 0.0, [3, 1, 1, 1, 1, 1, 1]));
    cells.extend(cohort_cells("2010-11", 2, 10.0, [2, 1, 1, 1, 1, 1, 1]));
    cells.extend(cohort_cells("2010-12", 4, 10.0, [4, 2, 2, 1, 1, 1, 1]));
    cells.extend(cohort_cells("2011-03", 4, 10.0, [4, 3, 2, 2, 2, 2, 2]));
    cells.extend(cohort_cells("2011-05", 5, 10.0, [5, 1, 1, 1, 1, 1, 1]));
    ActivityGrid { horizon_h: 6, cells }
}

fn series<'a>(rows: &'a [CohortAggregate], cohort: &str) -> Vec<&'a CohortAggregate> {
    rows.iter().filter(|r| r.cohort_month == ym(cohort)).collect()
}

#[test]
fn eligibility_needs_size_denominator_and_full_horizon() {
    let baselines = cohort_baselines(&grid());
    let rows = aggregate_cohorts(&grid(), &window(), &policy()).expect("aggregates");

    let eligible: Vec<String> = baselines
        .keys()
        .filter(|c| series(&rows, &c.label()).iter().all(|r| r.eligible_cohort))
        .map(YearMonth::label)
        .collect();
    assert_eq!(eligible, vec!["2010-12"], "zero denominator, small and young cohorts are excluded");
    assert_eq!(baselines[&ym("2010-10")].denom_month0_gross_valid, 0.0);
    assert_eq!(baselines[&ym("2010-11")].n_customers_m0, 2);
}

#[test]
fn net_proxy_is_monthly_net_over_month0_gross() {
    let rows = aggregate_cohorts(&grid(), &window(), &policy()).expect("aggregates");
    let values: Vec<Option<f64>> = series(&rows, "2010-12").iter().map(|r| r.net_retention_proxy).collect();
    assert_eq!(
        values,
        vec![Some(1.0), Some(0.5), Some(0.5), Some(0.25), Some(0.25), Some(0.25), Some(0.25)]
    );
}

#[test]
fn ineligible_cohorts_keep_rows_but_no_metric() {
    let rows = aggregate_cohorts(&grid(), &window(), &policy()).expect("aggregates");
    let young = series(&rows, "2011-03");

    assert_eq!(young.len(), 7, "every horizon month is present");
    assert!(young.iter().all(|r| r.net_retention_proxy.is_none()));
    let observed: Vec<u32> = young.iter().filter(|r| r.is_observed).map(|r| r.months_since_first).collect();
    assert_eq!(observed, vec![0, 1, 2, 3]);
    assert_eq!(young[4].net_revenue_proxy_total, 20.0, "raw totals are kept for unobserved months");

    check_right_censor(&rows, &policy()).expect("censor invariants hold");
}

#[test]
fn month2_logo_retention_is_missing_when_unobserved() {
    let grid = grid();
    let m2 = m2_logo_retention(&grid, &window());
    assert_eq!(m2[&ym("2010-12")], Some(0.5));
    assert_eq!(m2[&ym("2011-03")], Some(0.5), "2011-05 is inside the window");
    assert_eq!(m2[&ym("2011-05")], None, "2011-07 is beyond the window, not zero");

    let rows = aggregate_cohorts(&grid, &window(), &policy()).expect("aggregates");
    let selector_input = eligible_cohorts(&rows, &m2);
    assert_eq!(selector_input.len(), 5, "one row per cohort");
    let young = selector_input
        .iter()
        .find(|c| c.cohort_month == ym("2011-05"))
        .expect("cohort present");
    assert_eq!(young.n0, 5);
    assert!(!young.eligible_cohort);
    assert_eq!(young.m2_logo_retention, None);
}

#[test]
fn logo_heatmap_masks_unobserved_months() {
    let cells = build_logo_heatmap(&grid(), &window(), &policy()).expect("heatmap");
    let young: Vec<Option<f64>> = cells
        .iter()
        .filter(|c| c.cohort_month == ym("2011-05"))
        .map(|c| c.logo_retention)
        .collect();
    assert_eq!(young, vec![Some(1.0), Some(0.2), None, None, None, None, None]);
}

fn net_series(cells: &[NetHeatmapCell], cohort: &str) -> Vec<Option<f64>> {
    cells
        .iter()
        .filter(|c| c.cohort_month == cohort)
        .map(|c| c.net_retention_proxy)
        .collect()
}

#[test]
fn weighted_summary_is_taken_before_the_continuity_pass() {
    let grid = ActivityGrid { horizon_h: 6, cells: cohort_cells("2010-12", 4, 10.0, [4, 4, 4, 1, 4, 4, 4]) };
    let cells = build_net_heatmap(&grid, &window(), &policy()).expect("net heatmap");

    assert_eq!(
        net_series(&cells, "2010-12"),
        vec![Some(1.0), Some(1.0), Some(1.0), None, None, None, None],
        "a suppressed month clears the rest of the cohort series"
    );
    assert_eq!(
        net_series(&cells, ALL_WEIGHTED),
        vec![Some(1.0), Some(1.0), Some(1.0), None, Some(1.0), Some(1.0), Some(1.0)],
        "the summary keeps months after the gap"
    );
}

#[test]
fn weighted_summary_sums_reportable_cells_only() {
    let mut cells = Vec::new();
    // No month-0 gross: never reportable, never weighted.
    cells.extend(cohort_cells("2010-10", 3, 0.0, [3, 3, 3, 3, 3, 3, 3]));
    cells.extend(cohort_cells("2010-11", 4, 20.0, [4, 3, 2, 2, 2, 2, 2]));
    cells.extend(cohort_cells("2010-12", 5, 10.0, [5, 4, 3, 3, 3, 3, 3]));
    let grid = ActivityGrid { horizon_h: 6, cells };
    let rows = build_net_heatmap(&grid, &window(), &policy()).expect("net heatmap");

    assert!(net_series(&rows, "2010-10").iter().all(Option::is_none));
    assert_eq!(net_series(&rows, "2010-11")[1], Some(0.375));
    assert_eq!(net_series(&rows, "2010-11")[2], None, "two active customers are suppressed");

    let summary = net_series(&rows, ALL_WEIGHTED);
    assert_eq!(summary[0], Some(1.0));
    assert!((summary[1].expect("month 1") - 70.0 / 130.0).abs() < 1e-12);
    assert!((summary[2].expect("month 2") - 0.6).abs() < 1e-12, "only the 2010-12 cell is weighted");

    let summary_row = rows.iter().find(|c| c.cohort_month == ALL_WEIGHTED).expect("summary row");
    assert_eq!((summary_row.n_customers, summary_row.n_customers_m0), (0, 12));
}

#[test]
fn weighted_summary_is_missing_without_a_positive_baseline() {
    let grid = ActivityGrid { horizon_h: 6, cells: cohort_cells("2010-10", 3, 0.0, [3, 3, 3, 3, 3, 3, 3]) };
    let rows = build_net_heatmap(&grid, &window(), &policy()).expect("net heatmap");
    let summary = net_series(&rows, ALL_WEIGHTED);
    assert_eq!(summary.len(), 7);
    assert!(summary.iter().all(Option::is_none), "got {summary:?}");
}

fn aggregate_row(cohort: &str, m: u32, value: Option<f64>) -> CohortAggregate {
    CohortAggregate {
        cohort_month:             ym(cohort),
        months_since_first:       m,
        n_customers_m0:           120,
        denom_month0_gross_valid: 1000.0,
        net_revenue_proxy_total:  value.unwrap_or(0.0) * 1000.0,
        net_retention_proxy:      value,
        is_observed:              true,
        eligible_cohort:          true,
        selected_for_plot:        false,
    }
}

#[test]
fn missing_month_row_is_a_breach() {
    let mut rows: Vec<CohortAggregate> = [0, 1, 2, 4]
        .into_iter()
        .map(|m| aggregate_row("2010-03", m, Some(0.5)))
        .collect();
    let err = apply_continuity_rule(&mut rows, &policy().horizon_months()).expect_err("incomplete horizon");
    assert!(matches!(err, RetentionError::ContinuityBreach { .. }));
    assert_eq!(
        err.to_string(),
        "continuity breach: cohort=2010-03 months=[0,1,2,4] expected=[0,1,2,3,4,5,6]"
    );
}

#[test]
fn values_after_a_gap_are_cleared() {
    let values = [Some(1.0), Some(0.4), Some(0.3), None, Some(0.35), Some(0.2), None];
    let mut rows: Vec<CohortAggregate> = values
        .iter()
        .enumerate()
        .map(|(m, v)| aggregate_row("2010-03", m as u32, *v))
        .collect();

    let err = check_continuity(&rows, &policy().horizon_months()).expect_err("gap before a value");
    assert_eq!(
        err.to_string(),
        "continuity breach: cohort=2010-03 months=[0,1,2,4,5] expected=[0,1,2,3,4]"
    );

    let cleared = apply_continuity_rule(&mut rows, &policy().horizon_months()).expect("full horizon");
    assert_eq!(cleared, 2);
    let after: Vec<Option<f64>> = rows.iter().map(|r| r.net_retention_proxy).collect();
    assert_eq!(after, vec![Some(1.0), Some(0.4), Some(0.3), None, None, None, None]);
    check_continuity(&rows, &policy().horizon_months()).expect("continuous after the rule");
}

#[test]
fn observation_window_boundaries() {
    let w = window();
    assert!(w.is_observed(ym("2010-12"), 6));
    assert!(!w.is_observed(ym("2010-12"), 7));
    assert!(w.covers_horizon(ym("2010-12"), 6));
    assert!(!w.covers_horizon(ym("2011-01"), 6));
    assert_eq!(w.mask(ym("2011-06"), 1, Some(0.4)), None);
    assert_eq!(w.mask(ym("2011-06"), 0, Some(0.4)), Some(0.4));
}
