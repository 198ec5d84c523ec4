//! Cohort selector: ranking, plot floor, fallback, null handling, tie-break.

use retention_core::{
    config::PolicyConfig,
    eligibility::EligibleCohort,
    error::RetentionError,
    selection::{select_cohorts, SelectionReason},
    types::YearMonth,
};

fn month(label: &str) -> YearMonth {
    label.parse().expect("valid month label")
}

fn cohorts(n0: &[u64], m2: &[Option<f64>]) -> Vec<EligibleCohort> {
    n0.iter()
        .zip(m2)
        .enumerate()
        .map(|(i, (&n0, &m2))| EligibleCohort {
            cohort_month:             month(&format!("2010-{:02}", i + 1)),
            n0,
            denom_month0_gross_valid: 1000.0,
            eligible_cohort:          true,
            m2_logo_retention:        m2,
        })
        .collect()
}

fn some(values: &[f64]) -> Vec<Option<f64>> {
    values.iter().copied().map(Some).collect()
}

#[test]
fn pool_meeting_floor_picks_bottom_mid_top() {
    let policy = PolicyConfig::default();
    let input = cohorts(&[240, 260, 300, 280, 320], &some(&[0.10, 0.20, 0.30, 0.40, 0.50]));

    let selection = select_cohorts(&input, &policy).expect("selection");

    assert!(!selection.used_fallback, "all five cohorts clear the plot floor");
    assert_eq!(selection.selected_labels(), vec!["2010-01", "2010-03", "2010-05"]);
    assert_eq!(selection.plot_pool_count, 5);
    assert_eq!(selection.eligible_count, 5);
    assert_eq!(selection.selected_min_n0, Some(240));

    let reasons: Vec<(String, SelectionReason)> = selection
        .candidates
        .iter()
        .map(|c| (c.cohort_month.label(), c.selection_reason))
        .collect();
    assert_eq!(
        reasons,
        vec![
            ("2010-01".to_string(), SelectionReason::Bottom),
            ("2010-02".to_string(), SelectionReason::NotSelected),
            ("2010-03".to_string(), SelectionReason::Mid),
            ("2010-04".to_string(), SelectionReason::NotSelected),
            ("2010-05".to_string(), SelectionReason::Top),
        ]
    );
    let ranks: Vec<u32> = selection.candidates.iter().map(|c| c.rank_logo_m2).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
}

#[test]
fn small_plot_pool_falls_back_to_full_ranking() {
    let policy = PolicyConfig::default();
    let input = cohorts(&[210, 180, 170, 220, 160], &some(&[0.11, 0.22, 0.33, 0.44, 0.55]));

    let selection = select_cohorts(&input, &policy).expect("selection");

    assert!(selection.used_fallback, "only two cohorts clear n0 >= 200");
    assert_eq!(selection.plot_pool_count, 2);
    assert!((1..=3).contains(&selection.selected_count()));
    assert_eq!(selection.selected_labels(), vec!["2010-01", "2010-03", "2010-05"]);
    let floor: Vec<bool> = selection.candidates.iter().map(|c| c.plot_floor_pass).collect();
    assert_eq!(floor, vec![true, false, false, true, false]);
}

#[test]
fn missing_month2_retention_is_excluded_not_ranked_last() {
    let policy = PolicyConfig::default();
    let input = cohorts(&[220, 230, 240, 250], &[Some(0.10), None, Some(0.30), Some(0.40)]);

    let selection = select_cohorts(&input, &policy).expect("selection");

    assert_eq!(selection.eligible_count, 3);
    assert!(
        !selection.selected_labels().contains(&"2010-02".to_string()),
        "a cohort without a month-2 metric must never be selected"
    );
    assert!(selection.candidates.iter().all(|c| c.cohort_month != month("2010-02")));
    assert_eq!(selection.selected_labels(), vec!["2010-01", "2010-03", "2010-04"]);
}

#[test]
fn ties_break_on_cohort_label() {
    let policy = PolicyConfig::default();
    let input = cohorts(&[300, 305, 310, 315], &some(&[0.20, 0.20, 0.35, 0.40]));

    let selection = select_cohorts(&input, &policy).expect("selection");

    assert_eq!(selection.selected_labels(), vec!["2010-01", "2010-03", "2010-04"]);
    assert_eq!(selection.candidates[0].cohort_month, month("2010-01"));
    assert_eq!(selection.candidates[1].cohort_month, month("2010-02"));
    for picked in &selection.selected {
        let candidate = selection
            .candidates
            .iter()
            .find(|c| c.cohort_month == *picked)
            .expect("selected cohort is a candidate");
        assert!(candidate.eligible_cohort);
        assert!(candidate.selected_for_plot);
    }
}

#[test]
fn ineligible_and_undersized_cohorts_never_rank() {
    let policy = PolicyConfig::default();
    let mut input = cohorts(&[300, 40, 310, 320], &some(&[0.1, 0.2, 0.3, 0.4]));
    input[2].eligible_cohort = false;
    input[3].denom_month0_gross_valid = 0.0;

    let selection = select_cohorts(&input, &policy).expect("selection");

    assert_eq!(selection.eligible_count, 1);
    assert_eq!(selection.selected_labels(), vec!["2010-01"]);
    assert!(selection.used_fallback);
    assert_eq!(selection.candidates[0].selection_reason, SelectionReason::Bottom);
}

#[test]
fn two_ranked_cohorts_are_bottom_and_top() {
    let policy = PolicyConfig::default();
    let input = cohorts(&[300, 300], &some(&[0.5, 0.2]));

    let selection = select_cohorts(&input, &policy).expect("selection");

    assert_eq!(selection.selected_labels(), vec!["2010-02", "2010-01"]);
    assert_eq!(selection.candidates[0].selection_reason, SelectionReason::Bottom);
    assert_eq!(selection.candidates[1].selection_reason, SelectionReason::Top);
}

#[test]
fn nothing_rankable_is_a_policy_violation() {
    let policy = PolicyConfig::default();
    let input = cohorts(&[300, 300], &[None, None]);

    let err = select_cohorts(&input, &policy).expect_err("no rankable cohorts");
    assert!(matches!(err, RetentionError::PolicyViolation(_)), "got {err}");
    assert_eq!(err.category(), "PolicyViolationError");
}
