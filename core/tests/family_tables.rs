//! Family-level month-2 tables: confound gate, family retention table,
//! priority scatter and the top-SKU appendix.

use chrono::{NaiveDate, NaiveDateTime};
use retention_core::{
    activity_grid::{ActivityCell, ActivityGrid},
    censor::ObservationWindow,
    cohort::Customer,
    config::PolicyConfig,
    confound::{build_confound_table, summarize},
    coverage::build_coverage_report,
    error::RetentionError,
    family_report::{
        build_family_m2_table, build_priority_scatter, build_top_sku_appendix, check_family_set_match,
        FamilyM2Row,
    },
    order_lines::OrderLine,
    types::YearMonth,
};

fn ym(label: &str) -> YearMonth {
    label.parse().expect("valid month label")
}

struct Member {
    id:        String,
    cohort:    &'static str,
    family:    &'static str,
    wholesale: bool,
    /// Month-2 net; `Some` means the customer ordered in month 2.
    m2_net:    Option<f64>,
}

fn member(id: String, cohort: &'static str, family: &'static str, m2_net: Option<f64>) -> Member {
    Member { id, cohort, family, wholesale: false, m2_net }
}

/// Month-0 and month-2 cells only; the family tables read nothing else.
fn grid(members: &[Member]) -> ActivityGrid {
    let mut cells = Vec::new();
    for m in members {
        let cohort_month = ym(m.cohort);
        let cell = |months_since_first: u32, active: bool, gross: f64, net: f64| ActivityCell {
            customer_id:             m.id.clone(),
            cohort_month,
            activity_month:          cohort_month.plus_months(months_since_first),
            months_since_first,
            orders_count_valid:      u32::from(active),
            gross_revenue_valid:     gross,
            net_revenue_proxy_total: net,
            is_retained_logo:        active,
            first_product_family:    m.family.into(),
            is_wholesale_like:       m.wholesale,
        };
        cells.push(cell(0, true, 10.0, 10.0));
        let net = m.m2_net.unwrap_or(0.0);
        cells.push(cell(2, m.m2_net.is_some(), net.max(0.0), net));
    }
    ActivityGrid { horizon_h: 6, cells }
}

fn group(prefix: &str, cohort: &'static str, family: &'static str, n: usize, retained: usize, net: f64) -> Vec<Member> {
    (0..n)
        .map(|i| member(format!("{prefix}{i}"), cohort, family, (i < retained).then_some(net)))
        .collect()
}

fn window() -> ObservationWindow {
    ObservationWindow::new(ym("2011-06"))
}

fn family_members() -> Vec<Member> {
    let mut members = Vec::new();
    members.extend(group("h", "2011-01", "Home_Decor", 6, 3, 5.0));
    members.extend(group("b", "2011-01", "Bags", 4, 1, 10.0));
    members.extend(group("s", "2011-01", "Seasonal", 2, 2, 20.0));
    // Month 2 of this cohort is past the window.
    members.extend(group("late", "2011-05", "Home_Decor", 3, 3, 50.0));
    members
}

fn family_policy() -> PolicyConfig {
    PolicyConfig { family_top_n: 2, ..PolicyConfig::default() }
}

#[test]
fn confound_flags_only_large_gaps_with_enough_customers() {
    let mut members = Vec::new();
    // Bags: wholesale buyers all come back, retail buyers mostly do not.
    members.extend(group("bw", "2011-01", "Bags", 10, 10, 5.0));
    members.extend(group("br", "2011-01", "Bags", 90, 27, 5.0));
    members.extend(group("hd", "2011-01", "Home_Decor", 100, 40, 5.0));
    members.extend(group("kw", "2011-01", "Kitchen_Dining", 10, 10, 5.0));
    members.extend(group("kr", "2011-01", "Kitchen_Dining", 40, 4, 5.0));
    for m in members.iter_mut().filter(|m| m.id.starts_with("bw") || m.id.starts_with("kw")) {
        m.wholesale = true;
    }

    let rows = build_confound_table(&grid(&members), &PolicyConfig::default());
    let labels: Vec<&str> = rows.iter().map(|r| r.first_product_family.as_str()).collect();
    assert_eq!(labels, vec!["Bags", "Home_Decor", "Kitchen_Dining"]);

    let bags = &rows[0];
    assert_eq!((bags.all_n_customers, bags.retail_n_customers), (100, 90));
    assert!((bags.all_m2_retention - 0.37).abs() < 1e-9);
    assert!((bags.retail_m2_retention - 0.30).abs() < 1e-9);
    assert!((bags.retention_diff_pp - 7.0).abs() < 1e-9);
    assert!(bags.material_sensitivity);

    assert!(!rows[1].material_sensitivity, "no wholesale customers, no gap");
    assert!(rows[2].retention_diff_pp > 5.0);
    assert!(!rows[2].material_sensitivity, "gap is large but the groups are small");

    let outcome = summarize(&rows);
    assert_eq!((outcome.rows, outcome.material_count), (3, 1));
}

#[test]
fn family_table_groups_small_families_and_ranks_weakest_first() {
    let table = build_family_m2_table(&grid(&family_members()), &window(), &family_policy());
    let groups: Vec<(&str, u64)> = table.iter().map(|r| (r.family_group.as_str(), r.n_customers)).collect();
    assert_eq!(
        groups,
        vec![("Bags", 4), ("Home_Decor", 6), ("Other", 2)],
        "unobserved customers are excluded and Seasonal folds into Other"
    );
    assert_eq!(table[0].m2_logo_retention, 0.25);
    assert_eq!(table[0].m2_net_proxy_retention, Some(0.25));
    assert_eq!(table[1].m2_logo_retention, 0.5);
    assert_eq!(table[1].m2_net_proxy_retention, Some(0.25));
    assert_eq!(table[2].m2_net_proxy_retention, Some(2.0));
}

#[test]
fn scatter_scores_and_ranks_families() {
    let table = build_family_m2_table(&grid(&family_members()), &window(), &family_policy());
    let scatter = build_priority_scatter(&table, &family_policy());

    let ranked: Vec<(&str, u32)> = scatter
        .iter()
        .map(|p| (p.first_product_family.as_str(), p.rank_priority))
        .collect();
    assert_eq!(ranked, vec![("Bags", 1), ("Home_Decor", 2), ("Other", 3)]);
    assert!((scatter[0].priority_score - 0.75).abs() < 1e-9);
    assert!((scatter[1].priority_score - 0.625).abs() < 1e-9);
    assert!((scatter[2].priority_score + 0.5).abs() < 1e-9);

    let overall_x = scatter[0].overall_x.expect("weighted mean");
    let overall_y = scatter[0].overall_y.expect("weighted mean");
    assert!((overall_x - 0.5).abs() < 1e-9);
    assert!((overall_y - 6.5 / 12.0).abs() < 1e-9);

    check_family_set_match(&scatter, &table).expect("same families");
}

#[test]
fn scatter_ties_break_on_size_then_label() {
    let row = |family: &str, n: u64| FamilyM2Row {
        family_group:           family.into(),
        n_customers:            n,
        m2_logo_retention:      0.4,
        m2_net_proxy_retention: None,
    };
    let scatter = build_priority_scatter(&[row("Cards_Wrap", 90), row("Bags", 90), row("Seasonal", 120)], &PolicyConfig::default());
    let order: Vec<&str> = scatter.iter().map(|p| p.first_product_family.as_str()).collect();
    assert_eq!(order, vec!["Seasonal", "Bags", "Cards_Wrap"]);
    assert!((scatter[0].priority_score - 0.8).abs() < 1e-9, "missing net counts as 0");
    assert_eq!(scatter[0].overall_y, Some(0.0));
}

#[test]
fn mismatched_family_sets_are_rejected() {
    let table = build_family_m2_table(&grid(&family_members()), &window(), &family_policy());
    let mut scatter = build_priority_scatter(&table, &family_policy());
    scatter.retain(|p| p.first_product_family != "Home_Decor");
    scatter[0].first_product_family = "Toys".into();

    let err = check_family_set_match(&scatter, &table).expect_err("sets differ");
    match err {
        RetentionError::FamilySetMismatch { only_in_scatter, only_in_family_table } => {
            assert_eq!(only_in_scatter, vec!["Toys"]);
            assert_eq!(only_in_family_table, vec!["Bags", "Home_Decor"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn ts() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2011, 1, 10)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .expect("valid timestamp")
}

fn order_line(order: &str, customer: &str, sku: &str, description: &str, family: &str, gross: f64) -> OrderLine {
    OrderLine {
        order_id:              order.into(),
        order_ts:              ts(),
        customer_id:           customer.into(),
        sku:                   sku.into(),
        description:           description.into(),
        country:               "United Kingdom".into(),
        quantity:              1.0,
        unit_price:            gross,
        qty_pos:               1.0,
        unit_price_pos:        gross,
        line_amount_gross:     gross,
        line_amount_net_proxy: gross,
        is_cancel_invoice:     false,
        is_return_line:        false,
        product_family:        family.into(),
    }
}

fn customer(id: &str, order: &str, family: &str) -> Customer {
    Customer {
        customer_id:             id.into(),
        first_order_id:          order.into(),
        first_order_ts:          ts(),
        cohort_month:            ym("2011-01"),
        first_order_items_count: 2.0,
        first_order_gross:       10.0,
        is_wholesale_like:       false,
        first_product_family:    family.into(),
    }
}

#[test]
fn top_sku_appendix_covers_the_weakest_family() {
    let members = family_members();
    let grid = grid(&members);
    let policy = PolicyConfig {
        min_cohort_n: 1,
        min_sku_n: 2,
        topk_skus_per_family: 1,
        target_family_count: 1,
        ..family_policy()
    };
    let table = build_family_m2_table(&grid, &window(), &policy);

    let mut lines = Vec::new();
    let mut customers = Vec::new();
    for i in 0..4 {
        let id = format!("b{i}");
        let order = format!("B{i}");
        customers.push(customer(&id, &order, "Bags"));
        lines.push(order_line(&order, &id, "20725", "LUNCH  BAG RED RETROSPOT", "Bags", 10.0));
        if i < 2 {
            lines.push(order_line(&order, &id, "20726", "LUNCH BAG WOODLAND", "Bags", 3.0));
        }
        lines.push(order_line(&order, &id, "POST", "POSTAGE", "Shipping_NonMerch", 18.0));
    }
    customers.push(customer("h0", "H0", "Home_Decor"));
    lines.push(order_line("H0", "h0", "21755", "LOVE BUILDING BLOCK WORD", "Home_Decor", 10.0));

    let (rows, receipt) = build_top_sku_appendix(&lines, &customers, &grid, &table, &window(), &policy);

    assert_eq!(receipt.target_families, vec!["Bags"]);
    assert_eq!(receipt.rows_written, 1);
    assert_eq!(receipt.max_observed_month, ym("2011-06"));

    let top = &rows[0];
    assert_eq!(top.sku, "20725", "highest gross sku survives top-k");
    assert_eq!(top.description, "LUNCH BAG RED RETROSPOT", "whitespace collapsed");
    assert_eq!(top.n_customers_m0, 4);
    assert_eq!(top.m0_gross_valid, 40.0);
    assert_eq!(top.m2_logo_retention_observed, Some(0.25));
    assert_eq!(top.m2_net_retention_proxy_observed, Some(0.25));
    assert_eq!(top.delta_net_proxy_vs_family_pp, Some(0.0));
    assert_eq!(top.share_of_family_m0_gross_pct, Some(100.0));
}

#[test]
fn coverage_ranks_unmapped_descriptions_and_reports_shares() {
    let mut lines = vec![
        order_line("A1", "c1", "20725", "LUNCH BAG RED RETROSPOT", "Bags", 87.0),
        order_line("A2", "c2", "90001", "AA TIE", "Other", 30.0),
        order_line("A2", "c2", "90002", "BB TIE", "Other", 15.0),
        order_line("A3", "c3", "90002", "BB TIE", "Other", 15.0),
    ];
    for i in 0..22 {
        lines.push(order_line("A4", "c4", &format!("8{i:04}"), &format!("D{i:02}"), "Other", f64::from(i + 1)));
    }
    let customers = vec![
        customer("c1", "A1", "Bags"),
        customer("c2", "A2", "Other"),
        customer("c3", "A3", "Shipping_NonMerch"),
        customer("c4", "A4", "Home_Decor"),
    ];

    let report = build_coverage_report(&lines, &customers);

    // 87 mapped of 87 + 60 + 253.
    assert!((report.gross_non_other_pct - 21.75).abs() < 1e-9);
    assert_eq!(report.customer_non_other_pct, 75.0);
    assert_eq!(report.customer_nonmerch_pct, 25.0);

    assert_eq!(report.top_unmapped.len(), 20);
    let ranked: Vec<(usize, &str, f64)> = report
        .top_unmapped
        .iter()
        .map(|u| (u.rank, u.description.as_str(), u.gross_revenue))
        .collect();
    assert_eq!(ranked[0], (1, "AA TIE", 30.0), "equal gross falls back to description order");
    assert_eq!(ranked[1], (2, "BB TIE", 30.0), "lines of one description are summed");
    assert_eq!(ranked[2], (3, "D21", 22.0));
    assert_eq!(ranked[19], (20, "D04", 5.0));
}

#[test]
fn coverage_with_nothing_mapped_is_a_plain_zero() {
    let lines = vec![
        order_line("A1", "c1", "90001", "MYSTERY ITEM", "Other", 12.0),
        order_line("A2", "c2", "90002", "ANOTHER MYSTERY", "Other", 8.0),
    ];
    let report = build_coverage_report(&lines, &[]);
    assert_eq!(report.gross_non_other_pct, 0.0);
    assert!(report.gross_non_other_pct.is_sign_positive(), "no negative zero in the report");
    assert_eq!(report.customer_non_other_pct, 0.0);
    assert_eq!(report.top_unmapped[0].description, "MYSTERY ITEM");

    let empty = build_coverage_report(&[], &[]);
    assert!(empty.gross_non_other_pct.is_sign_positive());
    assert!(empty.top_unmapped.is_empty());
}
