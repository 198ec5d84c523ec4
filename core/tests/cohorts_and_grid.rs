//! Customer cohorts, wholesale flags and the dense activity grid.

use chrono::{NaiveDate, NaiveDateTime};
use retention_core::{
    activity_grid::build_activity_grid,
    classifier::FamilyClassifier,
    cohort::{assign_cohorts, first_product_family, percentile, Customer},
    config::{PipelineConfig, PolicyConfig},
    ingest::{normalize_raw_lines, NormalizedLine, RawOrderLine, RawToken},
    invariants::{check_dense_grid, check_month0_retention},
    order_lines::{build_order_lines, OrderLine},
    types::YearMonth,
    validity_gate::{build_orders, Order},
};

fn at(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(10, 0, 0))
        .expect("valid timestamp")
}

fn line(order: &str, customer: &str, ts: NaiveDateTime, desc: &str, qty: f64, price: f64) -> NormalizedLine {
    NormalizedLine {
        order_id:    order.into(),
        sku:         format!("SKU-{}", desc.len()),
        description: desc.into(),
        quantity:    qty,
        unit_price:  price,
        order_ts:    ts,
        customer_id: customer.into(),
        country:     "United Kingdom".into(),
    }
}

struct Fixture {
    lines:     Vec<OrderLine>,
    orders:    Vec<Order>,
    customers: Vec<Customer>,
}

fn build(raw: Vec<NormalizedLine>) -> Fixture {
    let classifier = FamilyClassifier::new(&PipelineConfig::default_test().rules).expect("rules compile");
    let lines = build_order_lines(raw, &classifier);
    let (orders, _) = build_orders(&lines, &PolicyConfig::default(), false).expect("gate A");
    let customers = assign_cohorts(&orders, &lines, &PolicyConfig::default());
    Fixture { lines, orders, customers }
}

const LANTERN: &str = "WHITE METAL LANTERN";
const MUG: &str = "RETRO COFFEE MUGS ASSORTED";

#[test]
fn float_spelled_ids_merge_into_one_customer() {
    let raw_row = |order: &str, customer: RawToken, ts: &str| RawOrderLine {
        order_id:    Some(order.into()),
        sku:         Some("71053".into()),
        description: Some(LANTERN.into()),
        quantity:    Some(RawToken::from(2.0)),
        unit_price:  Some(RawToken::from(3.75)),
        order_ts:    Some(ts.into()),
        customer_id: Some(customer),
        country:     Some("France".into()),
    };
    let (normalized, _) = normalize_raw_lines(&[
        raw_row("536365", RawToken::from(12345.0), "2011-01-05 10:00:00"),
        raw_row("540001", RawToken::from("12345"), "2011-02-07 10:00:00"),
        raw_row("540002", RawToken::from("12345.0"), "2011-03-09 10:00:00"),
    ])
    .expect("ingest");

    let fx = build(normalized);
    assert_eq!(fx.customers.len(), 1, "all three spellings are one customer");
    let customer = &fx.customers[0];
    assert_eq!(customer.customer_id, "12345");
    assert_eq!(customer.first_order_id, "536365");
    assert_eq!(customer.cohort_month, YearMonth::new(2011, 1).expect("month"));
}

#[test]
fn guest_orders_never_form_a_cohort() {
    let fx = build(vec![
        line("536365", "GUEST", at(2011, 1, 5), LANTERN, 2.0, 3.0),
        line("536366", "17850", at(2011, 1, 6), LANTERN, 2.0, 3.0),
    ]);
    let ids: Vec<&str> = fx.customers.iter().map(|c| c.customer_id.as_str()).collect();
    assert_eq!(ids, vec!["17850"]);
}

#[test]
fn first_order_ties_break_on_order_id() {
    let fx = build(vec![
        line("536500", "17850", at(2011, 1, 5), MUG, 1.0, 3.0),
        line("536499", "17850", at(2011, 1, 5), LANTERN, 1.0, 3.0),
    ]);
    assert_eq!(fx.customers[0].first_order_id, "536499");
    assert_eq!(fx.customers[0].first_product_family, "Candles_Lighting");
}

#[test]
fn cancel_before_first_purchase_is_ignored_for_the_cohort() {
    let fx = build(vec![
        line("C536000", "17850", at(2010, 12, 1), LANTERN, -1.0, 3.0),
        line("536100", "17850", at(2011, 1, 5), LANTERN, 1.0, 3.0),
    ]);
    assert_eq!(fx.customers[0].cohort_month, YearMonth::new(2011, 1).expect("month"));
}

#[test]
fn first_family_skips_non_merch_lines() {
    let fx = build(vec![
        line("536365", "17850", at(2011, 1, 5), "POSTAGE", 1.0, 40.0),
        line("536365", "17850", at(2011, 1, 5), LANTERN, 1.0, 3.0),
        line("536366", "13047", at(2011, 1, 6), "POSTAGE", 1.0, 18.0),
    ]);
    let family = |id: &str| {
        fx.customers
            .iter()
            .find(|c| c.customer_id == id)
            .map(|c| c.first_product_family.clone())
            .expect("customer present")
    };
    assert_eq!(family("17850"), "Candles_Lighting", "postage outweighs but is excluded");
    assert_eq!(family("13047"), "Other", "no merch lines on the first order");
}

#[test]
fn first_family_ties_on_items_then_label() {
    let classifier = FamilyClassifier::new(&PipelineConfig::default_test().rules).expect("rules compile");
    let lines = build_order_lines(
        vec![
            line("1", "A", at(2011, 1, 5), MUG, 2.0, 5.0),
            line("1", "A", at(2011, 1, 5), LANTERN, 1.0, 10.0),
        ],
        &classifier,
    );
    let refs: Vec<&OrderLine> = lines.iter().collect();
    assert_eq!(first_product_family(&refs), "Kitchen_Dining", "equal gross, more items wins");

    let lines = build_order_lines(
        vec![
            line("1", "A", at(2011, 1, 5), MUG, 1.0, 5.0),
            line("1", "A", at(2011, 1, 5), LANTERN, 1.0, 5.0),
        ],
        &classifier,
    );
    let refs: Vec<&OrderLine> = lines.iter().collect();
    assert_eq!(first_product_family(&refs), "Candles_Lighting", "full tie goes to the first label");
    assert_eq!(first_product_family(&[]), "Other");
}

#[test]
fn wholesale_floors_protect_small_populations() {
    let fx = build(vec![
        line("1", "A", at(2011, 1, 5), LANTERN, 12.0, 2.0),
        line("2", "B", at(2011, 1, 6), LANTERN, 240.0, 1.5),
        line("3", "C", at(2011, 1, 7), LANTERN, 3.0, 400.0),
    ]);
    let wholesale: Vec<(&str, bool)> = fx
        .customers
        .iter()
        .map(|c| (c.customer_id.as_str(), c.is_wholesale_like))
        .collect();
    assert_eq!(wholesale, vec![("A", false), ("B", true), ("C", true)]);
}

#[test]
fn percentile_matches_linear_interpolation() {
    let values: Vec<f64> = (1..=101).map(f64::from).collect();
    assert_eq!(percentile(&values, 99.0), Some(100.0));
    assert_eq!(percentile(&[7.0], 99.0), Some(7.0));
    assert_eq!(percentile(&[4.0, 1.0], 50.0), Some(2.5), "input order does not matter");
}

#[test]
fn activity_grid_is_dense_and_counts_net_from_every_order() {
    let policy = PolicyConfig::default();
    let fx = build(vec![
        line("100", "17850", at(2011, 1, 5), LANTERN, 4.0, 2.5),
        line("C101", "17850", at(2011, 2, 2), LANTERN, -2.0, 2.5),
        line("102", "17850", at(2011, 3, 9), MUG, 1.0, 6.0),
        line("103", "17850", at(2011, 3, 20), MUG, 1.0, 4.0),
        line("104", "17850", at(2012, 1, 1), MUG, 1.0, 4.0),
        line("200", "13047", at(2011, 2, 14), MUG, 2.0, 3.0),
    ]);
    let grid = build_activity_grid(&fx.customers, &fx.orders, &policy);

    assert_eq!(grid.cells.len(), 2 * (policy.horizon_h as usize + 1));
    check_dense_grid(&grid, &fx.customers, &policy).expect("dense grid");
    assert_eq!(check_month0_retention(&grid).expect("month 0"), 100.0);

    let cell = |customer: &str, m: u32| {
        grid.cells
            .iter()
            .find(|c| c.customer_id == customer && c.months_since_first == m)
            .expect("cell present")
    };

    let m1 = cell("17850", 1);
    assert_eq!(m1.orders_count_valid, 0);
    assert!(!m1.is_retained_logo);
    assert_eq!(m1.net_revenue_proxy_total, -5.0, "cancel net lands in its month");

    let m2 = cell("17850", 2);
    assert_eq!(m2.orders_count_valid, 2);
    assert_eq!(m2.gross_revenue_valid, 10.0);
    assert_eq!(m2.activity_month, YearMonth::new(2011, 3).expect("month"));

    let total_net: f64 = grid
        .cells
        .iter()
        .filter(|c| c.customer_id == "17850")
        .map(|c| c.net_revenue_proxy_total)
        .sum();
    assert_eq!(total_net, 10.0 - 5.0 + 10.0, "order past the horizon is excluded");

    assert_eq!(cell("13047", 0).cohort_month, YearMonth::new(2011, 2).expect("month"));
    assert!(fx.lines.iter().any(|l| l.is_cancel_invoice));
}
