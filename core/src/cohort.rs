//! Cohort assigner: first valid order per customer.
//!
//! Only valid, non-GUEST orders count. The earliest order (ties by order id)
//! fixes the cohort month, the first-order size used for the wholesale-like
//! flag, and the first product family.

use crate::{
    config::PolicyConfig,
    order_lines::OrderLine,
    types::{CustomerId, FamilyLabel, OrderId, YearMonth, GUEST, NON_MERCH_SUFFIX, OTHER_FAMILY},
    validity_gate::Order,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id:             CustomerId,
    pub first_order_id:          OrderId,
    pub first_order_ts:          NaiveDateTime,
    pub cohort_month:            YearMonth,
    pub first_order_items_count: f64,
    pub first_order_gross:       f64,
    pub is_wholesale_like:       bool,
    pub first_product_family:    FamilyLabel,
}

/// Thresholds a first order must reach to be flagged wholesale-like.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WholesaleThresholds {
    pub items: f64,
    pub gross: f64,
}

/// Linear-interpolated percentile (`p` in 0..=100) of unsorted values.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64))
}

/// Population percentile floored at the policy minimums, so a small or
/// retail-only population never flags ordinary baskets.
pub fn wholesale_thresholds(first_orders: &[&Order], policy: &PolicyConfig) -> WholesaleThresholds {
    let items: Vec<f64> = first_orders.iter().map(|o| o.items_count).collect();
    let gross: Vec<f64> = first_orders.iter().map(|o| o.order_gross).collect();
    WholesaleThresholds {
        items: percentile(&items, policy.wholesale_percentile)
            .unwrap_or(policy.wholesale_min_items)
            .max(policy.wholesale_min_items),
        gross: percentile(&gross, policy.wholesale_percentile)
            .unwrap_or(policy.wholesale_min_gross)
            .max(policy.wholesale_min_gross),
    }
}

/// Family with the largest gross on the first order, ignoring `_NonMerch`
/// families. Ties: more items, then label ascending. No merch lines: Other.
pub fn first_product_family(first_order_lines: &[&OrderLine]) -> FamilyLabel {
    let mut by_family: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for line in first_order_lines {
        let entry = by_family.entry(line.product_family.as_str()).or_insert((0.0, 0.0));
        entry.0 += line.line_amount_gross;
        entry.1 += line.qty_pos;
    }

    by_family
        .into_iter()
        .filter(|(family, _)| !family.ends_with(NON_MERCH_SUFFIX))
        .max_by(|(fa, (ga, ia)), (fb, (gb, ib))| {
            ga.total_cmp(gb)
                .then_with(|| ia.total_cmp(ib))
                .then_with(|| fb.cmp(fa))
        })
        .map(|(family, _)| family.to_string())
        .unwrap_or_else(|| OTHER_FAMILY.to_string())
}

/// Derive one customer row per non-GUEST customer with a valid order.
/// Output ordered by (first_order_ts, customer_id).
pub fn assign_cohorts(orders: &[Order], lines: &[OrderLine], policy: &PolicyConfig) -> Vec<Customer> {
    let mut first: BTreeMap<&str, &Order> = BTreeMap::new();
    for order in orders.iter().filter(|o| o.is_valid_purchase && o.customer_id != GUEST) {
        first
            .entry(order.customer_id.as_str())
            .and_modify(|current| {
                if (order.order_ts, &order.order_id) < (current.order_ts, &current.order_id) {
                    *current = order;
                }
            })
            .or_insert(order);
    }

    let first_orders: Vec<&Order> = first.values().copied().collect();
    let thresholds = wholesale_thresholds(&first_orders, policy);

    let mut lines_by_first_order: HashMap<(&str, &str), Vec<&OrderLine>> = first_orders
        .iter()
        .map(|o| ((o.customer_id.as_str(), o.order_id.as_str()), Vec::new()))
        .collect();
    for line in lines {
        if let Some(bucket) = lines_by_first_order.get_mut(&(line.customer_id.as_str(), line.order_id.as_str())) {
            bucket.push(line);
        }
    }

    let mut customers: Vec<Customer> = first_orders
        .iter()
        .map(|o| {
            let family_lines = lines_by_first_order
                .get(&(o.customer_id.as_str(), o.order_id.as_str()))
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            Customer {
                customer_id:             o.customer_id.clone(),
                first_order_id:          o.order_id.clone(),
                first_order_ts:          o.order_ts,
                cohort_month:            YearMonth::of(&o.order_ts),
                first_order_items_count: o.items_count,
                first_order_gross:       o.order_gross,
                is_wholesale_like:       o.items_count >= thresholds.items
                    || o.order_gross >= thresholds.gross,
                first_product_family:    first_product_family(family_lines),
            }
        })
        .collect();

    customers.sort_by(|a, b| {
        a.first_order_ts
            .cmp(&b.first_order_ts)
            .then_with(|| a.customer_id.cmp(&b.customer_id))
    });

    log::info!(
        "cohorts: {} customers, wholesale thresholds items>={} gross>={:.2}, {} wholesale-like",
        customers.len(),
        thresholds.items,
        thresholds.gross,
        customers.iter().filter(|c| c.is_wholesale_like).count(),
    );
    customers
}
