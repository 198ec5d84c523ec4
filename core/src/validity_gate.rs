//! Gate A: order aggregation and the adaptive validity switch.
//!
//! Lines collapse to one row per order. Default validity is
//! `gross > 0 && !cancel`. Among default-valid orders, the share whose signed
//! net proxy is non-positive is the Gate A metric; above the trigger (or when
//! the caller forces it) every order is re-judged under the strict rule,
//! which also requires `net_proxy > 0`.
//!
//! The switch is resolved once per run by a pure function, never by
//! mutating flags in place.

use crate::{
    config::PolicyConfig,
    error::{RetentionError, RetentionResult},
    order_lines::OrderLine,
    types::{CustomerId, OrderId},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancialStatus {
    Paid,
    RefundOrCredit,
}

impl FinancialStatus {
    pub fn from_credit_like(is_credit_like: bool) -> Self {
        if is_credit_like { Self::RefundOrCredit } else { Self::Paid }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidityBranch {
    Default,
    Strict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id:                  OrderId,
    /// Earliest line timestamp.
    pub order_ts:                  NaiveDateTime,
    pub customer_id:               CustomerId,
    pub country:                   String,
    pub items_count:               f64,
    pub order_gross:               f64,
    pub order_net_proxy:           f64,
    pub is_cancel_invoice:         bool,
    pub is_credit_like:            bool,
    pub financial_status:          FinancialStatus,
    pub is_valid_purchase_default: bool,
    pub is_valid_purchase:         bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateAOutcome {
    /// Percent of default-valid orders with `order_net_proxy <= 0`.
    pub pct_valid_nonpositive_net: f64,
    pub trigger_threshold_pct:     f64,
    pub trigger_fired:             bool,
    pub forced:                    bool,
    pub strict_applied:            bool,
    pub branch:                    ValidityBranch,
    pub default_valid_orders:      u64,
    pub valid_orders:              u64,
}

/// Result of resolving the validity policy over a set of orders.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidityResolution {
    /// Index-aligned with the orders passed in.
    pub flags:       Vec<bool>,
    pub branch:      ValidityBranch,
    pub trigger_pct: f64,
}

struct OrderAccumulator {
    order_id:     OrderId,
    order_ts:     NaiveDateTime,
    customer_id:  CustomerId,
    country:      String,
    items_count:  f64,
    gross:        f64,
    net_proxy:    f64,
    cancel:       bool,
}

/// Sum lines per order id. Lines are visited in (ts, order_id, sku) order
/// whatever order the caller passes, so customer and country come from the
/// earliest line. Output ordered by (order_ts, order_id).
fn aggregate(lines: &[OrderLine]) -> Vec<OrderAccumulator> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut accs: Vec<OrderAccumulator> = Vec::new();

    let mut ordered: Vec<&OrderLine> = lines.iter().collect();
    ordered.sort_by(|a, b| {
        a.order_ts
            .cmp(&b.order_ts)
            .then_with(|| a.order_id.cmp(&b.order_id))
            .then_with(|| a.sku.cmp(&b.sku))
    });

    for line in ordered {
        let slot = *index.entry(line.order_id.as_str()).or_insert_with(|| {
            accs.push(OrderAccumulator {
                order_id:    line.order_id.clone(),
                order_ts:    line.order_ts,
                customer_id: line.customer_id.clone(),
                country:     line.country.clone(),
                items_count: 0.0,
                gross:       0.0,
                net_proxy:   0.0,
                cancel:      false,
            });
            accs.len() - 1
        });
        let acc = &mut accs[slot];
        acc.order_ts = acc.order_ts.min(line.order_ts);
        acc.items_count += line.qty_pos;
        acc.gross += line.line_amount_gross;
        acc.net_proxy += line.line_amount_net_proxy;
        acc.cancel |= line.is_cancel_invoice;
    }

    accs.sort_by(|a, b| a.order_ts.cmp(&b.order_ts).then_with(|| a.order_id.cmp(&b.order_id)));
    accs
}

pub fn is_default_valid(order_gross: f64, is_cancel_invoice: bool) -> bool {
    order_gross > 0.0 && !is_cancel_invoice
}

/// Decide the validity branch and per-order flags. Pure: same orders and
/// threshold always give the same answer.
pub fn resolve_validity(orders: &[Order], trigger_threshold_pct: f64, force_strict: bool) -> ValidityResolution {
    let default_valid: Vec<&Order> = orders.iter().filter(|o| o.is_valid_purchase_default).collect();
    let trigger_pct = if default_valid.is_empty() {
        0.0
    } else {
        let nonpositive = default_valid.iter().filter(|o| o.order_net_proxy <= 0.0).count();
        nonpositive as f64 / default_valid.len() as f64 * 100.0
    };

    let branch = if force_strict || trigger_pct > trigger_threshold_pct {
        ValidityBranch::Strict
    } else {
        ValidityBranch::Default
    };

    let flags = orders
        .iter()
        .map(|o| match branch {
            ValidityBranch::Default => o.is_valid_purchase_default,
            ValidityBranch::Strict => o.is_valid_purchase_default && o.order_net_proxy > 0.0,
        })
        .collect();

    ValidityResolution { flags, branch, trigger_pct }
}

/// Build the orders table and record which validity branch the run took.
pub fn build_orders(
    lines: &[OrderLine],
    policy: &PolicyConfig,
    force_strict: bool,
) -> RetentionResult<(Vec<Order>, GateAOutcome)> {
    let mut orders: Vec<Order> = aggregate(lines)
        .into_iter()
        .map(|acc| {
            let is_credit_like = acc.cancel || acc.net_proxy < 0.0;
            let default_valid = is_default_valid(acc.gross, acc.cancel);
            Order {
                order_id:                  acc.order_id,
                order_ts:                  acc.order_ts,
                customer_id:               acc.customer_id,
                country:                   acc.country,
                items_count:               acc.items_count,
                order_gross:               acc.gross,
                order_net_proxy:           acc.net_proxy,
                is_cancel_invoice:         acc.cancel,
                is_credit_like,
                financial_status:          FinancialStatus::from_credit_like(is_credit_like),
                is_valid_purchase_default: default_valid,
                is_valid_purchase:         default_valid,
            }
        })
        .collect();

    let resolution = resolve_validity(&orders, policy.strict_trigger_pct, force_strict);
    for (order, flag) in orders.iter_mut().zip(&resolution.flags) {
        order.is_valid_purchase = *flag;
    }

    check_validity_consistency(&orders, resolution.branch)?;

    let outcome = GateAOutcome {
        pct_valid_nonpositive_net: resolution.trigger_pct,
        trigger_threshold_pct:     policy.strict_trigger_pct,
        trigger_fired:             resolution.trigger_pct > policy.strict_trigger_pct,
        forced:                    force_strict,
        strict_applied:            resolution.branch == ValidityBranch::Strict,
        branch:                    resolution.branch,
        default_valid_orders:      orders.iter().filter(|o| o.is_valid_purchase_default).count() as u64,
        valid_orders:              orders.iter().filter(|o| o.is_valid_purchase).count() as u64,
    };

    if outcome.strict_applied {
        log::warn!(
            "gate A: strict validity applied (metric={:.4}% threshold={}% forced={}); valid orders {} -> {}",
            outcome.pct_valid_nonpositive_net,
            outcome.trigger_threshold_pct,
            outcome.forced,
            outcome.default_valid_orders,
            outcome.valid_orders,
        );
    } else {
        log::info!(
            "gate A: default validity kept (metric={:.4}% threshold={}%); valid orders {}",
            outcome.pct_valid_nonpositive_net,
            outcome.trigger_threshold_pct,
            outcome.valid_orders,
        );
    }
    Ok((orders, outcome))
}

/// Every flag must agree with the rule of the branch that produced it.
fn check_validity_consistency(orders: &[Order], branch: ValidityBranch) -> RetentionResult<()> {
    for order in orders {
        if order.financial_status != FinancialStatus::from_credit_like(order.is_credit_like) {
            return Err(RetentionError::ValidityGate(format!(
                "order {} financial_status={:?} contradicts is_credit_like={}",
                order.order_id, order.financial_status, order.is_credit_like
            )));
        }
        if order.is_valid_purchase && !order.is_valid_purchase_default {
            return Err(RetentionError::ValidityGate(format!(
                "order {} is valid but fails the default rule (gross={}, cancel={})",
                order.order_id, order.order_gross, order.is_cancel_invoice
            )));
        }
        if branch == ValidityBranch::Strict && order.is_valid_purchase && order.order_net_proxy <= 0.0 {
            return Err(RetentionError::ValidityGate(format!(
                "order {} is valid under strict branch with net_proxy={}",
                order.order_id, order.order_net_proxy
            )));
        }
    }
    Ok(())
}
