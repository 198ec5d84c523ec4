//! Activity grid: dense customer x relative-month metrics.
//!
//! Every customer gets exactly `horizon_h + 1` cells (months 0..=H).
//! Empty cells are zero, never missing: missingness is introduced only by the
//! right-censor layer downstream.
//!
//! Valid-order counts and gross use valid orders only. The net proxy sums
//! every order in the month, valid or not, so credits and returns still
//! count against net value.

use crate::{
    cohort::Customer,
    config::PolicyConfig,
    types::{CustomerId, FamilyLabel, YearMonth},
    validity_gate::Order,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityCell {
    pub customer_id:             CustomerId,
    pub cohort_month:            YearMonth,
    pub activity_month:          YearMonth,
    pub months_since_first:      u32,
    pub orders_count_valid:      u32,
    pub gross_revenue_valid:     f64,
    pub net_revenue_proxy_total: f64,
    pub is_retained_logo:        bool,
    pub first_product_family:    FamilyLabel,
    pub is_wholesale_like:       bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityGrid {
    pub horizon_h: u32,
    /// Ordered by (customer_id, months_since_first).
    pub cells:     Vec<ActivityCell>,
}

#[derive(Clone, Copy, Default)]
struct CellTotals {
    orders_valid: u32,
    gross_valid:  f64,
    net_total:    f64,
}

impl ActivityGrid {
    pub fn at_month(&self, months_since_first: u32) -> impl Iterator<Item = &ActivityCell> {
        self.cells.iter().filter(move |c| c.months_since_first == months_since_first)
    }

    pub fn customer_count(&self) -> usize {
        self.at_month(0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

pub fn build_activity_grid(customers: &[Customer], orders: &[Order], policy: &PolicyConfig) -> ActivityGrid {
    let h = policy.horizon_h;
    let width = h as usize + 1;

    let slot_of: HashMap<&str, usize> = customers
        .iter()
        .enumerate()
        .map(|(i, c)| (c.customer_id.as_str(), i))
        .collect();
    let mut totals = vec![CellTotals::default(); customers.len() * width];

    for order in orders {
        let Some(&slot) = slot_of.get(order.customer_id.as_str()) else {
            continue;
        };
        let customer = &customers[slot];
        let delta = YearMonth::of(&order.order_ts).months_since(&customer.cohort_month);
        if delta < 0 || delta > h as i64 {
            continue;
        }
        let cell = &mut totals[slot * width + delta as usize];
        if order.is_valid_purchase {
            cell.orders_valid += 1;
            cell.gross_valid += order.order_gross;
        }
        cell.net_total += order.order_net_proxy;
    }

    let mut order_by_id: Vec<usize> = (0..customers.len()).collect();
    order_by_id.sort_by(|&a, &b| customers[a].customer_id.cmp(&customers[b].customer_id));

    let mut cells = Vec::with_capacity(customers.len() * width);
    for slot in order_by_id {
        let customer = &customers[slot];
        for m in 0..=h {
            let t = totals[slot * width + m as usize];
            cells.push(ActivityCell {
                customer_id:             customer.customer_id.clone(),
                cohort_month:            customer.cohort_month,
                activity_month:          customer.cohort_month.plus_months(m),
                months_since_first:      m,
                orders_count_valid:      t.orders_valid,
                gross_revenue_valid:     t.gross_valid,
                net_revenue_proxy_total: t.net_total,
                is_retained_logo:        t.orders_valid > 0,
                first_product_family:    customer.first_product_family.clone(),
                is_wholesale_like:       customer.is_wholesale_like,
            });
        }
    }

    log::info!("activity grid: {} customers x {} months = {} cells", customers.len(), width, cells.len());
    ActivityGrid { horizon_h: h, cells }
}
