//! Canonical order lines and the per-sku product table.

use crate::{
    classifier::FamilyClassifier,
    ingest::NormalizedLine,
    types::{CustomerId, FamilyLabel, OrderId, Sku},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub order_id:              OrderId,
    pub order_ts:              NaiveDateTime,
    pub customer_id:           CustomerId,
    pub sku:                   Sku,
    pub description:           String,
    pub country:               String,
    pub quantity:              f64,
    pub unit_price:            f64,
    pub qty_pos:               f64,
    pub unit_price_pos:        f64,
    /// max(quantity, 0) * max(unit_price, 0)
    pub line_amount_gross:     f64,
    /// quantity * unit_price, signed
    pub line_amount_net_proxy: f64,
    /// Invoice number starts with "C".
    pub is_cancel_invoice:     bool,
    pub is_return_line:        bool,
    pub product_family:        FamilyLabel,
}

/// Derive amounts, cancel/return flags and product family for every line.
/// Output is ordered by (order_ts, order_id, sku), stable.
pub fn build_order_lines(lines: Vec<NormalizedLine>, classifier: &FamilyClassifier) -> Vec<OrderLine> {
    let families = classifier.classify_all(
        &lines.iter().map(|l| l.description.as_str()).collect::<Vec<_>>(),
    );

    let mut out: Vec<OrderLine> = lines
        .into_iter()
        .zip(families)
        .map(|(line, product_family)| {
            let qty_pos = line.quantity.max(0.0);
            let unit_price_pos = line.unit_price.max(0.0);
            let is_cancel_invoice = line.order_id.starts_with('C');
            OrderLine {
                is_return_line: line.quantity < 0.0 || is_cancel_invoice,
                line_amount_gross: qty_pos * unit_price_pos,
                line_amount_net_proxy: line.quantity * line.unit_price,
                qty_pos,
                unit_price_pos,
                is_cancel_invoice,
                product_family,
                order_id: line.order_id,
                order_ts: line.order_ts,
                customer_id: line.customer_id,
                sku: line.sku,
                description: line.description,
                country: line.country,
                quantity: line.quantity,
                unit_price: line.unit_price,
            }
        })
        .collect();

    out.sort_by(|a, b| {
        a.order_ts
            .cmp(&b.order_ts)
            .then_with(|| a.order_id.cmp(&b.order_id))
            .then_with(|| a.sku.cmp(&b.sku))
    });
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub sku:            Sku,
    pub description:    String,
    pub product_family: FamilyLabel,
}

/// One row per sku: the (description, family) variant with the most gross
/// revenue, then most lines, then description and family ascending.
pub fn build_products(lines: &[OrderLine]) -> Vec<Product> {
    let mut variants: BTreeMap<(&str, &str, &str), (f64, u64)> = BTreeMap::new();
    for line in lines {
        let entry = variants
            .entry((line.sku.as_str(), line.description.as_str(), line.product_family.as_str()))
            .or_insert((0.0, 0));
        entry.0 += line.line_amount_gross;
        entry.1 += 1;
    }

    let mut best: BTreeMap<&str, ((&str, &str), (f64, u64))> = BTreeMap::new();
    // Keys arrive sorted by (sku, description, family), so strict comparisons
    // keep the alphabetically first variant on full ties.
    for ((sku, description, family), (gross, count)) in variants {
        match best.get(sku) {
            Some((_, (best_gross, best_count)))
                if gross < *best_gross || (gross == *best_gross && count <= *best_count) => {}
            _ => {
                best.insert(sku, ((description, family), (gross, count)));
            }
        }
    }

    best.into_iter()
        .map(|(sku, ((description, family), _))| Product {
            sku:            sku.to_string(),
            description:    description.to_string(),
            product_family: family.to_string(),
        })
        .collect()
}
