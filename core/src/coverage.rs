//! Gate B: how much of the business the family rules explain.

use crate::{
    cohort::Customer,
    order_lines::OrderLine,
    types::{NON_MERCH_SUFFIX, OTHER_FAMILY},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const TOP_UNMAPPED: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmappedDescription {
    pub rank:          usize,
    pub description:   String,
    pub gross_revenue: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// Share of line gross mapped to a family other than `Other`.
    pub gross_non_other_pct:    f64,
    pub customer_non_other_pct: f64,
    /// Should be ~0: non-merch families are excluded from first-family choice.
    pub customer_nonmerch_pct:  f64,
    pub top_unmapped:           Vec<UnmappedDescription>,
}

fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

pub fn build_coverage_report(lines: &[OrderLine], customers: &[Customer]) -> CoverageReport {
    let total_gross: f64 = lines.iter().map(|l| l.line_amount_gross).sum();
    let mapped_gross: f64 = lines
        .iter()
        .filter(|l| l.product_family != OTHER_FAMILY)
        .map(|l| l.line_amount_gross)
        .sum();
    // An empty f64 sum is -0.0; report a plain zero when nothing is mapped.
    let gross_non_other_pct = if total_gross > 0.0 && mapped_gross != 0.0 {
        mapped_gross / total_gross * 100.0
    } else {
        0.0
    };

    let non_other = customers.iter().filter(|c| c.first_product_family != OTHER_FAMILY).count();
    let non_merch = customers
        .iter()
        .filter(|c| c.first_product_family.ends_with(NON_MERCH_SUFFIX))
        .count();

    // BTreeMap gives description order as the tie-break under the stable sort.
    let mut unmapped: BTreeMap<&str, f64> = BTreeMap::new();
    for line in lines.iter().filter(|l| l.product_family == OTHER_FAMILY) {
        *unmapped.entry(line.description.as_str()).or_insert(0.0) += line.line_amount_gross;
    }
    let mut unmapped: Vec<(&str, f64)> = unmapped.into_iter().collect();
    unmapped.sort_by(|a, b| b.1.total_cmp(&a.1));

    let report = CoverageReport {
        gross_non_other_pct,
        customer_non_other_pct: pct(non_other, customers.len()),
        customer_nonmerch_pct: pct(non_merch, customers.len()),
        top_unmapped: unmapped
            .into_iter()
            .take(TOP_UNMAPPED)
            .enumerate()
            .map(|(i, (description, gross))| UnmappedDescription {
                rank:          i + 1,
                description:   description.to_string(),
                gross_revenue: gross,
            })
            .collect(),
    };
    log::info!(
        "Gate B: gross_non_other_pct={:.2}% customer_non_other_pct={:.2}% customer_nonmerch_pct={:.2}%",
        report.gross_non_other_pct,
        report.customer_non_other_pct,
        report.customer_nonmerch_pct
    );
    report
}
