//! Gate C: wholesale confound check on month-2 logo retention per family.
//!
//! Compares all customers with the retail-only subset (wholesale-like
//! customers removed). A family is materially sensitive when the gap is at
//! least `confound_min_diff_pp` points and both groups have at least
//! `confound_min_n` customers.

use crate::{activity_grid::ActivityGrid, config::PolicyConfig, types::FamilyLabel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfoundRow {
    pub first_product_family: FamilyLabel,
    pub all_n_customers:      u64,
    pub all_m2_retention:     f64,
    pub retail_n_customers:   u64,
    pub retail_m2_retention:  f64,
    pub retention_diff_pp:    f64,
    pub material_sensitivity: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateCOutcome {
    pub rows:           usize,
    pub material_count: usize,
}

#[derive(Default)]
struct Tally {
    n:        u64,
    retained: u64,
}

impl Tally {
    fn add(&mut self, retained: bool) {
        self.n += 1;
        if retained {
            self.retained += 1;
        }
    }

    /// Zero for an empty group.
    fn rate(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.retained as f64 / self.n as f64
        }
    }
}

/// One row per family seen at month 2, ordered by family label.
pub fn build_confound_table(grid: &ActivityGrid, policy: &PolicyConfig) -> Vec<ConfoundRow> {
    let mut by_family: BTreeMap<&str, (Tally, Tally)> = BTreeMap::new();
    for cell in grid.at_month(2) {
        let (all, retail) = by_family.entry(cell.first_product_family.as_str()).or_default();
        all.add(cell.is_retained_logo);
        if !cell.is_wholesale_like {
            retail.add(cell.is_retained_logo);
        }
    }

    by_family
        .into_iter()
        .map(|(family, (all, retail))| {
            let diff_pp = (all.rate() - retail.rate()) * 100.0;
            ConfoundRow {
                first_product_family: family.to_string(),
                all_n_customers:      all.n,
                all_m2_retention:     all.rate(),
                retail_n_customers:   retail.n,
                retail_m2_retention:  retail.rate(),
                retention_diff_pp:    diff_pp,
                material_sensitivity: diff_pp.abs() >= policy.confound_min_diff_pp
                    && all.n.min(retail.n) >= policy.confound_min_n,
            }
        })
        .collect()
}

pub fn summarize(rows: &[ConfoundRow]) -> GateCOutcome {
    let outcome = GateCOutcome {
        rows:           rows.len(),
        material_count: rows.iter().filter(|r| r.material_sensitivity).count(),
    };
    log::info!("Gate C: rows={} material_count={}", outcome.rows, outcome.material_count);
    outcome
}
