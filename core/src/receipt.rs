//! Scope receipt: one record summarizing a run for downstream reporting and
//! independent validation.

use crate::{
    config::PolicyConfig,
    confound::GateCOutcome,
    coverage::CoverageReport,
    family_report::TopSkuReceipt,
    invariants::QaSummary,
    types::YearMonth,
    validity_gate::GateAOutcome,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Processed line count more than 5% above raw suggests a join explosion.
pub const RECONCILE_UPPER: f64 = 1.05;
/// Processed line count more than 5% below raw is an undercount.
pub const RECONCILE_LOWER: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconcileStatus {
    Ok,
    MismatchJoinExplosionSuspected,
    MismatchUndercount,
}

impl ReconcileStatus {
    pub fn classify(raw_rows: u64, processed_rows: u64) -> Self {
        let raw = raw_rows as f64;
        let processed = processed_rows as f64;
        if processed > raw * RECONCILE_UPPER {
            Self::MismatchJoinExplosionSuspected
        } else if processed < raw * RECONCILE_LOWER {
            Self::MismatchUndercount
        } else {
            Self::Ok
        }
    }
}

/// Gate B numbers without the unmapped listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateBSummary {
    pub gross_non_other_pct:    f64,
    pub customer_non_other_pct: f64,
    pub customer_nonmerch_pct:  f64,
}

impl From<&CoverageReport> for GateBSummary {
    fn from(report: &CoverageReport) -> Self {
        Self {
            gross_non_other_pct:    report.gross_non_other_pct,
            customer_non_other_pct: report.customer_non_other_pct,
            customer_nonmerch_pct:  report.customer_nonmerch_pct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeReceipt {
    pub raw_row_count:                 u64,
    pub processed_order_lines_rows:    u64,
    pub processed_orders_rows:         u64,
    pub processed_customers_rows:      u64,
    pub reconcile_status:              ReconcileStatus,
    pub raw_min_date:                  Option<NaiveDateTime>,
    pub raw_max_date:                  Option<NaiveDateTime>,
    pub max_observed_month:            YearMonth,
    pub max_observed_month_overridden: bool,
    pub gate_a:                        GateAOutcome,
    pub gate_b:                        GateBSummary,
    pub gate_c:                        GateCOutcome,
    pub selected_cohorts:              Vec<YearMonth>,
    pub used_fallback:                 bool,
    pub plot_pool_count:               usize,
    pub eligible_count:                usize,
    pub selected_min_n0:               Option<u64>,
    pub family_count:                  usize,
    pub family_min_n_customers:        Option<u64>,
    pub top_sku_appendix:              TopSkuReceipt,
    pub qa:                            QaSummary,
    pub classification_rule_count:     usize,
    pub policy:                        PolicyConfig,
}
