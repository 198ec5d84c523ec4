//! Run policy and classification rules.
//!
//! RULE: Policy is an immutable value built once before a run and passed by
//! reference into every stage. No stage reads process-wide globals.

use crate::types::YearMonth;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How unobservable cells are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RightCensorMode {
    /// Cells past the observation watermark are missing, never zero.
    MissingNotZero,
}

/// Ten years of monthly rows per customer is the largest grid a run builds.
pub const MAX_HORIZON_H: u32 = 120;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Months tracked after the cohort month (grid has `horizon_h + 1` rows per customer).
    pub horizon_h: u32,
    /// Month-0 customers a cohort needs to be eligible.
    pub min_cohort_n: u64,
    /// Stricter month-0 floor for the plot pool.
    pub min_plot_cohort_n: u64,
    /// Minimum first-order customers for a SKU to enter the appendix.
    pub min_sku_n: u64,
    pub topk_skus_per_family: usize,
    pub right_censor_mode: RightCensorMode,
    pub observed_only: bool,
    /// Weight on the logo retention gap in family priority scoring.
    pub priority_w1: f64,
    /// Weight on the net proxy retention gap in family priority scoring.
    pub priority_w2: f64,
    /// Gate A: strict validity switches on above this share (percent) of
    /// default-valid orders with non-positive net proxy.
    pub strict_trigger_pct: f64,
    pub wholesale_percentile: f64,
    pub wholesale_min_items: f64,
    pub wholesale_min_gross: f64,
    /// Gate C: absolute retention gap (percentage points) that counts as material.
    pub confound_min_diff_pp: f64,
    /// Gate C: both subgroups need at least this many customers.
    pub confound_min_n: u64,
    /// Families kept by name in the month-2 family table; the rest fold into Other.
    pub family_top_n: usize,
    /// Weakest families profiled in the top-SKU appendix.
    pub target_family_count: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            horizon_h:            6,
            min_cohort_n:         50,
            min_plot_cohort_n:    200,
            min_sku_n:            30,
            topk_skus_per_family: 10,
            right_censor_mode:    RightCensorMode::MissingNotZero,
            observed_only:        true,
            priority_w1:          0.5,
            priority_w2:          0.5,
            strict_trigger_pct:   0.5,
            wholesale_percentile: 99.0,
            wholesale_min_items:  100.0,
            wholesale_min_gross:  1000.0,
            confound_min_diff_pp: 5.0,
            confound_min_n:       80,
            family_top_n:         8,
            target_family_count:  3,
        }
    }
}

impl PolicyConfig {
    /// Expected `months_since_first` values for one customer or cohort series.
    pub fn horizon_months(&self) -> Vec<u32> {
        (0..=self.horizon_h).collect()
    }

    /// Reject policies no run could honour.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.horizon_h >= 2, "horizon_h must cover month 2, got {}", self.horizon_h);
        anyhow::ensure!(
            self.horizon_h <= MAX_HORIZON_H,
            "horizon_h must be at most {MAX_HORIZON_H}, got {}",
            self.horizon_h
        );
        anyhow::ensure!(
            self.min_plot_cohort_n >= self.min_cohort_n,
            "min_plot_cohort_n ({}) must be >= min_cohort_n ({})",
            self.min_plot_cohort_n,
            self.min_cohort_n
        );
        anyhow::ensure!(
            (0.0..=100.0).contains(&self.wholesale_percentile),
            "wholesale_percentile must be within [0, 100], got {}",
            self.wholesale_percentile
        );
        anyhow::ensure!(
            self.strict_trigger_pct >= 0.0,
            "strict_trigger_pct must be non-negative"
        );
        Ok(())
    }
}

/// One product-family rule. Lower `priority` is tried first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyRule {
    pub priority:     u32,
    pub pattern:      String,
    pub family_label: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RulesFile {
    rules: Vec<FamilyRule>,
}

/// Caller switches for a single run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Apply the strict validity definition regardless of the Gate A metric.
    pub force_strict_validity: bool,
    /// Use this watermark instead of the month of the latest raw timestamp.
    pub max_observed_month: Option<YearMonth>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub policy: PolicyConfig,
    pub rules:  Vec<FamilyRule>,
}

impl PipelineConfig {
    /// Load from the data/ directory.
    /// `policy.json` is optional (canonical constants when absent);
    /// `product_family_rules.json` is required.
    /// In tests, use PipelineConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let policy_path = format!("{data_dir}/policy.json");
        let policy = if Path::new(&policy_path).exists() {
            let content = std::fs::read_to_string(&policy_path)
                .map_err(|e| anyhow::anyhow!("Cannot read {policy_path}: {e}"))?;
            serde_json::from_str::<PolicyConfig>(&content)
                .map_err(|e| anyhow::anyhow!("Cannot parse {policy_path}: {e}"))?
        } else {
            log::info!("{policy_path} not found; using default policy");
            PolicyConfig::default()
        };
        policy.validate()?;

        let rules_path = format!("{data_dir}/product_family_rules.json");
        let rules_content = std::fs::read_to_string(&rules_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {rules_path}: {e}"))?;
        let rules_file: RulesFile = serde_json::from_str(&rules_content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {rules_path}: {e}"))?;
        anyhow::ensure!(!rules_file.rules.is_empty(), "{rules_path} has no rules");

        Ok(Self { policy, rules: rules_file.rules })
    }

    /// Config with hardcoded defaults for use in unit tests.
    /// The rule keywords line up with the synthetic catalogue.
    pub fn default_test() -> Self {
        let rule = |priority: u32, pattern: &str, family_label: &str| FamilyRule {
            priority,
            pattern: pattern.into(),
            family_label: family_label.into(),
        };
        Self {
            policy: PolicyConfig::default(),
            rules: vec![
                rule(10, r"^POSTAGE$|CARRIAGE|DOTCOM POSTAGE", "Shipping_NonMerch"),
                rule(20, r"^MANUAL$|DISCOUNT|BANK CHARGES|ADJUST", "Adjustment_NonMerch"),
                rule(30, r"CHRISTMAS|XMAS|ADVENT", "Seasonal"),
                rule(40, r"BAG|TOTE", "Bags"),
                rule(50, r"CANDLE|T-LIGHT|LANTERN", "Candles_Lighting"),
                rule(60, r"MUG|CUP|PLATE|BOWL|TEAPOT", "Kitchen_Dining"),
                rule(70, r"CARD|WRAP|RIBBON", "Cards_Wrap"),
                rule(80, r"HEART|SIGN|FRAME|CLOCK", "Home_Decor"),
            ],
        }
    }
}
