//! The retention pipeline: raw export lines in, audited tables out.
//!
//! EXECUTION ORDER (fixed, each stage a total transform of the previous one):
//!   1. Ingest           normalize ids, coerce types, drop unusable lines
//!   2. Order lines      amounts, cancel flags, product family
//!   3. Gate A           orders, credit flags, adaptive validity branch
//!   4. Transactions     sale / credit view of orders
//!   5. Cohorts          first valid order per customer
//!   6. Activity grid    dense customer x month 0..=H
//!   7. Aggregates       eligibility, right-censor, continuity
//!   8. Table checks     ids, grid density, month-0 retention, censor mask
//!   9. Selection        bottom / mid / top cohorts, then selection checks
//!  10. Heatmaps         logo and net retention
//!  11. Gate B / Gate C  rule coverage, wholesale confound
//!  12. Family tables    month-2 family table, priority scatter, top SKUs
//!  13. Receipt
//!
//! RULES:
//!   - Any failed check aborts the run; no partial output is returned.
//!   - No stage reads the clock or any RNG: identical input gives identical output.
//!   - Policy is read-only for the whole run.

use crate::{
    activity_grid::{build_activity_grid, ActivityGrid},
    censor::ObservationWindow,
    classifier::FamilyClassifier,
    cohort::{assign_cohorts, Customer},
    config::{PipelineConfig, PolicyConfig, RunOptions},
    confound::{build_confound_table, summarize, ConfoundRow},
    coverage::{build_coverage_report, CoverageReport},
    eligibility::{aggregate_cohorts, eligible_cohorts, m2_logo_retention, mark_selected, CohortAggregate},
    error::{RetentionError, RetentionResult},
    family_report::{
        build_family_m2_table, build_priority_scatter, build_top_sku_appendix, check_family_set_match,
        FamilyM2Row, FamilyScatterPoint, TopSkuRow,
    },
    heatmap::{build_logo_heatmap, build_net_heatmap, LogoHeatmapCell, NetHeatmapCell},
    ingest::{normalize_raw_lines, IngestStats, RawOrderLine},
    invariants::{check_selection, check_tables},
    order_lines::{build_order_lines, build_products, OrderLine, Product},
    receipt::{GateBSummary, ReconcileStatus, ScopeReceipt},
    selection::{select_cohorts, CohortSelection},
    transactions::{build_transactions, Transaction},
    validity_gate::{build_orders, GateAOutcome, Order},
};
use serde::Serialize;

/// Every table a run produces. Nothing here exists unless every check passed.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub ingest:            IngestStats,
    pub order_lines:       Vec<OrderLine>,
    pub products:          Vec<Product>,
    pub orders:            Vec<Order>,
    pub gate_a:            GateAOutcome,
    pub transactions:      Vec<Transaction>,
    pub customers:         Vec<Customer>,
    pub activity:          ActivityGrid,
    pub cohort_aggregates: Vec<CohortAggregate>,
    pub selection:         CohortSelection,
    pub logo_heatmap:      Vec<LogoHeatmapCell>,
    pub net_heatmap:       Vec<NetHeatmapCell>,
    pub coverage:          CoverageReport,
    pub confound:          Vec<ConfoundRow>,
    pub family_m2:         Vec<FamilyM2Row>,
    pub family_scatter:    Vec<FamilyScatterPoint>,
    pub top_skus:          Vec<TopSkuRow>,
    pub receipt:           ScopeReceipt,
}

pub struct RetentionPipeline {
    policy:     PolicyConfig,
    classifier: FamilyClassifier,
}

impl RetentionPipeline {
    /// Compile the family rules and validate the policy once, up front.
    pub fn new(config: &PipelineConfig) -> RetentionResult<Self> {
        config.policy.validate()?;
        Ok(Self {
            policy:     config.policy.clone(),
            classifier: FamilyClassifier::new(&config.rules)?,
        })
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    /// Full run from raw export lines.
    pub fn run(&self, raw: &[RawOrderLine], options: &RunOptions) -> RetentionResult<PipelineOutput> {
        let (normalized, ingest) = normalize_raw_lines(raw)?;
        let order_lines = build_order_lines(normalized, &self.classifier);
        self.run_order_lines(order_lines, ingest, options)
    }

    /// Run from canonical order lines that were already normalized and
    /// classified.
    pub fn run_order_lines(
        &self,
        order_lines: Vec<OrderLine>,
        ingest: IngestStats,
        options: &RunOptions,
    ) -> RetentionResult<PipelineOutput> {
        let policy = &self.policy;
        if order_lines.is_empty() {
            return Err(RetentionError::InputContract("no order lines to process".into()));
        }

        let products = build_products(&order_lines);
        let (orders, gate_a) = build_orders(&order_lines, policy, options.force_strict_validity)?;
        let transactions = build_transactions(&orders);
        let customers = assign_cohorts(&orders, &order_lines, policy);
        if customers.is_empty() {
            return Err(RetentionError::DataQuality(
                "no identified customers with a valid order".into(),
            ));
        }
        let activity = build_activity_grid(&customers, &orders, policy);

        let window = match options.max_observed_month {
            Some(month) => ObservationWindow::new(month),
            None => ObservationWindow::from_lines(&order_lines)
                .ok_or_else(|| RetentionError::InputContract("no timestamps to anchor observation".into()))?,
        };
        log::info!(
            "observation: max_observed_month={} (overridden={})",
            window.max_observed_month,
            options.max_observed_month.is_some()
        );

        let mut cohort_aggregates = aggregate_cohorts(&activity, &window, policy)?;
        let mut qa = check_tables(
            &orders,
            &transactions,
            &products,
            &customers,
            &activity,
            &cohort_aggregates,
            policy,
        )?;

        let m2_logo = m2_logo_retention(&activity, &window);
        let selection = select_cohorts(&eligible_cohorts(&cohort_aggregates, &m2_logo), policy)?;
        mark_selected(&mut cohort_aggregates, &selection.selected);
        check_selection(&selection, &cohort_aggregates, policy)?;
        qa.selection_ok = true;

        let logo_heatmap = build_logo_heatmap(&activity, &window, policy)?;
        let net_heatmap = build_net_heatmap(&activity, &window, policy)?;

        let coverage = build_coverage_report(&order_lines, &customers);
        let confound = build_confound_table(&activity, policy);
        let gate_c = summarize(&confound);

        let family_m2 = build_family_m2_table(&activity, &window, policy);
        let family_scatter = build_priority_scatter(&family_m2, policy);
        check_family_set_match(&family_scatter, &family_m2)?;
        let (top_skus, top_sku_receipt) =
            build_top_sku_appendix(&order_lines, &customers, &activity, &family_m2, &window, policy);

        let reconcile_status = ReconcileStatus::classify(ingest.raw_row_count, order_lines.len() as u64);
        if reconcile_status != ReconcileStatus::Ok {
            log::warn!(
                "reconcile: raw={} processed={} status={:?}",
                ingest.raw_row_count,
                order_lines.len(),
                reconcile_status
            );
        }

        let receipt = ScopeReceipt {
            raw_row_count:                 ingest.raw_row_count,
            processed_order_lines_rows:    order_lines.len() as u64,
            processed_orders_rows:         orders.len() as u64,
            processed_customers_rows:      customers.len() as u64,
            reconcile_status,
            raw_min_date:                  ingest.min_order_ts,
            raw_max_date:                  ingest.max_order_ts,
            max_observed_month:            window.max_observed_month,
            max_observed_month_overridden: options.max_observed_month.is_some(),
            gate_a:                        gate_a.clone(),
            gate_b:                        GateBSummary::from(&coverage),
            gate_c,
            selected_cohorts:              selection.selected.clone(),
            used_fallback:                 selection.used_fallback,
            plot_pool_count:               selection.plot_pool_count,
            eligible_count:                selection.eligible_count,
            selected_min_n0:               selection.selected_min_n0,
            family_count:                  family_scatter.len(),
            family_min_n_customers:        family_scatter.iter().map(|p| p.n_customers).min(),
            top_sku_appendix:              top_sku_receipt,
            qa,
            classification_rule_count:     self.classifier.rule_count(),
            policy:                        policy.clone(),
        };

        log::info!(
            "run complete: customers={} cohorts={} selected={:?} fallback={}",
            customers.len(),
            cohort_aggregates.iter().filter(|a| a.months_since_first == 0).count(),
            selection.selected_labels(),
            selection.used_fallback
        );

        Ok(PipelineOutput {
            ingest,
            order_lines,
            products,
            orders,
            gate_a,
            transactions,
            customers,
            activity,
            cohort_aggregates,
            selection,
            logo_heatmap,
            net_heatmap,
            coverage,
            confound,
            family_m2,
            family_scatter,
            top_skus,
            receipt,
        })
    }
}
