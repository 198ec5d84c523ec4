//! Family-level month-2 tables: the family retention table (chart 3), the
//! priority scatter derived from it, and the top-SKU appendix for the
//! weakest families.
//!
//! Only customers whose month-2 cell is observed contribute.

use crate::{
    activity_grid::{ActivityCell, ActivityGrid},
    censor::ObservationWindow,
    cohort::Customer,
    config::{PolicyConfig, RightCensorMode},
    error::{RetentionError, RetentionResult},
    order_lines::OrderLine,
    types::{FamilyLabel, Sku, YearMonth, OTHER_FAMILY},
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

const MAX_DESCRIPTION_CHARS: usize = 120;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyM2Row {
    pub family_group:           FamilyLabel,
    pub n_customers:            u64,
    pub m2_logo_retention:      f64,
    /// Missing when the group's month-0 gross is zero.
    pub m2_net_proxy_retention: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyScatterPoint {
    pub first_product_family:     FamilyLabel,
    pub n_customers:              u64,
    pub x_m2_logo_retention:      f64,
    pub y_m2_net_retention_proxy: Option<f64>,
    pub priority_score:           f64,
    /// 1-based, highest priority first.
    pub rank_priority:            u32,
    pub overall_x:                Option<f64>,
    pub overall_y:                Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopSkuRow {
    pub first_product_family:            FamilyLabel,
    pub sku:                             Sku,
    pub description:                     String,
    pub n_customers_m0:                  u64,
    pub m0_gross_valid:                  f64,
    pub m2_logo_retention_observed:      Option<f64>,
    pub m2_net_retention_proxy_observed: Option<f64>,
    pub delta_net_proxy_vs_family_pp:    Option<f64>,
    pub share_of_family_m0_gross_pct:    Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopSkuReceipt {
    pub target_families:      Vec<FamilyLabel>,
    pub min_sku_n:            u64,
    pub topk_skus_per_family: usize,
    pub observed_only:        bool,
    pub right_censor_mode:    RightCensorMode,
    pub max_observed_month:   YearMonth,
    pub rows_written:         usize,
}

/// Ascending with missing values last.
fn cmp_missing_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Weakest first: logo asc, net asc (missing last), n desc, label asc.
fn cmp_weakest_first(a: &FamilyM2Row, b: &FamilyM2Row) -> Ordering {
    a.m2_logo_retention
        .total_cmp(&b.m2_logo_retention)
        .then_with(|| cmp_missing_last(a.m2_net_proxy_retention, b.m2_net_proxy_retention))
        .then_with(|| b.n_customers.cmp(&a.n_customers))
        .then_with(|| a.family_group.cmp(&b.family_group))
}

fn observed_m2_cells<'a>(grid: &'a ActivityGrid, window: &'a ObservationWindow) -> Vec<&'a ActivityCell> {
    grid.at_month(2).filter(|c| window.is_observed(c.cohort_month, 2)).collect()
}

fn month0_gross(grid: &ActivityGrid) -> HashMap<&str, f64> {
    grid.at_month(0).map(|c| (c.customer_id.as_str(), c.gross_revenue_valid)).collect()
}

#[derive(Default)]
struct GroupTotals {
    n:        u64,
    retained: u64,
    net_m2:   f64,
    gross_m0: f64,
}

pub fn build_family_m2_table(
    grid: &ActivityGrid,
    window: &ObservationWindow,
    policy: &PolicyConfig,
) -> Vec<FamilyM2Row> {
    let m2 = observed_m2_cells(grid, window);

    let mut sizes: BTreeMap<&str, u64> = BTreeMap::new();
    for cell in &m2 {
        *sizes.entry(cell.first_product_family.as_str()).or_insert(0) += 1;
    }
    let mut by_size: Vec<(&str, u64)> = sizes.into_iter().collect();
    by_size.sort_by(|a, b| b.1.cmp(&a.1));
    let top: BTreeSet<&str> = by_size.iter().take(policy.family_top_n).map(|(f, _)| *f).collect();

    let gross_m0 = month0_gross(grid);
    let mut groups: BTreeMap<&str, GroupTotals> = BTreeMap::new();
    for cell in &m2 {
        let family = cell.first_product_family.as_str();
        let group = if top.contains(family) { family } else { OTHER_FAMILY };
        let g = groups.entry(group).or_default();
        g.n += 1;
        if cell.is_retained_logo {
            g.retained += 1;
        }
        g.net_m2 += cell.net_revenue_proxy_total;
        g.gross_m0 += gross_m0.get(cell.customer_id.as_str()).copied().unwrap_or(0.0);
    }

    let mut rows: Vec<FamilyM2Row> = groups
        .into_iter()
        .map(|(group, g)| FamilyM2Row {
            family_group:           group.to_string(),
            n_customers:            g.n,
            m2_logo_retention:      g.retained as f64 / g.n as f64,
            m2_net_proxy_retention: (g.gross_m0 > 0.0).then(|| g.net_m2 / g.gross_m0),
        })
        .collect();
    rows.sort_by(cmp_weakest_first);
    log::info!("family m2 table: {} groups from {} observed month-2 customers", rows.len(), m2.len());
    rows
}

/// Priority = w1 * (1 - logo) + w2 * (1 - net), missing metrics counted as 0.
pub fn build_priority_scatter(family_table: &[FamilyM2Row], policy: &PolicyConfig) -> Vec<FamilyScatterPoint> {
    let weight_sum: f64 = family_table.iter().map(|r| r.n_customers as f64).sum();
    let (overall_x, overall_y) = if weight_sum > 0.0 {
        let x: f64 = family_table.iter().map(|r| r.m2_logo_retention * r.n_customers as f64).sum();
        let y: f64 = family_table
            .iter()
            .filter_map(|r| r.m2_net_proxy_retention.map(|y| y * r.n_customers as f64))
            .sum();
        (Some(x / weight_sum), Some(y / weight_sum))
    } else {
        (None, None)
    };

    let mut points: Vec<FamilyScatterPoint> = family_table
        .iter()
        .map(|r| {
            let score_x = 1.0 - r.m2_logo_retention;
            let score_y = 1.0 - r.m2_net_proxy_retention.unwrap_or(0.0);
            FamilyScatterPoint {
                first_product_family:     r.family_group.clone(),
                n_customers:              r.n_customers,
                x_m2_logo_retention:      r.m2_logo_retention,
                y_m2_net_retention_proxy: r.m2_net_proxy_retention,
                priority_score:           score_x * policy.priority_w1 + score_y * policy.priority_w2,
                rank_priority:            0,
                overall_x,
                overall_y,
            }
        })
        .collect();
    points.sort_by(|a, b| {
        b.priority_score
            .total_cmp(&a.priority_score)
            .then_with(|| b.n_customers.cmp(&a.n_customers))
            .then_with(|| a.first_product_family.cmp(&b.first_product_family))
    });
    for (i, p) in points.iter_mut().enumerate() {
        p.rank_priority = i as u32 + 1;
    }
    points
}

/// Both family tables must name the same families.
pub fn check_family_set_match(scatter: &[FamilyScatterPoint], family_table: &[FamilyM2Row]) -> RetentionResult<()> {
    let in_scatter: BTreeSet<&str> = scatter.iter().map(|p| p.first_product_family.as_str()).collect();
    let in_table: BTreeSet<&str> = family_table.iter().map(|r| r.family_group.as_str()).collect();
    if in_scatter != in_table {
        return Err(RetentionError::FamilySetMismatch {
            only_in_scatter:      in_scatter.difference(&in_table).map(|s| s.to_string()).collect(),
            only_in_family_table: in_table.difference(&in_scatter).map(|s| s.to_string()).collect(),
        });
    }
    log::debug!("family set match: {} families", in_table.len());
    Ok(())
}

fn clean_description(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Default)]
struct SkuTotals<'a> {
    customers:   BTreeSet<&'a str>,
    gross:       f64,
    description: BTreeMap<String, f64>,
}

impl SkuTotals<'_> {
    /// Highest-gross description, ties to the alphabetically first.
    fn description(&self) -> String {
        self.description
            .iter()
            .fold(None::<(&String, f64)>, |best, (d, g)| match best {
                Some((_, bg)) if bg >= *g => best,
                _ => Some((d, *g)),
            })
            .map(|(d, _)| d.chars().take(MAX_DESCRIPTION_CHARS).collect())
            .unwrap_or_default()
    }
}

/// Top SKUs on the first orders of the weakest non-Other families.
pub fn build_top_sku_appendix(
    lines: &[OrderLine],
    customers: &[Customer],
    grid: &ActivityGrid,
    family_table: &[FamilyM2Row],
    window: &ObservationWindow,
    policy: &PolicyConfig,
) -> (Vec<TopSkuRow>, TopSkuReceipt) {
    // family_table is already weakest-first.
    let targets: Vec<FamilyLabel> = family_table
        .iter()
        .filter(|r| r.family_group != OTHER_FAMILY && r.n_customers >= policy.min_cohort_n)
        .take(policy.target_family_count)
        .map(|r| r.family_group.clone())
        .collect();

    let first_order: HashMap<&str, (&str, &str)> = customers
        .iter()
        .filter(|c| targets.contains(&c.first_product_family))
        .map(|c| (c.customer_id.as_str(), (c.first_order_id.as_str(), c.first_product_family.as_str())))
        .collect();

    let mut per_sku: BTreeMap<(&str, &str), SkuTotals> = BTreeMap::new();
    for line in lines {
        let Some(&(first_order_id, family)) = first_order.get(line.customer_id.as_str()) else {
            continue;
        };
        if line.order_id != first_order_id || line.product_family != family || line.line_amount_gross <= 0.0 {
            continue;
        }
        let t = per_sku.entry((family, line.sku.as_str())).or_default();
        t.customers.insert(line.customer_id.as_str());
        t.gross += line.line_amount_gross;
        *t.description.entry(clean_description(&line.description)).or_insert(0.0) += line.line_amount_gross;
    }

    // Floor, then top-k by gross within each family.
    let mut kept: Vec<((&str, &str), SkuTotals)> = per_sku
        .into_iter()
        .filter(|(_, t)| t.customers.len() as u64 >= policy.min_sku_n)
        .collect();
    kept.sort_by(|((fa, sa), ta), ((fb, sb), tb)| {
        fa.cmp(fb).then_with(|| tb.gross.total_cmp(&ta.gross)).then_with(|| sa.cmp(sb))
    });
    let mut per_family_count: HashMap<&str, usize> = HashMap::new();
    kept.retain(|((family, _), _)| {
        let n = per_family_count.entry(*family).or_insert(0);
        *n += 1;
        *n <= policy.topk_skus_per_family
    });

    let mut family_gross: HashMap<&str, f64> = HashMap::new();
    for ((family, _), t) in &kept {
        *family_gross.entry(*family).or_insert(0.0) += t.gross;
    }

    let m2_observed: HashMap<&str, (bool, f64)> = observed_m2_cells(grid, window)
        .into_iter()
        .map(|c| (c.customer_id.as_str(), (c.is_retained_logo, c.net_revenue_proxy_total)))
        .collect();
    let gross_m0 = month0_gross(grid);
    let family_net: HashMap<&str, Option<f64>> = family_table
        .iter()
        .map(|r| (r.family_group.as_str(), r.m2_net_proxy_retention))
        .collect();

    let rows: Vec<TopSkuRow> = kept
        .iter()
        .map(|((family, sku), t)| {
            let (mut n_obs, mut retained, mut numer, mut denom) = (0u64, 0u64, 0.0, 0.0);
            for customer in &t.customers {
                if let Some(&(is_retained, net)) = m2_observed.get(customer) {
                    n_obs += 1;
                    if is_retained {
                        retained += 1;
                    }
                    numer += net;
                    denom += gross_m0.get(customer).copied().unwrap_or(0.0);
                }
            }
            let sku_net = (denom > 0.0).then(|| numer / denom);
            let fam_net = family_net.get(family).copied().flatten();
            let fam_gross = family_gross.get(family).copied().unwrap_or(0.0);
            TopSkuRow {
                first_product_family:            family.to_string(),
                sku:                             sku.to_string(),
                description:                     t.description(),
                n_customers_m0:                  t.customers.len() as u64,
                m0_gross_valid:                  t.gross,
                m2_logo_retention_observed:      (n_obs > 0).then(|| retained as f64 / n_obs as f64),
                m2_net_retention_proxy_observed: sku_net,
                delta_net_proxy_vs_family_pp:    sku_net.zip(fam_net).map(|(s, f)| (s - f) * 100.0),
                share_of_family_m0_gross_pct:    (fam_gross > 0.0).then(|| t.gross / fam_gross * 100.0),
            }
        })
        .collect();

    let receipt = TopSkuReceipt {
        target_families:      targets,
        min_sku_n:            policy.min_sku_n,
        topk_skus_per_family: policy.topk_skus_per_family,
        observed_only:        policy.observed_only,
        right_censor_mode:    policy.right_censor_mode,
        max_observed_month:   window.max_observed_month,
        rows_written:         rows.len(),
    };
    log::info!(
        "top-sku appendix: targets={:?} rows={}",
        receipt.target_families,
        receipt.rows_written
    );
    (rows, receipt)
}
