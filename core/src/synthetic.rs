//! Seeded synthetic export data for demos and tests.
//!
//! Produces raw lines shaped like a retail invoice export: mixed customer-id
//! token forms ("12346", "12346.0", bare numbers), guest orders, cancel
//! invoices, postage lines, the odd wholesale basket and a sprinkle of
//! unparseable timestamps. Same config, same lines.

use crate::{
    ingest::{RawOrderLine, RawToken},
    rng::{RngBank, StreamRng, StreamSlot},
    types::YearMonth,
};
use chrono::NaiveDate;

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub seed:                 u64,
    pub customers_per_cohort: usize,
    pub first_cohort:         YearMonth,
    pub cohort_months:        u32,
    /// Calendar months with activity, starting at `first_cohort`.
    pub window_months:        u32,
    pub guest_order_rate:     f64,
    pub cancel_rate:          f64,
    pub wholesale_rate:       f64,
    pub bad_timestamp_rate:   f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed:                 42,
            customers_per_cohort: 260,
            first_cohort:         YearMonth::from_month_index(2010 * 12),
            cohort_months:        12,
            window_months:        12,
            guest_order_rate:     0.03,
            cancel_rate:          0.04,
            wholesale_rate:       0.03,
            bad_timestamp_rate:   0.001,
        }
    }
}

impl SyntheticConfig {
    pub fn with_seed(seed: u64) -> Self {
        Self { seed, ..Self::default() }
    }

    pub fn last_month(&self) -> YearMonth {
        self.first_cohort.plus_months(self.window_months.saturating_sub(1))
    }
}

struct CatalogItem {
    sku:         &'static str,
    description: &'static str,
    price:       f64,
    group:       usize,
}

const fn catalog_item(sku: &'static str, description: &'static str, price: f64, group: usize) -> CatalogItem {
    CatalogItem { sku, description, price, group }
}

/// Merchandise groups, each with a retention tilt.
const GROUP_TILT: [f64; 7] = [0.06, -0.04, 0.02, -0.08, 0.04, 0.0, -0.02];

const CATALOG: [CatalogItem; 21] = [
    catalog_item("85123A", "WHITE HANGING HEART T-LIGHT HOLDER", 2.55, 0),
    catalog_item("84946", "ANTIQUE SILVER T-LIGHT GLASS", 1.25, 0),
    catalog_item("71053", "WHITE METAL LANTERN", 3.39, 0),
    catalog_item("85099B", "JUMBO BAG RED RETROSPOT", 2.08, 1),
    catalog_item("20725", "LUNCH BAG RED RETROSPOT", 1.65, 1),
    catalog_item("20712", "JUMBO BAG WOODLAND ANIMALS", 2.08, 1),
    catalog_item("37370", "RETRO COFFEE MUGS ASSORTED", 1.06, 2),
    catalog_item("21071", "VINTAGE BILLBOARD DRINK ME MUG", 1.06, 2),
    catalog_item("22328", "ROUND SNACK BOXES SET OF 4 WOODLAND PLATE", 2.95, 2),
    catalog_item("22086", "PAPER CHAIN KIT 50'S CHRISTMAS", 2.95, 3),
    catalog_item("22910", "PAPER CHAIN KIT VINTAGE CHRISTMAS", 2.95, 3),
    catalog_item("23355", "HOT WATER BOTTLE KEEP CALM ADVENT", 4.95, 3),
    catalog_item("22028", "PENNY FARTHING BIRTHDAY CARD", 0.42, 4),
    catalog_item("22045", "SPACEBOY GIFT WRAP", 0.42, 4),
    catalog_item("22457", "NATURAL SLATE HEART CHALKBOARD", 2.95, 5),
    catalog_item("22469", "HEART OF WICKER SMALL", 1.65, 5),
    catalog_item("82482", "WOODEN PICTURE FRAME WHITE FINISH", 2.55, 5),
    catalog_item("22423", "REGENCY CAKESTAND 3 TIER", 12.75, 6),
    catalog_item("47566", "PARTY BUNTING", 4.95, 6),
    catalog_item("21212", "PACK OF 72 RETROSPOT CAKE CASES", 0.55, 6),
    catalog_item("84879", "ASSORTED COLOUR BIRD ORNAMENT", 1.69, 6),
];

const POSTAGE: CatalogItem = catalog_item("POST", "POSTAGE", 18.0, usize::MAX);

const COUNTRIES: [&str; 5] = ["United Kingdom", "United Kingdom", "United Kingdom", "Germany", "France"];

struct Emitter {
    lines:        Vec<RawOrderLine>,
    next_invoice: u64,
    bad_ts_rate:  f64,
}

impl Emitter {
    fn invoice(&mut self) -> String {
        self.next_invoice += 1;
        self.next_invoice.to_string()
    }

    fn timestamp(&self, noise: &mut StreamRng, month: YearMonth, day: u32, minute_of_day: u32) -> String {
        if noise.chance(self.bad_ts_rate) {
            return "not-a-date".to_string();
        }
        let ts = NaiveDate::from_ymd_opt(month.year(), month.month(), day)
            .and_then(|d| d.and_hms_opt(minute_of_day / 60, minute_of_day % 60, 0));
        match ts {
            Some(ts) if noise.chance(0.2) => ts.format("%m/%d/%Y %H:%M").to_string(),
            Some(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => "not-a-date".to_string(),
        }
    }

    fn push(
        &mut self,
        invoice: &str,
        item: &CatalogItem,
        quantity: i64,
        ts: &str,
        customer: Option<RawToken>,
        country: &str,
    ) {
        self.lines.push(RawOrderLine {
            order_id:    Some(RawToken::from(invoice)),
            sku:         Some(RawToken::from(item.sku)),
            description: Some(item.description.to_string()),
            quantity:    Some(RawToken::from(quantity as f64)),
            unit_price:  Some(RawToken::from(item.price)),
            order_ts:    Some(ts.to_string()),
            customer_id: customer,
            country:     Some(country.to_string()),
        });
    }
}

/// One customer id rendered the way different exports spell it.
fn customer_token(id: u64, noise: &mut StreamRng) -> RawToken {
    match noise.below(3) {
        0 => RawToken::from(id.to_string().as_str()),
        1 => RawToken::from(format!("{id}.0").as_str()),
        _ => RawToken::from(id as f64),
    }
}

fn items_in_group(group: usize) -> Vec<&'static CatalogItem> {
    CATALOG.iter().filter(|i| i.group == group).collect()
}

pub fn generate_raw_lines(config: &SyntheticConfig) -> Vec<RawOrderLine> {
    let bank = RngBank::new(config.seed);
    let mut customers_rng = bank.stream(StreamSlot::Customers);
    let mut baskets = bank.stream(StreamSlot::Baskets);
    let mut returns = bank.stream(StreamSlot::Returns);
    let mut noise = bank.stream(StreamSlot::Noise);

    let mut out = Emitter {
        lines:        Vec::new(),
        next_invoice: 489_433,
        bad_ts_rate:  config.bad_timestamp_rate,
    };
    let last_month = config.last_month();
    let max_offset = 9u32;
    let mut customer_id = 12_345u64;

    for c in 0..config.cohort_months {
        let cohort = config.first_cohort.plus_months(c);
        let cohort_base = customers_rng.uniform(0.12, 0.42);

        for _ in 0..config.customers_per_cohort {
            customer_id += 1;
            let group = customers_rng.below(GROUP_TILT.len() as u64) as usize;
            let wholesale = customers_rng.chance(config.wholesale_rate);
            let country = *customers_rng.pick(&COUNTRIES).unwrap_or(&"United Kingdom");
            let wholesale_lift = if wholesale { 0.3 } else { 0.0 };
            let p_return = (cohort_base + GROUP_TILT[group] + wholesale_lift).clamp(0.02, 0.9);
            let favourites = items_in_group(group);

            for m in 0..=max_offset {
                let month = cohort.plus_months(m);
                if month > last_month {
                    break;
                }
                let orders_this_month = match m {
                    0 => 1 + u64::from(customers_rng.chance(0.1)),
                    _ => u64::from(customers_rng.chance(p_return)),
                };
                for k in 0..orders_this_month {
                    // The first order sits early in the month so repeat orders follow it.
                    let day = if m == 0 && k == 0 {
                        1 + baskets.below(3) as u32
                    } else {
                        4 + baskets.below(24) as u32
                    };
                    let minute = 8 * 60 + baskets.below(10 * 60) as u32;
                    let ts = out.timestamp(&mut noise, month, day, minute);
                    let invoice = out.invoice();
                    let token = customer_token(customer_id, &mut noise);

                    let n_lines = baskets.between(1, 5);
                    let mut basket: Vec<(&CatalogItem, i64)> = Vec::with_capacity(n_lines as usize + 1);
                    for _ in 0..n_lines {
                        let item = if baskets.chance(0.7) {
                            baskets.pick(&favourites).copied()
                        } else {
                            baskets.pick(&CATALOG)
                        };
                        let Some(item) = item else { continue };
                        let qty = if wholesale {
                            baskets.between(48, 240) as i64
                        } else {
                            baskets.pareto(1.0, 1.6).min(24.0) as i64
                        };
                        basket.push((item, qty.max(1)));
                    }
                    if baskets.chance(0.15) {
                        basket.push((&POSTAGE, 1));
                    }
                    // Rare mixed-sign basket: positive gross, non-positive net.
                    if m > 0 && noise.chance(0.002) {
                        if let Some(&(item, qty)) = basket.first() {
                            basket.push((item, -(qty + 2)));
                        }
                    }
                    for (item, qty) in &basket {
                        out.push(&invoice, item, *qty, &ts, Some(token.clone()), country);
                    }

                    if m > 0 && returns.chance(config.cancel_rate) {
                        let cancel_invoice = format!("C{}", out.invoice());
                        let cancel_ts = out.timestamp(&mut noise, month, 28, 17 * 60);
                        if let Some(&(item, qty)) = basket.iter().find(|(_, q)| *q > 0) {
                            let back = returns.between(1, qty.max(1) as u64) as i64;
                            out.push(&cancel_invoice, item, -back, &cancel_ts, Some(token.clone()), country);
                        }
                    }
                }
            }
        }
    }

    // Guest checkouts: no usable customer token.
    let guest_orders = ((out.lines.len() as f64) * config.guest_order_rate / 3.0).round() as usize;
    let guest_tokens = [
        None,
        Some(RawToken::from("")),
        Some(RawToken::from("nan")),
        Some(RawToken::from("NULL")),
    ];
    for _ in 0..guest_orders {
        let month = config.first_cohort.plus_months(noise.below(config.window_months.max(1) as u64) as u32);
        let day = 1 + noise.below(28) as u32;
        let ts = out.timestamp(&mut noise, month, day, 9 * 60);
        let invoice = out.invoice();
        let token = noise.pick(&guest_tokens).cloned().flatten();
        for _ in 0..noise.between(1, 4) {
            if let Some(item) = noise.pick(&CATALOG) {
                out.push(&invoice, item, noise.between(1, 6) as i64, &ts, token.clone(), "United Kingdom");
            }
        }
    }

    log::info!(
        "synthetic: seed={} customers={} lines={}",
        config.seed,
        config.customers_per_cohort * config.cohort_months as usize,
        out.lines.len()
    );
    out.lines
}
