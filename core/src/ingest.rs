//! Raw line intake: loosely typed export records to normalized lines.
//!
//! Headers are matched on their canonical key, so the common export
//! spellings (InvoiceNo, StockCode, Customer ID, ...) all resolve.

use crate::{
    error::{RetentionError, RetentionResult},
    normalize::{canonical_customer_id, canonical_order_id, canonical_sku, is_null_like},
    types::{CustomerId, OrderId, Sku},
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A cell as it arrives from a spreadsheet/CSV export: text or a bare number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawToken {
    Number(serde_json::Number),
    Text(String),
}

impl RawToken {
    pub fn as_text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    /// Numeric coercion; anything unparseable counts as 0.
    pub fn as_f64(&self) -> f64 {
        let value = match self {
            Self::Number(n) => n.as_f64(),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
        };
        value.filter(|v| v.is_finite()).unwrap_or(0.0)
    }
}

impl From<&str> for RawToken {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<f64> for RawToken {
    fn from(v: f64) -> Self {
        serde_json::Number::from_f64(v)
            .map(Self::Number)
            .unwrap_or_else(|| Self::Text(v.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Map<String, serde_json::Value>")]
pub struct RawOrderLine {
    pub order_id:    Option<RawToken>,
    pub sku:         Option<RawToken>,
    pub description: Option<String>,
    pub quantity:    Option<RawToken>,
    pub unit_price:  Option<RawToken>,
    pub order_ts:    Option<String>,
    pub customer_id: Option<RawToken>,
    pub country:     Option<String>,
}

/// Lower-cased ASCII alphanumerics only, so "Customer ID", "customer_id"
/// and "CustomerID" compare equal.
pub fn canonical_column_key(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// The columns a raw export can carry. Every one but `Country` is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawColumn {
    OrderId,
    Sku,
    Description,
    Quantity,
    UnitPrice,
    OrderTs,
    CustomerId,
    Country,
}

impl RawColumn {
    pub const REQUIRED: [RawColumn; 7] = [
        Self::OrderId,
        Self::Sku,
        Self::Description,
        Self::Quantity,
        Self::UnitPrice,
        Self::OrderTs,
        Self::CustomerId,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::OrderId => "order_id",
            Self::Sku => "sku",
            Self::Description => "description",
            Self::Quantity => "quantity",
            Self::UnitPrice => "unit_price",
            Self::OrderTs => "order_ts",
            Self::CustomerId => "customer_id",
            Self::Country => "country",
        }
    }

    /// Resolve an export header through its canonical key.
    pub fn from_header(header: &str) -> Option<Self> {
        let column = match canonical_column_key(header).as_str() {
            "orderid" | "invoiceno" | "invoice" | "order" => Self::OrderId,
            "sku" | "stockcode" | "itemcode" => Self::Sku,
            "description" | "productdescription" | "itemdescription" => Self::Description,
            "quantity" | "qty" => Self::Quantity,
            "unitprice" | "price" => Self::UnitPrice,
            "orderts" | "invoicedate" | "orderdate" | "date" => Self::OrderTs,
            "customerid" | "customer" => Self::CustomerId,
            "country" => Self::Country,
            _ => return None,
        };
        Some(column)
    }

    fn is_populated(self, row: &RawOrderLine) -> bool {
        match self {
            Self::OrderId => row.order_id.is_some(),
            Self::Sku => row.sku.is_some(),
            Self::Description => row.description.is_some(),
            Self::Quantity => row.quantity.is_some(),
            Self::UnitPrice => row.unit_price.is_some(),
            Self::OrderTs => row.order_ts.is_some(),
            Self::CustomerId => row.customer_id.is_some(),
            Self::Country => row.country.is_some(),
        }
    }
}

fn token_of(value: serde_json::Value) -> Option<RawToken> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::Number(n) => Some(RawToken::Number(n)),
        serde_json::Value::String(s) => Some(RawToken::Text(s)),
        other => Some(RawToken::Text(other.to_string())),
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for RawOrderLine {
    fn from(record: serde_json::Map<String, serde_json::Value>) -> Self {
        let mut row = RawOrderLine::default();
        for (header, value) in record {
            let Some(column) = RawColumn::from_header(&header) else {
                continue;
            };
            // Two headers for one column: the first populated one wins.
            if column.is_populated(&row) {
                continue;
            }
            let Some(token) = token_of(value) else {
                continue;
            };
            match column {
                RawColumn::OrderId => row.order_id = Some(token),
                RawColumn::Sku => row.sku = Some(token),
                RawColumn::Description => row.description = Some(token.as_text()),
                RawColumn::Quantity => row.quantity = Some(token),
                RawColumn::UnitPrice => row.unit_price = Some(token),
                RawColumn::OrderTs => row.order_ts = Some(token.as_text()),
                RawColumn::CustomerId => row.customer_id = Some(token),
                RawColumn::Country => row.country = Some(token.as_text()),
            }
        }
        row
    }
}

/// Every required column must be populated somewhere in the input. A column
/// that is null on every row is treated as absent from the export.
pub fn check_required_columns(raw: &[RawOrderLine]) -> RetentionResult<()> {
    let missing: Vec<&str> = RawColumn::REQUIRED
        .iter()
        .filter(|column| !raw.iter().any(|row| column.is_populated(row)))
        .map(|column| column.name())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(RetentionError::InputContract(format!(
            "required column(s) missing from raw input: {}",
            missing.join(", ")
        )))
    }
}

/// A line after identity normalization and type coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedLine {
    pub order_id:    OrderId,
    pub sku:         Sku,
    pub description: String,
    pub quantity:    f64,
    pub unit_price:  f64,
    pub order_ts:    NaiveDateTime,
    pub customer_id: CustomerId,
    pub country:     String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestStats {
    pub raw_row_count:                    u64,
    pub normalized_row_count:             u64,
    pub dropped_empty_id_row_count:       u64,
    pub dropped_unparseable_ts_row_count: u64,
    pub unparseable_ts_pct:               f64,
    pub null_customer_rate_pct:           f64,
    pub min_order_ts:                     Option<NaiveDateTime>,
    pub max_order_ts:                     Option<NaiveDateTime>,
    /// Five most frequent first characters of order ids (C = cancellations).
    pub top_prefix_counts:                Vec<(String, u64)>,
}

const TIMESTAMP_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

/// Parse an export timestamp; date-only values land at midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn text_or_unknown(value: Option<&String>) -> String {
    match value.map(|s| s.trim()) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => "UNKNOWN".to_string(),
    }
}

/// Normalize raw export lines. Lines with an empty order id or sku, or with
/// an unparseable timestamp, are dropped and counted.
pub fn normalize_raw_lines(raw: &[RawOrderLine]) -> RetentionResult<(Vec<NormalizedLine>, IngestStats)> {
    if raw.is_empty() {
        return Err(RetentionError::InputContract(
            "raw input has no rows".into(),
        ));
    }
    check_required_columns(raw)?;

    let mut lines = Vec::with_capacity(raw.len());
    let mut dropped_empty_id = 0u64;
    let mut dropped_bad_ts = 0u64;
    let mut null_customers = 0u64;

    for row in raw {
        let customer_token = row.customer_id.as_ref().map(RawToken::as_text).unwrap_or_default();
        if is_null_like(&customer_token) {
            null_customers += 1;
        }

        let order_id = canonical_order_id(&row.order_id.as_ref().map(RawToken::as_text).unwrap_or_default());
        let sku = canonical_sku(&row.sku.as_ref().map(RawToken::as_text).unwrap_or_default());
        if order_id.is_empty() || sku.is_empty() {
            dropped_empty_id += 1;
            continue;
        }

        let Some(order_ts) = row.order_ts.as_deref().and_then(parse_timestamp) else {
            dropped_bad_ts += 1;
            continue;
        };

        lines.push(NormalizedLine {
            order_id,
            sku,
            description: text_or_unknown(row.description.as_ref()),
            quantity:    row.quantity.as_ref().map(RawToken::as_f64).unwrap_or(0.0),
            unit_price:  row.unit_price.as_ref().map(RawToken::as_f64).unwrap_or(0.0),
            order_ts,
            customer_id: canonical_customer_id(&customer_token),
            country:     text_or_unknown(row.country.as_ref()),
        });
    }

    let id_kept = raw.len() as u64 - dropped_empty_id;
    let stats = IngestStats {
        raw_row_count:                    raw.len() as u64,
        normalized_row_count:             lines.len() as u64,
        dropped_empty_id_row_count:       dropped_empty_id,
        dropped_unparseable_ts_row_count: dropped_bad_ts,
        unparseable_ts_pct:               pct(dropped_bad_ts, id_kept),
        null_customer_rate_pct:           pct(null_customers, raw.len() as u64),
        min_order_ts:                     lines.iter().map(|l| l.order_ts).min(),
        max_order_ts:                     lines.iter().map(|l| l.order_ts).max(),
        top_prefix_counts:                top_prefixes(&lines, 5),
    };

    if lines.is_empty() {
        return Err(RetentionError::DataQuality(format!(
            "no usable lines after normalization (raw={}, empty_id={}, unparseable_ts={})",
            stats.raw_row_count, dropped_empty_id, dropped_bad_ts
        )));
    }

    log::info!(
        "ingest: raw={} normalized={} dropped_empty_id={} dropped_unparseable_ts={} null_customer_rate={:.4}%",
        stats.raw_row_count,
        stats.normalized_row_count,
        stats.dropped_empty_id_row_count,
        stats.dropped_unparseable_ts_row_count,
        stats.null_customer_rate_pct,
    );
    Ok((lines, stats))
}

fn pct(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn top_prefixes(lines: &[NormalizedLine], k: usize) -> Vec<(String, u64)> {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for line in lines {
        let prefix = line.order_id.chars().next().map(String::from).unwrap_or_else(|| "?".into());
        *counts.entry(prefix).or_default() += 1;
    }
    let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
    // BTreeMap order makes the prefix the stable tie-break.
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(k);
    ranked
}
