//! Shared primitive types used across the entire pipeline.

use chrono::{Datelike, NaiveDateTime};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Canonical (trimmed, upper-cased) invoice/order identifier.
pub type OrderId = String;

/// Canonical customer identifier, or [`GUEST`].
pub type CustomerId = String;

/// Canonical (trimmed, upper-cased) stock code.
pub type Sku = String;

/// A product family label produced by the classifier.
pub type FamilyLabel = String;

/// Sentinel customer id for lines with no usable customer token.
pub const GUEST: &str = "GUEST";

/// Label for lines no classification rule matched.
pub const OTHER_FAMILY: &str = "Other";

/// Families carrying this suffix are never a customer's first family.
pub const NON_MERCH_SUFFIX: &str = "_NonMerch";

/// Cohort label used for the gross-weighted summary row of the net heatmap.
pub const ALL_WEIGHTED: &str = "ALL_WEIGHTED";

/// A calendar month, ordered chronologically and rendered as `YYYY-MM`.
///
/// For four-digit years the rendered label sorts the same way the value does,
/// so label order and calendar order agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year:  i32,
    month: u32,
}

impl YearMonth {
    /// `month` is 1-based. Returns None outside 1..=12.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(ts: &NaiveDateTime) -> Self {
        Self { year: ts.year(), month: ts.month() }
    }

    pub fn year(&self) -> i32  { self.year }
    pub fn month(&self) -> u32 { self.month }

    /// Months since year 0, used for month arithmetic.
    fn ordinal(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    fn from_ordinal(ordinal: i64) -> Self {
        Self {
            year:  ordinal.div_euclid(12) as i32,
            month: ordinal.rem_euclid(12) as u32 + 1,
        }
    }

    /// Inverse of `year * 12 + (month - 1)`.
    pub fn from_month_index(index: i64) -> Self {
        Self::from_ordinal(index)
    }

    pub fn plus_months(&self, n: u32) -> Self {
        Self::from_ordinal(self.ordinal() + n as i64)
    }

    pub fn minus_months(&self, n: u32) -> Self {
        Self::from_ordinal(self.ordinal() - n as i64)
    }

    /// Signed whole-month distance `self - earlier`.
    pub fn months_since(&self, earlier: &YearMonth) -> i64 {
        self.ordinal() - earlier.ordinal()
    }

    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got '{s}'"))?;
        let year: i32 = year
            .parse()
            .map_err(|_| format!("bad year in '{s}'"))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("bad month in '{s}'"))?;
        YearMonth::new(year, month).ok_or_else(|| format!("month out of range in '{s}'"))
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_arithmetic_crosses_year_boundaries() {
        let nov = YearMonth::new(2010, 11).unwrap();
        assert_eq!(nov.plus_months(3).to_string(), "2011-02");
        assert_eq!(nov.minus_months(11).to_string(), "2009-12");
        assert_eq!(nov.plus_months(3).months_since(&nov), 3);
    }

    #[test]
    fn label_round_trips_through_from_str() {
        let m: YearMonth = "2010-03".parse().unwrap();
        assert_eq!(m, YearMonth::new(2010, 3).unwrap());
        assert!("2010-13".parse::<YearMonth>().is_err());
        assert!("201003".parse::<YearMonth>().is_err());
    }
}
