//! Identity normalizer: canonical order, sku and customer tokens.
//!
//! Pure functions, one token in, one token out.
//! Order ids and skus are trimmed and upper-cased; an empty result means the
//! line is unusable and is dropped by ingest.
//! Customer ids map null-like tokens to GUEST and strip float artifacts
//! left behind by spreadsheet exports ("12345.0" -> "12345").

use crate::types::GUEST;

/// Tokens treated as "no customer", compared case-insensitively after trim.
pub const NULL_TOKENS: [&str; 6] = ["", "nan", "none", "null", "na", "nat"];

pub fn is_null_like(token: &str) -> bool {
    let lowered = token.trim().to_ascii_lowercase();
    NULL_TOKENS.contains(&lowered.as_str())
}

pub fn canonical_order_id(raw: &str) -> String {
    raw.trim().to_uppercase()
}

pub fn canonical_sku(raw: &str) -> String {
    raw.trim().to_uppercase()
}

pub fn canonical_customer_id(raw: &str) -> String {
    let token = raw.trim();
    if is_null_like(token) {
        return GUEST.to_string();
    }
    if let Some(integer) = integer_with_zero_fraction(token) {
        return integer;
    }
    // Other float spellings of a whole number ("1.2345e4").
    if let Ok(parsed) = token.parse::<f64>() {
        if parsed.is_finite() && parsed.fract() == 0.0 && parsed.abs() < i64::MAX as f64 {
            return (parsed as i64).to_string();
        }
    }
    token.to_string()
}

/// Matches `[+-]?\d+(\.0+)?` and returns the integer in canonical form
/// (no sign for positives, no leading zeros).
fn integer_with_zero_fraction(token: &str) -> Option<String> {
    let (int_part, frac_part) = match token.split_once('.') {
        Some((int_part, frac)) => (int_part, Some(frac)),
        None => (token, None),
    };
    if let Some(frac) = frac_part {
        if frac.is_empty() || !frac.bytes().all(|b| b == b'0') {
            return None;
        }
    }

    let (negative, digits) = match int_part.as_bytes().first() {
        Some(b'-') => (true, &int_part[1..]),
        Some(b'+') => (false, &int_part[1..]),
        _ => (false, int_part),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let trimmed = digits.trim_start_matches('0');
    let magnitude = if trimmed.is_empty() { "0" } else { trimmed };
    if negative && magnitude != "0" {
        Some(format!("-{magnitude}"))
    } else {
        Some(magnitude.to_string())
    }
}
