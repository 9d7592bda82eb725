//! Brazilian monetary value formatting.
//!
//! Portal fields expect amounts as `1234,56`: no thousands separator, comma
//! as decimal point, exactly two decimals. Spreadsheet cells arrive as floats
//! or as strings in any mix of `R$ 1.234,56`, `1234,56` and `1234.56`.

use crate::record::RawValue;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use std::sync::LazyLock;

/// Value returned for anything that cannot be read as an amount.
pub const ZERO: &str = "0,00";

static CANONICAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+,\d{2}$").unwrap());

/// Format any cell value as a canonical `digits,two-decimals` string.
///
/// Never fails: unreadable, empty, negative or non-finite input yields
/// [`ZERO`].
pub fn format_money<V: Into<RawValue>>(value: V) -> String {
    match parse_raw(&value.into()) {
        Some(amount) => format_decimal(amount),
        None => ZERO.to_string(),
    }
}

/// Format an exact amount. Negative amounts map to [`ZERO`].
pub fn format_decimal(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        return ZERO.to_string();
    }
    format!("{:.2}", rounded.abs()).replace('.', ",")
}

/// Read a cell value as an amount.
pub fn parse_raw(value: &RawValue) -> Option<Decimal> {
    match value {
        RawValue::Empty => None,
        RawValue::Number(n) => parse_float(*n),
        RawValue::Text(s) => parse_brl(s),
    }
}

fn parse_float(n: f64) -> Option<Decimal> {
    if !n.is_finite() || n < 0.0 {
        return None;
    }
    // Display on f64 yields the shortest round-trip form, so 0.1 stays 0.1.
    Decimal::from_str(&n.to_string()).ok()
}

/// Lenient parse of a Brazilian- or plain-formatted amount.
///
/// * both `.` and `,` present: dots are thousands separators
/// * only `,`: decimal comma
/// * several `.` and no `,`: dots are thousands separators
/// * a single `.`: decimal point
pub fn parse_brl(input: &str) -> Option<Decimal> {
    let stripped = input.replace("R$", "");
    let cleaned = stripped.trim();
    if cleaned.is_empty() {
        return None;
    }

    let canonical = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else if cleaned.matches('.').count() > 1 {
        cleaned.replace('.', "")
    } else {
        cleaned.to_string()
    };

    let amount = match Decimal::from_str(canonical.trim()) {
        Ok(d) => d,
        Err(_) => {
            let digits: String = canonical
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            Decimal::from_str(&digits).ok()?
        }
    };

    if amount.is_sign_negative() && !amount.is_zero() {
        return None;
    }
    Some(amount)
}

/// Whether `s` already has the canonical portal shape.
pub fn is_canonical(s: &str) -> bool {
    CANONICAL.is_match(s)
}
