//! Decimal unit conversion
//!
//! Amounts travel as human-readable decimal strings ("0.1") and are sent to
//! the chain in the token's smallest unit. Conversion is exact; no floating
//! point is involved.

use num_bigint::BigUint;
use num_traits::{Num, Zero};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("invalid amount '{0}'")]
    Invalid(String),

    #[error("negative amount '{0}'")]
    Negative(String),

    #[error("amount '{0}' has too many decimal points")]
    TooManyPoints(String),

    #[error("amount '{amount}' has more than {decimals} decimal places")]
    TooManyDecimals { amount: String, decimals: u32 },
}

/// Convert a decimal string into base units: `"1.5"` at 18 decimals is `1.5e18`
pub fn from_decimals(amount: &str, decimals: u32) -> Result<BigUint, UnitError> {
    let amount = amount.trim();
    if amount.starts_with('-') {
        return Err(UnitError::Negative(amount.to_string()));
    }
    if amount.is_empty() || amount == "." {
        return Err(UnitError::Invalid(amount.to_string()));
    }

    let mut parts = amount.split('.');
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next().unwrap_or_default();
    if parts.next().is_some() {
        return Err(UnitError::TooManyPoints(amount.to_string()));
    }

    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(UnitError::Invalid(amount.to_string()));
    }
    if fraction.len() > decimals as usize {
        return Err(UnitError::TooManyDecimals {
            amount: amount.to_string(),
            decimals,
        });
    }

    let padded = format!("{whole}{fraction:0<width$}", width = decimals as usize);
    let digits = padded.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(BigUint::zero());
    }

    BigUint::from_str_radix(digits, 10).map_err(|_| UnitError::Invalid(amount.to_string()))
}

/// Render base units as a trimmed decimal string
///
/// Trailing fractional zeros are dropped. With `fixed`, the result is cut to
/// that many characters (truncation, not rounding).
pub fn to_decimals(value: &BigUint, decimals: u32, fixed: Option<usize>) -> String {
    let base = BigUint::from(10u32).pow(decimals);
    let whole = value / &base;
    let fraction = value % &base;

    let mut rendered = whole.to_string();
    if !fraction.is_zero() {
        let fraction = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
        rendered.push('.');
        rendered.push_str(fraction.trim_end_matches('0'));
    }

    if let Some(fixed) = fixed {
        rendered.truncate(fixed);
    }
    rendered
}
