//! Token amount parsing and Rupiah formatting.
//!
//! Amounts are handled as integers in the token's smallest unit. Parsing is
//! exact on the decimal string; extra fractional digits are truncated toward
//! zero.

use crate::errors::{ClientError, Result};

/// Largest decimals whose scale `10^decimals` fits in a `u128`.
pub const MAX_DECIMALS: u8 = 38;

/// Parse a user-entered decimal amount into base units.
pub fn parse_amount(input: &str, decimals: u8) -> Result<u128> {
    let s = input.trim();
    if s.is_empty() {
        return Err(ClientError::Decode("amount is empty".to_string()));
    }
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(ClientError::Decode(format!("invalid amount {input}")));
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return Err(ClientError::Decode(format!("invalid amount {input}")));
    }

    let scale = 10u128
        .checked_pow(u32::from(decimals))
        .ok_or_else(|| ClientError::Decode(format!("unsupported decimals {decimals}")))?;
    let whole_units: u128 = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u128>()
            .map_err(|_| ClientError::Decode(format!("amount too large: {input}")))?
    };

    let kept: String = frac.chars().take(decimals as usize).collect();
    let frac_units = if kept.is_empty() {
        0
    } else {
        let padded = format!("{kept:0<width$}", width = decimals as usize);
        padded
            .parse::<u128>()
            .map_err(|_| ClientError::Decode(format!("invalid amount {input}")))?
    };

    whole_units
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_units))
        .ok_or_else(|| ClientError::Decode(format!("amount too large: {input}")))
}

/// Plain decimal rendering: `123456, 2 → "1234.56"`, trailing zeros dropped.
pub fn format_units(amount: u128, decimals: u8) -> String {
    let scale = 10u128.pow(u32::from(decimals));
    let whole = amount / scale;
    let frac = amount % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:0>width$}", width = decimals as usize);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

/// Rupiah rendering with `.` thousands separators and no fraction digits,
/// rounding half away from zero: `10_000_050, 2 → "Rp 100.001"`.
pub fn format_rupiah(amount: u128, decimals: u8) -> String {
    let scale = 10u128.pow(u32::from(decimals));
    let mut whole = amount / scale;
    let rem = amount % scale;
    if decimals > 0 && rem >= scale - rem {
        whole += 1;
    }
    format!("Rp {}", group_thousands(whole))
}

fn group_thousands(n: u128) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    out
}
