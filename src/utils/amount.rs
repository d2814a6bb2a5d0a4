use crate::constants::{AMOUNT_DECIMALS, STROOPS_PER_UNIT};

/// Converts a decimal amount string into stroops.
pub fn parse_amount(amount: &str) -> Result<i64, String> {
    let amount = amount.trim();
    let (negative, digits) = match amount.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, amount),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));

    let is_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !is_digits(whole) || !is_digits(fraction) {
        return Err(format!("invalid amount {amount:?}"));
    }
    if fraction.len() > AMOUNT_DECIMALS {
        return Err(format!(
            "amount {amount} has more than {AMOUNT_DECIMALS} decimal places"
        ));
    }

    let whole: i64 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|e| format!("invalid amount {amount:?}: {e}"))?
    };
    let fraction: i64 = format!("{fraction:0<width$}", width = AMOUNT_DECIMALS)
        .parse()
        .map_err(|e| format!("invalid amount {amount:?}: {e}"))?;

    let stroops = whole
        .checked_mul(STROOPS_PER_UNIT)
        .and_then(|v| v.checked_add(fraction))
        .ok_or_else(|| format!("amount {amount} is too large"))?;

    Ok(if negative { -stroops } else { stroops })
}
