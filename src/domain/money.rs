use thiserror::Error;

/// Money is represented as integer cents to avoid floating-point precision issues.
/// A balance of 300.00 is stored as 30000.
pub type Cents = i64;

/// Sum of many balances or amounts. Wide enough that no ledger of `Cents`
/// values can overflow it.
pub type TotalCents = i128;

/// Add up cents without overflowing.
pub fn total_cents(values: impl IntoIterator<Item = Cents>) -> TotalCents {
    values.into_iter().map(TotalCents::from).sum()
}

/// Format cents as a decimal string.
/// Example: 30000 -> "300.00", -1234 -> "-12.34"
pub fn format_cents(cents: impl Into<TotalCents>) -> String {
    let cents = cents.into();
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs_cents / 100, abs_cents % 100)
}

/// Parse a decimal string into cents.
/// Example: "500" -> 50000, "12.5" -> 1250, ".75" -> 75
///
/// More than two fractional digits is rejected rather than truncated:
/// a request for 10.005 is not a request for 10.00.
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let input = input.trim();
    let (negative, body) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };

    if body.is_empty() {
        return Err(ParseCentsError::InvalidFormat);
    }

    let (units_str, fraction_str) = body.split_once('.').unwrap_or((body, ""));

    if !units_str.chars().all(|c| c.is_ascii_digit())
        || !fraction_str.chars().all(|c| c.is_ascii_digit())
        || (units_str.is_empty() && fraction_str.is_empty())
    {
        return Err(ParseCentsError::InvalidFormat);
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str.parse().map_err(|_| ParseCentsError::Overflow)?
    };

    let fraction: i64 = match fraction_str.len() {
        0 => 0,
        1 => fraction_str.parse::<i64>().map_err(|_| ParseCentsError::InvalidFormat)? * 10,
        2 => fraction_str.parse().map_err(|_| ParseCentsError::InvalidFormat)?,
        _ => return Err(ParseCentsError::TooPrecise),
    };

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(fraction))
        .ok_or(ParseCentsError::Overflow)?;

    Ok(if negative { -cents } else { cents })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCentsError {
    #[error("invalid money format")]
    InvalidFormat,

    #[error("money amounts support at most two decimal places")]
    TooPrecise,

    #[error("money amount is too large")]
    Overflow,
}
