use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use thiserror::Error;

/// Scale of `NUMERIC(10,2)` money columns.
const MONEY_SCALE: u32 = 2;
/// Scale of the `NUMERIC(5,4)` commission_rate column.
const RATE_SCALE: u32 = 4;

const RATE_ONE: i64 = 10_000;

/// Platform share used when neither the order nor the settings carry a rate.
pub const DEFAULT_COMMISSION_RATE: Rate = Rate(700);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecimalError {
    #[error("'{0}' is not a decimal number")]
    Malformed(String),

    #[error("'{0}' has more than {1} fractional digits")]
    TooPrecise(String, u32),

    #[error("'{0}' is out of range")]
    OutOfRange(String),
}

/// Parses a plain decimal string into an integer scaled by `10^scale`.
/// Fractional digits beyond `scale` are rejected rather than rounded.
fn parse_scaled(input: &str, scale: u32) -> Result<i64, DecimalError> {
    let s = input.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };

    let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !all_digits(int_part) || !all_digits(frac_part) {
        return Err(DecimalError::Malformed(input.to_owned()));
    }
    if frac_part.len() > scale as usize {
        return Err(DecimalError::TooPrecise(input.to_owned(), scale));
    }

    let out_of_range = || DecimalError::OutOfRange(input.to_owned());

    let int_value: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().map_err(|_| out_of_range())?
    };

    let mut frac_value: i64 = 0;
    for c in frac_part.chars() {
        frac_value = frac_value * 10 + i64::from(c as u8 - b'0');
    }
    frac_value *= 10_i64.pow(scale - frac_part.len() as u32);

    let scaled = int_value
        .checked_mul(10_i64.pow(scale))
        .and_then(|v| v.checked_add(frac_value))
        .ok_or_else(out_of_range)?;

    Ok(if negative { -scaled } else { scaled })
}

/// Integer division rounding half away from zero (`NUMERIC` rounding). `d` must be positive.
fn div_round(n: i128, d: i128) -> i128 {
    let q = n / d;
    let r = n % d;
    if r.abs() * 2 >= d {
        q + n.signum()
    } else {
        q
    }
}

fn scaled_from_f64(value: f64, scale: u32) -> Option<i64> {
    let scaled = (value * 10_f64.powi(scale as i32)).round();
    if scaled.is_finite() && scaled.abs() < i64::MAX as f64 {
        Some(scaled as i64)
    } else {
        None
    }
}

fn fmt_scaled(f: &mut fmt::Formatter<'_>, value: i64, scale: u32) -> fmt::Result {
    let unit = 10_i64.pow(scale);
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    write!(
        f,
        "{}{}.{:0width$}",
        sign,
        abs / unit as u64,
        abs % unit as u64,
        width = scale as usize
    )
}

/// Reads a fixed-point column. SQLite `NUMERIC` affinity hands back INTEGER for whole
/// values and REAL otherwise; TEXT shows up when a value could not be converted.
fn column_scaled(value: ValueRef<'_>, scale: u32) -> FromSqlResult<i64> {
    match value {
        ValueRef::Integer(i) => i
            .checked_mul(10_i64.pow(scale))
            .ok_or(FromSqlError::OutOfRange(i)),
        ValueRef::Real(r) => scaled_from_f64(r, scale).ok_or(FromSqlError::InvalidType),
        ValueRef::Text(t) => {
            let s = std::str::from_utf8(t).map_err(|e| FromSqlError::Other(Box::new(e)))?;
            parse_scaled(s, scale).map_err(|e| FromSqlError::Other(Box::new(e)))
        }
        _ => Err(FromSqlError::InvalidType),
    }
}

/// An amount in hundredths of the currency unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

impl Money {
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl FromStr for Money {
    type Err = DecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_scaled(s, MONEY_SCALE).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_scaled(f, self.0, MONEY_SCALE)
    }
}

impl ToSql for Money {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_f64()))
    }
}

impl FromSql for Money {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        column_scaled(value, MONEY_SCALE).map(Money)
    }
}

/// A fraction between 0 and 1 in ten-thousandths (basis points).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rate(i64);

impl Rate {
    pub fn from_bps(bps: i64) -> Option<Self> {
        (0..=RATE_ONE).contains(&bps).then_some(Rate(bps))
    }

    #[cfg(test)]
    pub fn bps(&self) -> i64 {
        self.0
    }

    /// The share left over after this rate is taken.
    pub fn complement(&self) -> Rate {
        Rate(RATE_ONE - self.0)
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / RATE_ONE as f64
    }

    /// `round(amount × rate, 2)`.
    pub fn apply(&self, amount: Money) -> Money {
        let product = i128::from(amount.cents()) * i128::from(self.0);
        Money(div_round(product, i128::from(RATE_ONE)) as i64)
    }
}

impl FromStr for Rate {
    type Err = DecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bps = parse_scaled(s, RATE_SCALE)?;
        Rate::from_bps(bps).ok_or_else(|| DecimalError::OutOfRange(s.to_owned()))
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_scaled(f, self.0, RATE_SCALE)
    }
}

impl ToSql for Rate {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_f64()))
    }
}

impl FromSql for Rate {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let bps = column_scaled(value, RATE_SCALE)?;
        Rate::from_bps(bps).ok_or(FromSqlError::OutOfRange(bps))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionSplit {
    pub platform_fee: Money,
    pub driver_earnings: Money,
}

/// Splits a price into the platform fee and the driver's earnings. Each side is rounded
/// independently, so on an exact half-cent tie the two may sum to one cent over the price.
pub fn split(price: Money, rate: Rate) -> CommissionSplit {
    CommissionSplit {
        platform_fee: rate.apply(price),
        driver_earnings: rate.complement().apply(price),
    }
}
