use std::{
    fmt::{self, Display},
    iter::Sum,
    ops::{Add, AddAssign, Sub},
    str::FromStr,
};

use serde::{
    de::{self, Visitor},
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};
use thiserror::Error;

pub const CURRENCY_CODE: &str = "PHP";
pub const CURRENCY_SYMBOL: &str = "₱";

const CENTAVOS_PER_UNIT: i64 = 100;

//--------------------------------------       Money        ---------------------------------------------------------
/// A cash amount, stored as a whole number of centavos.
///
/// On the wire, amounts travel as JSON numbers in currency units (`250.5` is ₱250.50). Strings such as `"250.50"` are
/// also accepted when deserializing, since some clients quote their decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("The amount is empty")]
    Empty,
    #[error("'{0}' is not a valid amount")]
    NotANumber(String),
    #[error("'{0}' has more than two decimal places")]
    TooPrecise(String),
    #[error("Negative amounts are not allowed: {0}")]
    Negative(String),
    #[error("'{0}' is too large to be represented")]
    Overflow(String),
}

impl Money {
    pub const fn from_centavos(centavos: i64) -> Self {
        Self(centavos)
    }

    pub const fn from_units(units: i64) -> Self {
        Self(units * CENTAVOS_PER_UNIT)
    }

    pub fn centavos(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns `self - rhs`, or zero if `rhs` is larger.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self((self.0 - rhs.0).max(0))
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// The amount as plain decimal text without a currency symbol. Whole amounts drop the fraction (`100`), others keep
    /// two places (`12.50`). This is the form the acceptor protocol uses.
    pub fn to_plain_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let units = abs / CENTAVOS_PER_UNIT as u64;
        let cents = abs % CENTAVOS_PER_UNIT as u64;
        if cents == 0 {
            format!("{sign}{units}")
        } else {
            format!("{sign}{units}.{cents:02}")
        }
    }

    /// Two fixed decimal places and no currency symbol, e.g. `250.00`.
    pub fn to_fixed_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        format!("{sign}{}.{:02}", abs / CENTAVOS_PER_UNIT as u64, abs % CENTAVOS_PER_UNIT as u64)
    }

    fn from_f64(value: f64) -> Result<Self, MoneyError> {
        if !value.is_finite() {
            return Err(MoneyError::NotANumber(value.to_string()));
        }
        if value < 0.0 {
            return Err(MoneyError::Negative(value.to_string()));
        }
        let centavos = (value * CENTAVOS_PER_UNIT as f64).round();
        if centavos > i64::MAX as f64 {
            return Err(MoneyError::Overflow(value.to_string()));
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(Self(centavos as i64))
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    /// Parses non-negative decimal text with at most two fractional digits: `100`, `12.5`, `12.50`, `0.25`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MoneyError::Empty);
        }
        if s.starts_with('-') {
            return Err(MoneyError::Negative(s.to_string()));
        }
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if whole.is_empty() || !all_digits(whole) || !all_digits(frac) || (s.contains('.') && frac.is_empty()) {
            return Err(MoneyError::NotANumber(s.to_string()));
        }
        if frac.len() > 2 {
            return Err(MoneyError::TooPrecise(s.to_string()));
        }
        let units = whole.parse::<i64>().map_err(|_| MoneyError::Overflow(s.to_string()))?;
        let cents = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| MoneyError::NotANumber(s.to_string()))? * 10,
            _ => frac.parse::<i64>().map_err(|_| MoneyError::NotANumber(s.to_string()))?,
        };
        units
            .checked_mul(CENTAVOS_PER_UNIT)
            .and_then(|c| c.checked_add(cents))
            .map(Self)
            .ok_or_else(|| MoneyError::Overflow(s.to_string()))
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CURRENCY_SYMBOL}{}", self.to_fixed_string())
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0 as f64 / CENTAVOS_PER_UNIT as f64)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MoneyVisitor)
    }
}

struct MoneyVisitor;

impl<'de> Visitor<'de> for MoneyVisitor {
    type Value = Money;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative amount as a number or decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
        i64::try_from(v)
            .ok()
            .and_then(|units| units.checked_mul(CENTAVOS_PER_UNIT))
            .map(Money)
            .ok_or_else(|| E::custom(MoneyError::Overflow(v.to_string())))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
        if v < 0 {
            return Err(E::custom(MoneyError::Negative(v.to_string())));
        }
        v.checked_mul(CENTAVOS_PER_UNIT).map(Money).ok_or_else(|| E::custom(MoneyError::Overflow(v.to_string())))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
        Money::from_f64(v).map_err(E::custom)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
        v.parse().map_err(E::custom)
    }
}
