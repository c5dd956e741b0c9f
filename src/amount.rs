//! Fixed-point monetary amount with 4 decimal places precision.
//!
//! The smallest representable unit is `0.0001`. Proportional arithmetic
//! (the share of a deposit earned at a given progress) is carried out on
//! those minor units widened to `i128`, so it never overflows before the
//! division and always truncates.
//!
//! Every amount that enters the ledger must be *exact*: stored at scale 4.
//! Values too large for that scale, or written with more than 4 decimal
//! places, are rejected when parsed.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;
use thiserror::Error;

/// Why a value cannot be represented as an exact `Amount`.
#[derive(Error, Debug)]
pub enum AmountError {
    #[error("invalid decimal: {0}")]
    Parse(#[from] rust_decimal::Error),

    #[error("{0} has more than 4 decimal places")]
    TooPrecise(Decimal),

    #[error("{0} is too large to hold 4 decimal places")]
    OutOfRange(Decimal),
}

/// An escrowed amount with exactly 4 decimal places.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use progress_escrow::Amount;
///
/// let deposit = Amount::from_str("10").unwrap();
/// assert_eq!(deposit.percent_floor(25).to_string(), "2.5000");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Amount(Decimal);

impl Amount {
    /// The number of decimal places to maintain.
    pub const SCALE: u32 = 4;

    pub const ZERO: Self = Amount(Decimal::ZERO);

    /// Creates an `Amount` from a `Decimal`, normalizing to 4 decimal places.
    ///
    /// Extra places are rounded, and a value too large for scale 4 keeps a
    /// smaller scale; check `is_exact` or use `try_new` where that matters.
    pub fn new(value: Decimal) -> Self {
        let mut normalized = value;
        normalized.rescale(Self::SCALE);
        Amount(normalized)
    }

    /// Creates an exact `Amount`, refusing to round or lose scale.
    pub fn try_new(value: Decimal) -> std::result::Result<Self, AmountError> {
        if value.scale() > Self::SCALE {
            return Err(AmountError::TooPrecise(value));
        }
        let amount = Amount::new(value);
        if !amount.is_exact() {
            return Err(AmountError::OutOfRange(value));
        }
        Ok(amount)
    }

    /// `true` when the amount is held at exactly 4 decimal places, which is
    /// what `minor_units` and `percent_floor` rely on.
    pub fn is_exact(&self) -> bool {
        self.0.scale() == Self::SCALE
    }

    /// Builds an amount from a count of minor units (`0.0001` each).
    ///
    /// Returns `None` when the count does not fit the 96-bit mantissa.
    pub fn from_minor_units(units: i128) -> Option<Self> {
        Decimal::try_from_i128_with_scale(units, Self::SCALE)
            .ok()
            .map(Amount)
    }

    /// The amount expressed in minor units.
    pub fn minor_units(&self) -> i128 {
        // Meaningful only for exact amounts; the ledger admits no others.
        self.0.mantissa()
    }

    /// `floor(self * percent / 100)` in minor units. `percent` is clamped to 100.
    pub fn percent_floor(self, percent: u8) -> Self {
        let percent = i128::from(percent.min(100));
        let units = self.minor_units() * percent / 100;
        // |units| <= |self.minor_units()|, which already fits the mantissa.
        Amount(Decimal::from_i128_with_scale(units, Self::SCALE))
    }

    /// `None` when the sum overflows or can no longer be held at scale 4.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0
            .checked_add(rhs.0)
            .and_then(|sum| Amount::try_new(sum).ok())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns `true` if this value is strictly greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s.trim())?;
        Amount::try_new(decimal)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Amount::new(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
        self.0.rescale(Self::SCALE);
    }
}

impl Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Amount::new(self.0 - rhs.0)
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
        self.0.rescale(Self::SCALE);
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}
