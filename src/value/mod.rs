use bigdecimal::num_bigint::{BigInt, Sign};
use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed-point decimal used for every token amount.
///
/// Wraps an arbitrary-precision integer magnitude with a decimal exponent.
/// Scaled values are raw base units (what a contract returns); unscaled
/// values are human amounts, related through the token's decimal count.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScaledValue(BigDecimal);

impl ScaledValue {
    pub fn zero() -> Self {
        Self(BigDecimal::zero())
    }

    pub fn from_u256(raw: U256) -> Self {
        let mut bytes = [0u8; 32];
        raw.to_big_endian(&mut bytes);
        Self(BigDecimal::new(BigInt::from_bytes_be(Sign::Plus, &bytes), 0))
    }

    /// Integer part as a `U256`. `None` for negative values or overflow.
    pub fn to_u256(&self) -> Option<U256> {
        let (int, _) = self.0.with_scale(0).into_bigint_and_exponent();
        let (sign, bytes) = int.to_bytes_be();
        if sign == Sign::Minus || bytes.len() > 32 {
            return None;
        }
        Some(U256::from_big_endian(&bytes))
    }

    /// Multiplies by `10^decimals`. Exact: only the exponent moves.
    pub fn scale_by(&self, decimals: i64) -> Self {
        let (int, scale) = self.0.as_bigint_and_exponent();
        Self(BigDecimal::new(int, scale - decimals))
    }

    /// Divides by `10^decimals`.
    pub fn unscale_by(&self, decimals: i64) -> Self {
        self.scale_by(-decimals)
    }

    pub fn plus(&self, other: &Self) -> Self {
        Self(&self.0 + &other.0)
    }

    pub fn minus(&self, other: &Self) -> Self {
        Self(&self.0 - &other.0)
    }

    pub fn multiplied_by(&self, other: &Self) -> Self {
        Self(&self.0 * &other.0)
    }

    /// `None` when dividing by zero.
    pub fn divided_by(&self, other: &Self) -> Option<Self> {
        if other.0.is_zero() {
            return None;
        }
        Some(Self(&self.0 / &other.0))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > BigDecimal::zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0 < BigDecimal::zero()
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    pub fn to_f64(&self) -> Option<f64> {
        self.0.to_f64()
    }

    /// Smallest of a set, `None` for an empty set.
    pub fn min<'a>(values: impl IntoIterator<Item = &'a ScaledValue>) -> Option<ScaledValue> {
        values.into_iter().min().cloned()
    }

    /// Largest of a set, `None` for an empty set.
    pub fn max<'a>(values: impl IntoIterator<Item = &'a ScaledValue>) -> Option<ScaledValue> {
        values.into_iter().max().cloned()
    }

    /// Sums the selected values, skipping elements without data.
    ///
    /// Returns `None` when the selector yields nothing for every element,
    /// so "no data" stays distinguishable from zero.
    pub fn sum_each<T, F>(items: impl IntoIterator<Item = T>, mut selector: F) -> Option<ScaledValue>
    where
        F: FnMut(T) -> Option<ScaledValue>,
    {
        items
            .into_iter()
            .filter_map(|item| selector(item))
            .fold(None, |acc: Option<ScaledValue>, value| {
                Some(match acc {
                    Some(sum) => sum.plus(&value),
                    None => value,
                })
            })
    }

    /// Plain decimal string truncated to `digits` fractional digits.
    pub fn to_fixed(&self, digits: i64) -> String {
        let digits = digits.max(0);
        let (int, _) = self.0.with_scale(digits).into_bigint_and_exponent();
        let negative = int.sign() == Sign::Minus;
        let mut magnitude = int.magnitude().to_string();
        let digits = digits as usize;

        if magnitude.len() <= digits {
            magnitude = format!("{}{}", "0".repeat(digits + 1 - magnitude.len()), magnitude);
        }

        let split = magnitude.len() - digits;
        let mut out = String::with_capacity(magnitude.len() + 2);
        if negative && magnitude.chars().any(|c| c != '0') {
            out.push('-');
        }
        out.push_str(&magnitude[..split]);
        if digits > 0 {
            out.push('.');
            out.push_str(&magnitude[split..]);
        }
        out
    }

    /// Number of fractional digits carried by the representation.
    pub fn fraction_digits(&self) -> i64 {
        self.0.as_bigint_and_exponent().1.max(0)
    }
}

impl fmt::Display for ScaledValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let normalized = Self(self.0.normalized());
        write!(f, "{}", normalized.to_fixed(normalized.fraction_digits()))
    }
}

impl FromStr for ScaledValue {
    type Err = bigdecimal::ParseBigDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BigDecimal::from_str(s.trim()).map(Self)
    }
}

impl From<U256> for ScaledValue {
    fn from(raw: U256) -> Self {
        Self::from_u256(raw)
    }
}

impl From<u64> for ScaledValue {
    fn from(value: u64) -> Self {
        Self(BigDecimal::from(value))
    }
}

impl From<i64> for ScaledValue {
    fn from(value: i64) -> Self {
        Self(BigDecimal::from(value))
    }
}

impl From<BigDecimal> for ScaledValue {
    fn from(value: BigDecimal) -> Self {
        Self(value)
    }
}

/// Arithmetic over possibly-absent values. Absence propagates.
pub trait MaybeScaled {
    fn maybe_plus(&self, other: Option<&ScaledValue>) -> Option<ScaledValue>;
    fn maybe_minus(&self, other: Option<&ScaledValue>) -> Option<ScaledValue>;
    fn maybe_multiplied_by(&self, other: Option<&ScaledValue>) -> Option<ScaledValue>;
    fn maybe_divided_by(&self, other: Option<&ScaledValue>) -> Option<ScaledValue>;
    fn maybe_unscale_by(&self, decimals: Option<i64>) -> Option<ScaledValue>;
}

impl MaybeScaled for Option<ScaledValue> {
    fn maybe_plus(&self, other: Option<&ScaledValue>) -> Option<ScaledValue> {
        Some(self.as_ref()?.plus(other?))
    }

    fn maybe_minus(&self, other: Option<&ScaledValue>) -> Option<ScaledValue> {
        Some(self.as_ref()?.minus(other?))
    }

    fn maybe_multiplied_by(&self, other: Option<&ScaledValue>) -> Option<ScaledValue> {
        Some(self.as_ref()?.multiplied_by(other?))
    }

    fn maybe_divided_by(&self, other: Option<&ScaledValue>) -> Option<ScaledValue> {
        self.as_ref()?.divided_by(other?)
    }

    fn maybe_unscale_by(&self, decimals: Option<i64>) -> Option<ScaledValue> {
        Some(self.as_ref()?.unscale_by(decimals?))
    }
}
