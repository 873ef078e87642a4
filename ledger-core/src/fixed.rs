//! Deterministic fixed-point arithmetic: a signed 64-bit integer of minor
//! units plus a decimal scale. All monetary and NFT-count quantities in
//! this crate use this type rather than floating point, so that settlement
//! is bit-for-bit reproducible across hosts.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Decimal places used by the native coin and by Token721 amounts.
pub const NATIVE_DECIMALS: u8 = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FixedError {
    #[error("invalid fixed-point literal '{0}'")]
    Parse(String),
    #[error("fixed-point overflow")]
    Overflow,
}

/// A fixed-8 (or fixed-`decimal`) quantity: `value` minor units at
/// `decimal` fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fixed {
    pub value: i64,
    pub decimal: u8,
}

impl Fixed {
    pub const fn new(value: i64, decimal: u8) -> Self {
        Self { value, decimal }
    }

    pub const fn zero(decimal: u8) -> Self {
        Self { value: 0, decimal }
    }

    /// Parses a decimal string into minor units. Mirrors `common.NewFixed`
    /// in the source VM: every call site there discards the parse error
    /// (`amount, _ := common.NewFixed(amountStr, 8)`), so a malformed
    /// literal resolves to zero rather than propagating an error — callers
    /// that need `amount > 0` reject the zero downstream instead.
    pub fn parse(s: &str, decimal: u8) -> Self {
        Self::try_parse(s, decimal).unwrap_or(Self::zero(decimal))
    }

    pub fn try_parse(s: &str, decimal: u8) -> Result<Self, FixedError> {
        let trimmed = s.trim();
        let negative = trimmed.starts_with('-');
        let unsigned = trimmed.strip_prefix('-').unwrap_or(trimmed);
        let mut parts = unsigned.splitn(2, '.');
        let int_part = parts.next().unwrap_or("");
        let frac_part = parts.next().unwrap_or("");

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(FixedError::Parse(s.to_string()));
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(FixedError::Parse(s.to_string()));
        }
        if frac_part.len() > decimal as usize {
            return Err(FixedError::Parse(s.to_string()));
        }

        let mut digits = String::with_capacity(int_part.len() + decimal as usize);
        digits.push_str(if int_part.is_empty() { "0" } else { int_part });
        digits.push_str(frac_part);
        for _ in 0..(decimal as usize - frac_part.len()) {
            digits.push('0');
        }

        let magnitude: i64 =
            digits.parse().map_err(|_| FixedError::Parse(s.to_string()))?;
        Ok(Self { value: if negative { -magnitude } else { magnitude }, decimal })
    }

    pub fn checked_add(self, rhs: Fixed) -> Result<Fixed, FixedError> {
        debug_assert_eq!(self.decimal, rhs.decimal, "adding fixed-point values of different scale");
        self.value
            .checked_add(rhs.value)
            .map(|value| Fixed { value, decimal: self.decimal })
            .ok_or(FixedError::Overflow)
    }

    pub fn checked_sub(self, rhs: Fixed) -> Result<Fixed, FixedError> {
        debug_assert_eq!(self.decimal, rhs.decimal, "subtracting fixed-point values of different scale");
        self.value
            .checked_sub(rhs.value)
            .map(|value| Fixed { value, decimal: self.decimal })
            .ok_or(FixedError::Overflow)
    }

    pub fn to_string_fixed(&self) -> String {
        let decimal = self.decimal as usize;
        let negative = self.value < 0;
        let magnitude = self.value.unsigned_abs();
        let digits = format!("{:0width$}", magnitude, width = decimal + 1);
        let (int_part, frac_part) = digits.split_at(digits.len() - decimal);

        let mut out = String::with_capacity(out_capacity(int_part, frac_part, negative));
        if negative {
            out.push('-');
        }
        out.push_str(int_part);
        if decimal > 0 {
            out.push('.');
            out.push_str(frac_part);
        }
        out
    }
}

fn out_capacity(int_part: &str, frac_part: &str, negative: bool) -> usize {
    int_part.len() + frac_part.len() + if frac_part.is_empty() { 0 } else { 1 } + negative as usize
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_fixed())
    }
}

/// Serializes as its fixed-8 string form, never a raw integer — matching
/// `near-sdk`'s `U128`/`U64` convention of string-encoding large integers
/// so JSON round-trips never silently lose the assumed decimal scale.
impl Serialize for Fixed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string_fixed())
    }
}

impl<'de> Deserialize<'de> for Fixed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = Deserialize::deserialize(deserializer)?;
        Fixed::try_parse(&s, NATIVE_DECIMALS).map_err(serde::de::Error::custom)
    }
}
