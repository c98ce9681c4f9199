//! Fixed-point token amounts.
//!
//! ERC-20 balances are plain `uint256` values; the human-facing form divides them by
//! `10^decimals`. This module is the only place that converts between the two, and it
//! does so purely on decimal digit strings so no value ever passes through a float.
//!
//! An [`Amount`] always remembers the scale it was produced at. Two amounts can only be
//! compared when their scales agree, see [`Amount::covers`].

use alloy::primitives::U256;
use std::fmt::{self, Display, Formatter};

/// Scaling exponent between the integer and the decimal representation.
pub type Decimals = u8;

/// Largest exponent for which `10^decimals` still fits into a `uint256`.
pub const MAX_DECIMALS: Decimals = 77;

/// Reasons an amount string could not be turned into an [`Amount`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount must not be empty")]
    Empty,
    #[error("amount '{0}' is not a plain decimal number")]
    InvalidCharacters(String),
    #[error("amount '{amount}' has more than {decimals} fractional digits")]
    TooPrecise { amount: String, decimals: Decimals },
    #[error("amount '{0}' does not fit into 256 bits")]
    Overflow(String),
    #[error("token reports unsupported precision of {0} decimals")]
    UnsupportedDecimals(Decimals),
}

/// A non-negative token quantity in ledger-native units, tagged with its scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Amount {
    raw: U256,
    decimals: Decimals,
}

impl Amount {
    /// Wrap a raw ledger value read at the given precision.
    pub const fn from_raw(raw: U256, decimals: Decimals) -> Self {
        Self { raw, decimals }
    }

    /// The `uint256::MAX` allowance sentinel, treated by ERC-20 tokens as infinite.
    pub const fn unlimited(decimals: Decimals) -> Self {
        Self::from_raw(U256::MAX, decimals)
    }

    pub const fn raw(&self) -> U256 {
        self.raw
    }

    pub const fn decimals(&self) -> Decimals {
        self.decimals
    }

    pub fn is_unlimited(&self) -> bool {
        self.raw == U256::MAX
    }

    /// Whether this amount is at least `required`.
    ///
    /// Returns `None` when the scales differ: such amounts are not comparable.
    /// An unlimited amount covers everything at its scale.
    pub fn covers(&self, required: &Amount) -> Option<bool> {
        if self.decimals != required.decimals {
            return None;
        }
        Some(self.is_unlimited() || self.raw >= required.raw)
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&format_units(self.raw, self.decimals))
    }
}

/// Split `value` into its integer and fractional digits.
///
/// Anything other than `^[0-9]+(\.[0-9]+)?$` is rejected; the fraction is empty when
/// there is no decimal point.
fn split_decimal(value: &str) -> Result<(&str, &str), AmountError> {
    if value.is_empty() {
        return Err(AmountError::Empty);
    }
    let (integer, fraction) = match value.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (value, None),
    };
    let is_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if !is_digits(integer) || !fraction.is_none_or(is_digits) {
        return Err(AmountError::InvalidCharacters(value.to_string()));
    }
    Ok((integer, fraction.unwrap_or_default()))
}

/// Check that `value` is a plain decimal number without knowing the token precision.
pub fn check_decimal(value: &str) -> Result<(), AmountError> {
    split_decimal(value).map(|_| ())
}

/// Parse a decimal string such as `"12.5"` into ledger units at `decimals` precision.
///
/// Accepts `^[0-9]+(\.[0-9]+)?$` only. Fractional digits beyond the token precision are
/// rejected rather than rounded.
pub fn parse_units(value: &str, decimals: Decimals) -> Result<Amount, AmountError> {
    if decimals > MAX_DECIMALS {
        return Err(AmountError::UnsupportedDecimals(decimals));
    }
    let (integer, fraction) = split_decimal(value)?;
    if fraction.len() > usize::from(decimals) {
        return Err(AmountError::TooPrecise {
            amount: value.to_string(),
            decimals,
        });
    }

    let mut digits = String::with_capacity(integer.len() + usize::from(decimals));
    digits.push_str(integer);
    digits.push_str(fraction);
    digits.extend(std::iter::repeat_n('0', usize::from(decimals) - fraction.len()));

    let raw = U256::from_str_radix(&digits, 10)
        .map_err(|_| AmountError::Overflow(value.to_string()))?;
    Ok(Amount::from_raw(raw, decimals))
}

/// Render ledger units as the shortest exact decimal string at `decimals` precision.
///
/// `format_units(1_500_000, 6) == "1.5"`, `format_units(0, 18) == "0"`.
pub fn format_units(raw: U256, decimals: Decimals) -> String {
    let digits = raw.to_string();
    let scale = usize::from(decimals);
    if scale == 0 {
        return digits;
    }
    let padded = if digits.len() <= scale {
        format!("{}{digits}", "0".repeat(scale + 1 - digits.len()))
    } else {
        digits
    };
    let (integer, fraction) = padded.split_at(padded.len() - scale);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        integer.to_string()
    } else {
        format!("{integer}.{fraction}")
    }
}
