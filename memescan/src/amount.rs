//! USD prices and their conversion to token base units.
//!
//! Scan prices are published by the purchase contract as whole US cents. The
//! payment token is a USD stablecoin, so the amount owed in base units is the
//! price scaled by the token's decimals:
//!
//! ```text
//! required = cents * 10^decimals / 100
//! ```
//!
//! Tokens with fewer than two decimals cannot represent every cent value; the
//! result is rounded up so the buyer never underpays.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::LazyLock;

use alloy_primitives::U256;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A USD price with cent precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsdPrice(u64);

impl UsdPrice {
    /// Creates a price from whole cents.
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// The price in whole cents.
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// The price as a decimal number of dollars.
    #[must_use]
    pub fn as_decimal(&self) -> Decimal {
        Decimal::new(i64::try_from(self.0).unwrap_or(i64::MAX), 2)
    }

    /// Amount of a USD stablecoin with `decimals` decimals that pays this price.
    #[must_use]
    pub fn to_token_units(&self, decimals: u8) -> U256 {
        required_amount(*self, decimals)
    }

    /// Parses a human-readable price such as `"$2.50"` or `"1"`.
    ///
    /// Currency symbols, thousand separators and whitespace are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`UsdPriceParseError`] for malformed, negative or sub-cent values.
    pub fn parse(input: &str) -> Result<Self, UsdPriceParseError> {
        static NON_NUMERIC: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"[^\d\.\-]+").expect("valid regex"));
        let cleaned = NON_NUMERIC.replace_all(input, "");
        let parsed = Decimal::from_str(&cleaned).map_err(|_| UsdPriceParseError::InvalidFormat)?;
        if parsed.is_sign_negative() {
            return Err(UsdPriceParseError::Negative);
        }
        let cents = parsed * Decimal::ONE_HUNDRED;
        if !cents.fract().is_zero() {
            return Err(UsdPriceParseError::SubCent);
        }
        let cents = u64::try_from(cents.mantissa().unsigned_abs() / 10u128.pow(cents.scale()))
            .map_err(|_| UsdPriceParseError::OutOfRange)?;
        Ok(Self(cents))
    }
}

impl Display for UsdPrice {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for UsdPrice {
    type Err = UsdPriceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Errors that can occur when parsing a [`UsdPrice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UsdPriceParseError {
    /// The input could not be parsed as a number.
    #[error("Invalid number format")]
    InvalidFormat,
    /// Negative prices are not allowed.
    #[error("Negative value is not allowed")]
    Negative,
    /// The input is more precise than one cent.
    #[error("Price must be a whole number of cents")]
    SubCent,
    /// The input does not fit.
    #[error("Price is out of range")]
    OutOfRange,
}

/// Token base units owed for `price`, for a token with `decimals` decimals.
///
/// Exact for two or more decimals; rounded up otherwise.
#[must_use]
pub fn required_amount(price: UsdPrice, decimals: u8) -> U256 {
    let scaled = U256::from(price.cents()) * pow10(decimals);
    let hundred = U256::from(100u8);
    let (quotient, remainder) = scaled.div_rem(hundred);
    if remainder.is_zero() {
        quotient
    } else {
        quotient + U256::from(1u8)
    }
}

/// Renders a base-unit amount as a decimal string with trailing zeros removed.
///
/// `format_units(U256::from(1_500_000), 6)` is `"1.5"`.
#[must_use]
pub fn format_units(amount: U256, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let (whole, frac) = amount.div_rem(pow10(decimals));
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = frac.to_string();
    let frac = format!("{frac:0>width$}", width = usize::from(decimals));
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

fn pow10(exp: u8) -> U256 {
    U256::from(10u8).pow(U256::from(exp))
}
