//! Amount types
//!
//! Domain primitives for monetary values. `Amount` is what operators and API
//! callers speak (display units, e.g. "1.5" coins); `BaseUnits` is what the
//! ledger speaks (integer minimal units). Reconciliation arithmetic only ever
//! happens on `BaseUnits`.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum allowed display amount (1 trillion)
const MAX_AMOUNT: &str = "1000000000000";

/// Maximum decimal places accepted in display amounts
const MAX_SCALE: u32 = 18;

/// Decimals of the native gas currency
pub const CURRENCY_DECIMALS: u32 = 18;

/// Most decimals a display `Decimal` can carry
pub const MAX_DISPLAY_DECIMALS: u32 = 28;

/// Ledger unit a balance or transfer is denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    /// Native currency used to pay transaction fees
    #[serde(alias = "gas")]
    Currency,
    /// The fungible token distributed to users
    Token,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Currency => "currency",
            Unit::Token => "token",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "currency" | "gas" | "eth" => Ok(Unit::Currency),
            "token" | "tokens" => Ok(Unit::Token),
            other => Err(AmountError::ParseError(format!("unknown unit '{}'", other))),
        }
    }
}

/// Amount represents a validated display-unit value.
///
/// # Invariants
/// - Value is never negative (zero is allowed, e.g. a zero reserve)
/// - Maximum 18 decimal places
/// - Maximum value is 1 trillion
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use faucet_onboarding::domain::Amount;
///
/// let amount = Amount::new(Decimal::new(15, 1)).unwrap();
/// assert_eq!(amount.value(), Decimal::new(15, 1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(Decimal);

/// Errors that can occur when creating an Amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must not be negative (got {0})")]
    Negative(Decimal),

    #[error("Amount has too many decimal places (max {MAX_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Amount exceeds maximum allowed value ({MAX_AMOUNT})")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::Negative` if value < 0
    /// - `AmountError::TooManyDecimals` if more than 18 decimal places
    /// - `AmountError::Overflow` if value > 1 trillion
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value < Decimal::ZERO {
            return Err(AmountError::Negative(value));
        }

        if value.scale() > MAX_SCALE {
            return Err(AmountError::TooManyDecimals(value.scale()));
        }

        let max = Decimal::from_str(MAX_AMOUNT).map_err(|e| AmountError::ParseError(e.to_string()))?;
        if value > max {
            return Err(AmountError::Overflow);
        }

        Ok(Self(value.normalize()))
    }

    /// Create an Amount from an integer (no decimal places).
    pub fn from_integer(value: i64) -> Result<Self, AmountError> {
        Self::new(Decimal::from(value))
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Convert to ledger minimal units, rounding any sub-unit remainder down.
    pub fn to_base_units(&self, decimals: u32) -> Result<BaseUnits, AmountError> {
        let scale = 10u128
            .checked_pow(decimals)
            .ok_or(AmountError::Overflow)?;

        let whole = self.0.trunc().to_u128().ok_or(AmountError::Overflow)?;

        // The fraction is < 1, so fraction * 10^decimals stays well inside
        // Decimal's range for any realistic token precision.
        let fraction = self.0.fract();
        let fraction_units = match Decimal::from_u128(scale) {
            Some(factor) => fraction
                .checked_mul(factor)
                .and_then(|v| v.trunc().to_u128())
                .ok_or(AmountError::Overflow)?,
            None => return Err(AmountError::Overflow),
        };

        whole
            .checked_mul(scale)
            .and_then(|v| v.checked_add(fraction_units))
            .map(BaseUnits)
            .ok_or(AmountError::Overflow)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s.trim())
            .map_err(|e| AmountError::ParseError(e.to_string()))?;
        Amount::new(decimal)
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Amount::from_str(&value)
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.0.to_string()
    }
}

/// Balance or transfer size in ledger minimal units (wei-like).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaseUnits(pub u128);

impl BaseUnits {
    pub const ZERO: BaseUnits = BaseUnits(0);

    pub fn new(value: u128) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn saturating_sub(self, rhs: BaseUnits) -> BaseUnits {
        BaseUnits(self.0.saturating_sub(rhs.0))
    }

    pub fn checked_add(self, rhs: BaseUnits) -> Option<BaseUnits> {
        self.0.checked_add(rhs.0).map(BaseUnits)
    }

    pub fn checked_sub(self, rhs: BaseUnits) -> Option<BaseUnits> {
        self.0.checked_sub(rhs.0).map(BaseUnits)
    }

    pub fn saturating_add(self, rhs: BaseUnits) -> BaseUnits {
        BaseUnits(self.0.saturating_add(rhs.0))
    }

    /// Conversion back to display units.
    ///
    /// Exact up to [`MAX_DISPLAY_DECIMALS`]; digits past that are rounded
    /// down. Values beyond the `Decimal` range saturate at `Decimal::MAX`.
    pub fn to_display(&self, decimals: u32) -> Decimal {
        let (value, decimals) = if decimals > MAX_DISPLAY_DECIMALS {
            let dropped = 10u128
                .checked_pow(decimals - MAX_DISPLAY_DECIMALS)
                .map_or(0, |divisor| self.0 / divisor);
            (dropped, MAX_DISPLAY_DECIMALS)
        } else {
            (self.0, decimals)
        };

        let Some(scale) = 10u128.checked_pow(decimals) else {
            return Decimal::ZERO;
        };
        let Some(whole) = Decimal::from_u128(value / scale) else {
            return Decimal::MAX;
        };
        let fraction = i128::try_from(value % scale)
            .ok()
            .and_then(|f| Decimal::try_from_i128_with_scale(f, decimals).ok())
            .unwrap_or(Decimal::ZERO);

        whole.checked_add(fraction).unwrap_or(Decimal::MAX).normalize()
    }

    /// Parse a `0x`-prefixed hex quantity as returned by JSON-RPC nodes.
    pub fn from_hex(value: &str) -> Result<Self, AmountError> {
        let digits = value.trim_start_matches("0x").trim_start_matches('0');
        if digits.is_empty() {
            return Ok(BaseUnits::ZERO);
        }
        if digits.len() > 32 {
            return Err(AmountError::Overflow);
        }
        u128::from_str_radix(digits, 16)
            .map(BaseUnits)
            .map_err(|e| AmountError::ParseError(e.to_string()))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{:x}", self.0)
    }
}

impl fmt::Display for BaseUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u128> for BaseUnits {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_zero_allowed() {
        let amount = Amount::new(Decimal::ZERO).unwrap();
        assert!(amount.is_zero());
    }

    #[test]
    fn test_amount_negative_rejected() {
        let amount = Amount::new(dec!(-1));
        assert!(matches!(amount, Err(AmountError::Negative(_))));
    }

    #[test]
    fn test_amount_too_many_decimals() {
        let amount = Amount::new(Decimal::new(1, 19));
        assert!(matches!(amount, Err(AmountError::TooManyDecimals(19))));
    }

    #[test]
    fn test_amount_overflow() {
        let amount: Result<Amount, _> = "1000000000001".parse();
        assert!(matches!(amount, Err(AmountError::Overflow)));
    }

    #[test]
    fn test_amount_from_str() {
        let amount: Amount = "0.1".parse().unwrap();
        assert_eq!(amount.value(), dec!(0.1));
    }

    #[test]
    fn test_to_base_units_exact() {
        let amount: Amount = "1.5".parse().unwrap();
        assert_eq!(
            amount.to_base_units(18).unwrap(),
            BaseUnits(1_500_000_000_000_000_000)
        );
    }

    #[test]
    fn test_to_base_units_rounds_down() {
        // 0.129 with 2 decimals is 12.9 base units -> 12
        let amount: Amount = "0.129".parse().unwrap();
        assert_eq!(amount.to_base_units(2).unwrap(), BaseUnits(12));
    }

    #[test]
    fn test_to_base_units_max_amount_fits() {
        let amount: Amount = "1000000000000".parse().unwrap();
        let units = amount.to_base_units(18).unwrap();
        assert_eq!(units.value(), 1_000_000_000_000u128 * 10u128.pow(18));
    }

    #[test]
    fn test_to_display_is_exact() {
        let units = BaseUnits(100_000_000_000_000_001);
        assert_eq!(units.to_display(18), dec!(0.100000000000000001));
        assert_eq!(BaseUnits(10 * 10u128.pow(18)).to_display(18), dec!(10));
    }

    #[test]
    fn test_to_display_saturates_instead_of_overflowing() {
        assert_eq!(BaseUnits(u128::MAX).to_display(0), Decimal::MAX);
        assert_eq!(BaseUnits(u128::MAX).to_display(9), Decimal::MAX);
    }

    #[test]
    fn test_to_display_rounds_down_past_max_decimals() {
        // 1.5 tokens plus 7 units at 30 decimals
        let units = BaseUnits(15 * 10u128.pow(29) + 7);
        assert_eq!(units.to_display(30), dec!(1.5));
    }

    #[test]
    fn test_hex_parsing() {
        assert_eq!(BaseUnits::from_hex("0x0").unwrap(), BaseUnits::ZERO);
        assert_eq!(BaseUnits::from_hex("0x").unwrap(), BaseUnits::ZERO);
        assert_eq!(BaseUnits::from_hex("0xde0b6b3a7640000").unwrap(), BaseUnits(10u128.pow(18)));
        // 32-byte ABI word with leading zeros
        let word = format!("0x{:0>64}", "2a");
        assert_eq!(BaseUnits::from_hex(&word).unwrap(), BaseUnits(42));
        let too_big = format!("0x1{}", "0".repeat(32));
        assert!(matches!(BaseUnits::from_hex(&too_big), Err(AmountError::Overflow)));
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!("gas".parse::<Unit>().unwrap(), Unit::Currency);
        assert_eq!("Token".parse::<Unit>().unwrap(), Unit::Token);
        assert!("btc".parse::<Unit>().is_err());
    }

    #[test]
    fn test_saturating_sub() {
        assert_eq!(BaseUnits(5).saturating_sub(BaseUnits(7)), BaseUnits::ZERO);
        assert_eq!(BaseUnits(7).saturating_sub(BaseUnits(5)), BaseUnits(2));
    }
}
