//! Ledger address
//!
//! Opaque account identifier. Stored lowercase so that two spellings of the
//! same account (checksummed vs. lowercase) compare equal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const ADDRESS_HEX_LEN: usize = 40;

/// A validated `0x`-prefixed, 20-byte hex address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("Address must start with 0x: {0}")]
    MissingPrefix(String),

    #[error("Address must be {ADDRESS_HEX_LEN} hex characters after 0x (got {0})")]
    InvalidLength(usize),

    #[error("Address contains non-hex characters: {0}")]
    InvalidHex(String),
}

impl Address {
    pub fn parse(value: &str) -> Result<Self, AddressError> {
        let value = value.trim();
        let hex_part = value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
            .ok_or_else(|| AddressError::MissingPrefix(value.to_string()))?;

        if hex_part.len() != ADDRESS_HEX_LEN {
            return Err(AddressError::InvalidLength(hex_part.len()));
        }
        hex::decode(hex_part).map_err(|_| AddressError::InvalidHex(value.to_string()))?;

        Ok(Self(format!("0x{}", hex_part.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 40 hex characters without the prefix.
    pub fn hex_digits(&self) -> &str {
        &self.0[2..]
    }

    /// Left-pad to a 32-byte ABI word / log topic.
    pub fn to_topic(&self) -> String {
        format!("0x{:0>64}", self.hex_digits())
    }

    /// Recover an address from a 32-byte log topic.
    pub fn from_topic(topic: &str) -> Result<Self, AddressError> {
        let digits = topic.trim_start_matches("0x");
        if digits.len() < ADDRESS_HEX_LEN {
            return Err(AddressError::InvalidLength(digits.len()));
        }
        Address::parse(&format!("0x{}", &digits[digits.len() - ADDRESS_HEX_LEN..]))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Address::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}
