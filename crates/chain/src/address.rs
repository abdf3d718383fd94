//! Tron account addresses.
//!
//! A Tron address is a 20-byte account prefixed with version byte `0x41` and
//! rendered as base58check (`T...`). Contract calls take the bare 20 bytes
//! left-padded to a 32-byte ABI word.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Version byte of mainnet Tron addresses.
pub const ADDRESS_PREFIX: u8 = 0x41;

/// Address parsing failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("invalid base58check address '{0}'")]
    Base58(String),

    #[error("invalid hex address '{0}'")]
    Hex(String),

    #[error("address '{0}' has wrong length or prefix")]
    Layout(String),
}

/// A Tron account or contract address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TronAddress(Address);

impl TronAddress {
    /// Wrap a raw 20-byte account.
    pub const fn new(account: Address) -> Self {
        Self(account)
    }

    /// The bare 20-byte account.
    pub fn account(&self) -> Address {
        self.0
    }

    /// Parse either base58check (`T...`) or hex (`41...`, `0x...`) text.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let s = s.trim();
        if s.starts_with('T') {
            return Self::from_base58(s);
        }
        Self::from_hex(s)
    }

    /// Parse a base58check address.
    pub fn from_base58(s: &str) -> Result<Self, AddressError> {
        let bytes = bs58::decode(s)
            .with_check(Some(ADDRESS_PREFIX))
            .into_vec()
            .map_err(|_| AddressError::Base58(s.to_string()))?;
        match bytes.as_slice() {
            [ADDRESS_PREFIX, account @ ..] if account.len() == 20 => {
                Ok(Self(Address::from_slice(account)))
            }
            _ => Err(AddressError::Layout(s.to_string())),
        }
    }

    /// Parse a hex address: 20 bytes, 21 bytes with the `0x41` prefix, or a
    /// 32-byte ABI word whose low 20 bytes hold the account.
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|_| AddressError::Hex(s.to_string()))?;
        match bytes.len() {
            20 => Ok(Self(Address::from_slice(&bytes))),
            21 if bytes[0] == ADDRESS_PREFIX => Ok(Self(Address::from_slice(&bytes[1..]))),
            32 => Ok(Self(Address::from_slice(&bytes[12..]))),
            _ => Err(AddressError::Layout(s.to_string())),
        }
    }

    /// Base58check rendering (`T...`).
    pub fn to_base58(&self) -> String {
        let mut bytes = Vec::with_capacity(21);
        bytes.push(ADDRESS_PREFIX);
        bytes.extend_from_slice(self.0.as_slice());
        bs58::encode(bytes).with_check().into_string()
    }

    /// Account left-padded to a 32-byte ABI word, lowercase hex without `0x`.
    pub fn to_abi_word(&self) -> String {
        format!("{:0>64}", hex::encode(self.0.as_slice()))
    }
}

impl fmt::Display for TronAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl FromStr for TronAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for TronAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for TronAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Render a possibly-hex address as base58 for display; unknown text passes through.
pub fn display_address(s: &str) -> String {
    if s.starts_with('T') {
        return s.to_string();
    }
    TronAddress::from_hex(s)
        .map(|a| a.to_base58())
        .unwrap_or_else(|_| s.to_string())
}
