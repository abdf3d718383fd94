//! ABI word encoding and decoding for constant contract calls.

use alloy::primitives::U256;

use crate::address::TronAddress;
use crate::ledger::QueryError;

/// Unsigned integer as a 32-byte word, lowercase hex without `0x`.
pub fn pad_uint256(value: u64) -> String {
    format!("{:064x}", value)
}

/// Address as a 32-byte word.
pub fn pad_address(addr: &TronAddress) -> String {
    addr.to_abi_word()
}

/// Decode a hex return value into an unsigned integer (big-endian).
///
/// Odd-length input is left-padded with a single zero nibble. An empty
/// string decodes to zero.
pub fn decode_uint(hex_str: &str) -> Result<U256, QueryError> {
    let raw = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    if raw.is_empty() {
        return Ok(U256::ZERO);
    }
    let bytes = if raw.len() % 2 == 1 {
        hex::decode(format!("0{raw}"))
    } else {
        hex::decode(raw)
    }
    .map_err(|e| QueryError::Decode(format!("bad hex '{hex_str}': {e}")))?;

    // Return data may carry several words; a scalar lives in the first one.
    let word = if bytes.len() > 32 { &bytes[..32] } else { &bytes[..] };
    U256::try_from_be_slice(word)
        .ok_or_else(|| QueryError::Decode(format!("integer overflow in '{hex_str}'")))
}

/// Decode an address returned as a 32-byte word.
pub fn decode_address_word(hex_str: &str) -> Result<TronAddress, QueryError> {
    let raw = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let word = raw
        .get(..64)
        .ok_or_else(|| QueryError::Decode(format!("short address word '{hex_str}'")))?;
    Ok(TronAddress::from_hex(word)?)
}

/// Decode a dynamic `string` return value (offset, length, data).
pub fn decode_string(hex_str: &str) -> Result<String, QueryError> {
    let raw = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let bytes = hex::decode(raw).map_err(|e| QueryError::Decode(format!("bad hex: {e}")))?;
    if bytes.len() < 64 {
        return Err(QueryError::Decode("string return shorter than two words".into()));
    }

    let offset = word_to_usize(&bytes[..32])?;
    let len_end = offset
        .checked_add(32)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| QueryError::Decode("string offset out of range".into()))?;
    let len = word_to_usize(&bytes[offset..len_end])?;
    let data_end = len_end
        .checked_add(len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| QueryError::Decode("string length out of range".into()))?;

    String::from_utf8(bytes[len_end..data_end].to_vec())
        .map_err(|e| QueryError::Decode(format!("string is not utf-8: {e}")))
}

fn word_to_usize(word: &[u8]) -> Result<usize, QueryError> {
    let value = U256::try_from_be_slice(word)
        .ok_or_else(|| QueryError::Decode("word overflow".into()))?;
    if value > U256::from(u32::MAX) {
        return Err(QueryError::Decode("word does not fit usize".into()));
    }
    Ok(value.to::<u64>() as usize)
}
