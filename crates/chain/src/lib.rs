//! Ledger access layer.
//!
//! This crate provides:
//! - Tron address parsing and ABI word encoding
//! - The ledger facade: constant contract calls, chain height, block events
//! - Typed reads for tokens, stable-swap pools, the peg vault and lending markets
//! - Token amount arithmetic on U256 / I256

pub mod abi;
mod address;
pub mod contracts;
mod events;
mod ledger;
pub mod units;

pub use address::{display_address, AddressError, TronAddress, ADDRESS_PREFIX};
pub use events::{Event, EventPage, PageLinks, PageMeta};
pub use ledger::{
    decode_rpc_hex, BlockSource, ContractReader, LedgerClient, QueryError, DEFAULT_ENDPOINT,
    DEFAULT_OWNER,
};
