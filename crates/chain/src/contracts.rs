//! Typed reads against the token, pool, vault and lending contracts.

use alloy::primitives::U256;
use tracing::warn;

use crate::abi;
use crate::address::TronAddress;
use crate::ledger::{ContractReader, QueryError};

/// Decimals assumed when a token does not answer `decimals()`.
pub const FALLBACK_DECIMALS: u8 = 18;

/// Function selectors used by the monitors.
pub mod selectors {
    pub const BALANCE_OF: &str = "balanceOf(address)";
    pub const DECIMALS: &str = "decimals()";
    pub const SYMBOL: &str = "symbol()";
    pub const COINS: &str = "coins(uint256)";
    pub const BALANCES: &str = "balances(uint256)";
    pub const AMPLIFICATION: &str = "A()";
    pub const USDD_BALANCE: &str = "getUsddBalance()";
    pub const CASH: &str = "getCash()";
}

/// Token balance of `holder`, normalized by `decimals`.
pub async fn balance_of<R: ContractReader + ?Sized>(
    reader: &R,
    token: &TronAddress,
    holder: &TronAddress,
    decimals: u8,
) -> Result<U256, QueryError> {
    reader
        .query_uint(token, selectors::BALANCE_OF, &abi::pad_address(holder), decimals)
        .await
}

/// Token decimals; falls back to [`FALLBACK_DECIMALS`] when the call fails.
pub async fn decimals<R: ContractReader + ?Sized>(reader: &R, token: &TronAddress) -> u8 {
    match reader.query_uint(token, selectors::DECIMALS, "", 0).await {
        Ok(value) if value <= U256::from(u8::MAX) => value.to::<u8>(),
        Ok(value) => {
            warn!(token = %token, %value, "decimals out of range, using fallback");
            FALLBACK_DECIMALS
        }
        Err(e) => {
            warn!(token = %token, error = %e, "decimals query failed, using fallback");
            FALLBACK_DECIMALS
        }
    }
}

/// Token symbol.
pub async fn symbol<R: ContractReader + ?Sized>(
    reader: &R,
    token: &TronAddress,
) -> Result<String, QueryError> {
    let raw = reader.trigger_constant(token, selectors::SYMBOL, "").await?;
    abi::decode_string(&raw)
}

/// Address of coin `index` in a stable-swap pool.
pub async fn pool_coin<R: ContractReader + ?Sized>(
    reader: &R,
    pool: &TronAddress,
    index: u64,
) -> Result<TronAddress, QueryError> {
    let raw = reader
        .trigger_constant(pool, selectors::COINS, &abi::pad_uint256(index))
        .await?;
    abi::decode_address_word(&raw)
}

/// Pool reserve of coin `index`, normalized by the coin's `decimals`.
pub async fn pool_balance<R: ContractReader + ?Sized>(
    reader: &R,
    pool: &TronAddress,
    index: u64,
    decimals: u8,
) -> Result<U256, QueryError> {
    reader
        .query_uint(pool, selectors::BALANCES, &abi::pad_uint256(index), decimals)
        .await
}

/// Pool amplification coefficient.
pub async fn pool_amplification<R: ContractReader + ?Sized>(
    reader: &R,
    pool: &TronAddress,
) -> Result<U256, QueryError> {
    reader.query_uint(pool, selectors::AMPLIFICATION, "", 0).await
}

/// USDD held by the peg module vault.
pub async fn vault_usdd_balance<R: ContractReader + ?Sized>(
    reader: &R,
    vault: &TronAddress,
    decimals: u8,
) -> Result<U256, QueryError> {
    reader
        .query_uint(vault, selectors::USDD_BALANCE, "", decimals)
        .await
}

/// Underlying cash held by a lending market.
pub async fn market_cash<R: ContractReader + ?Sized>(
    reader: &R,
    market: &TronAddress,
    decimals: u8,
) -> Result<U256, QueryError> {
    reader.query_uint(market, selectors::CASH, "", decimals).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    const POOL: &str = "TNTfaTpkdd4AQDeqr8SGG7tgdkdjdhbP5c";
    const USDT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

    /// Answers by selector; unknown selectors fail like a reverted call.
    struct Canned(HashMap<&'static str, String>);

    #[async_trait]
    impl ContractReader for Canned {
        async fn trigger_constant(
            &self,
            contract: &TronAddress,
            selector: &str,
            _parameter: &str,
        ) -> Result<String, QueryError> {
            self.0
                .get(selector)
                .cloned()
                .ok_or_else(|| QueryError::QueryFailed {
                    contract: contract.to_base58(),
                    selector: selector.to_string(),
                    message: None,
                })
        }
    }

    fn canned(entries: &[(&'static str, String)]) -> Canned {
        Canned(entries.iter().cloned().collect())
    }

    #[tokio::test]
    async fn test_decimals_fallback() {
        let token = TronAddress::parse(USDT).unwrap();
        let reader = canned(&[(selectors::DECIMALS, abi::pad_uint256(6))]);
        assert_eq!(decimals(&reader, &token).await, 6);

        let reader = canned(&[]);
        assert_eq!(decimals(&reader, &token).await, FALLBACK_DECIMALS);
    }

    #[tokio::test]
    async fn test_pool_reads() {
        let pool = TronAddress::parse(POOL).unwrap();
        let usdt = TronAddress::parse(USDT).unwrap();
        let reader = canned(&[
            (selectors::COINS, usdt.to_abi_word()),
            (selectors::BALANCES, format!("{:064x}", 5_000_000_000u64)),
            (selectors::AMPLIFICATION, abi::pad_uint256(1000)),
            (
                selectors::SYMBOL,
                format!("{:064x}{:064x}{:0<64}", 32, 4, hex::encode("USDT")),
            ),
        ]);

        assert_eq!(pool_coin(&reader, &pool, 1).await.unwrap(), usdt);
        assert_eq!(
            pool_balance(&reader, &pool, 1, 6).await.unwrap(),
            U256::from(5_000u64)
        );
        assert_eq!(
            pool_amplification(&reader, &pool).await.unwrap(),
            U256::from(1000u64)
        );
        assert_eq!(symbol(&reader, &usdt).await.unwrap(), "USDT");
    }
}
