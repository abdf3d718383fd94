//! Slack message fragments.

use alloy::primitives::{I256, U256};
use peg_monitor_chain::{display_address, units};

/// Mention that pages the whole channel.
pub const CHANNEL: &str = "<!channel>";

/// Prefix for alerts where USDT leaves a pool.
pub const BANG: &str = ":bangbang:";

/// Emoji for a token symbol; unknown symbols render as themselves.
pub fn token_logo(symbol: &str) -> String {
    match symbol.to_ascii_lowercase().as_str() {
        "usdt" => ":usdtlogo:".to_string(),
        "usdc" => ":usdclogo:".to_string(),
        "tusd" => ":tusdlogo:".to_string(),
        "usdj" => ":usdjlogo:".to_string(),
        "usdd" => ":usdd:".to_string(),
        _ => symbol.to_string(),
    }
}

/// `logo - `1,234``
pub fn amount(symbol: &str, value: U256) -> String {
    format!("{} - `{}`", token_logo(symbol), units::readable(value))
}

/// Like [`amount`] for a delta, with a direction marker.
pub fn change(symbol: &str, value: I256) -> String {
    let arrow = if value.is_positive() {
        ":arrow_heading_up:"
    } else if value.is_negative() {
        ":arrow_heading_down:"
    } else {
        ":repeat:"
    };
    format!("{} {}", amount(symbol, value.unsigned_abs()), arrow)
}

/// Counterparty account, base58.
pub fn user(address: &str) -> String {
    format!(":clown_face: - `{}`", display_address(address))
}

/// Explorer link for a transaction.
pub fn tx_url(tx_hash: &str) -> String {
    format!(":clippy:<https://tronscan.io/#/transaction/{tx_hash}|TxHash>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_and_change() {
        assert_eq!(amount("USDT", U256::from(1_234_567u64)), ":usdtlogo: - `1,234,567`");
        assert_eq!(
            change("usdd", I256::try_from(-5_000i64).unwrap()),
            ":usdd: - `5,000` :arrow_heading_down:"
        );
        assert_eq!(
            change("USDC", I256::try_from(12i64).unwrap()),
            ":usdclogo: - `12` :arrow_heading_up:"
        );
        assert_eq!(change("TUSD", I256::ZERO), ":tusdlogo: - `0` :repeat:");
        assert_eq!(amount("BTT", U256::from(1u64)), "BTT - `1`");
    }

    #[test]
    fn test_user_and_tx() {
        assert_eq!(
            user("41a614f803b6fd780986a42c78ec9c7f77e6ded13c"),
            ":clown_face: - `TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t`"
        );
        assert_eq!(
            tx_url("ab12"),
            ":clippy:<https://tronscan.io/#/transaction/ab12|TxHash>"
        );
    }
}
