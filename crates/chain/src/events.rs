//! Contract events as served by the block event feed.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};

use crate::address::TronAddress;

/// A decoded contract event.
///
/// Events are ordered by `log_index` within a block and by `block_number`
/// across blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub block_number: u64,
    #[serde(default)]
    pub block_timestamp: i64,
    /// Emitting contract, base58
    #[serde(default)]
    pub contract_address: String,
    #[serde(rename = "event_index", default)]
    pub log_index: u64,
    #[serde(default)]
    pub event_name: String,
    #[serde(rename = "transaction_id", default)]
    pub transaction_hash: String,
    /// Decoded event fields by name
    #[serde(rename = "result", default, deserialize_with = "string_map")]
    pub fields: HashMap<String, String>,
}

impl Event {
    /// Emitting contract, if the address is well formed.
    pub fn contract(&self) -> Option<TronAddress> {
        TronAddress::parse(&self.contract_address).ok()
    }

    /// Field value by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Key identifying this event across re-deliveries.
    pub fn key(&self) -> (String, u64) {
        (self.transaction_hash.clone(), self.log_index)
    }
}

/// One page of the block event feed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPage {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Vec<Event>,
    #[serde(default)]
    pub meta: PageMeta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageMeta {
    #[serde(default)]
    pub at: u64,
    #[serde(default)]
    pub links: PageLinks,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageLinks {
    /// URL of the next page; empty or absent on the last page
    #[serde(default)]
    pub next: Option<String>,
}

impl EventPage {
    /// Next page URL, if any.
    pub fn next(&self) -> Option<&str> {
        self.meta
            .links
            .next
            .as_deref()
            .filter(|next| !next.is_empty())
    }
}

fn string_map<'de, D: Deserializer<'de>>(deserializer: D) -> Result<HashMap<String, String>, D::Error> {
    let raw: Option<HashMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, v)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"{
        "success": true,
        "data": [{
            "block_number": 100,
            "block_timestamp": 1700000000000,
            "contract_address": "TM9gWuCdFGNMiT1qTq1bgw4tNhJbsESfjA",
            "event_index": 2,
            "event_name": "BuyGem",
            "event": "BuyGem(address owner, uint256 value, uint256 fee)",
            "transaction_id": "ab12",
            "result": {"owner": "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf", "value": "5000000000", "fee": 0}
        }],
        "meta": {"at": 1700000000001, "links": {"next": "https://api.trongrid.io/v1/blocks/100/events?fingerprint=x"}}
    }"#;

    #[test]
    fn test_page_decoding() {
        let page: EventPage = serde_json::from_str(PAGE).unwrap();
        assert_eq!(page.data.len(), 1);
        let event = &page.data[0];
        assert_eq!(event.block_number, 100);
        assert_eq!(event.log_index, 2);
        assert_eq!(event.event_name, "BuyGem");
        assert_eq!(event.field("value"), Some("5000000000"));
        assert_eq!(event.field("fee"), Some("0"));
        assert!(event.contract().is_some());
        assert_eq!(event.key(), ("ab12".to_string(), 2));
        assert!(page.next().unwrap().contains("fingerprint"));
    }

    #[test]
    fn test_last_page_has_no_next() {
        let page: EventPage =
            serde_json::from_str(r#"{"success":true,"data":[],"meta":{"at":1,"links":{}}}"#).unwrap();
        assert!(page.next().is_none());

        let page: EventPage =
            serde_json::from_str(r#"{"data":[],"meta":{"links":{"next":""}}}"#).unwrap();
        assert!(page.next().is_none());
    }
}
