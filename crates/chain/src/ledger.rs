//! Typed facade over the ledger HTTP API.
//!
//! Three endpoints are used:
//! - `wallet/triggerconstantcontract` for read-only contract calls
//! - `jsonrpc` for `eth_blockNumber`
//! - `v1/blocks/{height}/events` for the paginated block event feed

use std::sync::Arc;

use alloy::primitives::U256;
use async_trait::async_trait;
use peg_monitor_api::{RequestClient, RequestError};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::abi;
use crate::address::{AddressError, TronAddress};
use crate::events::{Event, EventPage};
use crate::units;

/// Default ledger API base.
pub const DEFAULT_ENDPOINT: &str = "https://api.trongrid.io";

/// Account used as caller for constant calls (never signs anything).
pub const DEFAULT_OWNER: &str = "T9yD14Nj9j7xAB4dbGeiX9h8unkKHxuWwb";

/// Events requested per page.
const PAGE_LIMIT: u32 = 100;

/// Hard stop on pagination loops.
const MAX_PAGES: usize = 1_000;

/// Chain query failures.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The HTTP call failed after retries.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// The response could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),

    /// The contract call executed but reported failure.
    #[error("query {selector} on {contract} failed: {}", .message.as_deref().unwrap_or("execution failed"))]
    QueryFailed {
        contract: String,
        selector: String,
        message: Option<String>,
    },

    /// The contract call succeeded without return data.
    #[error("query {selector} on {contract} returned no data")]
    NoReturnData { contract: String, selector: String },

    /// An address argument or return word is malformed.
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),
}

impl From<serde_json::Error> for QueryError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Read-only contract calls.
#[async_trait]
pub trait ContractReader: Send + Sync {
    /// Execute `selector(parameter)` on `contract` and return the first
    /// result word(s) as hex.
    async fn trigger_constant(
        &self,
        contract: &TronAddress,
        selector: &str,
        parameter: &str,
    ) -> Result<String, QueryError>;

    /// Execute a call returning an unsigned integer, scaled down by `10^decimals`.
    async fn query_uint(
        &self,
        contract: &TronAddress,
        selector: &str,
        parameter: &str,
        decimals: u8,
    ) -> Result<U256, QueryError> {
        let raw = self.trigger_constant(contract, selector, parameter).await?;
        Ok(units::normalize(abi::decode_uint(&raw)?, decimals))
    }
}

/// Block height and per-block event access.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Latest block height.
    async fn block_number(&self) -> Result<u64, QueryError>;

    /// Every event of block `height`, ordered as served.
    async fn block_events(&self, height: u64) -> Result<Vec<Event>, QueryError>;
}

#[derive(Debug, Serialize)]
struct TriggerRequest<'a> {
    owner_address: String,
    contract_address: String,
    function_selector: &'a str,
    parameter: &'a str,
    visible: bool,
}

#[derive(Debug, Default, Deserialize)]
struct TriggerResponse {
    #[serde(default)]
    constant_result: Vec<String>,
    #[serde(default)]
    result: TriggerResult,
}

#[derive(Debug, Default, Deserialize)]
struct TriggerResult {
    #[serde(default)]
    result: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Ledger API client.
#[derive(Debug, Clone)]
pub struct LedgerClient {
    client: Arc<RequestClient>,
    endpoint: String,
    owner: TronAddress,
}

impl LedgerClient {
    pub fn new(client: Arc<RequestClient>, endpoint: impl Into<String>, owner: TronAddress) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            owner,
        }
    }

    /// API base URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn events_url(&self, height: u64) -> String {
        format!(
            "{}/v1/blocks/{}/events?limit={}",
            self.endpoint, height, PAGE_LIMIT
        )
    }

    async fn call_json_rpc(&self, method: &str) -> Result<Vec<u8>, QueryError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params: Vec::new(),
        };
        let data = self
            .client
            .post_json(&format!("{}/jsonrpc", self.endpoint), &request)
            .await?;
        let response: JsonRpcResponse = serde_json::from_slice(&data)?;
        if let Some(error) = response.error {
            return Err(QueryError::Decode(format!("{method} returned error {error}")));
        }
        let result = response
            .result
            .ok_or_else(|| QueryError::Decode(format!("{method} returned no result")))?;
        decode_rpc_hex(&result)
    }
}

/// Decode a JSON-RPC quantity; odd-length hex gets one leading zero nibble.
pub fn decode_rpc_hex(result: &str) -> Result<Vec<u8>, QueryError> {
    let raw = result.strip_prefix("0x").unwrap_or(result);
    let padded = if raw.len() % 2 == 1 {
        format!("0{raw}")
    } else {
        raw.to_string()
    };
    hex::decode(&padded).map_err(|e| QueryError::Decode(format!("bad hex '{result}': {e}")))
}

#[async_trait]
impl ContractReader for LedgerClient {
    #[instrument(skip(self), fields(contract = %contract))]
    async fn trigger_constant(
        &self,
        contract: &TronAddress,
        selector: &str,
        parameter: &str,
    ) -> Result<String, QueryError> {
        let request = TriggerRequest {
            owner_address: self.owner.to_base58(),
            contract_address: contract.to_base58(),
            function_selector: selector,
            parameter,
            visible: true,
        };
        let data = self
            .client
            .post_json(
                &format!("{}/wallet/triggerconstantcontract", self.endpoint),
                &request,
            )
            .await?;
        let response: TriggerResponse = serde_json::from_slice(&data)?;

        if !response.result.result {
            let message = response.result.message.map(|m| {
                hex::decode(&m)
                    .ok()
                    .and_then(|b| String::from_utf8(b).ok())
                    .unwrap_or(m)
            });
            return Err(QueryError::QueryFailed {
                contract: contract.to_base58(),
                selector: selector.to_string(),
                message,
            });
        }

        response
            .constant_result
            .into_iter()
            .next()
            .ok_or_else(|| QueryError::NoReturnData {
                contract: contract.to_base58(),
                selector: selector.to_string(),
            })
    }
}

#[async_trait]
impl BlockSource for LedgerClient {
    async fn block_number(&self) -> Result<u64, QueryError> {
        let bytes = self.call_json_rpc("eth_blockNumber").await?;
        let height = U256::try_from_be_slice(&bytes)
            .filter(|h| *h <= U256::from(u64::MAX))
            .ok_or_else(|| QueryError::Decode("block number out of range".into()))?;
        Ok(height.to::<u64>())
    }

    #[instrument(skip(self))]
    async fn block_events(&self, height: u64) -> Result<Vec<Event>, QueryError> {
        let mut events = Vec::new();
        let mut next = Some(self.events_url(height));
        let mut pages = 0;

        while let Some(url) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                return Err(QueryError::Decode(format!(
                    "event feed for block {height} exceeded {MAX_PAGES} pages"
                )));
            }
            let data = self.client.get(&url).await?;
            let page: EventPage = serde_json::from_slice(&data)?;
            next = page.next().map(str::to_string);
            events.extend(page.data);
        }

        debug!(height, pages, count = events.len(), "Fetched block events");
        Ok(events)
    }
}
