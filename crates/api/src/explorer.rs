//! Block explorer client used to attribute transactions in alerts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use tracing::debug;

use crate::client::{RequestClient, RequestError};

/// Default explorer API base.
pub const DEFAULT_EXPLORER: &str = "https://apilist.tronscan.org";

/// Transaction lookup failures.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("malformed transaction info: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("transaction {0} has no owner address")]
    MissingOwner(String),
}

/// Subset of the explorer's transaction-info document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionInfo {
    /// Account that signed the transaction
    #[serde(rename = "ownerAddress", default)]
    pub owner_address: String,
    /// Decoded contract call, when the transaction triggered a contract
    #[serde(default)]
    pub trigger_info: Option<TriggerInfo>,
}

/// Decoded call parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerInfo {
    #[serde(default)]
    pub parameter: HashMap<String, serde_json::Value>,
}

impl TransactionInfo {
    /// Call parameter rendered as a plain string (numbers and strings alike).
    pub fn parameter(&self, name: &str) -> Option<String> {
        let value = self.trigger_info.as_ref()?.parameter.get(name)?;
        match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Resolves transaction metadata by hash.
#[async_trait]
pub trait TransactionLookup: Send + Sync {
    /// Fetch the transaction info document.
    async fn transaction(&self, tx_hash: &str) -> Result<TransactionInfo, LookupError>;

    /// Originating account of `tx_hash`.
    async fn sender(&self, tx_hash: &str) -> Result<String, LookupError> {
        let info = self.transaction(tx_hash).await?;
        if info.owner_address.is_empty() {
            return Err(LookupError::MissingOwner(tx_hash.to_string()));
        }
        Ok(info.owner_address)
    }
}

#[derive(Clone)]
struct CachedInfo {
    info: TransactionInfo,
    cached_at: Instant,
}

/// Explorer client with a short-lived cache.
///
/// One transaction often emits several monitored events, so lookups for the
/// same hash within the TTL are served from memory.
#[derive(Clone)]
pub struct ExplorerClient {
    client: Arc<RequestClient>,
    base_url: String,
    cache: Arc<DashMap<String, CachedInfo>>,
    cache_ttl: Duration,
}

impl std::fmt::Debug for ExplorerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExplorerClient")
            .field("base_url", &self.base_url)
            .field("cache_size", &self.cache.len())
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}

impl ExplorerClient {
    pub fn new(client: Arc<RequestClient>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache: Arc::new(DashMap::new()),
            cache_ttl: Duration::from_secs(60),
        }
    }

    /// Override the cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Drop expired entries.
    pub fn cleanup_cache(&self) {
        self.cache.retain(|_, cached| cached.cached_at.elapsed() < self.cache_ttl);
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl TransactionLookup for ExplorerClient {
    async fn transaction(&self, tx_hash: &str) -> Result<TransactionInfo, LookupError> {
        if let Some(cached) = self.cache.get(tx_hash) {
            if cached.cached_at.elapsed() < self.cache_ttl {
                debug!(tx = tx_hash, "Cache hit for transaction info");
                return Ok(cached.info.clone());
            }
        }

        let url = format!("{}/api/transaction-info?hash={}", self.base_url, tx_hash);
        let data = self.client.get(&url).await?;
        let info: TransactionInfo = serde_json::from_slice(&data)?;

        self.cleanup_cache();
        self.cache.insert(
            tx_hash.to_string(),
            CachedInfo {
                info: info.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(info)
    }
}
