//! Block event tracker.
//!
//! Walks the chain one height at a time and dispatches every event of a
//! height to the handler registered for the emitting contract. The tracked
//! height only moves past `h` once all events of `h` have been fetched and
//! dispatched, so a fetch failure stalls the tracker instead of dropping
//! events. Ticks are serialized by holding the state lock for the whole
//! catch-up loop.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use peg_monitor_chain::{BlockSource, Event, QueryError, TronAddress};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Heights whose event keys are remembered for de-duplication.
const DEDUPE_WINDOW: usize = 64;

/// Receives events emitted by a registered contract.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event);
}

/// Contract address to handler table. Built once at startup.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<TronAddress, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route events of `address` to `handler`, replacing any previous one.
    pub fn register(&mut self, address: TronAddress, handler: Arc<dyn EventHandler>) {
        if self.handlers.insert(address, handler).is_some() {
            warn!(address = %address, "Replaced existing event handler");
        }
    }

    pub fn get(&self, address: &TronAddress) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(address)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("addresses", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Tracker failures. The tracked height is left at the last fully
/// dispatched block.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("failed to fetch chain head: {0}")]
    Head(#[source] QueryError),

    #[error("failed to fetch events of block {height}: {source}")]
    Events {
        height: u64,
        #[source]
        source: QueryError,
    },
}

/// Result of one `advance` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Chain head observed at the start of the tick
    pub head: u64,
    /// Heights fully dispatched in this tick
    pub heights: u64,
    /// Events handed to handlers
    pub dispatched: usize,
}

#[derive(Debug, Default)]
struct TrackerState {
    height: Option<u64>,
    recent: VecDeque<(u64, HashSet<(String, u64)>)>,
}

impl TrackerState {
    fn seen(&self, key: &(String, u64)) -> bool {
        self.recent.iter().any(|(_, keys)| keys.contains(key))
    }

    fn remember(&mut self, height: u64, keys: HashSet<(String, u64)>) {
        self.recent.push_back((height, keys));
        while self.recent.len() > DEDUPE_WINDOW {
            self.recent.pop_front();
        }
    }
}

/// Owns the tracked height and the handler registry.
pub struct BlockTracker {
    source: Arc<dyn BlockSource>,
    registry: HandlerRegistry,
    state: Mutex<TrackerState>,
}

impl BlockTracker {
    pub fn new(source: Arc<dyn BlockSource>, registry: HandlerRegistry) -> Self {
        Self {
            source,
            registry,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Start from `height` as already processed.
    pub fn starting_at(self, height: u64) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                height: Some(height),
                recent: VecDeque::new(),
            }),
            ..self
        }
    }

    /// Highest fully dispatched height.
    pub async fn tracked_height(&self) -> Option<u64> {
        self.state.lock().await.height
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Seed the tracked height to `head - 1` so the first tick only
    /// processes the newest block.
    pub async fn seed(&self) -> Result<u64, TrackerError> {
        let mut state = self.state.lock().await;
        let head = self.source.block_number().await.map_err(TrackerError::Head)?;
        let start = head.saturating_sub(1);
        state.height = Some(start);
        info!(head, tracked = start, handlers = self.registry.len(), "Block tracker seeded");
        Ok(start)
    }

    /// Process every height in `(tracked, head]` in ascending order.
    #[instrument(skip(self))]
    pub async fn advance(&self) -> Result<Progress, TrackerError> {
        let mut state = self.state.lock().await;
        let head = self.source.block_number().await.map_err(TrackerError::Head)?;

        let tracked = match state.height {
            Some(height) => height,
            None => {
                let start = head.saturating_sub(1);
                info!(head, tracked = start, "Block tracker was not seeded, starting at head");
                state.height = Some(start);
                start
            }
        };

        let mut progress = Progress {
            head,
            heights: 0,
            dispatched: 0,
        };

        if head <= tracked {
            debug!(head, tracked, "Block already tracked");
            return Ok(progress);
        }

        for height in tracked + 1..=head {
            let mut events = self
                .source
                .block_events(height)
                .await
                .map_err(|source| TrackerError::Events { height, source })?;
            events.sort_by_key(|event| event.log_index);

            let mut keys = HashSet::with_capacity(events.len());
            for event in &events {
                let key = event.key();
                if state.seen(&key) || !keys.insert(key) {
                    debug!(
                        height,
                        tx = %event.transaction_hash,
                        log_index = event.log_index,
                        "Skipping already dispatched event"
                    );
                    continue;
                }
                let Some(handler) = event.contract().and_then(|c| self.registry.get(&c)) else {
                    continue;
                };
                debug!(
                    height,
                    contract = %event.contract_address,
                    event = %event.event_name,
                    tx = %event.transaction_hash,
                    "Dispatching event"
                );
                handler.handle(event).await;
                progress.dispatched += 1;
            }

            state.remember(height, keys);
            state.height = Some(height);
            progress.heights += 1;
        }

        debug!(
            head,
            heights = progress.heights,
            dispatched = progress.dispatched,
            "Block tracker advanced"
        );
        Ok(progress)
    }

    /// One scheduler tick: advance and log failures.
    pub async fn tick(&self) {
        if let Err(e) = self.advance().await {
            warn!(error = %e, "Block tracker tick failed, will retry next tick");
        }
    }
}
