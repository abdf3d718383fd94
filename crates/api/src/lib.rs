//! HTTP clients for external services.
//!
//! This crate provides:
//! - A pooled request client with bounded retries for the ledger API
//! - The Slack webhook notification sink
//! - Block explorer transaction lookups for alert attribution

pub mod client;
mod explorer;
mod slack;

pub use client::{ClientConfig, Method, RequestClient, RequestError, Validator};
pub use explorer::{
    ExplorerClient, LookupError, TransactionInfo, TransactionLookup, TriggerInfo, DEFAULT_EXPLORER,
};
pub use slack::{slack_ack, NotifyError, Notifier, SlackNotifier};
