//! Quota balance polling.
//!
//! The poller is a session consumer: it only reads the session state and
//! keeps a best-effort view of the remaining quota while the session is
//! authenticated.

pub mod poller;

use anyhow::Result;
use async_trait::async_trait;

pub use poller::{PollerHandle, QuotaPoller, DEFAULT_POLL_INTERVAL};

/// Something that can report the current quota balance.
#[async_trait]
pub trait QuotaSource: Send + Sync + 'static {
    async fn fetch_balance(&self) -> Result<u64>;
}
