//! Core library for quotadesk.
//!
//! Client-side session management for a quota-metered HTTP service:
//!
//! - `api`: the HTTP client and the shared `Authorization` default
//! - `auth`: the session state machine and its durable stores
//! - `quota`: background polling of the remaining quota balance
//! - `config`: user configuration and on-disk locations
//!
//! A typical start-up rehydrates the session before any request is sent:
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use quotadesk_core::{ApiClient, Config, QuotaPoller, SessionManager};
//!
//! let config = Config::load()?;
//! let api = ApiClient::new(&config.api_base_url)?;
//! let session = SessionManager::new(api.clone(), config.session_store()?);
//! session.rehydrate();
//!
//! let poller = QuotaPoller::new(Arc::new(api), session.subscribe()).start();
//! println!("{:?}", poller.balance());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod quota;

pub use api::{ApiClient, ApiError, Authorization};
pub use auth::{
    FileSessionStore, KeychainSessionStore, PersistedSession, SessionManager, SessionState,
    SessionStore,
};
pub use config::{Config, CredentialBackend};
pub use models::User;
pub use quota::{PollerHandle, QuotaPoller, QuotaSource};
