//! Authentication module for managing the user session and its storage.
//!
//! This module provides:
//! - `SessionManager`: the session state machine (login, register, logout,
//!   refresh, rehydrate)
//! - `SessionStore`: durable storage for the session projection, backed by
//!   a JSON file (`FileSessionStore`) or the OS keychain
//!   (`KeychainSessionStore`)
//!
//! Tokens have no client-side expiry; a session ends on logout or when the
//! server rejects the token.

pub mod keychain;
pub mod session;
pub mod store;

pub use keychain::{KeychainSessionStore, NATIVE_KEYCHAIN};
pub use session::{SessionManager, SessionState, LOGIN_FAILED, REGISTER_FAILED};
pub use store::{FileSessionStore, PersistedSession, SessionStore, StoreError, STORAGE_KEY};
