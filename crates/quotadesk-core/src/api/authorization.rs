//! Shared `Authorization` default applied to every outbound request.
//!
//! One `Authorization` lives inside each `ApiClient`; clones of the client
//! share it, so setting or clearing the credential is visible to every
//! request issued afterwards regardless of which clone sends it.

use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

#[derive(Debug, Clone, Default)]
pub struct Authorization {
    value: Arc<RwLock<Option<HeaderValue>>>,
}

impl Authorization {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `Bearer <token>` as the default. Setting the same token twice
    /// is harmless. On error the previous value is kept.
    pub fn set(&self, token: &str) -> Result<()> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
            .context("Token is not a valid header value")?;
        value.set_sensitive(true);
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = Some(value);
        Ok(())
    }

    /// Remove the default. Clearing when nothing is set is a no-op.
    pub fn clear(&self) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// The full header value currently applied, e.g. `Bearer abc`.
    pub fn current(&self) -> Option<String> {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn is_set(&self) -> bool {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Headers to attach to an outgoing request.
    pub(crate) fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(ref value) = *self.value.read().unwrap_or_else(PoisonError::into_inner) {
            headers.insert(AUTHORIZATION, value.clone());
        }
        headers
    }
}
