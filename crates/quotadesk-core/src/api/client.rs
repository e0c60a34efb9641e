//! API client for the quota service REST API.
//!
//! `ApiClient` wraps one `reqwest::Client` and one shared `Authorization`
//! default. Every request it sends carries whatever bearer credential the
//! session last installed.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::models::{QuotaBalance, QuotaCheck, TransactionPage, User};
use crate::quota::QuotaSource;

use super::{ApiError, Authorization};

// ============================================================================
// Constants
// ============================================================================

/// Default backend location for local development.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Server-side cap on transaction page size.
const MAX_TRANSACTIONS_PER_PAGE: u32 = 100;

// ============================================================================
// Wire types
// ============================================================================

/// Successful credential exchange (login or register).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
struct CurrentUserResponse {
    user: User,
}

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct PasswordChange<'a> {
    old_password: &'a str,
    new_password: &'a str,
}

#[derive(Debug, Serialize)]
struct QuotaCheckRequest<'a> {
    action: &'a str,
    count: u32,
}

/// The backend wraps payloads as `{"success", "data", "message"}`; bare
/// payloads are accepted too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(data) => data,
        }
    }
}

/// API client for the quota service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling,
/// and clones share the same `Authorization` default.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    authorization: Authorization,
}

impl ApiClient {
    /// Create a new API client against `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization: Authorization::new(),
        })
    }

    /// The shared authorization default applied to every request.
    pub fn authorization(&self) -> &Authorization {
        &self.authorization
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .headers(self.authorization.headers())
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, path: &str) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(ApiError::from)
            .with_context(|| format!("Failed to send request to {}", path))?;

        let response = Self::check_response(response).await?;

        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", path))?;
        let envelope: Envelope<T> = serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
            .with_context(|| format!("Failed to parse JSON response from {}", path))?;
        Ok(envelope.into_inner())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!(path, "GET");
        self.send(self.request(Method::GET, path), path).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        debug!(path, "POST");
        self.send(self.request(Method::POST, path).json(body), path)
            .await
    }

    // ===== Authentication =====

    /// Exchange email and password for a bearer token.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let body = Credentials {
            email,
            password,
            username: None,
        };
        self.post("/api/auth/login", &body).await
    }

    /// Create an account; the server answers like `login`.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        username: Option<&str>,
    ) -> Result<AuthResponse> {
        let body = Credentials {
            email,
            password,
            username,
        };
        self.post("/api/auth/register", &body).await
    }

    /// Fetch the identity the current bearer token belongs to.
    pub async fn current_user(&self) -> Result<User> {
        let response: CurrentUserResponse = self.get("/api/auth/me").await?;
        Ok(response.user)
    }

    pub async fn change_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        let body = PasswordChange {
            old_password,
            new_password,
        };
        let _: serde_json::Value = self.post("/api/auth/change-password", &body).await?;
        Ok(())
    }

    // ===== Quota =====

    pub async fn quota_balance(&self) -> Result<u64> {
        let response: QuotaBalance = self.get("/api/quota/balance").await?;
        Ok(response.balance)
    }

    pub async fn quota_transactions(&self, page: u32, per_page: u32) -> Result<TransactionPage> {
        let per_page = per_page.clamp(1, MAX_TRANSACTIONS_PER_PAGE);
        let path = format!(
            "/api/quota/transactions?page={}&per_page={}",
            page.max(1),
            per_page
        );
        self.get(&path).await
    }

    pub async fn check_quota(&self, action: &str, count: u32) -> Result<QuotaCheck> {
        let body = QuotaCheckRequest { action, count };
        self.post("/api/quota/check", &body).await
    }
}

#[async_trait]
impl QuotaSource for ApiClient {
    async fn fetch_balance(&self) -> Result<u64> {
        self.quota_balance().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let api = ApiClient::new("http://example.test/").unwrap();
        assert_eq!(api.base_url(), "http://example.test");
        assert_eq!(api.url("/api/auth/me"), "http://example.test/api/auth/me");
    }

    #[test]
    fn test_envelope_wrapped_and_bare() {
        let wrapped = r#"{"success": true, "data": {"balance": 4}, "message": "ok"}"#;
        let parsed: Envelope<QuotaBalance> = serde_json::from_str(wrapped).unwrap();
        assert_eq!(parsed.into_inner().balance, 4);

        let bare = r#"{"balance": 9}"#;
        let parsed: Envelope<QuotaBalance> = serde_json::from_str(bare).unwrap();
        assert_eq!(parsed.into_inner().balance, 9);
    }

    #[test]
    fn test_parse_auth_response() {
        let json = r#"{"data": {"user": {"id": 1, "email": "a@x.com"}, "access_token": "tok", "token_type": "Bearer"}}"#;
        let parsed: Envelope<AuthResponse> = serde_json::from_str(json).unwrap();
        let auth = parsed.into_inner();
        assert_eq!(auth.access_token, "tok");
        assert_eq!(auth.user.email, "a@x.com");
    }

    #[test]
    fn test_credentials_omit_missing_username() {
        let body = Credentials {
            email: "a@x.com",
            password: "pw",
            username: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("username").is_none());
    }

    #[test]
    fn test_clones_share_authorization() {
        let api = ApiClient::new(DEFAULT_BASE_URL).unwrap();
        let clone = api.clone();
        api.authorization().set("t").unwrap();
        assert_eq!(clone.authorization().current().as_deref(), Some("Bearer t"));
    }
}
