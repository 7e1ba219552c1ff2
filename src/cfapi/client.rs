//! Cloudflare API client for Access groups
//!
//! Thin reqwest wrapper over `/accounts/{account}/access/groups`, bound to
//! one account and one set of credentials. Every call is single-attempt;
//! retrying a failed pass is the controller's requeue policy, not ours.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Response, StatusCode};
use tracing::debug;

use crate::cfapi::types::{AccessGroup, ApiEnvelope};
use crate::config::CloudflareConfig;
use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

/// The Access group operations the reconciler consumes.
///
/// Split out as a trait so convergence logic can run against an in-memory
/// implementation in tests.
#[async_trait]
pub trait AccessGroupService: Send + Sync {
    /// Full account listing. No pagination: accounts with very large group
    /// counts are out of scope for now.
    async fn list_groups(&self) -> Result<Vec<AccessGroup>>;

    /// Authoritative lookup by id. `Error::GroupNotFound` when the id no
    /// longer exists (e.g. deleted out-of-band).
    async fn get_group(&self, id: &str) -> Result<AccessGroup>;

    /// Create a new group. `Error::GroupConflict` if a same-named group
    /// already exists; callers de-duplicate via the listing first.
    async fn create_group(&self, group: &AccessGroup) -> Result<AccessGroup>;

    /// Update an existing group by its id. `Error::GroupNotFound` if the id
    /// vanished since lookup.
    async fn update_group(&self, group: &AccessGroup) -> Result<AccessGroup>;
}

/// Cloudflare v4 API client scoped to a single account.
#[derive(Clone)]
pub struct CloudflareApi {
    http: reqwest::Client,
    base_url: String,
    account_id: String,
}

impl CloudflareApi {
    /// Build a client from validated credentials.
    ///
    /// Prefers the API token; falls back to the key+email header pair.
    pub fn new(config: &CloudflareConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();

        if !config.api_token.is_empty() {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", config.api_token))
                .map_err(|e| Error::ClientInit(format!("invalid API token: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        } else {
            let mut key = HeaderValue::from_str(&config.api_key)
                .map_err(|e| Error::ClientInit(format!("invalid API key: {e}")))?;
            key.set_sensitive(true);
            headers.insert("X-Auth-Key", key);
            let email = HeaderValue::from_str(&config.api_email)
                .map_err(|e| Error::ClientInit(format!("invalid API email: {e}")))?;
            headers.insert("X-Auth-Email", email);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::ClientInit(e.to_string()))?;

        Ok(CloudflareApi {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            account_id: config.account_id.clone(),
        })
    }

    /// Override the API endpoint; used by tests against a local mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn groups_url(&self) -> String {
        format!("{}/accounts/{}/access/groups", self.base_url, self.account_id)
    }

    /// Decode the v4 envelope, treating non-2xx and `success: false` alike
    /// as upstream failures.
    async fn unwrap_envelope<T: serde::de::DeserializeOwned>(
        response: Response,
        context: &str,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamError(format!(
                "{context}: HTTP {status}: {body}"
            )));
        }

        let envelope: ApiEnvelope<T> = response.json().await?;
        if !envelope.success {
            return Err(Error::UpstreamError(format!(
                "{context}: {}",
                envelope.error_summary()
            )));
        }

        envelope
            .result
            .ok_or_else(|| Error::UpstreamError(format!("{context}: envelope missing result")))
    }
}

#[async_trait]
impl AccessGroupService for CloudflareApi {
    async fn list_groups(&self) -> Result<Vec<AccessGroup>> {
        debug!(account = %self.account_id, "listing Access groups");
        let response = self.http.get(self.groups_url()).send().await?;
        Self::unwrap_envelope(response, "list Access groups").await
    }

    async fn get_group(&self, id: &str) -> Result<AccessGroup> {
        debug!(account = %self.account_id, id, "fetching Access group");
        let response = self
            .http
            .get(format!("{}/{}", self.groups_url(), id))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::GroupNotFound(id.to_string()));
        }
        Self::unwrap_envelope(response, "get Access group").await
    }

    async fn create_group(&self, group: &AccessGroup) -> Result<AccessGroup> {
        debug!(account = %self.account_id, name = %group.name, "creating Access group");
        let response = self
            .http
            .post(self.groups_url())
            .json(group)
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            return Err(Error::GroupConflict(group.name.clone()));
        }
        Self::unwrap_envelope(response, "create Access group").await
    }

    async fn update_group(&self, group: &AccessGroup) -> Result<AccessGroup> {
        debug!(account = %self.account_id, id = %group.id, "updating Access group");
        let response = self
            .http
            .put(format!("{}/{}", self.groups_url(), group.id))
            .json(group)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::GroupNotFound(group.id.clone()));
        }
        Self::unwrap_envelope(response, "update Access group").await
    }
}
