//! Cloudflare connection configuration
//!
//! Credentials come from the operator environment; the account scope can be
//! overridden per resource. Validation happens before any network call so a
//! bad config fails fast with a message attributable to configuration, not
//! connectivity.

use crate::crd::CloudflareAccessGroup;
use crate::error::{Error, Result};

pub const ENV_API_TOKEN: &str = "CLOUDFLARE_API_TOKEN";
pub const ENV_API_KEY: &str = "CLOUDFLARE_API_KEY";
pub const ENV_API_EMAIL: &str = "CLOUDFLARE_API_EMAIL";
pub const ENV_ACCOUNT_ID: &str = "CLOUDFLARE_ACCOUNT_ID";

/// Connection parameters for one reconciliation pass.
#[derive(Clone, Debug, Default)]
pub struct CloudflareConfig {
    pub api_token: String,
    pub api_key: String,
    pub api_email: String,
    pub account_id: String,
}

impl CloudflareConfig {
    /// Read credentials and account scope from the environment.
    pub fn from_env() -> Self {
        CloudflareConfig {
            api_token: std::env::var(ENV_API_TOKEN).unwrap_or_default(),
            api_key: std::env::var(ENV_API_KEY).unwrap_or_default(),
            api_email: std::env::var(ENV_API_EMAIL).unwrap_or_default(),
            account_id: std::env::var(ENV_ACCOUNT_ID).unwrap_or_default(),
        }
    }

    /// Environment config with the resource's own account override applied.
    pub fn from_resource(group: &CloudflareAccessGroup) -> Self {
        let mut config = Self::from_env();
        if let Some(account_id) = &group.spec.account_id {
            config.account_id = account_id.clone();
        }
        config
    }

    fn has_token(&self) -> bool {
        !self.api_token.is_empty()
    }

    fn has_key_pair(&self) -> bool {
        !self.api_key.is_empty() && !self.api_email.is_empty()
    }

    /// Require one complete authentication method and a non-empty account.
    pub fn validate(&self) -> Result<()> {
        if !self.has_token() && !self.has_key_pair() {
            return Err(Error::InvalidConfig(format!(
                "no complete authentication method: set {ENV_API_TOKEN}, or both {ENV_API_KEY} and {ENV_API_EMAIL}"
            )));
        }

        if self.account_id.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "account id is empty: set {ENV_ACCOUNT_ID} or spec.accountId"
            )));
        }

        Ok(())
    }
}
