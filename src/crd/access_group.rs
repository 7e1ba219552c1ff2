//! CloudflareAccessGroup Custom Resource Definition
//!
//! A CloudflareAccessGroup declares the desired membership of one Access
//! group in a Cloudflare Zero Trust account. The controller creates the
//! group if it is missing, adopts a same-named group created out-of-band,
//! and keeps the member list converged.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cfapi::AccessGroup;

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "zero-trust.zelic.io",
    version = "v1alpha1",
    kind = "CloudflareAccessGroup",
    namespaced,
    status = "CloudflareAccessGroupStatus",
    shortname = "cfag",
    printcolumn = r#"{"name":"GroupID","type":"string","jsonPath":".status.accessGroupId"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CloudflareAccessGroupSpec {
    /// Logical group name. Immutable once the external group exists.
    pub name: String,

    /// Email addresses that must belong to the group. This is the only
    /// field expected to change across reconciliations.
    #[serde(default)]
    pub emails: Vec<String>,

    /// Cloudflare account to reconcile against. Falls back to the
    /// operator-wide CLOUDFLARE_ACCOUNT_ID when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

/// Recorded correspondence with the Cloudflare account.
///
/// Owned exclusively by the reconciler. Once `access_group_id` is set it is
/// the authoritative lookup key; name-based scanning is only the bootstrap
/// path for groups this controller has never observed.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloudflareAccessGroupStatus {
    /// Cloudflare-side id of the group; empty until the group is known to
    /// exist.
    #[serde(default)]
    pub access_group_id: String,

    /// Cloudflare's creation timestamp (RFC 3339), mirrored for
    /// observability only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    /// Cloudflare's last-update timestamp (RFC 3339), mirrored for
    /// observability only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl CloudflareAccessGroupSpec {
    /// Validate the spec before touching the network.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("spec.name must not be empty".to_string());
        }

        for email in &self.emails {
            if !email.contains('@') {
                return Err(format!("spec.emails entry {:?} is not an email address", email));
            }
        }

        Ok(())
    }
}

impl CloudflareAccessGroup {
    /// The fully-qualified display name used on the Cloudflare side.
    ///
    /// Decorated so operator-managed groups are recognizable in the
    /// dashboard; also the exact key used when adopting pre-existing
    /// groups by name.
    pub fn cloudflare_name(&self) -> String {
        format!("{} [K8s]", self.spec.name)
    }

    /// Translate the desired state into the Cloudflare API shape.
    ///
    /// Carries the recorded group id (empty if the group has not been
    /// observed yet) so the same value serves both create and update calls.
    pub fn to_cloudflare(&self) -> AccessGroup {
        AccessGroup::from_emails(
            self.status
                .as_ref()
                .map(|s| s.access_group_id.clone())
                .unwrap_or_default(),
            self.cloudflare_name(),
            &self.spec.emails,
        )
    }
}
