//! Convergence pass for a single CloudflareAccessGroup
//!
//! Drives one level-triggered pass: resolve which Cloudflare group (if any)
//! corresponds to the resource, create or adopt as needed, then converge
//! membership. Runs against the `AccessGroupService` and `StatusPersister`
//! seams so the whole state machine is testable without a cluster or the
//! Cloudflare API.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::cfapi::{AccessGroup, AccessGroupService};
use crate::controller::matcher;
use crate::crd::{CloudflareAccessGroup, CloudflareAccessGroupStatus};
use crate::error::{Error, Result};

/// What to do when a recorded group id no longer exists upstream.
///
/// Defaults to failing the pass: re-creating on a stale listing can mint a
/// duplicate group, so opting in is explicit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissingGroupPolicy {
    /// Surface `GroupNotFound` and let the error policy requeue the pass.
    #[default]
    Fail,
    /// Treat the group as absent and fall through to creation.
    Recreate,
}

/// Write-through persistence for the resource's status subresource.
#[async_trait]
pub trait StatusPersister: Send + Sync {
    async fn persist(&self, group: &CloudflareAccessGroup) -> Result<()>;
}

/// Which external mutations a pass performed. All false means the pass was
/// a no-op: desired and actual state already matched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConvergeOutcome {
    pub adopted: bool,
    pub created: bool,
    pub updated: bool,
}

impl ConvergeOutcome {
    pub fn is_noop(&self) -> bool {
        !(self.adopted || self.created || self.updated)
    }
}

/// Adopt an existing upstream group: record its identity and write the
/// status through before anything else can fail.
async fn adopt_existing(
    persister: &dyn StatusPersister,
    group: &mut CloudflareAccessGroup,
    existing: &AccessGroup,
    outcome: &mut ConvergeOutcome,
) -> Result<()> {
    record_identity(group, existing);
    persister.persist(group).await?;
    outcome.adopted = true;
    Ok(())
}

/// Record the Cloudflare-side identity and timestamps on the status.
///
/// Idempotent: adopting the same group twice writes the same values.
fn record_identity(group: &mut CloudflareAccessGroup, upstream: &AccessGroup) {
    let status = group
        .status
        .get_or_insert_with(CloudflareAccessGroupStatus::default);
    status.access_group_id = upstream.id.clone();
    status.created_at = upstream.created_at.map(|t| t.to_rfc3339());
    status.updated_at = upstream.updated_at.map(|t| t.to_rfc3339());
}

/// One full convergence pass.
///
/// Nothing upstream is mutated until identity is resolved; on any failure
/// the remainder of the pass is abandoned and the only committed side
/// effects are the idempotent status writes.
pub async fn converge_access_group(
    api: &dyn AccessGroupService,
    persister: &dyn StatusPersister,
    group: &CloudflareAccessGroup,
    policy: MissingGroupPolicy,
) -> Result<ConvergeOutcome> {
    let mut group = group.clone();
    let mut outcome = ConvergeOutcome::default();

    let listing = api.list_groups().await?;

    let recorded_id = group
        .status
        .as_ref()
        .map(|s| s.access_group_id.clone())
        .unwrap_or_default();

    // Resolve identity: recorded id is authoritative; the name scan is only
    // the bootstrap path for groups created before we observed them.
    let current = if recorded_id.is_empty() {
        match matcher::find_by_name(&listing, &group.cloudflare_name()) {
            Some(existing) => {
                info!(
                    cloudflare_name = %group.cloudflare_name(),
                    id = %existing.id,
                    "Access group already exists, adopting"
                );
                let existing = existing.clone();
                adopt_existing(persister, &mut group, &existing, &mut outcome).await?;
                Some(existing)
            }
            None => None,
        }
    } else {
        match api.get_group(&recorded_id).await {
            Ok(existing) => Some(existing),
            Err(Error::GroupNotFound(id)) => match policy {
                MissingGroupPolicy::Fail => return Err(Error::GroupNotFound(id)),
                MissingGroupPolicy::Recreate => {
                    if let Some(status) = group.status.as_mut() {
                        status.access_group_id.clear();
                    }
                    // The group may have been deleted and re-created
                    // out-of-band, leaving a same-named survivor in the
                    // listing. Adopt it; creating here would only collide
                    // on the name, and the stale id would replay forever.
                    match matcher::find_by_name(&listing, &group.cloudflare_name()) {
                        Some(survivor) => {
                            warn!(
                                stale_id = %id,
                                id = %survivor.id,
                                "recorded Access group vanished upstream, adopting same-named survivor"
                            );
                            let survivor = survivor.clone();
                            adopt_existing(persister, &mut group, &survivor, &mut outcome)
                                .await?;
                            Some(survivor)
                        }
                        None => {
                            warn!(stale_id = %id, "recorded Access group vanished upstream, re-creating");
                            None
                        }
                    }
                }
            },
            Err(e) => return Err(e),
        }
    };

    let current = match current {
        Some(existing) => existing,
        None => {
            let created = api.create_group(&group.to_cloudflare()).await?;
            info!(
                cloudflare_name = %group.cloudflare_name(),
                id = %created.id,
                "created Access group"
            );
            // Persist the minted id in the same step; a requeue before the
            // next listing observes the group must not create it again.
            record_identity(&mut group, &created);
            persister.persist(&group).await?;
            outcome.created = true;
            created
        }
    };

    // Diff and update. Membership is the only field compared.
    let desired = group.to_cloudflare();
    if !matcher::membership_equal(&current, &desired) {
        info!(cloudflare_name = %desired.name, "membership has changed, updating");
        let updated = api.update_group(&desired).await?;
        record_identity(&mut group, &updated);
        persister.persist(&group).await?;
        outcome.updated = true;
    }

    Ok(outcome)
}
