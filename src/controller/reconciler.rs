//! Controller loop for CloudflareAccessGroup resources
//!
//! Implements the controller pattern using kube-rs runtime.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Event;
use kube::{
    api::{Api, Patch, PatchParams, PostParams},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
    Resource, ResourceExt,
};
use tracing::{error, info, instrument, warn};

use crate::cfapi::CloudflareApi;
use crate::config::CloudflareConfig;
use crate::controller::converge::{
    converge_access_group, ConvergeOutcome, MissingGroupPolicy, StatusPersister,
};
use crate::crd::CloudflareAccessGroup;
use crate::error::{Error, Result};

/// Resync interval after a successful pass. Level-triggered: drift applied
/// out-of-band on the Cloudflare side is picked up on the next resync.
const RESYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Requeue delay after a transient failure.
const RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Requeue delay after a failure that needs a config change. Still requeued
/// (the operator stays level-triggered) but slowly, to avoid hammering the
/// API with passes that cannot succeed.
const FATAL_INTERVAL: Duration = Duration::from_secs(15 * 60);

const FIELD_MANAGER: &str = "cloudflare-zero-trust-operator";

/// Shared state for the controller
pub struct ControllerState {
    pub client: Client,
    pub missing_group_policy: MissingGroupPolicy,
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let client = state.client.clone();
    let groups: Api<CloudflareAccessGroup> = Api::all(client.clone());

    info!("Starting CloudflareAccessGroup controller");

    // Verify CRD exists
    match groups.list(&Default::default()).await {
        Ok(_) => info!("CloudflareAccessGroup CRD is available"),
        Err(e) => {
            error!(
                "CloudflareAccessGroup CRD not found. Please install the CRD first: {:?}",
                e
            );
            return Err(Error::InvalidConfig(
                "CloudflareAccessGroup CRD not installed".to_string(),
            ));
        }
    }

    Controller::new(groups, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => info!("Reconciled: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

/// Persists status through the Kubernetes status subresource.
struct KubeStatusPersister {
    api: Api<CloudflareAccessGroup>,
}

#[async_trait]
impl StatusPersister for KubeStatusPersister {
    async fn persist(&self, group: &CloudflareAccessGroup) -> Result<()> {
        let patch = serde_json::json!({ "status": group.status });
        self.api
            .patch_status(
                &group.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(Error::KubeError)?;
        Ok(())
    }
}

/// Helper to emit a Kubernetes Event
async fn emit_event(
    client: &Client,
    group: &CloudflareAccessGroup,
    reason: &str,
    message: &str,
) -> Result<()> {
    let namespace = group.namespace().unwrap_or_else(|| "default".to_string());
    let events: Api<Event> = Api::namespaced(client.clone(), &namespace);

    let time = chrono::Utc::now();
    let event = Event {
        metadata: kube::api::ObjectMeta {
            generate_name: Some(format!("{}-event-", group.name_any())),
            ..Default::default()
        },
        type_: Some("Normal".to_string()),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        involved_object: group.object_ref(&()),
        first_timestamp: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(time)),
        last_timestamp: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(time)),
        count: Some(1),
        ..Default::default()
    };

    events
        .create(&PostParams::default(), &event)
        .await
        .map_err(Error::KubeError)?;
    Ok(())
}

async fn report_outcome(
    client: &Client,
    group: &CloudflareAccessGroup,
    outcome: &ConvergeOutcome,
) {
    let pairs = [
        (outcome.adopted, "Adopted", "adopted existing Access group"),
        (outcome.created, "Created", "created Access group"),
        (outcome.updated, "Updated", "updated Access group membership"),
    ];

    for (happened, reason, message) in pairs {
        if !happened {
            continue;
        }
        if let Err(e) = emit_event(client, group, reason, message).await {
            // Events are best-effort; the pass already converged.
            warn!("failed to emit {} event: {:?}", reason, e);
        }
    }
}

/// The main reconciliation function
///
/// This function is called whenever:
/// - A CloudflareAccessGroup is created or updated
/// - The requeue timer expires
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(
    obj: Arc<CloudflareAccessGroup>,
    ctx: Arc<ControllerState>,
) -> Result<Action> {
    let client = ctx.client.clone();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<CloudflareAccessGroup> = Api::namespaced(client.clone(), &namespace);

    // Re-fetch rather than trusting the watch cache: the status may have
    // been persisted by a pass the cache has not caught up with yet.
    let Some(group) = api
        .get_opt(&obj.name_any())
        .await
        .map_err(Error::KubeError)?
    else {
        // Deleted concurrently; nothing to converge.
        return Ok(Action::await_change());
    };

    info!(
        "Reconciling CloudflareAccessGroup {}/{}",
        namespace,
        group.name_any()
    );

    if let Err(e) = group.spec.validate() {
        warn!("Validation failed for {}/{}: {}", namespace, group.name_any(), e);
        return Err(Error::InvalidConfig(e));
    }

    let cf_config = CloudflareConfig::from_resource(&group);
    cf_config.validate()?;

    let cf_api = CloudflareApi::new(&cf_config)?;
    let persister = KubeStatusPersister { api: api.clone() };

    let outcome =
        converge_access_group(&cf_api, &persister, &group, ctx.missing_group_policy).await?;

    if outcome.is_noop() {
        info!(
            "CloudflareAccessGroup {}/{} already converged",
            namespace,
            group.name_any()
        );
    } else {
        report_outcome(&client, &group, &outcome).await;
    }

    Ok(Action::requeue(RESYNC_INTERVAL))
}

/// Decide the requeue class for a failed pass.
///
/// Transient upstream trouble retries quickly; configuration mistakes wait
/// for a human (or the next edit) and only resync slowly.
fn error_policy(
    obj: Arc<CloudflareAccessGroup>,
    err: &Error,
    _ctx: Arc<ControllerState>,
) -> Action {
    if err.is_transient() {
        warn!(
            "Transient error reconciling {}: {}; requeueing",
            obj.name_any(),
            err
        );
        Action::requeue(RETRY_INTERVAL)
    } else {
        error!(
            "Fatal error reconciling {}: {}; fix the configuration",
            obj.name_any(),
            err
        );
        Action::requeue(FATAL_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_requeue_faster_than_fatal_ones() {
        assert!(Error::UpstreamError("503".into()).is_transient());
        assert!(Error::GroupNotFound("42".into()).is_transient());
        assert!(Error::GroupConflict("eng".into()).is_transient());
        assert!(!Error::InvalidConfig("no token".into()).is_transient());
        assert!(RETRY_INTERVAL < FATAL_INTERVAL);
    }
}
