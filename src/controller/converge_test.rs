//! Tests for the convergence pass
//!
//! Run against in-memory implementations of the Cloudflare service and the
//! status persister, covering the pass's decision table: create vs. adopt
//! vs. update vs. no-op, idempotence across passes, and the vanished-id
//! policies.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use kube::api::ObjectMeta;

use crate::cfapi::{AccessGroup, AccessGroupService};
use crate::controller::converge::{
    converge_access_group, MissingGroupPolicy, StatusPersister,
};
use crate::crd::{CloudflareAccessGroup, CloudflareAccessGroupSpec, CloudflareAccessGroupStatus};
use crate::error::{Error, Result};

#[derive(Default)]
struct FakeCloudflare {
    groups: Mutex<Vec<AccessGroup>>,
    fail_listing: bool,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

impl FakeCloudflare {
    fn with_groups(groups: Vec<AccessGroup>) -> Self {
        FakeCloudflare {
            groups: Mutex::new(groups),
            ..Default::default()
        }
    }

    fn stored(&self, id: &str) -> Option<AccessGroup> {
        self.groups.lock().unwrap().iter().find(|g| g.id == id).cloned()
    }
}

#[async_trait]
impl AccessGroupService for FakeCloudflare {
    async fn list_groups(&self) -> Result<Vec<AccessGroup>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing {
            return Err(Error::UpstreamError("listing unavailable".to_string()));
        }
        Ok(self.groups.lock().unwrap().clone())
    }

    async fn get_group(&self, id: &str) -> Result<AccessGroup> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.stored(id)
            .ok_or_else(|| Error::GroupNotFound(id.to_string()))
    }

    async fn create_group(&self, group: &AccessGroup) -> Result<AccessGroup> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut groups = self.groups.lock().unwrap();
        if groups.iter().any(|g| g.name == group.name) {
            return Err(Error::GroupConflict(group.name.clone()));
        }

        let mut created = group.clone();
        created.id = format!("cf-{}", groups.len() + 1);
        created.created_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        created.updated_at = created.created_at;
        groups.push(created.clone());
        Ok(created)
    }

    async fn update_group(&self, group: &AccessGroup) -> Result<AccessGroup> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut groups = self.groups.lock().unwrap();
        let existing = groups
            .iter_mut()
            .find(|g| g.id == group.id)
            .ok_or_else(|| Error::GroupNotFound(group.id.clone()))?;

        existing.include = group.include.clone();
        existing.updated_at = Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        Ok(existing.clone())
    }
}

/// Captures every status write-through, in order.
#[derive(Default)]
struct RecordingPersister {
    writes: Mutex<Vec<CloudflareAccessGroupStatus>>,
}

impl RecordingPersister {
    fn last(&self) -> Option<CloudflareAccessGroupStatus> {
        self.writes.lock().unwrap().last().cloned()
    }

    fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl StatusPersister for RecordingPersister {
    async fn persist(&self, group: &CloudflareAccessGroup) -> Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push(group.status.clone().unwrap_or_default());
        Ok(())
    }
}

fn desired(name: &str, emails: &[&str]) -> CloudflareAccessGroup {
    CloudflareAccessGroup {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: CloudflareAccessGroupSpec {
            name: name.to_string(),
            emails: emails.iter().map(|e| e.to_string()).collect(),
            account_id: None,
        },
        status: None,
    }
}

fn desired_with_id(name: &str, emails: &[&str], id: &str) -> CloudflareAccessGroup {
    let mut group = desired(name, emails);
    group.status = Some(CloudflareAccessGroupStatus {
        access_group_id: id.to_string(),
        ..Default::default()
    });
    group
}

fn upstream(id: &str, name: &str, emails: &[&str]) -> AccessGroup {
    AccessGroup::from_emails(
        id.to_string(),
        name.to_string(),
        &emails.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
    )
}

#[tokio::test]
async fn creates_group_when_absent() {
    let api = FakeCloudflare::default();
    let persister = RecordingPersister::default();
    let group = desired("eng", &["a@x.com", "b@x.com"]);

    let outcome = converge_access_group(&api, &persister, &group, MissingGroupPolicy::Fail)
        .await
        .unwrap();

    assert!(outcome.created && !outcome.adopted && !outcome.updated);
    assert_eq!(api.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.update_calls.load(Ordering::SeqCst), 0);

    let created = api.stored("cf-1").unwrap();
    assert_eq!(created.email_set(), ["a@x.com", "b@x.com"].into_iter().collect());
}

#[tokio::test]
async fn create_persists_minted_id_immediately() {
    let api = FakeCloudflare::default();
    let persister = RecordingPersister::default();
    let group = desired("eng", &["a@x.com"]);

    converge_access_group(&api, &persister, &group, MissingGroupPolicy::Fail)
        .await
        .unwrap();

    let status = persister.last().unwrap();
    assert_eq!(status.access_group_id, "cf-1");
    assert!(status.created_at.is_some());
}

#[tokio::test]
async fn adopts_same_named_group_instead_of_creating() {
    let api = FakeCloudflare::with_groups(vec![upstream(
        "42",
        "eng [K8s]",
        &["a@x.com", "b@x.com"],
    )]);
    let persister = RecordingPersister::default();
    let group = desired("eng", &["a@x.com", "b@x.com"]);

    let outcome = converge_access_group(&api, &persister, &group, MissingGroupPolicy::Fail)
        .await
        .unwrap();

    assert!(outcome.adopted && !outcome.created && !outcome.updated);
    assert_eq!(api.create_calls.load(Ordering::SeqCst), 0);
    assert_eq!(persister.last().unwrap().access_group_id, "42");
}

#[tokio::test]
async fn adoption_converges_divergent_membership() {
    let api = FakeCloudflare::with_groups(vec![upstream("42", "eng [K8s]", &["old@x.com"])]);
    let persister = RecordingPersister::default();
    let group = desired("eng", &["a@x.com"]);

    let outcome = converge_access_group(&api, &persister, &group, MissingGroupPolicy::Fail)
        .await
        .unwrap();

    assert!(outcome.adopted && outcome.updated);
    assert_eq!(
        api.stored("42").unwrap().email_set(),
        ["a@x.com"].into_iter().collect()
    );
}

#[tokio::test]
async fn second_pass_is_a_noop() {
    let api = FakeCloudflare::default();
    let persister = RecordingPersister::default();
    let group = desired("eng", &["a@x.com"]);

    converge_access_group(&api, &persister, &group, MissingGroupPolicy::Fail)
        .await
        .unwrap();

    // Replay with the status the first pass persisted, as the controller
    // would after re-fetching the resource.
    let mut group = group;
    group.status = persister.last();
    let outcome = converge_access_group(&api, &persister, &group, MissingGroupPolicy::Fail)
        .await
        .unwrap();

    assert!(outcome.is_noop());
    assert_eq!(api.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.update_calls.load(Ordering::SeqCst), 0);
    // Second pass resolved identity by id, not by scanning.
    assert_eq!(api.get_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn recorded_id_wins_over_name_matches() {
    // The listing contains a same-named imposter with different members;
    // the recorded id points at a renamed group that already matches.
    let api = FakeCloudflare::with_groups(vec![
        upstream("99", "eng [K8s]", &["imposter@x.com"]),
        upstream("42", "renamed [K8s]", &["a@x.com"]),
    ]);
    let persister = RecordingPersister::default();
    let group = desired_with_id("eng", &["a@x.com"], "42");

    let outcome = converge_access_group(&api, &persister, &group, MissingGroupPolicy::Fail)
        .await
        .unwrap();

    assert!(outcome.is_noop());
    assert_eq!(api.update_calls.load(Ordering::SeqCst), 0);
    assert_eq!(api.create_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn renamed_group_with_same_members_is_unchanged() {
    let api = FakeCloudflare::with_groups(vec![upstream("42", "B", &["x@x.com", "y@x.com"])]);
    let persister = RecordingPersister::default();
    let group = desired_with_id("A", &["x@x.com", "y@x.com"], "42");

    let outcome = converge_access_group(&api, &persister, &group, MissingGroupPolicy::Fail)
        .await
        .unwrap();

    assert!(outcome.is_noop());
    assert_eq!(api.update_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn shrinks_membership_through_recorded_id() {
    let api = FakeCloudflare::with_groups(vec![upstream(
        "42",
        "eng [K8s]",
        &["a@x.com", "b@x.com"],
    )]);
    let persister = RecordingPersister::default();
    let group = desired_with_id("eng", &["a@x.com"], "42");

    let outcome = converge_access_group(&api, &persister, &group, MissingGroupPolicy::Fail)
        .await
        .unwrap();

    assert!(outcome.updated && !outcome.created && !outcome.adopted);
    assert_eq!(api.update_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        api.stored("42").unwrap().email_set(),
        ["a@x.com"].into_iter().collect()
    );
}

#[tokio::test]
async fn vanished_id_fails_the_pass_by_default() {
    let api = FakeCloudflare::default();
    let persister = RecordingPersister::default();
    let group = desired_with_id("eng", &["a@x.com"], "42");

    let err = converge_access_group(&api, &persister, &group, MissingGroupPolicy::Fail)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::GroupNotFound(ref id) if id == "42"));
    assert_eq!(api.create_calls.load(Ordering::SeqCst), 0);
    assert!(err.is_transient());
}

#[tokio::test]
async fn vanished_id_recreates_when_opted_in() {
    let api = FakeCloudflare::default();
    let persister = RecordingPersister::default();
    let group = desired_with_id("eng", &["a@x.com"], "42");

    let outcome = converge_access_group(&api, &persister, &group, MissingGroupPolicy::Recreate)
        .await
        .unwrap();

    assert!(outcome.created);
    assert_eq!(api.create_calls.load(Ordering::SeqCst), 1);
    // The stale id is replaced with the freshly minted one.
    assert_eq!(persister.last().unwrap().access_group_id, "cf-1");
}

#[tokio::test]
async fn recreate_policy_adopts_same_named_survivor() {
    // The recorded id vanished but the listing still holds a same-named
    // group (deleted and re-created out-of-band). Creating would collide
    // on the name; the pass must adopt the survivor instead.
    let api = FakeCloudflare::with_groups(vec![upstream("99", "eng [K8s]", &["old@x.com"])]);
    let persister = RecordingPersister::default();
    let group = desired_with_id("eng", &["a@x.com"], "42");

    let outcome = converge_access_group(&api, &persister, &group, MissingGroupPolicy::Recreate)
        .await
        .unwrap();

    assert!(outcome.adopted && outcome.updated && !outcome.created);
    assert_eq!(api.create_calls.load(Ordering::SeqCst), 0);
    assert_eq!(persister.last().unwrap().access_group_id, "99");
    assert_eq!(
        api.stored("99").unwrap().email_set(),
        ["a@x.com"].into_iter().collect()
    );

    // A follow-up pass with the adopted status converges to a no-op
    // rather than replaying the stale id.
    let mut group = group;
    group.status = persister.last();
    let outcome = converge_access_group(&api, &persister, &group, MissingGroupPolicy::Recreate)
        .await
        .unwrap();
    assert!(outcome.is_noop());
}

#[tokio::test]
async fn listing_failure_aborts_before_any_mutation() {
    let api = FakeCloudflare {
        fail_listing: true,
        ..Default::default()
    };
    let persister = RecordingPersister::default();
    let group = desired("eng", &["a@x.com"]);

    let err = converge_access_group(&api, &persister, &group, MissingGroupPolicy::Fail)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UpstreamError(_)));
    assert_eq!(api.create_calls.load(Ordering::SeqCst), 0);
    assert_eq!(api.update_calls.load(Ordering::SeqCst), 0);
    assert_eq!(persister.write_count(), 0);
}

#[tokio::test]
async fn adopting_twice_writes_the_same_status() {
    let api = FakeCloudflare::with_groups(vec![upstream("42", "eng [K8s]", &["a@x.com"])]);
    let persister = RecordingPersister::default();
    let group = desired("eng", &["a@x.com"]);

    converge_access_group(&api, &persister, &group, MissingGroupPolicy::Fail)
        .await
        .unwrap();
    converge_access_group(&api, &persister, &group, MissingGroupPolicy::Fail)
        .await
        .unwrap();

    let writes = persister.writes.lock().unwrap();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].access_group_id, writes[1].access_group_id);
}
