//! Tests for identity resolution and membership equality

use crate::cfapi::{AccessGroup, AccessRule};
use crate::controller::matcher::{find_by_name, membership_equal};

fn group(id: &str, name: &str, emails: &[&str]) -> AccessGroup {
    AccessGroup::from_emails(
        id.to_string(),
        name.to_string(),
        &emails.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
    )
}

#[test]
fn find_by_name_requires_exact_match() {
    let listing = vec![
        group("1", "eng [K8s]", &[]),
        group("2", "ops [K8s]", &[]),
    ];

    assert_eq!(find_by_name(&listing, "ops [K8s]").map(|g| g.id.as_str()), Some("2"));
    assert!(find_by_name(&listing, "eng").is_none());
    assert!(find_by_name(&listing, "ENG [K8s]").is_none());
}

#[test]
fn find_by_name_returns_none_on_empty_listing() {
    assert!(find_by_name(&[], "eng [K8s]").is_none());
}

#[test]
fn find_by_name_takes_first_of_duplicates() {
    let listing = vec![
        group("1", "eng [K8s]", &[]),
        group("2", "eng [K8s]", &[]),
    ];

    assert_eq!(find_by_name(&listing, "eng [K8s]").map(|g| g.id.as_str()), Some("1"));
}

#[test]
fn membership_equal_ignores_order() {
    let a = group("1", "eng", &["a@x.com", "b@x.com"]);
    let b = group("1", "eng", &["b@x.com", "a@x.com"]);
    assert!(membership_equal(&a, &b));
}

#[test]
fn membership_equal_collapses_duplicates() {
    let a = group("1", "eng", &["a@x.com", "a@x.com", "b@x.com"]);
    let b = group("1", "eng", &["a@x.com", "b@x.com"]);
    assert!(membership_equal(&a, &b));
}

#[test]
fn membership_equal_ignores_name() {
    let current = group("1", "A", &["x@x.com", "y@x.com"]);
    let desired = group("1", "B", &["x@x.com", "y@x.com"]);
    assert!(membership_equal(&current, &desired));
}

#[test]
fn membership_equal_detects_divergence() {
    let current = group("1", "eng", &["a@x.com", "b@x.com"]);
    let desired = group("1", "eng", &["a@x.com"]);
    assert!(!membership_equal(&current, &desired));
}

#[test]
fn membership_equal_ignores_non_email_rules() {
    let mut current = group("1", "eng", &["a@x.com"]);
    current.include.push(AccessRule::Other(serde_json::json!({
        "ip": { "ip": "10.0.0.0/8" }
    })));
    let desired = group("1", "eng", &["a@x.com"]);

    assert!(membership_equal(&current, &desired));
}
