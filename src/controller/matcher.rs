//! Identity and equality matching between desired and Cloudflare state
//!
//! Pure functions, no side effects.

use tracing::warn;

use crate::cfapi::AccessGroup;

/// Resolve identity by exact name against an account listing.
///
/// Bootstrap path only: once a group id is recorded in status, lookups go
/// by id and this scan is never consulted. First match in listing order
/// wins; duplicates are logged so operators can clean them up out-of-band.
pub fn find_by_name<'a>(groups: &'a [AccessGroup], name: &str) -> Option<&'a AccessGroup> {
    let mut matches = groups.iter().filter(|g| g.name == name);
    let first = matches.next();

    let duplicates: Vec<&str> = matches.map(|g| g.id.as_str()).collect();
    if !duplicates.is_empty() {
        warn!(
            name,
            ?duplicates,
            "multiple Access groups share this name; adopting the first listed"
        );
    }

    first
}

/// `MembershipEquality`: two groups are equivalent iff their email member
/// sets are equal as unordered sets, duplicates collapsed.
///
/// Deliberately narrow. Name and timestamps are excluded, so a renamed
/// group with identical members counts as unchanged and produces no update
/// call. Widening this to structural equality would make every pass rewrite
/// groups that are already converged.
pub fn membership_equal(current: &AccessGroup, desired: &AccessGroup) -> bool {
    current.email_set() == desired.email_set()
}
