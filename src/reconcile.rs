//! Rule reconciliation.
//!
//! Given a direction's existing permissions, the tag policy and the freshly
//! resolved CIDR blocks, compute the authorize and revoke lists that bring
//! the direction to exactly the resolved blocks on the policy's port range
//! and protocol.
//!
//! Only IPv4 entries on the policy's ports/protocol are managed. Every other
//! entry, including IPv6, principal and prefix-list grants on the managed
//! ports, is revoked unconditionally.

use tracing::trace;

use crate::permission::{normalize_all, IpPermission, RuleEntry};
use crate::policy::Policy;

/// Rule changes for one direction of one group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleDiff {
    /// Entries to authorize.
    pub authorize: Vec<RuleEntry>,
    /// Entries to revoke.
    pub revoke: Vec<RuleEntry>,
}

impl RuleDiff {
    /// True if nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.authorize.is_empty() && self.revoke.is_empty()
    }

    /// Authorize list in API form.
    pub fn authorize_permissions(&self) -> Vec<IpPermission> {
        self.authorize.iter().cloned().map(IpPermission::from).collect()
    }

    /// Revoke list in API form.
    pub fn revoke_permissions(&self) -> Vec<IpPermission> {
        self.revoke.iter().cloned().map(IpPermission::from).collect()
    }
}

/// Elements of `b` that do not appear in `a`, in `b`'s order.
pub fn set_difference<T: PartialEq + Clone>(a: &[T], b: &[T]) -> Vec<T> {
    b.iter().filter(|item| !a.contains(item)).cloned().collect()
}

/// IPv4 entry for the given ports, protocol and CIDR blocks.
pub fn map_permission(from_port: i32, to_port: i32, protocol: &str, ranges: &[String]) -> RuleEntry {
    RuleEntry::ipv4(from_port, to_port, protocol, ranges.iter().cloned())
}

fn is_managed(entry: &RuleEntry, policy: &Policy) -> bool {
    entry.from_port == Some(policy.from_port)
        && entry.to_port == Some(policy.to_port)
        && entry.protocol == policy.protocol
        && entry.ipv4_cidrs().is_some()
}

/// Compute the changes converging `existing` onto `resolved`.
///
/// `resolved` holds CIDR blocks (`a.b.c.d/32`). An empty `resolved` revokes
/// every managed block. If several IPv4 entries match the policy the last
/// one is treated as the managed entry.
pub fn reconcile(existing: &[IpPermission], policy: &Policy, resolved: &[String]) -> RuleDiff {
    let mut managed: Option<Vec<String>> = None;
    let mut revoke = Vec::new();

    for entry in normalize_all(existing) {
        if is_managed(&entry, policy) {
            if managed.is_some() {
                trace!(protocol = %entry.protocol, "replacing earlier managed entry");
            }
            managed = entry.ipv4_cidrs();
        } else {
            trace!(
                family = %entry.grants.family(),
                protocol = %entry.protocol,
                "unmanaged entry scheduled for revoke"
            );
            revoke.push(entry);
        }
    }

    let old_ranges = managed.unwrap_or_default();
    let add_ranges = set_difference(&old_ranges, resolved);
    let remove_ranges = set_difference(resolved, &old_ranges);
    trace!(
        old = old_ranges.len(),
        new = resolved.len(),
        add = add_ranges.len(),
        remove = remove_ranges.len(),
        "diffed managed ranges"
    );

    let mut authorize = Vec::new();
    if !add_ranges.is_empty() {
        authorize.push(map_permission(
            policy.from_port,
            policy.to_port,
            &policy.protocol,
            &add_ranges,
        ));
    }
    if !remove_ranges.is_empty() {
        revoke.push(map_permission(
            policy.from_port,
            policy.to_port,
            &policy.protocol,
            &remove_ranges,
        ));
    }

    RuleDiff { authorize, revoke }
}
