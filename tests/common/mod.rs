//! Shared test infrastructure for reconciliation integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use security_group_fqdn::config::SyncConfig;
use security_group_fqdn::permission::{IpPermission, RuleEntry};
use security_group_fqdn::policy::{Direction, Tag, TagSchema};
use security_group_fqdn::provider::{SecurityGroup, SecurityGroupApi, SnapshotProvider};
use security_group_fqdn::resolver::HostResolver;
use security_group_fqdn::sync::Syncer;
use security_group_fqdn::SyncError;

// --- Constants ---

pub const API_HOST: &str = "api.example.com";
pub const DB_HOST: &str = "db.example.com";

// --- FakeResolver ---

/// Resolver answering from a fixed table. Unknown hostnames fail.
#[derive(Clone, Default)]
pub struct FakeResolver {
    records: Arc<Mutex<HashMap<String, Vec<IpAddr>>>>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish addresses for a hostname, replacing earlier answers.
    pub fn set(&self, hostname: &str, addrs: &[&str]) {
        let addrs = addrs.iter().map(|a| a.parse().unwrap()).collect();
        self.records
            .lock()
            .unwrap()
            .insert(hostname.to_string(), addrs);
    }

    /// Make lookups for a hostname fail.
    pub fn remove(&self, hostname: &str) {
        self.records.lock().unwrap().remove(hostname);
    }
}

#[async_trait]
impl HostResolver for FakeResolver {
    async fn resolve(&self, hostname: &str) -> Result<Vec<IpAddr>, SyncError> {
        self.records
            .lock()
            .unwrap()
            .get(hostname)
            .cloned()
            .ok_or_else(|| SyncError::Provider(format!("NXDOMAIN {hostname}")))
    }
}

// --- RecordingProvider ---

/// A call made against the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Authorize(String, Direction, Vec<IpPermission>),
    Revoke(String, Direction, Vec<IpPermission>),
}

/// Snapshot provider that records calls and can fail chosen groups.
#[derive(Clone)]
pub struct RecordingProvider {
    inner: SnapshotProvider,
    calls: Arc<Mutex<Vec<Call>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    fail_listing: Arc<AtomicBool>,
}

impl RecordingProvider {
    pub fn new(groups: Vec<SecurityGroup>) -> Self {
        Self {
            inner: SnapshotProvider::from_groups(groups),
            calls: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(Mutex::new(HashSet::new())),
            fail_listing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Reject every rule change for a group.
    pub fn fail_group(&self, group_id: &str) {
        self.failing.lock().unwrap().insert(group_id.to_string());
    }

    /// Reject group listing.
    pub fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }

    /// Calls made so far, then forget them.
    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    pub fn group(&self, group_id: &str) -> SecurityGroup {
        self.inner.group(group_id).expect("group exists")
    }

    fn check(&self, group_id: &str) -> Result<(), SyncError> {
        if self.failing.lock().unwrap().contains(group_id) {
            return Err(SyncError::Provider(format!("{group_id}: UnauthorizedOperation")));
        }
        Ok(())
    }
}

#[async_trait]
impl SecurityGroupApi for RecordingProvider {
    async fn describe_tagged_groups(
        &self,
        tag_keys: &[String],
    ) -> Result<Vec<SecurityGroup>, SyncError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(SyncError::Provider("RequestLimitExceeded".to_string()));
        }
        self.inner.describe_tagged_groups(tag_keys).await
    }

    async fn authorize(
        &self,
        group_id: &str,
        direction: Direction,
        permissions: Vec<IpPermission>,
    ) -> Result<(), SyncError> {
        self.calls.lock().unwrap().push(Call::Authorize(
            group_id.to_string(),
            direction,
            permissions.clone(),
        ));
        self.check(group_id)?;
        self.inner.authorize(group_id, direction, permissions).await
    }

    async fn revoke(
        &self,
        group_id: &str,
        direction: Direction,
        permissions: Vec<IpPermission>,
    ) -> Result<(), SyncError> {
        self.calls.lock().unwrap().push(Call::Revoke(
            group_id.to_string(),
            direction,
            permissions.clone(),
        ));
        self.check(group_id)?;
        self.inner.revoke(group_id, direction, permissions).await
    }
}

// --- Builders ---

/// IPv4 permission on the given ports/protocol.
pub fn ipv4_rule(from: i32, to: i32, protocol: &str, cidrs: &[&str]) -> IpPermission {
    RuleEntry::ipv4(from, to, protocol, cidrs.iter().copied()).into()
}

/// IPv4 permission on 443/tcp.
pub fn https(cidrs: &[&str]) -> IpPermission {
    ipv4_rule(443, 443, "tcp", cidrs)
}

/// Group tagged with hostnames for the given directions.
pub fn tracked_group(group_id: &str, targets: &[(Direction, &str)]) -> SecurityGroup {
    let schema = TagSchema::default();
    let tags = targets
        .iter()
        .map(|(direction, host)| Tag::new(schema.hostname_key(*direction), *host))
        .collect();

    SecurityGroup {
        group_id: group_id.to_string(),
        group_name: format!("{group_id}-name"),
        tags,
        ..Default::default()
    }
}

/// Syncer wired to the fakes with default configuration.
pub fn build_syncer(provider: &RecordingProvider, resolver: &FakeResolver) -> Syncer {
    Syncer::new(
        Arc::new(provider.clone()),
        Arc::new(resolver.clone()),
        SyncConfig::default(),
    )
}
