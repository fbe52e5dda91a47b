//! Reconciliation driver and lifecycle management.

use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tripwire::Tripwire;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::metrics::{self, ChangeKind, DirectionOutcome, Timer};
use crate::policy::{Direction, Policy, TagSchema};
use crate::provider::{SecurityGroup, SecurityGroupApi};
use crate::reconcile::{reconcile, RuleDiff};
use crate::resolver::{resolve_cidrs, HostResolver};

/// Totals for one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Tagged groups returned by the provider.
    pub groups: usize,
    /// Directions that were reconciled.
    pub directions_synced: usize,
    /// Directions without a hostname tag.
    pub directions_skipped: usize,
    /// Rule entries sent for authorization.
    pub entries_authorized: usize,
    /// Rule entries sent for revocation.
    pub entries_revoked: usize,
    /// Failed cloud API calls.
    pub failures: usize,
}

impl SyncReport {
    fn absorb(&mut self, other: SyncReport) {
        self.directions_synced += other.directions_synced;
        self.directions_skipped += other.directions_skipped;
        self.entries_authorized += other.entries_authorized;
        self.entries_revoked += other.entries_revoked;
        self.failures += other.failures;
    }
}

/// Keeps tagged security groups in sync with their hostnames.
pub struct Syncer {
    provider: Arc<dyn SecurityGroupApi>,
    resolver: Arc<dyn HostResolver>,
    schema: TagSchema,
    config: SyncConfig,
}

impl Syncer {
    /// Create a syncer over the given collaborators.
    pub fn new(
        provider: Arc<dyn SecurityGroupApi>,
        resolver: Arc<dyn HostResolver>,
        config: SyncConfig,
    ) -> Self {
        Self {
            provider,
            resolver,
            schema: config.tag_schema(),
            config,
        }
    }

    /// Run one reconciliation cycle over every tagged group.
    ///
    /// Only failing to list groups aborts the cycle. Failures for a single
    /// group or direction are logged and counted in the report.
    pub async fn sync_once(&self) -> Result<SyncReport, SyncError> {
        let timer = Timer::start();
        let groups = match self
            .provider
            .describe_tagged_groups(&self.schema.activation_keys())
            .await
        {
            Ok(groups) => groups,
            Err(e) => {
                metrics::record_cycle_error();
                return Err(e);
            }
        };
        debug!(groups = groups.len(), "listed tagged security groups");

        let mut report = SyncReport {
            groups: groups.len(),
            ..Default::default()
        };
        let concurrency = self.config.concurrency.max(1);
        let reports: Vec<SyncReport> = futures::stream::iter(groups.iter())
            .map(|group| self.sync_group(group))
            .buffer_unordered(concurrency)
            .collect()
            .await;
        for group_report in reports {
            report.absorb(group_report);
        }

        metrics::record_cycle(report.groups, report.failures, timer.elapsed());
        info!(
            groups = report.groups,
            synced = report.directions_synced,
            skipped = report.directions_skipped,
            authorized = report.entries_authorized,
            revoked = report.entries_revoked,
            failures = report.failures,
            "reconciliation cycle complete"
        );
        Ok(report)
    }

    async fn sync_group(&self, group: &SecurityGroup) -> SyncReport {
        let policy = Policy::from_tags(&self.schema, &group.tags);
        let mut report = SyncReport::default();

        for direction in Direction::ALL {
            let Some(hostname) = self.schema.target_hostname(direction, &group.tags) else {
                metrics::record_direction(direction, DirectionOutcome::Skipped);
                report.directions_skipped += 1;
                continue;
            };

            let resolved = resolve_cidrs(self.resolver.as_ref(), hostname).await;
            let diff = reconcile(group.permissions(direction), &policy, &resolved);
            report.directions_synced += 1;

            if diff.is_empty() {
                debug!(
                    group_id = %group.group_id,
                    %direction,
                    hostname,
                    "rules already match"
                );
                metrics::record_direction(direction, DirectionOutcome::Unchanged);
                continue;
            }

            let outcome = self.apply(group, direction, &diff, &mut report).await;
            metrics::record_direction(direction, outcome);
        }

        report
    }

    async fn apply(
        &self,
        group: &SecurityGroup,
        direction: Direction,
        diff: &RuleDiff,
        report: &mut SyncReport,
    ) -> DirectionOutcome {
        let mut outcome = DirectionOutcome::Changed;

        if !diff.authorize.is_empty() {
            let permissions = diff.authorize_permissions();
            info!(
                group_id = %group.group_id,
                group_name = %group.group_name,
                %direction,
                dry_run = self.config.dry_run,
                permissions = %serde_json::to_string(&permissions).unwrap_or_default(),
                "authorizing rules"
            );
            if !self.config.dry_run {
                let count = permissions.len();
                match self
                    .provider
                    .authorize(&group.group_id, direction, permissions)
                    .await
                {
                    Ok(()) => {
                        metrics::record_rule_changes(direction, ChangeKind::Authorize, count);
                        report.entries_authorized += count;
                    }
                    Err(e) => {
                        error!(group_id = %group.group_id, %direction, error = %e, "authorize failed");
                        metrics::record_api_error(direction, ChangeKind::Authorize);
                        report.failures += 1;
                        outcome = DirectionOutcome::Failed;
                    }
                }
            }
        }

        if !diff.revoke.is_empty() {
            let permissions = diff.revoke_permissions();
            info!(
                group_id = %group.group_id,
                group_name = %group.group_name,
                %direction,
                dry_run = self.config.dry_run,
                permissions = %serde_json::to_string(&permissions).unwrap_or_default(),
                "revoking rules"
            );
            if !self.config.dry_run {
                let count = permissions.len();
                match self
                    .provider
                    .revoke(&group.group_id, direction, permissions)
                    .await
                {
                    Ok(()) => {
                        metrics::record_rule_changes(direction, ChangeKind::Revoke, count);
                        report.entries_revoked += count;
                    }
                    Err(e) => {
                        error!(group_id = %group.group_id, %direction, error = %e, "revoke failed");
                        metrics::record_api_error(direction, ChangeKind::Revoke);
                        report.failures += 1;
                        outcome = DirectionOutcome::Failed;
                    }
                }
            }
        }

        outcome
    }

    /// Reconcile immediately and then on every interval until the tripwire is triggered.
    pub async fn run(self, mut tripwire: Tripwire) -> Result<(), SyncError> {
        info!(
            interval_secs = self.config.interval_secs,
            tag_prefix = %self.config.tag_prefix,
            concurrency = self.config.concurrency,
            dry_run = self.config.dry_run,
            "Starting security-group-fqdn sync loop"
        );

        let mut interval = tokio::time::interval(self.config.interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sync_once().await {
                        warn!(error = %e, "reconciliation cycle failed");
                    }
                }
                _ = &mut tripwire => {
                    info!("sync loop shutdown requested");
                    break;
                }
            }
        }

        info!("sync loop stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::{IpPermission, RuleEntry};
    use crate::policy::Tag;
    use crate::provider::SnapshotProvider;
    use async_trait::async_trait;
    use std::net::IpAddr;

    struct StaticResolver(Vec<IpAddr>);

    #[async_trait]
    impl HostResolver for StaticResolver {
        async fn resolve(&self, _hostname: &str) -> Result<Vec<IpAddr>, SyncError> {
            Ok(self.0.clone())
        }
    }

    fn tracked_group() -> SecurityGroup {
        SecurityGroup {
            group_id: "sg-1".to_string(),
            group_name: "web".to_string(),
            tags: vec![Tag::new("security-group-fqdn:egress", "api.example.com")],
            ip_permissions_egress: vec![RuleEntry::ipv4(443, 443, "tcp", ["9.9.9.9/32"]).into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_dry_run_leaves_groups_untouched() {
        let provider = Arc::new(SnapshotProvider::from_groups(vec![tracked_group()]));
        let resolver = Arc::new(StaticResolver(vec!["1.2.3.4".parse().unwrap()]));
        let config = SyncConfig {
            dry_run: true,
            ..Default::default()
        };

        let syncer = Syncer::new(provider.clone(), resolver, config);
        let report = syncer.sync_once().await.unwrap();

        assert_eq!(report.directions_synced, 1);
        assert_eq!(report.directions_skipped, 1);
        assert_eq!(report.entries_authorized, 0);
        assert_eq!(report.entries_revoked, 0);
        assert_eq!(provider.group("sg-1").unwrap(), tracked_group());
    }

    #[tokio::test]
    async fn test_sync_once_applies_diff() {
        let provider = Arc::new(SnapshotProvider::from_groups(vec![tracked_group()]));
        let resolver = Arc::new(StaticResolver(vec!["1.2.3.4".parse().unwrap()]));

        let syncer = Syncer::new(provider.clone(), resolver, SyncConfig::default());
        let report = syncer.sync_once().await.unwrap();

        assert_eq!(report.groups, 1);
        assert_eq!(report.entries_authorized, 1);
        assert_eq!(report.entries_revoked, 1);
        let expected: IpPermission = RuleEntry::ipv4(443, 443, "tcp", ["1.2.3.4/32"]).into();
        assert_eq!(provider.group("sg-1").unwrap().ip_permissions_egress, vec![expected]);
    }
}
