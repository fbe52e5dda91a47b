//! Security group source and sink.
//!
//! [`SecurityGroupApi`] is the seam to the cloud provider: list the groups
//! carrying the activation tags and push authorize/revoke changes. The
//! bundled [`SnapshotProvider`] serves a DescribeSecurityGroups-shaped JSON
//! document and applies changes to it in memory.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::SyncError;
use crate::permission::{normalize, IpPermission};
use crate::policy::{Direction, Tag};

/// A security group as returned by DescribeSecurityGroups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityGroup {
    /// Group identifier, e.g. `sg-0123456789abcdef0`.
    pub group_id: String,
    /// Human readable name.
    #[serde(default)]
    pub group_name: String,
    /// Tags driving reconciliation.
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Ingress rules.
    #[serde(default)]
    pub ip_permissions: Vec<IpPermission>,
    /// Egress rules.
    #[serde(default)]
    pub ip_permissions_egress: Vec<IpPermission>,
    /// Remaining attributes (VpcId, OwnerId, ...), kept as-is.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SecurityGroup {
    /// Rules for a direction.
    pub fn permissions(&self, direction: Direction) -> &[IpPermission] {
        match direction {
            Direction::Ingress => &self.ip_permissions,
            Direction::Egress => &self.ip_permissions_egress,
        }
    }

    fn permissions_mut(&mut self, direction: Direction) -> &mut Vec<IpPermission> {
        match direction {
            Direction::Ingress => &mut self.ip_permissions,
            Direction::Egress => &mut self.ip_permissions_egress,
        }
    }

    /// True if the group carries any of the given tag keys.
    pub fn has_any_tag(&self, keys: &[String]) -> bool {
        self.tags.iter().any(|tag| keys.contains(&tag.key))
    }

    /// Add grants, merging into existing rules with the same ports and protocol.
    pub fn apply_authorize(&mut self, direction: Direction, permissions: &[IpPermission]) {
        let rules = self.permissions_mut(direction);
        for entry in permissions.iter().flat_map(normalize) {
            match rules.iter_mut().find(|rule| rule.same_rule(&entry)) {
                Some(rule) => rule.add_grants(&entry.grants),
                None => rules.push(entry.into()),
            }
        }
    }

    /// Remove grants, dropping rules left with none.
    pub fn apply_revoke(&mut self, direction: Direction, permissions: &[IpPermission]) {
        let rules = self.permissions_mut(direction);
        for entry in permissions.iter().flat_map(normalize) {
            for rule in rules.iter_mut().filter(|rule| rule.same_rule(&entry)) {
                rule.remove_grants(&entry.grants);
            }
        }
        rules.retain(IpPermission::has_grants);
    }
}

/// Cloud API operations the reconciler needs.
#[async_trait]
pub trait SecurityGroupApi: Send + Sync {
    /// Groups carrying at least one of `tag_keys`.
    async fn describe_tagged_groups(
        &self,
        tag_keys: &[String],
    ) -> Result<Vec<SecurityGroup>, SyncError>;

    /// Add rules to a group.
    async fn authorize(
        &self,
        group_id: &str,
        direction: Direction,
        permissions: Vec<IpPermission>,
    ) -> Result<(), SyncError>;

    /// Remove rules from a group.
    async fn revoke(
        &self,
        group_id: &str,
        direction: Direction,
        permissions: Vec<IpPermission>,
    ) -> Result<(), SyncError>;
}

/// DescribeSecurityGroups response body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityGroupsDocument {
    /// Groups in the document.
    #[serde(default)]
    pub security_groups: Vec<SecurityGroup>,
}

/// Provider serving security groups from a JSON snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotProvider {
    groups: Arc<RwLock<Vec<SecurityGroup>>>,
    path: Option<PathBuf>,
    write_lock: Arc<Mutex<()>>,
}

impl SnapshotProvider {
    /// In-memory provider over the given groups.
    pub fn from_groups(groups: Vec<SecurityGroup>) -> Self {
        Self {
            groups: Arc::new(RwLock::new(groups)),
            path: None,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Load a snapshot file. With `persist`, changes are written back to it.
    pub async fn load(path: &Path, persist: bool) -> Result<Self, SyncError> {
        let raw = tokio::fs::read(path).await?;
        let document: SecurityGroupsDocument = serde_json::from_slice(&raw)?;
        info!(
            path = %path.display(),
            groups = document.security_groups.len(),
            persist,
            "loaded security group snapshot"
        );

        let mut provider = Self::from_groups(document.security_groups);
        if persist {
            provider.path = Some(path.to_path_buf());
        }
        Ok(provider)
    }

    /// Copy of one group.
    pub fn group(&self, group_id: &str) -> Option<SecurityGroup> {
        self.groups
            .read()
            .iter()
            .find(|g| g.group_id == group_id)
            .cloned()
    }

    fn update<F>(&self, group_id: &str, f: F) -> Result<(), SyncError>
    where
        F: FnOnce(&mut SecurityGroup),
    {
        let mut groups = self.groups.write();
        let group = groups
            .iter_mut()
            .find(|g| g.group_id == group_id)
            .ok_or_else(|| SyncError::GroupNotFound(group_id.to_string()))?;
        f(group);
        Ok(())
    }

    async fn persist(&self) -> Result<(), SyncError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        // Serialize inside the write lock so the last write carries the latest state.
        let _guard = self.write_lock.lock().await;
        let body = {
            let document = SecurityGroupsDocument {
                security_groups: self.groups.read().clone(),
            };
            serde_json::to_vec_pretty(&document)?
        };
        tokio::fs::write(path, body).await?;
        debug!(path = %path.display(), "persisted security group snapshot");
        Ok(())
    }
}

#[async_trait]
impl SecurityGroupApi for SnapshotProvider {
    async fn describe_tagged_groups(
        &self,
        tag_keys: &[String],
    ) -> Result<Vec<SecurityGroup>, SyncError> {
        Ok(self
            .groups
            .read()
            .iter()
            .filter(|g| g.has_any_tag(tag_keys))
            .cloned()
            .collect())
    }

    async fn authorize(
        &self,
        group_id: &str,
        direction: Direction,
        permissions: Vec<IpPermission>,
    ) -> Result<(), SyncError> {
        self.update(group_id, |g| g.apply_authorize(direction, &permissions))?;
        self.persist().await
    }

    async fn revoke(
        &self,
        group_id: &str,
        direction: Direction,
        permissions: Vec<IpPermission>,
    ) -> Result<(), SyncError> {
        self.update(group_id, |g| g.apply_revoke(direction, &permissions))?;
        self.persist().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::{IpRange, Ipv6Range, RuleEntry};

    fn https(ranges: &[&str]) -> IpPermission {
        RuleEntry::ipv4(443, 443, "tcp", ranges.iter().copied()).into()
    }

    fn group(id: &str, tags: Vec<Tag>) -> SecurityGroup {
        SecurityGroup {
            group_id: id.to_string(),
            group_name: format!("{id}-name"),
            tags,
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_authorize_merges_into_existing_rule() {
        let mut g = group("sg-1", vec![]);
        g.ip_permissions_egress = vec![https(&["1.1.1.1/32"])];

        g.apply_authorize(Direction::Egress, &[https(&["2.2.2.2/32", "1.1.1.1/32"])]);

        assert_eq!(g.ip_permissions_egress, vec![https(&["1.1.1.1/32", "2.2.2.2/32"])]);
        assert!(g.ip_permissions.is_empty());
    }

    #[test]
    fn test_apply_authorize_adds_new_rule() {
        let mut g = group("sg-1", vec![]);
        g.ip_permissions = vec![https(&["1.1.1.1/32"])];

        let dns: IpPermission = RuleEntry::ipv4(53, 53, "udp", ["8.8.8.8/32"]).into();
        g.apply_authorize(Direction::Ingress, &[dns.clone()]);

        assert_eq!(g.ip_permissions, vec![https(&["1.1.1.1/32"]), dns]);
    }

    #[test]
    fn test_apply_revoke_drops_empty_rules() {
        let mut g = group("sg-1", vec![]);
        let mut rule = https(&["1.1.1.1/32", "2.2.2.2/32"]);
        rule.ipv6_ranges = vec![Ipv6Range::new("::/0")];
        g.ip_permissions = vec![rule];

        g.apply_revoke(Direction::Ingress, &[https(&["1.1.1.1/32"])]);
        assert_eq!(g.ip_permissions[0].ip_ranges, vec![IpRange::new("2.2.2.2/32")]);

        let mut rest = https(&["2.2.2.2/32"]);
        rest.ipv6_ranges = vec![Ipv6Range::new("::/0")];
        g.apply_revoke(Direction::Ingress, &[rest]);
        assert!(g.ip_permissions.is_empty());
    }

    #[test]
    fn test_parses_describe_response() {
        let json = r#"{
            "SecurityGroups": [{
                "GroupId": "sg-0123",
                "GroupName": "web",
                "VpcId": "vpc-1",
                "Tags": [{"Key": "security-group-fqdn:egress", "Value": "api.example.com"}],
                "IpPermissions": [],
                "IpPermissionsEgress": [{
                    "FromPort": 443, "ToPort": 443, "IpProtocol": "tcp",
                    "IpRanges": [{"CidrIp": "1.2.3.4/32"}]
                }]
            }]
        }"#;
        let document: SecurityGroupsDocument = serde_json::from_str(json).unwrap();
        let g = &document.security_groups[0];

        assert_eq!(g.group_id, "sg-0123");
        assert_eq!(g.permissions(Direction::Egress), &[https(&["1.2.3.4/32"])]);
        assert_eq!(g.extra.get("VpcId"), Some(&serde_json::json!("vpc-1")));
    }

    #[tokio::test]
    async fn test_describe_filters_by_tag_key() {
        let provider = SnapshotProvider::from_groups(vec![
            group("sg-1", vec![Tag::new("security-group-fqdn:ingress", "a.example.com")]),
            group("sg-2", vec![Tag::new("Name", "untracked")]),
        ]);
        let keys = vec![
            "security-group-fqdn:ingress".to_string(),
            "security-group-fqdn:egress".to_string(),
        ];

        let groups = provider.describe_tagged_groups(&keys).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].group_id, "sg-1");
    }

    #[tokio::test]
    async fn test_unknown_group_is_an_error() {
        let provider = SnapshotProvider::from_groups(vec![]);

        let result = provider
            .authorize("sg-missing", Direction::Ingress, vec![https(&["1.1.1.1/32"])])
            .await;
        assert!(matches!(result, Err(SyncError::GroupNotFound(id)) if id == "sg-missing"));
    }

    #[tokio::test]
    async fn test_persists_changes_to_snapshot() {
        let path = std::env::temp_dir().join(format!(
            "security-group-fqdn-snapshot-{}.json",
            std::process::id()
        ));
        let document = SecurityGroupsDocument {
            security_groups: vec![group("sg-1", vec![])],
        };
        std::fs::write(&path, serde_json::to_vec(&document).unwrap()).unwrap();

        let provider = SnapshotProvider::load(&path, true).await.unwrap();
        provider
            .authorize("sg-1", Direction::Egress, vec![https(&["1.2.3.4/32"])])
            .await
            .unwrap();

        let reloaded = SnapshotProvider::load(&path, false).await.unwrap();
        let g = reloaded.group("sg-1").unwrap();
        assert_eq!(g.ip_permissions_egress, vec![https(&["1.2.3.4/32"])]);

        std::fs::remove_file(&path).unwrap();
    }
}
