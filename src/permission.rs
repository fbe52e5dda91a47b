//! Security group permission entries and their normalization.
//!
//! The cloud API hands out composite entries: one port range and protocol
//! with up to four grant lists (principals, IPv4 ranges, IPv6 ranges,
//! prefix lists), applied as a union. The reconciler works on normalized
//! [`RuleEntry`] values instead, each carrying exactly one addressing family.

use serde::{Deserialize, Serialize};
use std::fmt;

/// IPv4 CIDR grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpRange {
    /// CIDR block, e.g. `1.2.3.4/32`.
    pub cidr_ip: String,
    /// Optional rule description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl IpRange {
    /// Grant for a single CIDR block with no description.
    pub fn new(cidr_ip: impl Into<String>) -> Self {
        Self {
            cidr_ip: cidr_ip.into(),
            description: None,
        }
    }
}

/// IPv6 CIDR grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ipv6Range {
    /// CIDR block, e.g. `2001:db8::1/128`.
    pub cidr_ipv6: String,
    /// Optional rule description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Ipv6Range {
    /// Grant for a single CIDR block with no description.
    pub fn new(cidr_ipv6: impl Into<String>) -> Self {
        Self {
            cidr_ipv6: cidr_ipv6.into(),
            description: None,
        }
    }
}

/// Cross-account or security-group principal grant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserIdGroupPair {
    /// Referenced security group id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Referenced security group name (default VPC only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    /// Account owning the referenced group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// VPC of the referenced group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    /// Peering connection used to reach the referenced group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_peering_connection_id: Option<String>,
    /// Status of that peering connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peering_status: Option<String>,
    /// Optional rule description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl UserIdGroupPair {
    fn same_principal(&self, other: &Self) -> bool {
        self.group_id == other.group_id
            && self.group_name == other.group_name
            && self.user_id == other.user_id
    }
}

/// Managed prefix list grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PrefixListId {
    /// Prefix list identifier, e.g. `pl-12345678`.
    pub prefix_list_id: String,
    /// Optional rule description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Composite permission entry as exchanged with the cloud API.
///
/// Ports are absent for all-traffic rules (protocol `-1`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpPermission {
    /// First port, or ICMP type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_port: Option<i32>,
    /// Last port, or ICMP code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_port: Option<i32>,
    /// Protocol name or number. `-1` means all traffic.
    pub ip_protocol: String,
    /// Principal grants.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_id_group_pairs: Vec<UserIdGroupPair>,
    /// IPv4 grants.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_ranges: Vec<IpRange>,
    /// IPv6 grants.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ipv6_ranges: Vec<Ipv6Range>,
    /// Prefix list grants.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefix_list_ids: Vec<PrefixListId>,
}

impl IpPermission {
    /// Empty permission for the given ports and protocol.
    pub fn empty(from_port: Option<i32>, to_port: Option<i32>, protocol: &str) -> Self {
        Self {
            from_port,
            to_port,
            ip_protocol: protocol.to_string(),
            ..Default::default()
        }
    }

    /// True if this entry has the same port range and protocol as `entry`.
    pub fn same_rule(&self, entry: &RuleEntry) -> bool {
        self.from_port == entry.from_port
            && self.to_port == entry.to_port
            && self.ip_protocol == entry.protocol
    }

    /// True if at least one grant list is non-empty.
    pub fn has_grants(&self) -> bool {
        !(self.user_id_group_pairs.is_empty()
            && self.ip_ranges.is_empty()
            && self.ipv6_ranges.is_empty()
            && self.prefix_list_ids.is_empty())
    }

    /// Number of non-empty grant lists.
    pub fn family_count(&self) -> usize {
        [
            !self.user_id_group_pairs.is_empty(),
            !self.ip_ranges.is_empty(),
            !self.ipv6_ranges.is_empty(),
            !self.prefix_list_ids.is_empty(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }

    /// Add grants not already present. CIDR grants are keyed by block,
    /// prefix lists by id, principals by group/user.
    pub fn add_grants(&mut self, grants: &Grants) {
        match grants {
            Grants::Principals(pairs) => {
                for pair in pairs {
                    if !self.user_id_group_pairs.iter().any(|p| p.same_principal(pair)) {
                        self.user_id_group_pairs.push(pair.clone());
                    }
                }
            }
            Grants::Ipv4(ranges) => {
                for range in ranges {
                    if !self.ip_ranges.iter().any(|r| r.cidr_ip == range.cidr_ip) {
                        self.ip_ranges.push(range.clone());
                    }
                }
            }
            Grants::Ipv6(ranges) => {
                for range in ranges {
                    if !self.ipv6_ranges.iter().any(|r| r.cidr_ipv6 == range.cidr_ipv6) {
                        self.ipv6_ranges.push(range.clone());
                    }
                }
            }
            Grants::PrefixLists(ids) => {
                for id in ids {
                    if !self
                        .prefix_list_ids
                        .iter()
                        .any(|p| p.prefix_list_id == id.prefix_list_id)
                    {
                        self.prefix_list_ids.push(id.clone());
                    }
                }
            }
        }
    }

    /// Remove matching grants, keyed the same way as [`IpPermission::add_grants`].
    pub fn remove_grants(&mut self, grants: &Grants) {
        match grants {
            Grants::Principals(pairs) => self
                .user_id_group_pairs
                .retain(|p| !pairs.iter().any(|q| q.same_principal(p))),
            Grants::Ipv4(ranges) => self
                .ip_ranges
                .retain(|r| !ranges.iter().any(|q| q.cidr_ip == r.cidr_ip)),
            Grants::Ipv6(ranges) => self
                .ipv6_ranges
                .retain(|r| !ranges.iter().any(|q| q.cidr_ipv6 == r.cidr_ipv6)),
            Grants::PrefixLists(ids) => self
                .prefix_list_ids
                .retain(|p| !ids.iter().any(|q| q.prefix_list_id == p.prefix_list_id)),
        }
    }
}

/// The four ways a rule can name its peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// Security group / account references.
    Principal,
    /// IPv4 CIDR blocks.
    Ipv4,
    /// IPv6 CIDR blocks.
    Ipv6,
    /// Managed prefix lists.
    PrefixList,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddressFamily::Principal => "principal",
            AddressFamily::Ipv4 => "ipv4",
            AddressFamily::Ipv6 => "ipv6",
            AddressFamily::PrefixList => "prefix_list",
        };
        f.write_str(name)
    }
}

/// Grant list of a normalized entry: exactly one addressing family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grants {
    /// Security group / account references.
    Principals(Vec<UserIdGroupPair>),
    /// IPv4 CIDR blocks.
    Ipv4(Vec<IpRange>),
    /// IPv6 CIDR blocks.
    Ipv6(Vec<Ipv6Range>),
    /// Managed prefix lists.
    PrefixLists(Vec<PrefixListId>),
}

impl Grants {
    /// Addressing family of this grant list.
    pub fn family(&self) -> AddressFamily {
        match self {
            Grants::Principals(_) => AddressFamily::Principal,
            Grants::Ipv4(_) => AddressFamily::Ipv4,
            Grants::Ipv6(_) => AddressFamily::Ipv6,
            Grants::PrefixLists(_) => AddressFamily::PrefixList,
        }
    }

    /// Number of grants in the list.
    pub fn len(&self) -> usize {
        match self {
            Grants::Principals(v) => v.len(),
            Grants::Ipv4(v) => v.len(),
            Grants::Ipv6(v) => v.len(),
            Grants::PrefixLists(v) => v.len(),
        }
    }

    /// True if the list has no grants.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Normalized permission entry carrying a single addressing family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEntry {
    /// First port, absent for all-traffic rules.
    pub from_port: Option<i32>,
    /// Last port, absent for all-traffic rules.
    pub to_port: Option<i32>,
    /// Protocol name or number.
    pub protocol: String,
    /// Grants of a single addressing family.
    pub grants: Grants,
}

impl RuleEntry {
    /// IPv4 entry granting the given CIDR blocks.
    pub fn ipv4<I, S>(from_port: i32, to_port: i32, protocol: &str, cidrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            from_port: Some(from_port),
            to_port: Some(to_port),
            protocol: protocol.to_string(),
            grants: Grants::Ipv4(cidrs.into_iter().map(IpRange::new).collect()),
        }
    }

    /// CIDR blocks of an IPv4 entry, `None` for every other family.
    pub fn ipv4_cidrs(&self) -> Option<Vec<String>> {
        match &self.grants {
            Grants::Ipv4(ranges) => Some(ranges.iter().map(|r| r.cidr_ip.clone()).collect()),
            _ => None,
        }
    }
}

impl From<RuleEntry> for IpPermission {
    fn from(entry: RuleEntry) -> Self {
        let mut permission = IpPermission::empty(entry.from_port, entry.to_port, &entry.protocol);
        match entry.grants {
            Grants::Principals(v) => permission.user_id_group_pairs = v,
            Grants::Ipv4(v) => permission.ip_ranges = v,
            Grants::Ipv6(v) => permission.ipv6_ranges = v,
            Grants::PrefixLists(v) => permission.prefix_list_ids = v,
        }
        permission
    }
}

/// Split a composite entry into one entry per non-empty grant list.
///
/// Families are emitted in a fixed order: principals, IPv4, IPv6, prefix
/// lists. An entry with no grants yields nothing.
pub fn normalize(permission: &IpPermission) -> Vec<RuleEntry> {
    let with = |grants: Grants| RuleEntry {
        from_port: permission.from_port,
        to_port: permission.to_port,
        protocol: permission.ip_protocol.clone(),
        grants,
    };

    let mut entries = Vec::with_capacity(permission.family_count());
    if !permission.user_id_group_pairs.is_empty() {
        entries.push(with(Grants::Principals(permission.user_id_group_pairs.clone())));
    }
    if !permission.ip_ranges.is_empty() {
        entries.push(with(Grants::Ipv4(permission.ip_ranges.clone())));
    }
    if !permission.ipv6_ranges.is_empty() {
        entries.push(with(Grants::Ipv6(permission.ipv6_ranges.clone())));
    }
    if !permission.prefix_list_ids.is_empty() {
        entries.push(with(Grants::PrefixLists(permission.prefix_list_ids.clone())));
    }
    entries
}

/// Normalize every entry and flatten the result.
pub fn normalize_all(permissions: &[IpPermission]) -> Vec<RuleEntry> {
    permissions.iter().flat_map(normalize).collect()
}

/// Fold normalized entries back into composite entries, one per
/// port range and protocol, in first-seen order.
pub fn merge(entries: &[RuleEntry]) -> Vec<IpPermission> {
    let mut merged: Vec<IpPermission> = Vec::new();
    for entry in entries {
        match merged.iter_mut().find(|p| p.same_rule(entry)) {
            Some(permission) => permission.add_grants(&entry.grants),
            None => {
                let mut permission =
                    IpPermission::empty(entry.from_port, entry.to_port, &entry.protocol);
                permission.add_grants(&entry.grants);
                merged.push(permission);
            }
        }
    }
    merged
}
