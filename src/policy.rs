//! Tag-driven reconciliation policy.
//!
//! A security group opts in by carrying a hostname tag for a direction.
//! Port range and protocol come from optional tags with fixed defaults:
//!
//! | Tag key | Meaning | Default |
//! |---|---|---|
//! | `<prefix>:ingress` | hostname for inbound rules | direction skipped |
//! | `<prefix>:egress` | hostname for outbound rules | direction skipped |
//! | `<prefix>:from-port` | first port | 443 |
//! | `<prefix>:to-port` | last port | 443 |
//! | `<prefix>:protocol` | protocol | tcp |

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Tag prefix used when none is configured.
pub const DEFAULT_TAG_PREFIX: &str = "security-group-fqdn";

/// Port used for either end of the range when the tag is missing or invalid.
pub const DEFAULT_PORT: i32 = 443;

/// Protocol used when the tag is missing or blank.
pub const DEFAULT_PROTOCOL: &str = "tcp";

/// Key/value tag attached to a security group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Build a tag from anything string-like.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Value of the first tag with the given key.
pub fn get_tag<'a>(tags: &'a [Tag], key: &str) -> Option<&'a str> {
    tags.iter()
        .find(|tag| tag.key == key)
        .map(|tag| tag.value.as_str())
}

/// Rule direction of a security group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Inbound rules.
    Ingress,
    /// Outbound rules.
    Egress,
}

impl Direction {
    /// Both directions, in processing order.
    pub const ALL: [Direction; 2] = [Direction::Ingress, Direction::Egress];

    /// Lowercase name, used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Ingress => "ingress",
            Direction::Egress => "egress",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The recognized tag keys, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSchema {
    ingress: String,
    egress: String,
    from_port: String,
    to_port: String,
    protocol: String,
}

impl Default for TagSchema {
    fn default() -> Self {
        Self::with_prefix(DEFAULT_TAG_PREFIX)
    }
}

impl TagSchema {
    /// Schema whose keys all share `prefix`.
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            ingress: format!("{prefix}:ingress"),
            egress: format!("{prefix}:egress"),
            from_port: format!("{prefix}:from-port"),
            to_port: format!("{prefix}:to-port"),
            protocol: format!("{prefix}:protocol"),
        }
    }

    /// Key of the hostname tag for a direction.
    pub fn hostname_key(&self, direction: Direction) -> &str {
        match direction {
            Direction::Ingress => &self.ingress,
            Direction::Egress => &self.egress,
        }
    }

    /// Key of the from-port tag.
    pub fn from_port_key(&self) -> &str {
        &self.from_port
    }

    /// Key of the to-port tag.
    pub fn to_port_key(&self) -> &str {
        &self.to_port
    }

    /// Key of the protocol tag.
    pub fn protocol_key(&self) -> &str {
        &self.protocol
    }

    /// Keys whose presence marks a group as managed.
    pub fn activation_keys(&self) -> Vec<String> {
        vec![self.ingress.clone(), self.egress.clone()]
    }

    /// Hostname to track for a direction. Blank values count as absent.
    pub fn target_hostname<'a>(&self, direction: Direction, tags: &'a [Tag]) -> Option<&'a str> {
        get_tag(tags, self.hostname_key(direction))
            .map(str::trim)
            .filter(|host| !host.is_empty())
    }
}

/// Desired port range and protocol for managed rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// First port of the managed range.
    pub from_port: i32,
    /// Last port of the managed range.
    pub to_port: i32,
    /// Protocol name or number, as the cloud API spells it.
    pub protocol: String,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            from_port: DEFAULT_PORT,
            to_port: DEFAULT_PORT,
            protocol: DEFAULT_PROTOCOL.to_string(),
        }
    }
}

impl Policy {
    /// Derive the policy from a group's tags.
    pub fn from_tags(schema: &TagSchema, tags: &[Tag]) -> Self {
        Self {
            from_port: parse_port(tags, schema.from_port_key()),
            to_port: parse_port(tags, schema.to_port_key()),
            protocol: get_tag(tags, schema.protocol_key())
                .map(str::trim)
                .filter(|protocol| !protocol.is_empty())
                .unwrap_or(DEFAULT_PROTOCOL)
                .to_string(),
        }
    }
}

fn parse_port(tags: &[Tag], key: &str) -> i32 {
    match get_tag(tags, key) {
        None => DEFAULT_PORT,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = raw, default = DEFAULT_PORT, "unparseable port tag");
            DEFAULT_PORT
        }),
    }
}
