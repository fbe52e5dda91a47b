//! Configuration types for security-group-fqdn.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::policy::{TagSchema, DEFAULT_TAG_PREFIX};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Reconciliation loop configuration.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Hostname resolver configuration.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Security group source configuration.
    pub provider: ProviderConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Reconciliation loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between reconciliation cycles.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Prefix shared by all recognized tag keys.
    #[serde(default = "default_tag_prefix")]
    pub tag_prefix: String,

    /// Maximum number of groups reconciled at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Compute and log changes without applying them.
    #[serde(default)]
    pub dry_run: bool,
}

impl SyncConfig {
    /// Interval between cycles.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Tag keys derived from the configured prefix.
    pub fn tag_schema(&self) -> TagSchema {
        TagSchema::with_prefix(&self.tag_prefix)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            tag_prefix: default_tag_prefix(),
            concurrency: default_concurrency(),
            dry_run: false,
        }
    }
}

/// Hostname resolver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Nameservers to query. Empty means the system configuration.
    #[serde(default)]
    pub nameservers: Vec<IpAddr>,

    /// Port the nameservers listen on.
    #[serde(default = "default_dns_port")]
    pub port: u16,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            nameservers: Vec::new(),
            port: default_dns_port(),
        }
    }
}

/// Security group source configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// DescribeSecurityGroups-shaped JSON document to manage.
    pub snapshot_path: PathBuf,

    /// Write applied changes back to the snapshot file.
    #[serde(default)]
    pub persist: bool,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "security_group_fqdn=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,

    /// OpenTelemetry configuration.
    #[serde(default)]
    pub opentelemetry: Option<OpenTelemetryConfig>,
}

/// OpenTelemetry exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTelemetryConfig {
    /// OTLP endpoint (e.g., "http://localhost:4317").
    pub endpoint: String,

    /// Service name for traces.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
            opentelemetry: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "security-group-fqdn".to_string()
}

fn default_interval_secs() -> u64 {
    300
}

fn default_tag_prefix() -> String {
    DEFAULT_TAG_PREFIX.to_string()
}

fn default_concurrency() -> usize {
    4
}

fn default_dns_port() -> u16 {
    53
}
