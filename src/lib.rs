//! security-group-fqdn - keeps security group rules pointed at a hostname.
//!
//! A security group opts in with a tag naming a hostname for its ingress or
//! egress rules. Every cycle the hostname is resolved and the group's rules
//! are reconciled so that exactly the resolved addresses are allowed on the
//! configured port range and protocol. Anything else on that direction is
//! revoked.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     security-group-fqdn                      │
//! │                                                              │
//! │  ┌──────────────────┐        ┌──────────────────┐            │
//! │  │ SecurityGroupApi │──────▶ │      Syncer      │◀── interval │
//! │  │ (describe,       │ groups │  per group and   │            │
//! │  │  authorize,      │        │  direction       │            │
//! │  │  revoke)         │◀────── │                  │            │
//! │  └──────────────────┘  diff  └────────┬─────────┘            │
//! │                                       │                      │
//! │                     ┌─────────────────┼────────────────┐     │
//! │                     ▼                 ▼                ▼     │
//! │              ┌────────────┐   ┌─────────────┐  ┌───────────┐ │
//! │              │ Policy     │   │ HostResolver│  │ reconcile │ │
//! │              │ (tags)     │   │ (hickory)   │  │ (pure)    │ │
//! │              └────────────┘   └─────────────┘  └───────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use security_group_fqdn::{DnsResolver, SnapshotProvider, SyncConfig, Syncer};
//! use std::sync::Arc;
//! use tripwire::Tripwire;
//!
//! #[tokio::main]
//! async fn main() {
//!     let provider = SnapshotProvider::load("groups.json".as_ref(), true).await.unwrap();
//!     let resolver = DnsResolver::new(&Default::default()).unwrap();
//!
//!     let (tripwire, worker) = Tripwire::new_signals();
//!     tokio::spawn(worker);
//!
//!     let syncer = Syncer::new(Arc::new(provider), Arc::new(resolver), SyncConfig::default());
//!     syncer.run(tripwire).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod permission;
pub mod policy;
pub mod provider;
pub mod reconcile;
pub mod resolver;
pub mod sync;
pub mod telemetry;

// Re-export main types
pub use config::{Config, ProviderConfig, ResolverConfig, SyncConfig, TelemetryConfig};
pub use error::SyncError;
pub use permission::{normalize, Grants, IpPermission, RuleEntry};
pub use policy::{Direction, Policy, TagSchema};
pub use provider::{SecurityGroup, SecurityGroupApi, SnapshotProvider};
pub use reconcile::{reconcile, RuleDiff};
pub use resolver::{DnsResolver, HostResolver};
pub use sync::{SyncReport, Syncer};
