//! Hostname resolution for tracked groups.

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig as HickoryConfig};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use std::net::IpAddr;
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::error::SyncError;
use crate::metrics::{self, Timer};

/// Resolves a hostname to its current addresses.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Addresses currently published for `hostname`.
    async fn resolve(&self, hostname: &str) -> Result<Vec<IpAddr>, SyncError>;
}

/// Resolver backed by hickory.
#[derive(Clone)]
pub struct DnsResolver {
    resolver: TokioResolver,
}

impl DnsResolver {
    /// Build a resolver from configuration.
    ///
    /// With no nameservers configured the system configuration is used.
    pub fn new(config: &ResolverConfig) -> Result<Self, SyncError> {
        let resolver = if config.nameservers.is_empty() {
            info!("using system resolver configuration");
            TokioResolver::builder_tokio()?.build()
        } else {
            info!(nameservers = ?config.nameservers, port = config.port, "using configured nameservers");
            let group = NameServerConfigGroup::from_ips_clear(&config.nameservers, config.port, true);
            let hickory_config = HickoryConfig::from_parts(None, vec![], group);
            TokioResolver::builder_with_config(hickory_config, TokioConnectionProvider::default())
                .build()
        };

        Ok(Self { resolver })
    }
}

#[async_trait]
impl HostResolver for DnsResolver {
    async fn resolve(&self, hostname: &str) -> Result<Vec<IpAddr>, SyncError> {
        let lookup = self.resolver.lookup_ip(hostname).await?;
        Ok(lookup.iter().collect())
    }
}

/// CIDR block covering exactly `addr`.
pub fn to_cidr(addr: IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => format!("{v4}/32"),
        IpAddr::V6(v6) => format!("{v6}/128"),
    }
}

/// Resolve `hostname` into the IPv4 CIDR blocks to authorize.
///
/// Resolution failures yield an empty list, which revokes every managed
/// block for the direction. IPv6 answers are dropped since only IPv4 rules
/// are managed.
pub async fn resolve_cidrs(resolver: &dyn HostResolver, hostname: &str) -> Vec<String> {
    let timer = Timer::start();
    let addrs = match resolver.resolve(hostname).await {
        Ok(addrs) => {
            metrics::record_resolution(true, timer.elapsed());
            addrs
        }
        Err(e) => {
            metrics::record_resolution(false, timer.elapsed());
            warn!(hostname, error = %e, "hostname resolution failed, treating as no addresses");
            return Vec::new();
        }
    };

    let mut cidrs: Vec<String> = Vec::with_capacity(addrs.len());
    for addr in addrs {
        if addr.is_ipv6() {
            debug!(hostname, %addr, "ignoring IPv6 answer");
            continue;
        }
        let cidr = to_cidr(addr);
        if !cidrs.contains(&cidr) {
            cidrs.push(cidr);
        }
    }

    debug!(hostname, resolved = ?cidrs, "resolved hostname");
    cidrs
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Result<Vec<IpAddr>, String>);

    #[async_trait]
    impl HostResolver for Fixed {
        async fn resolve(&self, _hostname: &str) -> Result<Vec<IpAddr>, SyncError> {
            self.0.clone().map_err(SyncError::Provider)
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_to_cidr() {
        assert_eq!(to_cidr(ip("1.2.3.4")), "1.2.3.4/32");
        assert_eq!(to_cidr(ip("2001:db8::1")), "2001:db8::1/128");
    }

    #[tokio::test]
    async fn test_resolve_cidrs_keeps_ipv4_only() {
        let resolver = Fixed(Ok(vec![ip("1.2.3.4"), ip("2001:db8::1"), ip("5.6.7.8")]));

        let cidrs = resolve_cidrs(&resolver, "api.example.com").await;
        assert_eq!(cidrs, vec!["1.2.3.4/32", "5.6.7.8/32"]);
    }

    #[tokio::test]
    async fn test_resolve_cidrs_deduplicates() {
        let resolver = Fixed(Ok(vec![ip("1.2.3.4"), ip("1.2.3.4")]));

        let cidrs = resolve_cidrs(&resolver, "api.example.com").await;
        assert_eq!(cidrs, vec!["1.2.3.4/32"]);
    }

    #[tokio::test]
    async fn test_resolve_failure_is_empty() {
        let resolver = Fixed(Err("SERVFAIL".to_string()));

        let cidrs = resolve_cidrs(&resolver, "api.example.com").await;
        assert!(cidrs.is_empty());
    }
}
