//! security-group-fqdn binary entry point.

use clap::Parser;
use security_group_fqdn::{telemetry, Config, DnsResolver, SnapshotProvider, Syncer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tripwire::Tripwire;

/// Keeps tagged security group rules in sync with their hostnames.
#[derive(Parser, Debug)]
#[command(name = "security-group-fqdn")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML).
    #[arg(short, long, default_value = "security-group-fqdn.toml")]
    config: PathBuf,

    /// Run a single reconciliation cycle and exit.
    #[arg(long)]
    once: bool,

    /// Log the changes that would be made without applying them.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let mut config: Config = config::Config::builder()
        .add_source(config::File::from(args.config.clone()))
        .add_source(
            config::Environment::with_prefix("SG_FQDN")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;
    if args.dry_run {
        config.sync.dry_run = true;
    }

    telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    info!(
        config_file = %args.config.display(),
        snapshot = %config.provider.snapshot_path.display(),
        tag_prefix = %config.sync.tag_prefix,
        dry_run = config.sync.dry_run,
        "Starting security-group-fqdn"
    );

    let provider = SnapshotProvider::load(&config.provider.snapshot_path, config.provider.persist).await?;
    let resolver = DnsResolver::new(&config.resolver)?;
    let syncer = Syncer::new(Arc::new(provider), Arc::new(resolver), config.sync);

    let result = if args.once {
        syncer.sync_once().await.map(|_| ())
    } else {
        let (tripwire, tripwire_worker) = Tripwire::new_signals();
        tokio::spawn(tripwire_worker);
        syncer.run(tripwire).await
    };

    telemetry::shutdown();

    if let Err(e) = result {
        error!("security-group-fqdn error: {}", e);
        return Err(e.into());
    }

    info!("security-group-fqdn shutdown complete");
    Ok(())
}
