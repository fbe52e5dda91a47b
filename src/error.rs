//! Error types for security-group-fqdn.

use thiserror::Error;

/// Errors raised by the collaborators around the reconciler.
///
/// The reconciler itself never fails; everything here comes from hostname
/// resolution, the cloud API and the snapshot file.
#[derive(Debug, Error)]
pub enum SyncError {
    /// IO error (snapshot file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot document could not be parsed or written
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Hostname resolution failed
    #[error("Resolve error: {0}")]
    Resolve(#[from] hickory_resolver::ResolveError),

    /// Security group referenced by a rule change does not exist
    #[error("Security group not found: {0}")]
    GroupNotFound(String),

    /// Cloud API rejected a request
    #[error("Provider error: {0}")]
    Provider(String),
}
