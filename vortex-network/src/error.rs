//! Error types for network provisioning and lifecycle operations.

use thiserror::Error;

/// Errors that can occur while provisioning, persisting or tearing down a network.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Malformed request, missing fields or an unsupported network type.
    #[error("Invalid network spec: {0}")]
    InvalidSpec(String),

    /// Duplicate network name, or the external resource exists with a
    /// different configuration.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The referenced network does not exist.
    #[error("Network not found: {0}")]
    NotFound(String),

    /// Deletion blocked by running workloads bound to the network.
    #[error("Network {network} is still used by {} workload(s): {}", .workloads.len(), .workloads.join(", "))]
    InUse {
        network: String,
        workloads: Vec<String>,
    },

    /// The substrate failed to create the external resource.
    #[error("Failed to provision network: {0}")]
    ProvisionFailure(String),

    /// The substrate failed to remove the external resource.
    #[error("Failed to deprovision network: {0}")]
    DeprovisionFailure(String),

    /// A create failed and the compensating delete failed as well, leaving an
    /// orphaned external resource behind.
    #[error("{primary} (compensation for bridge {bridge_name} also failed: {compensation})")]
    CompensationFailed {
        primary: Box<NetworkError>,
        compensation: Box<NetworkError>,
        bridge_name: String,
    },

    /// The record store or the workload collaborator could not be reached.
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`NetworkError`], used by outer layers to map
/// errors onto their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidSpec,
    Conflict,
    NotFound,
    InUse,
    ProvisionFailure,
    DeprovisionFailure,
    CompensationFailure,
    DependencyUnavailable,
    Internal,
}

impl NetworkError {
    /// Get the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NetworkError::InvalidSpec(_) => ErrorKind::InvalidSpec,
            NetworkError::Conflict(_) => ErrorKind::Conflict,
            NetworkError::NotFound(_) => ErrorKind::NotFound,
            NetworkError::InUse { .. } => ErrorKind::InUse,
            NetworkError::ProvisionFailure(_) => ErrorKind::ProvisionFailure,
            NetworkError::DeprovisionFailure(_) => ErrorKind::DeprovisionFailure,
            NetworkError::CompensationFailed { .. } => ErrorKind::CompensationFailure,
            NetworkError::DependencyUnavailable(_) => ErrorKind::DependencyUnavailable,
            NetworkError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The error that caused the operation to fail.
    ///
    /// For a compensation failure this is the original error, not the
    /// secondary one raised while undoing the create.
    pub fn primary(&self) -> &NetworkError {
        match self {
            NetworkError::CompensationFailed { primary, .. } => primary.primary(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, NetworkError::NotFound(_))
    }
}

/// Result type alias for network operations.
pub type Result<T> = std::result::Result<T, NetworkError>;
