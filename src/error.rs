//! Error types for cluster lifecycle operations

use std::time::Duration;

use thiserror::Error;

/// Errors returned by [`ClusterController`](crate::cluster::ClusterController) operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Scale or Connect was called before a successful Create.
    #[error("Cluster is not initialized")]
    Uninitialized,

    /// Create was called on a cluster that is already up.
    #[error("Cluster is already initialized")]
    AlreadyInitialized,

    #[error("Invalid cluster id '{cluster_id}': {reason}")]
    InvalidClusterId { cluster_id: String, reason: String },

    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    /// Pod template could not be parsed or has the wrong shape.
    #[error("Invalid pod template: {0}")]
    InvalidTemplate(String),

    #[error("Replica count {0} is out of range")]
    InvalidReplicas(u32),

    /// The platform already holds a resource with this name.
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The platform accepted a resource but left out a field we depend on.
    #[error("{kind} '{name}' is missing {field}")]
    IncompleteResource {
        kind: &'static str,
        name: String,
        field: &'static str,
    },

    #[error("Could not connect to scheduler at {address} after {attempts} attempts: {last_error}")]
    ConnectionExhausted {
        address: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Timed out after {waited:?} waiting for {operation}: {detail}")]
    ConvergenceTimeout {
        operation: &'static str,
        waited: Duration,
        detail: String,
    },

    /// A cluster client query failed.
    #[error("Cluster client error: {0}")]
    Client(String),
}

pub type ClusterResult<T> = Result<T, ClusterError>;

impl From<serde_yaml::Error> for ClusterError {
    fn from(err: serde_yaml::Error) -> Self {
        ClusterError::InvalidTemplate(err.to_string())
    }
}

impl ClusterError {
    /// Map a create-time API error, turning 409 into [`ClusterError::AlreadyExists`].
    pub(crate) fn from_create(err: kube::Error, kind: &'static str, name: &str) -> Self {
        match err {
            kube::Error::Api(e) if e.code == 409 => ClusterError::AlreadyExists {
                kind,
                name: name.to_string(),
            },
            other => ClusterError::Kube(other),
        }
    }
}

/// True when a Kubernetes error means the resource does not exist.
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 404)
}
