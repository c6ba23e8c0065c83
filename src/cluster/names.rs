//! Resource names derived from a cluster id

use crate::error::{ClusterError, ClusterResult};

/// Longest cluster id whose dashboard service name still fits in 63 characters
pub const MAX_CLUSTER_ID_LEN: usize = 63 - "dask-scheduler--dashboard".len();

/// Names of the four resources backing one cluster.
///
/// Every name is a pure function of the cluster id, so a controller rebuilt
/// from `(namespace, cluster_id)` addresses the same resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub scheduler_service: String,
    pub dashboard_service: String,
    pub scheduler_deployment: String,
    pub worker_deployment: String,
}

impl ResourceNames {
    pub fn for_cluster(cluster_id: &str) -> Self {
        Self {
            scheduler_service: scheduler_service_name(cluster_id),
            dashboard_service: dashboard_service_name(cluster_id),
            scheduler_deployment: scheduler_deployment_name(cluster_id),
            worker_deployment: worker_deployment_name(cluster_id),
        }
    }
}

pub fn scheduler_service_name(cluster_id: &str) -> String {
    format!("dask-scheduler-{}", cluster_id)
}

pub fn dashboard_service_name(cluster_id: &str) -> String {
    format!("dask-scheduler-{}-dashboard", cluster_id)
}

// Shares its spelling with the scheduler service; the kinds differ.
pub fn scheduler_deployment_name(cluster_id: &str) -> String {
    format!("dask-scheduler-{}", cluster_id)
}

pub fn worker_deployment_name(cluster_id: &str) -> String {
    format!("dask-workers-{}", cluster_id)
}

/// Check that a cluster id yields valid DNS-1123 names and label values
pub fn validate_cluster_id(cluster_id: &str) -> ClusterResult<()> {
    let invalid = |reason: &str| ClusterError::InvalidClusterId {
        cluster_id: cluster_id.to_string(),
        reason: reason.to_string(),
    };

    if cluster_id.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if cluster_id.len() > MAX_CLUSTER_ID_LEN {
        return Err(invalid(&format!(
            "must be at most {} characters",
            MAX_CLUSTER_ID_LEN
        )));
    }
    if !cluster_id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid(
            "may only contain lowercase letters, digits and '-'",
        ));
    }
    if cluster_id.starts_with('-') || cluster_id.ends_with('-') {
        return Err(invalid("must start and end with a letter or digit"));
    }
    Ok(())
}
