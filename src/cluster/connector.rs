//! The cluster client seam
//!
//! A `Connector` opens a connection to a running scheduler; the resulting
//! `ClusterHandle` reports how many workers have joined.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::error::ClusterResult;

/// Externally reachable endpoints of a created cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEndpoints {
    /// Dask protocol endpoint, `tcp://host:port`
    pub scheduler_address: String,
    /// Web dashboard, `http://host:port`
    pub dashboard_address: String,
}

impl ClusterEndpoints {
    pub fn new(host: &str, scheduler_port: i32, dashboard_port: i32) -> Self {
        Self {
            scheduler_address: format!("tcp://{}:{}", host, scheduler_port),
            dashboard_address: format!("http://{}:{}", host, dashboard_port),
        }
    }
}

impl fmt::Display for ClusterEndpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scheduler {} (dashboard {})",
            self.scheduler_address, self.dashboard_address
        )
    }
}

/// Retriable failures of a single connection attempt
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("connection failed: {0}")]
    Refused(String),

    #[error("connection timed out after {0:?}")]
    Timeout(Duration),
}

/// A live connection to a scheduler
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterHandle: Send + Sync {
    /// Number of workers currently registered with the scheduler
    async fn worker_count(&self) -> ClusterResult<usize>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Make one connection attempt, giving up after `timeout`
    async fn connect(
        &self,
        endpoints: &ClusterEndpoints,
        timeout: Duration,
    ) -> Result<Arc<dyn ClusterHandle>, ConnectError>;
}

#[async_trait]
impl<T: Connector + ?Sized> Connector for Arc<T> {
    async fn connect(
        &self,
        endpoints: &ClusterEndpoints,
        timeout: Duration,
    ) -> Result<Arc<dyn ClusterHandle>, ConnectError> {
        (**self).connect(endpoints, timeout).await
    }
}
