//! dask-k8s Library
//!
//! Stands up, scales and tears down ephemeral Dask clusters inside a shared
//! Kubernetes namespace, one cluster per `(namespace, cluster_id)`.

pub mod cluster;
pub mod config;
pub mod dask;
pub mod error;
pub mod k8s;

pub use cluster::{ClusterController, ClusterEndpoints, ClusterSettings, TeardownReport};
pub use dask::DaskConnector;
pub use error::{ClusterError, ClusterResult};
pub use k8s::{K8sClient, Platform, PodTemplate};
