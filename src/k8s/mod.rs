//! Kubernetes integration module for dask-k8s
//!
//! This module handles all interactions with the Kubernetes API:
//! - The `Platform` trait the cluster controller is written against
//! - A `kube`-backed implementation of it
//! - Builders for the services and deployments of one cluster
//! - Scheduler and worker pod templates

mod client;
mod platform;
mod resources;
mod templates;

pub use client::K8sClient;
pub use platform::Platform;
#[cfg(test)]
pub use platform::MockPlatform;
pub use resources::{
    cluster_labels, create_deployment, create_scheduler_service, internal_address,
    label_selector, node_port, DASHBOARD_PORT, SCHEDULER_PORT, SCHEDULER_ROLE, WORKER_ROLE,
};
pub use templates::{
    PodTemplate, DEFAULT_SCHEDULER_TEMPLATE, DEFAULT_WORKER_TEMPLATE, SCHEDULER_ADDRESS_ENV,
};
