//! Dask cluster lifecycle
//!
//! `ClusterController` drives create, scale, connect and close for one
//! cluster, against the `Platform` and `Connector` seams.

mod connector;
mod controller;
mod names;
mod settings;
mod teardown;

pub use connector::{ClusterEndpoints, ClusterHandle, ConnectError, Connector};
pub use controller::ClusterController;
pub use names::{
    dashboard_service_name, scheduler_deployment_name, scheduler_service_name,
    validate_cluster_id, worker_deployment_name, ResourceNames, MAX_CLUSTER_ID_LEN,
};
pub use settings::ClusterSettings;
pub use teardown::{DeleteOutcome, ResourceKind, ResourceOutcome, TeardownReport};
