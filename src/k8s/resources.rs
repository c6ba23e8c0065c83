//! Kubernetes resource builders for dask-k8s
//!
//! Functions to create the Service and Deployment specs of one cluster

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{PodTemplateSpec, Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use super::templates::PodTemplate;

/// Port the scheduler listens on for the Dask protocol
pub const SCHEDULER_PORT: i32 = 8786;
/// Port of the scheduler's web dashboard
pub const DASHBOARD_PORT: i32 = 8787;

pub const SCHEDULER_ROLE: &str = "dask-scheduler";
pub const WORKER_ROLE: &str = "dask-workers";

/// Labels identifying a role inside one tenant's cluster
pub fn cluster_labels(role: &str, cluster_id: &str) -> BTreeMap<String, String> {
    [
        ("app".to_string(), role.to_string()),
        ("user".to_string(), cluster_id.to_string()),
    ]
    .into_iter()
    .collect()
}

/// Label selector string matching pods of `role` in one tenant's cluster
pub fn label_selector(role: &str, cluster_id: &str) -> String {
    format!("user={},app={}", cluster_id, role)
}

/// Create a NodePort Service exposing `port` of the scheduler pod
pub fn create_scheduler_service(name: &str, cluster_id: &str, port: i32) -> Service {
    let labels = cluster_labels(SCHEDULER_ROLE, cluster_id);

    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(labels),
            ports: Some(vec![ServicePort {
                port,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            type_: Some("NodePort".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Create a Deployment running `replicas` copies of `template` for `role`
pub fn create_deployment(
    name: &str,
    role: &str,
    cluster_id: &str,
    replicas: i32,
    template: PodTemplate,
) -> Deployment {
    let labels = cluster_labels(role, cluster_id);

    let pod_template_spec = PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels.clone()),
            ..Default::default()
        }),
        spec: Some(template.into_spec()),
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(labels),
                ..Default::default()
            },
            template: pod_template_spec,
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// In-cluster `clusterIP:port` address of a created service
pub fn internal_address(service: &Service) -> Option<String> {
    let spec = service.spec.as_ref()?;
    let ip = spec.cluster_ip.as_deref().filter(|ip| !ip.is_empty())?;
    let port = spec.ports.as_ref()?.first()?.port;
    Some(format!("{}:{}", ip, port))
}

/// Node port the platform allocated to the first port of a service
pub fn node_port(service: &Service) -> Option<i32> {
    service.spec.as_ref()?.ports.as_ref()?.first()?.node_port
}
