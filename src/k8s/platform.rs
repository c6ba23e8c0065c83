//! The orchestration platform seam
//!
//! The controller talks to Kubernetes only through this trait so tests can
//! substitute an in-memory platform.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};

#[cfg(test)]
use mockall::automock;

/// Resource operations the cluster lifecycle needs from the platform.
///
/// Deletions of missing resources must fail with a 404 `kube::Error::Api`
/// so callers can tell "already absent" apart from real failures.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Platform: Send + Sync {
    /// Create a service and return it as stored, with cluster IP and node ports allocated
    async fn create_service(&self, namespace: &str, service: &Service) -> kube::Result<Service>;

    async fn delete_service(&self, namespace: &str, name: &str) -> kube::Result<()>;

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> kube::Result<Deployment>;

    /// Set the desired replica count of a deployment
    async fn patch_deployment_replicas(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> kube::Result<()>;

    async fn delete_deployment(&self, namespace: &str, name: &str) -> kube::Result<()>;

    /// List pods matching a label selector such as `user=alice,app=dask-scheduler`
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> kube::Result<Vec<Pod>>;
}

#[async_trait]
impl<T: Platform + ?Sized> Platform for std::sync::Arc<T> {
    async fn create_service(&self, namespace: &str, service: &Service) -> kube::Result<Service> {
        (**self).create_service(namespace, service).await
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> kube::Result<()> {
        (**self).delete_service(namespace, name).await
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> kube::Result<Deployment> {
        (**self).create_deployment(namespace, deployment).await
    }

    async fn patch_deployment_replicas(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> kube::Result<()> {
        (**self)
            .patch_deployment_replicas(namespace, name, replicas)
            .await
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> kube::Result<()> {
        (**self).delete_deployment(namespace, name).await
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> kube::Result<Vec<Pod>> {
        (**self).list_pods(namespace, label_selector).await
    }
}
