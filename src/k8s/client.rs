//! Kubernetes client wrapper for dask-k8s

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config,
};
use serde_json::json;
use tracing::{debug, info, instrument};

use super::platform::Platform;

/// Wrapper around kube::Client implementing [`Platform`]
#[derive(Clone)]
pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    /// Create a new K8sClient using the default kubeconfig or in-cluster config
    #[instrument(skip_all)]
    pub async fn new() -> Result<Self> {
        let config = Config::infer().await?;
        let client = Client::try_from(config)?;

        info!("Connected to Kubernetes cluster");

        Ok(Self { client })
    }

    /// Create a K8sClient from an explicit kubeconfig file
    #[instrument]
    pub async fn from_kubeconfig(path: &str) -> Result<Self> {
        let kubeconfig = Kubeconfig::read_from(path)
            .with_context(|| format!("Failed to read kubeconfig {}", path))?;
        let config =
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        let client = Client::try_from(config)?;

        info!(kubeconfig = path, "Connected to Kubernetes cluster");

        Ok(Self { client })
    }

    /// Check if cluster is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let version = self.client.apiserver_version().await?;
        info!(version = %version.git_version, "Kubernetes cluster is healthy");
        Ok(true)
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl Platform for K8sClient {
    #[instrument(
        skip(self, service),
        fields(service_name = %service.metadata.name.as_deref().unwrap_or("unknown"))
    )]
    async fn create_service(&self, namespace: &str, service: &Service) -> kube::Result<Service> {
        let created = self
            .services(namespace)
            .create(&PostParams::default(), service)
            .await?;
        info!("Created service");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn delete_service(&self, namespace: &str, name: &str) -> kube::Result<()> {
        self.services(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        info!(name, "Deleted service");
        Ok(())
    }

    #[instrument(
        skip(self, deployment),
        fields(deployment_name = %deployment.metadata.name.as_deref().unwrap_or("unknown"))
    )]
    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> kube::Result<Deployment> {
        let created = self
            .deployments(namespace)
            .create(&PostParams::default(), deployment)
            .await?;
        info!("Created deployment");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn patch_deployment_replicas(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> kube::Result<()> {
        let patch = json!({ "spec": { "replicas": replicas } });
        self.deployments(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        info!(name, replicas, "Patched deployment replicas");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_deployment(&self, namespace: &str, name: &str) -> kube::Result<()> {
        self.deployments(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        info!(name, "Deleted deployment");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> kube::Result<Vec<Pod>> {
        let list = self
            .pods(namespace)
            .list(&ListParams::default().labels(label_selector))
            .await?;
        debug!(label_selector, count = list.items.len(), "Listed pods");
        Ok(list.items)
    }
}
