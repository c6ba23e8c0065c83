//! Lifecycle controller for one Dask cluster
//!
//! Creates the scheduler and worker topology, discovers where the scheduler
//! landed, scales the worker pool and tears everything down again.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

use super::connector::{ClusterEndpoints, ClusterHandle, ConnectError, Connector};
use super::names::{validate_cluster_id, ResourceNames};
use super::settings::ClusterSettings;
use super::teardown::{DeleteOutcome, ResourceKind, TeardownReport};
use crate::error::{is_not_found, ClusterError, ClusterResult};
use crate::k8s::{
    create_deployment, create_scheduler_service, internal_address, label_selector, node_port,
    Platform, PodTemplate, DASHBOARD_PORT, SCHEDULER_ADDRESS_ENV, SCHEDULER_PORT,
    SCHEDULER_ROLE, WORKER_ROLE,
};

/// A Dask cluster (one scheduler, a pool of workers) in a Kubernetes namespace.
///
/// All resources are named and labeled after `cluster_id`, so clusters of
/// different tenants can share a namespace. The controller is single-owner:
/// every operation that changes state takes `&mut self`.
pub struct ClusterController<P, C> {
    platform: P,
    connector: C,
    namespace: String,
    cluster_id: String,
    names: ResourceNames,
    scheduler_template: PodTemplate,
    worker_template: PodTemplate,
    settings: ClusterSettings,
    initialized: bool,
    endpoints: Option<ClusterEndpoints>,
    client: Option<Arc<dyn ClusterHandle>>,
}

impl<P: Platform, C: Connector> ClusterController<P, C> {
    /// Create an uninitialized controller with the default pod templates
    pub fn new(
        platform: P,
        connector: C,
        namespace: impl Into<String>,
        cluster_id: impl Into<String>,
    ) -> ClusterResult<Self> {
        let namespace = namespace.into();
        let cluster_id = cluster_id.into();

        if namespace.trim().is_empty() {
            return Err(ClusterError::InvalidNamespace(
                "namespace must not be empty".to_string(),
            ));
        }
        validate_cluster_id(&cluster_id)?;

        Ok(Self {
            platform,
            connector,
            names: ResourceNames::for_cluster(&cluster_id),
            namespace,
            cluster_id,
            scheduler_template: PodTemplate::default_scheduler(),
            worker_template: PodTemplate::default_worker(),
            settings: ClusterSettings::default(),
            initialized: false,
            endpoints: None,
            client: None,
        })
    }

    pub fn with_scheduler_template(mut self, template: PodTemplate) -> Self {
        self.scheduler_template = template;
        self
    }

    pub fn with_worker_template(mut self, template: PodTemplate) -> Self {
        self.worker_template = template;
        self
    }

    pub fn with_settings(mut self, settings: ClusterSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn names(&self) -> &ResourceNames {
        &self.names
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn endpoints(&self) -> Option<&ClusterEndpoints> {
        self.endpoints.as_ref()
    }

    /// `tcp://host:port` of the scheduler, once created
    pub fn scheduler_address(&self) -> Option<&str> {
        self.endpoints.as_ref().map(|e| e.scheduler_address.as_str())
    }

    /// `http://host:port` of the dashboard, once created
    pub fn dashboard_address(&self) -> Option<&str> {
        self.endpoints.as_ref().map(|e| e.dashboard_address.as_str())
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Create the services and deployments and wait for the scheduler to be placed.
    ///
    /// Fails with [`ClusterError::AlreadyExists`] if any resource name is taken.
    /// On failure the resources created by this call are removed again.
    #[instrument(skip(self), fields(namespace = %self.namespace, cluster_id = %self.cluster_id))]
    pub async fn create(&mut self) -> ClusterResult<ClusterEndpoints> {
        if self.initialized {
            return Err(ClusterError::AlreadyInitialized);
        }

        info!("Creating Dask cluster");

        let mut created = Vec::new();
        match self.provision(&mut created).await {
            Ok(endpoints) => {
                info!(
                    scheduler = %endpoints.scheduler_address,
                    dashboard = %endpoints.dashboard_address,
                    "Dask cluster is up"
                );
                self.initialized = true;
                self.endpoints = Some(endpoints.clone());
                Ok(endpoints)
            }
            Err(e) => {
                warn!(error = %e, created = created.len(), "Cluster creation failed, rolling back");
                self.rollback(&created).await;
                Err(e)
            }
        }
    }

    async fn provision(
        &self,
        created: &mut Vec<(ResourceKind, String)>,
    ) -> ClusterResult<ClusterEndpoints> {
        let names = &self.names;

        let scheduler_service = self
            .declare_service(&names.scheduler_service, SCHEDULER_PORT, created)
            .await?;
        let dashboard_service = self
            .declare_service(&names.dashboard_service, DASHBOARD_PORT, created)
            .await?;

        let scheduler_internal = internal_address(&scheduler_service).ok_or_else(|| {
            ClusterError::IncompleteResource {
                kind: "Service",
                name: names.scheduler_service.clone(),
                field: "spec.clusterIP",
            }
        })?;
        let scheduler_node_port =
            node_port(&scheduler_service).ok_or_else(|| ClusterError::IncompleteResource {
                kind: "Service",
                name: names.scheduler_service.clone(),
                field: "spec.ports[0].nodePort",
            })?;
        let dashboard_node_port =
            node_port(&dashboard_service).ok_or_else(|| ClusterError::IncompleteResource {
                kind: "Service",
                name: names.dashboard_service.clone(),
                field: "spec.ports[0].nodePort",
            })?;
        debug!(%scheduler_internal, scheduler_node_port, dashboard_node_port, "Services ready");

        let scheduler = create_deployment(
            &names.scheduler_deployment,
            SCHEDULER_ROLE,
            &self.cluster_id,
            1,
            self.scheduler_template.clone(),
        );
        let worker_template = self
            .worker_template
            .with_env(SCHEDULER_ADDRESS_ENV, &scheduler_internal)?;
        let workers = create_deployment(
            &names.worker_deployment,
            WORKER_ROLE,
            &self.cluster_id,
            0,
            worker_template,
        );

        self.declare_deployment(&names.scheduler_deployment, &scheduler, created)
            .await?;
        self.declare_deployment(&names.worker_deployment, &workers, created)
            .await?;

        let host = self.wait_for_scheduler_host().await?;

        Ok(ClusterEndpoints::new(
            &host,
            scheduler_node_port,
            dashboard_node_port,
        ))
    }

    async fn declare_service(
        &self,
        name: &str,
        port: i32,
        created: &mut Vec<(ResourceKind, String)>,
    ) -> ClusterResult<k8s_openapi::api::core::v1::Service> {
        let service = create_scheduler_service(name, &self.cluster_id, port);
        let stored = self
            .platform
            .create_service(&self.namespace, &service)
            .await
            .map_err(|e| ClusterError::from_create(e, "Service", name))?;
        created.push((ResourceKind::Service, name.to_string()));
        Ok(stored)
    }

    async fn declare_deployment(
        &self,
        name: &str,
        deployment: &Deployment,
        created: &mut Vec<(ResourceKind, String)>,
    ) -> ClusterResult<()> {
        self.platform
            .create_deployment(&self.namespace, deployment)
            .await
            .map_err(|e| ClusterError::from_create(e, "Deployment", name))?;
        created.push((ResourceKind::Deployment, name.to_string()));
        Ok(())
    }

    /// Wait until the scheduler pod reports the IP of the node it runs on
    async fn wait_for_scheduler_host(&self) -> ClusterResult<String> {
        let selector = label_selector(SCHEDULER_ROLE, &self.cluster_id);
        let max_wait = self.settings.host_wait_timeout;

        match timeout(max_wait, self.poll_scheduler_host(&selector)).await {
            Ok(result) => result,
            Err(_) => Err(ClusterError::ConvergenceTimeout {
                operation: "scheduler host address",
                waited: max_wait,
                detail: format!("no pod matching '{}' reported a host IP", selector),
            }),
        }
    }

    async fn poll_scheduler_host(&self, selector: &str) -> ClusterResult<String> {
        loop {
            let pods = self.platform.list_pods(&self.namespace, selector).await?;
            let host = pods
                .iter()
                .filter_map(|pod| pod.status.as_ref()?.host_ip.clone())
                .find(|ip| !ip.is_empty());

            if let Some(host) = host {
                info!(%host, "Scheduler pod scheduled");
                return Ok(host);
            }

            debug!(pods = pods.len(), "Scheduler pod has no host IP yet");
            sleep(self.settings.host_poll_interval).await;
        }
    }

    async fn rollback(&self, created: &[(ResourceKind, String)]) {
        for (kind, name) in created.iter().rev() {
            let result = match kind {
                ResourceKind::Service => self.platform.delete_service(&self.namespace, name).await,
                ResourceKind::Deployment => {
                    self.platform.delete_deployment(&self.namespace, name).await
                }
            };
            if let Err(e) = result {
                warn!(%kind, name = %name, error = %e, "Rollback could not delete resource");
            }
        }
    }

    /// Set the worker replica count to `n`.
    ///
    /// With `blocking`, waits until exactly `n` workers are registered with
    /// the scheduler, connecting first if needed.
    #[instrument(skip(self), fields(namespace = %self.namespace, cluster_id = %self.cluster_id))]
    pub async fn scale(&mut self, n: u32, blocking: bool) -> ClusterResult<()> {
        if !self.initialized {
            return Err(ClusterError::Uninitialized);
        }
        let replicas = i32::try_from(n).map_err(|_| ClusterError::InvalidReplicas(n))?;

        self.platform
            .patch_deployment_replicas(&self.namespace, &self.names.worker_deployment, replicas)
            .await?;
        info!(replicas, "Requested worker replicas");

        if !blocking {
            return Ok(());
        }

        let client = self.connect().await?;
        let target = n as usize;
        let max_wait = self.settings.scale_wait_timeout;
        let mut last_seen = None;

        let waited = timeout(
            max_wait,
            wait_for_workers(
                client.as_ref(),
                target,
                self.settings.scale_poll_interval,
                &mut last_seen,
            ),
        )
        .await;

        match waited {
            Ok(()) => Ok(()),
            Err(_) => Err(ClusterError::ConvergenceTimeout {
                operation: "worker count",
                waited: max_wait,
                detail: match last_seen {
                    Some(seen) => format!("{} workers out of the {} required", seen, target),
                    None => format!("worker count never observed, {} required", target),
                },
            }),
        }
    }

    /// Return a client connected to the scheduler, connecting on first use
    #[instrument(skip(self), fields(cluster_id = %self.cluster_id))]
    pub async fn connect(&mut self) -> ClusterResult<Arc<dyn ClusterHandle>> {
        if !self.initialized {
            return Err(ClusterError::Uninitialized);
        }
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }
        let endpoints = self.endpoints.clone().ok_or(ClusterError::Uninitialized)?;

        let attempt_timeout = self.settings.connect_timeout;
        let retries = self.settings.connect_retries;
        let mut last_error = None;

        for attempt in 1..=retries {
            let result = match timeout(
                attempt_timeout,
                self.connector.connect(&endpoints, attempt_timeout),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ConnectError::Timeout(attempt_timeout)),
            };

            match result {
                Ok(client) => {
                    info!(
                        attempt,
                        address = %endpoints.scheduler_address,
                        "Connected to scheduler"
                    );
                    self.client = Some(client.clone());
                    return Ok(client);
                }
                Err(e) => {
                    warn!(
                        attempt,
                        retries,
                        error = %e,
                        "Could not connect to scheduler, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(ClusterError::ConnectionExhausted {
            address: endpoints.scheduler_address,
            attempts: retries,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt was made".to_string()),
        })
    }

    /// Delete every resource of the cluster. Never fails; the report lists
    /// what could not be removed. Absent resources are not failures.
    #[instrument(skip(self), fields(namespace = %self.namespace, cluster_id = %self.cluster_id))]
    pub async fn close(&mut self) -> TeardownReport {
        let namespace = self.namespace.as_str();
        let names = &self.names;
        let platform = &self.platform;

        let (scheduler_service, dashboard_service, scheduler_deployment, worker_deployment) =
            futures::join!(
                platform.delete_service(namespace, &names.scheduler_service),
                platform.delete_service(namespace, &names.dashboard_service),
                platform.delete_deployment(namespace, &names.scheduler_deployment),
                platform.delete_deployment(namespace, &names.worker_deployment),
            );

        let mut report = TeardownReport::default();
        report.push(
            ResourceKind::Service,
            &names.scheduler_service,
            delete_outcome(scheduler_service),
        );
        report.push(
            ResourceKind::Service,
            &names.dashboard_service,
            delete_outcome(dashboard_service),
        );
        report.push(
            ResourceKind::Deployment,
            &names.scheduler_deployment,
            delete_outcome(scheduler_deployment),
        );
        report.push(
            ResourceKind::Deployment,
            &names.worker_deployment,
            delete_outcome(worker_deployment),
        );

        for failure in report.failures() {
            warn!(
                kind = %failure.kind,
                name = %failure.name,
                outcome = ?failure.outcome,
                "Could not delete resource"
            );
        }
        info!(deleted = report.deleted(), clean = report.is_clean(), "Cluster closed");

        self.initialized = false;
        self.endpoints = None;
        self.client = None;

        report
    }
}

/// Poll `client` until exactly `target` workers are registered
async fn wait_for_workers(
    client: &dyn ClusterHandle,
    target: usize,
    interval: Duration,
    last_seen: &mut Option<usize>,
) {
    loop {
        sleep(interval).await;
        match client.worker_count().await {
            Ok(count) if count == target => {
                info!(workers = count, "Reached the desired worker count");
                return;
            }
            Ok(count) => {
                *last_seen = Some(count);
                info!(workers = count, target, "Waiting for workers");
            }
            Err(e) => {
                warn!(error = %e, "Could not query worker count");
            }
        }
    }
}

fn delete_outcome(result: kube::Result<()>) -> DeleteOutcome {
    match result {
        Ok(()) => DeleteOutcome::Deleted,
        Err(e) if is_not_found(&e) => DeleteOutcome::Absent,
        Err(e) => DeleteOutcome::Failed(e.to_string()),
    }
}
