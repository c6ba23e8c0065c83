//! Simulated Kubernetes platform and scripted Dask client for lifecycle tests

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, PodStatus, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::ErrorResponse;

use dask_k8s::cluster::{ClusterEndpoints, ClusterHandle, ConnectError, Connector};
use dask_k8s::{ClusterResult, ClusterSettings, Platform};

/// One call received by the simulated platform
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateService {
        namespace: String,
        name: String,
        port: i32,
        selector: BTreeMap<String, String>,
    },
    DeleteService {
        namespace: String,
        name: String,
    },
    CreateDeployment {
        namespace: String,
        name: String,
        replicas: i32,
        labels: BTreeMap<String, String>,
    },
    PatchDeployment {
        namespace: String,
        name: String,
        replicas: i32,
    },
    DeleteDeployment {
        namespace: String,
        name: String,
    },
    ListPods {
        namespace: String,
        selector: String,
    },
}

type Key = (String, String);

#[derive(Default)]
struct State {
    services: BTreeMap<Key, Service>,
    deployments: BTreeMap<Key, Deployment>,
    calls: Vec<Call>,
    allocated_ports: i32,
    allocated_ips: u8,
    pod_lists: usize,
}

/// In-memory platform: allocates cluster IPs and node ports, and reports a
/// host IP for scheduled pods once `unscheduled_polls` listings have passed.
/// The first `unlisted_polls` listings return no pods at all.
pub struct FakePlatform {
    state: Mutex<State>,
    host_ip: Option<String>,
    first_node_port: i32,
    unscheduled_polls: usize,
    unlisted_polls: usize,
}

fn api_error(code: u16, reason: &str, message: String) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    })
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            host_ip: Some("10.0.0.5".to_string()),
            first_node_port: 31000,
            unscheduled_polls: 0,
            unlisted_polls: 0,
        }
    }

    /// Scheduler pods never get a host IP
    pub fn never_scheduled(mut self) -> Self {
        self.host_ip = None;
        self
    }

    pub fn with_unscheduled_polls(mut self, polls: usize) -> Self {
        self.unscheduled_polls = polls;
        self
    }

    /// Pods only show up in listings after `polls` empty ones
    pub fn with_unlisted_polls(mut self, polls: usize) -> Self {
        self.unlisted_polls = polls;
        self
    }

    /// Seed a service that does not belong to any controller
    pub fn with_existing_service(self, namespace: &str, name: &str) -> Self {
        let service = Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        self.state
            .lock()
            .unwrap()
            .services
            .insert(key(namespace, name), service);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn service_names(&self, namespace: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .services
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn deployment_names(&self, namespace: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .deployments
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.state
            .lock()
            .unwrap()
            .deployments
            .get(&key(namespace, name))
            .cloned()
    }

    pub fn pod_lists(&self) -> usize {
        self.state.lock().unwrap().pod_lists
    }
}

fn parse_selector(selector: &str) -> Vec<(String, String)> {
    selector
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

#[async_trait]
impl Platform for FakePlatform {
    async fn create_service(&self, namespace: &str, service: &Service) -> kube::Result<Service> {
        let mut state = self.state.lock().unwrap();
        let name = service.metadata.name.clone().unwrap_or_default();
        let spec = service.spec.clone().unwrap_or_default();
        let port = spec
            .ports
            .as_ref()
            .and_then(|p| p.first())
            .map(|p| p.port)
            .unwrap_or_default();

        state.calls.push(Call::CreateService {
            namespace: namespace.to_string(),
            name: name.clone(),
            port,
            selector: spec.selector.clone().unwrap_or_default(),
        });

        if state.services.contains_key(&key(namespace, &name)) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("services \"{}\" already exists", name),
            ));
        }

        let mut stored = service.clone();
        let stored_spec = stored.spec.get_or_insert_with(Default::default);
        state.allocated_ips += 1;
        stored_spec.cluster_ip = Some(format!("10.96.0.{}", state.allocated_ips));
        if let Some(first) = stored_spec.ports.as_mut().and_then(|p| p.first_mut()) {
            first.node_port = Some(self.first_node_port + state.allocated_ports);
            state.allocated_ports += 1;
        }

        state.services.insert(key(namespace, &name), stored.clone());
        Ok(stored)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> kube::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DeleteService {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        match state.services.remove(&key(namespace, name)) {
            Some(_) => Ok(()),
            None => Err(api_error(
                404,
                "NotFound",
                format!("services \"{}\" not found", name),
            )),
        }
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> kube::Result<Deployment> {
        let mut state = self.state.lock().unwrap();
        let name = deployment.metadata.name.clone().unwrap_or_default();
        let spec = deployment.spec.clone().unwrap_or_default();

        state.calls.push(Call::CreateDeployment {
            namespace: namespace.to_string(),
            name: name.clone(),
            replicas: spec.replicas.unwrap_or(1),
            labels: spec
                .template
                .metadata
                .and_then(|m| m.labels)
                .unwrap_or_default(),
        });

        if state.deployments.contains_key(&key(namespace, &name)) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("deployments.apps \"{}\" already exists", name),
            ));
        }
        state.deployments.insert(key(namespace, &name), deployment.clone());
        Ok(deployment.clone())
    }

    async fn patch_deployment_replicas(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> kube::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::PatchDeployment {
            namespace: namespace.to_string(),
            name: name.to_string(),
            replicas,
        });
        match state.deployments.get_mut(&key(namespace, name)) {
            Some(deployment) => {
                deployment.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
                Ok(())
            }
            None => Err(api_error(
                404,
                "NotFound",
                format!("deployments.apps \"{}\" not found", name),
            )),
        }
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> kube::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DeleteDeployment {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        match state.deployments.remove(&key(namespace, name)) {
            Some(_) => Ok(()),
            None => Err(api_error(
                404,
                "NotFound",
                format!("deployments.apps \"{}\" not found", name),
            )),
        }
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> kube::Result<Vec<Pod>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ListPods {
            namespace: namespace.to_string(),
            selector: label_selector.to_string(),
        });
        state.pod_lists += 1;
        if state.pod_lists <= self.unlisted_polls {
            return Ok(Vec::new());
        }

        let host_ip = if state.pod_lists > self.unscheduled_polls {
            self.host_ip.clone()
        } else {
            None
        };
        let wanted = parse_selector(label_selector);

        let mut pods = Vec::new();
        for ((ns, name), deployment) in &state.deployments {
            if ns != namespace {
                continue;
            }
            let Some(spec) = &deployment.spec else { continue };
            let labels = spec
                .template
                .metadata
                .as_ref()
                .and_then(|m| m.labels.clone())
                .unwrap_or_default();
            if !wanted.iter().all(|(k, v)| labels.get(k) == Some(v)) {
                continue;
            }
            for i in 0..spec.replicas.unwrap_or(1) {
                pods.push(Pod {
                    metadata: ObjectMeta {
                        name: Some(format!("{}-{}", name, i)),
                        labels: Some(labels.clone()),
                        ..Default::default()
                    },
                    status: Some(PodStatus {
                        host_ip: host_ip.clone(),
                        ..Default::default()
                    }),
                    ..Default::default()
                });
            }
        }
        Ok(pods)
    }
}

/// Connector that refuses a fixed number of attempts, then hands out a
/// client replaying a script of worker counts (the last one repeats).
/// A hanging connector never answers any attempt.
#[derive(Clone)]
pub struct ScriptedConnector {
    refusals: usize,
    hangs: bool,
    attempts: Arc<AtomicUsize>,
    queries: Arc<AtomicUsize>,
    counts: Arc<Mutex<VecDeque<usize>>>,
}

impl ScriptedConnector {
    pub fn new(counts: &[usize]) -> Self {
        Self {
            refusals: 0,
            hangs: false,
            attempts: Arc::new(AtomicUsize::new(0)),
            queries: Arc::new(AtomicUsize::new(0)),
            counts: Arc::new(Mutex::new(counts.iter().copied().collect())),
        }
    }

    pub fn refusing(mut self, refusals: usize) -> Self {
        self.refusals = refusals;
        self
    }

    pub fn hanging(mut self) -> Self {
        self.hangs = true;
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        _endpoints: &ClusterEndpoints,
        _timeout: Duration,
    ) -> Result<Arc<dyn ClusterHandle>, ConnectError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.hangs {
            std::future::pending::<()>().await;
        }
        if attempt <= self.refusals {
            return Err(ConnectError::Refused("connection refused".to_string()));
        }
        Ok(Arc::new(ScriptedClient {
            queries: self.queries.clone(),
            counts: self.counts.clone(),
        }))
    }
}

struct ScriptedClient {
    queries: Arc<AtomicUsize>,
    counts: Arc<Mutex<VecDeque<usize>>>,
}

#[async_trait]
impl ClusterHandle for ScriptedClient {
    async fn worker_count(&self) -> ClusterResult<usize> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let mut counts = self.counts.lock().unwrap();
        let count = if counts.len() > 1 {
            counts.pop_front()
        } else {
            counts.front().copied()
        };
        Ok(count.unwrap_or_default())
    }
}

/// Millisecond intervals with generous bounds
pub fn fast_settings() -> ClusterSettings {
    ClusterSettings {
        host_poll_interval: Duration::from_millis(1),
        host_wait_timeout: Duration::from_secs(5),
        scale_poll_interval: Duration::from_millis(1),
        scale_wait_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(1),
        connect_retries: 5,
    }
}
