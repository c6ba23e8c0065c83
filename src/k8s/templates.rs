//! Pod templates for the scheduler and worker deployments
//!
//! Templates are YAML pod specs. The defaults run the `daskdev/dask` image;
//! the worker reads the scheduler address from `$(DASK_SCHEDULER_ADDRESS)`,
//! which is injected at create time.

use std::path::Path;

use k8s_openapi::api::core::v1::{EnvVar, PodSpec};

use crate::error::{ClusterError, ClusterResult};

/// Environment variable carrying the scheduler's in-cluster address to workers
pub const SCHEDULER_ADDRESS_ENV: &str = "DASK_SCHEDULER_ADDRESS";

pub const DEFAULT_SCHEDULER_TEMPLATE: &str = r#"
containers:
  - image: daskdev/dask:1.2.0
    command: ["sh", "-c"]
    args:
      - dask-scheduler --port 8786 --bokeh-port 8787
    imagePullPolicy: Always
    name: dask-scheduler
    ports:
      - containerPort: 8787
      - containerPort: 8786
    resources:
      requests:
        cpu: "1"
        memory: 4G
"#;

pub const DEFAULT_WORKER_TEMPLATE: &str = r#"
containers:
  - image: daskdev/dask:1.2.0
    args: [dask-worker, $(DASK_SCHEDULER_ADDRESS), --nthreads, '1', --no-bokeh, --memory-limit, 4GB, --death-timeout, '60']
    imagePullPolicy: Always
    name: dask-worker
    env:
      - name: POD_IP
        valueFrom:
          fieldRef:
            fieldPath: status.podIP
      - name: POD_NAME
        valueFrom:
          fieldRef:
            fieldPath: metadata.name
      - name: EXTRA_PIP_PACKAGES
        value: s3fs
      - name: EXTRA_CONDA_PACKAGES
        value: ""
    resources:
      requests:
        cpu: "1"
        memory: 4G
      limits:
        cpu: "1"
        memory: 4G
"#;

/// A parsed pod specification used as the template of a deployment
#[derive(Debug, Clone, PartialEq)]
pub struct PodTemplate {
    spec: PodSpec,
}

impl PodTemplate {
    /// Parse a YAML pod spec
    pub fn from_yaml(yaml: &str) -> ClusterResult<Self> {
        let spec: PodSpec = serde_yaml::from_str(yaml)?;
        if spec.containers.is_empty() {
            return Err(ClusterError::InvalidTemplate(
                "pod spec declares no containers".to_string(),
            ));
        }
        Ok(Self { spec })
    }

    /// Read and parse a YAML pod spec from disk
    pub fn from_file(path: impl AsRef<Path>) -> ClusterResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            ClusterError::InvalidTemplate(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&yaml)
    }

    pub fn default_scheduler() -> Self {
        Self::from_yaml(DEFAULT_SCHEDULER_TEMPLATE).expect("built-in scheduler template is valid")
    }

    pub fn default_worker() -> Self {
        Self::from_yaml(DEFAULT_WORKER_TEMPLATE).expect("built-in worker template is valid")
    }

    pub fn spec(&self) -> &PodSpec {
        &self.spec
    }

    pub fn into_spec(self) -> PodSpec {
        self.spec
    }

    /// Return a copy with one env entry appended to the first container.
    ///
    /// Existing entries are kept as they are, even one with the same name.
    pub fn with_env(&self, name: &str, value: &str) -> ClusterResult<Self> {
        let mut spec = self.spec.clone();
        let container = spec.containers.first_mut().ok_or_else(|| {
            ClusterError::InvalidTemplate("pod spec declares no containers".to_string())
        })?;
        container.env.get_or_insert_with(Vec::new).push(EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            ..Default::default()
        });
        Ok(Self { spec })
    }
}
