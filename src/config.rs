use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::cluster::ClusterSettings;

/// Settings read from `DASK_K8S_*` environment variables (and `.env`)
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Identifier of this tenant's cluster; a random one is generated when unset
    #[serde(default = "default_cluster_id")]
    pub cluster_id: String,

    #[serde(default = "default_kubeconfig")]
    pub kubeconfig: Option<String>,

    /// Path to a YAML pod spec overriding the scheduler template
    #[serde(default)]
    pub scheduler_template: Option<String>,

    /// Path to a YAML pod spec overriding the worker template
    #[serde(default)]
    pub worker_template: Option<String>,

    #[serde(default = "default_workers")]
    pub workers: u32,

    #[serde(default = "default_host_poll_interval_secs")]
    pub host_poll_interval_secs: u64,

    #[serde(default = "default_host_wait_timeout_secs")]
    pub host_wait_timeout_secs: u64,

    #[serde(default = "default_scale_poll_interval_secs")]
    pub scale_poll_interval_secs: u64,

    #[serde(default = "default_scale_wait_timeout_secs")]
    pub scale_wait_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_cluster_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn default_kubeconfig() -> Option<String> {
    None
}

fn default_workers() -> u32 {
    1
}

fn default_host_poll_interval_secs() -> u64 {
    2
}

fn default_host_wait_timeout_secs() -> u64 {
    600
}

fn default_scale_poll_interval_secs() -> u64 {
    5
}

fn default_scale_wait_timeout_secs() -> u64 {
    1800
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_connect_retries() -> u32 {
    20
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("DASK_K8S").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Controller settings derived from the configured intervals and bounds
    pub fn settings(&self) -> ClusterSettings {
        ClusterSettings {
            host_poll_interval: Duration::from_secs(self.host_poll_interval_secs),
            host_wait_timeout: Duration::from_secs(self.host_wait_timeout_secs),
            scale_poll_interval: Duration::from_secs(self.scale_poll_interval_secs),
            scale_wait_timeout: Duration::from_secs(self.scale_wait_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            connect_retries: self.connect_retries,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            cluster_id: default_cluster_id(),
            kubeconfig: default_kubeconfig(),
            scheduler_template: None,
            worker_template: None,
            workers: default_workers(),
            host_poll_interval_secs: default_host_poll_interval_secs(),
            host_wait_timeout_secs: default_host_wait_timeout_secs(),
            scale_poll_interval_secs: default_scale_poll_interval_secs(),
            scale_wait_timeout_secs: default_scale_wait_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            connect_retries: default_connect_retries(),
            log_json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::validate_cluster_id;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.namespace, "default");
        assert_eq!(config.workers, 1);
        assert_eq!(config.connect_retries, 20);
        assert!(config.kubeconfig.is_none());
    }

    #[test]
    fn test_generated_cluster_id_is_valid() {
        let config = Config::default();
        assert_eq!(config.cluster_id.len(), 8);
        assert!(validate_cluster_id(&config.cluster_id).is_ok());
    }

    #[test]
    fn test_settings_match_controller_defaults() {
        assert_eq!(Config::default().settings(), ClusterSettings::default());
    }
}
