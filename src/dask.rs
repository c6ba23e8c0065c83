//! Dask scheduler client
//!
//! Connects by opening a TCP connection to the scheduler's protocol port and
//! reads the live worker count from the dashboard's `/json/counts.json`.
//! A refused connection is retried until the attempt's timeout elapses.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::time::{sleep, Instant};
use tracing::{debug, instrument};
use url::Url;

use crate::cluster::{ClusterEndpoints, ClusterHandle, ConnectError, Connector};
use crate::error::{ClusterError, ClusterResult};

const COUNTS_PATH: &str = "json/counts.json";

/// Pause between refused connections within one attempt
const PROBE_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Subset of the scheduler's counts document
#[derive(Debug, Deserialize)]
struct Counts {
    workers: usize,
}

/// [`Connector`] for a real Dask scheduler
#[derive(Clone, Default)]
pub struct DaskConnector {
    http: reqwest::Client,
}

impl DaskConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Connector for DaskConnector {
    #[instrument(skip(self), fields(scheduler = %endpoints.scheduler_address))]
    async fn connect(
        &self,
        endpoints: &ClusterEndpoints,
        timeout: Duration,
    ) -> Result<Arc<dyn ClusterHandle>, ConnectError> {
        let (host, port) = scheduler_host_port(&endpoints.scheduler_address)?;
        probe_until(&host, port, timeout).await?;

        let counts_url = Url::parse(&endpoints.dashboard_address)
            .and_then(|base| base.join(COUNTS_PATH))
            .map_err(|e| ConnectError::Refused(format!("invalid dashboard address: {}", e)))?;

        Ok(Arc::new(DaskClient {
            http: self.http.clone(),
            counts_url,
            timeout,
        }))
    }
}

/// Open a TCP connection to `host:port`, retrying refusals until `timeout`
async fn probe_until(host: &str, port: u16, timeout: Duration) -> Result<(), ConnectError> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let error = match tokio::time::timeout(remaining, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => {
                debug!("Scheduler port is reachable");
                return Ok(());
            }
            Ok(Err(e)) => e,
            Err(_) => return Err(ConnectError::Timeout(timeout)),
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ConnectError::Refused(error.to_string()));
        }
        debug!(error = %error, "Scheduler not accepting connections yet");
        sleep(remaining.min(PROBE_RETRY_INTERVAL)).await;
    }
}

/// Handle on a reachable scheduler
pub struct DaskClient {
    http: reqwest::Client,
    counts_url: Url,
    timeout: Duration,
}

impl DaskClient {
    pub fn counts_url(&self) -> &Url {
        &self.counts_url
    }
}

#[async_trait]
impl ClusterHandle for DaskClient {
    async fn worker_count(&self) -> ClusterResult<usize> {
        let counts: Counts = self
            .http
            .get(self.counts_url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ClusterError::Client(e.to_string()))?
            .json()
            .await
            .map_err(|e| ClusterError::Client(e.to_string()))?;
        Ok(counts.workers)
    }
}

/// Split `tcp://host:port` into its host and port
fn scheduler_host_port(address: &str) -> Result<(String, u16), ConnectError> {
    let invalid = |reason: &str| {
        ConnectError::Refused(format!("invalid scheduler address '{}': {}", address, reason))
    };

    let url = Url::parse(address).map_err(|e| invalid(&e.to_string()))?;
    let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
    let port = url.port().ok_or_else(|| invalid("missing port"))?;
    Ok((host.to_string(), port))
}
