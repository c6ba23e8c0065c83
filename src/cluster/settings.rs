use std::time::Duration;

/// Poll intervals, wait bounds and retry counts of a controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSettings {
    /// Delay between checks for the scheduler pod's host IP
    pub host_poll_interval: Duration,
    /// Give up on the scheduler host IP after this long
    pub host_wait_timeout: Duration,
    /// Delay between worker count checks while scaling
    pub scale_poll_interval: Duration,
    /// Give up waiting for workers after this long
    pub scale_wait_timeout: Duration,
    /// Bound on a single connection attempt
    pub connect_timeout: Duration,
    pub connect_retries: u32,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            host_poll_interval: Duration::from_secs(2),
            host_wait_timeout: Duration::from_secs(600),
            scale_poll_interval: Duration::from_secs(5),
            scale_wait_timeout: Duration::from_secs(1800),
            connect_timeout: Duration::from_secs(10),
            connect_retries: 20,
        }
    }
}
