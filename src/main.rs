use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dask_k8s::{
    config::Config, ClusterController, DaskConnector, K8sClient, Platform, PodTemplate,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize tracing
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
    );
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(
        namespace = %config.namespace,
        cluster_id = %config.cluster_id,
        "Configuration loaded"
    );

    let k8s = match &config.kubeconfig {
        Some(path) => K8sClient::from_kubeconfig(path).await?,
        None => K8sClient::new().await?,
    };
    k8s.health_check().await?;

    let mut cluster = ClusterController::new(
        k8s,
        DaskConnector::new(),
        config.namespace.clone(),
        config.cluster_id.clone(),
    )?
    .with_settings(config.settings());
    if let Some(path) = &config.scheduler_template {
        cluster = cluster.with_scheduler_template(PodTemplate::from_file(path)?);
    }
    if let Some(path) = &config.worker_template {
        cluster = cluster.with_worker_template(PodTemplate::from_file(path)?);
    }

    let (outcome, interrupted) = tokio::select! {
        result = run(&mut cluster, config.workers) => (result, false),
        _ = tokio::signal::ctrl_c() => (Ok(()), true),
    };

    // A failed create has already removed what it made; anything else is released here
    if interrupted || cluster.is_initialized() {
        tracing::info!("Tearing down cluster");
        let report = cluster.close().await;
        for failure in report.failures() {
            tracing::error!(kind = %failure.kind, name = %failure.name, "Resource was not deleted");
        }
    }

    outcome
}

/// Create the cluster, scale it and keep it up until interrupted
async fn run<P: Platform>(
    cluster: &mut ClusterController<P, DaskConnector>,
    workers: u32,
) -> Result<()> {
    let endpoints = cluster.create().await?;
    println!("Scheduler: {}", endpoints.scheduler_address);
    println!("Dashboard: {}", endpoints.dashboard_address);

    cluster.scale(workers, true).await?;
    tracing::info!(workers, "Cluster ready, press Ctrl-C to tear it down");

    std::future::pending::<()>().await;
    Ok(())
}
