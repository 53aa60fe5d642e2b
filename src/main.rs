//! Ingress Monitor Kubernetes Operator
//!
//! Main entry point for the operator. Sets up the Kubernetes client, the
//! provider registry and the caches, then runs the reconciliation loops.

use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ingress_monitor_operator::{
    adapters::ingress_monitor_store::KubeIngressMonitorStore,
    config::Config,
    controllers::{Caches, Context, Operator, Sources},
    metrics,
    providers::{logger, ProviderRegistry},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    init_tracing();

    info!("Starting Ingress Monitor Operator");

    let settings = config.settings()?;
    let client = config.client().await?;
    info!("Connected to Kubernetes API server");

    let mut registry = ProviderRegistry::new();
    logger::register(&mut registry);
    info!(providers = ?registry.types(), "Registered providers");

    let (caches, writers) = Caches::new();
    let context = Context::new(
        Arc::new(KubeIngressMonitorStore::new(client.clone())),
        caches,
        Arc::new(registry),
    );

    let http_addr = config.http_addr();
    let mut metrics_handle = tokio::spawn(metrics::serve(http_addr));
    info!("Metrics server starting on {}", http_addr);

    let shutdown = CancellationToken::new();
    let sources = Sources::from_client(client, config.watch_namespace());
    let operator = Operator::new(context, writers, settings);
    let mut operator_handle = tokio::spawn(operator.run(sources, shutdown.clone()));

    tokio::select! {
        res = &mut operator_handle => {
            match res {
                Ok(Ok(())) => error!("Operator exited unexpectedly"),
                Ok(Err(e)) => error!("Operator failed: {}", e),
                Err(e) => error!("Operator task failed: {}", e),
            }
            anyhow::bail!("operator stopped");
        }
        res = &mut metrics_handle => {
            error!("Metrics server exited unexpectedly: {:?}", res);
            shutdown.cancel();
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping operator");
            shutdown.cancel();
        }
    }

    match operator_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Operator failed during shutdown: {}", e),
        Err(e) => error!("Operator task failed: {}", e),
    }

    info!("Ingress Monitor Operator stopped");
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,ingress_monitor_operator=debug,kube=warn,hyper=warn")
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
