// src/main.rs
//
// Process bootstrap, generalized from the inherited `main.rs` (tracing
// setup, config load, metrics bring-up, graceful-shutdown signal future)
// to construct the registry/strategy/supervisor/engine/management-API and
// drive two listeners instead of one.
use anyhow::{Context, Result};
use balance_plane::{
    api::ManagementApi,
    config,
    health::HealthSupervisor,
    metrics::MetricsRegistry,
    proxy::ProxyEngine,
    registry::{BackendSpec, Registry},
    server::{ManagementHandler, RequestHandler, ServerBuilder},
    strategy::Strategy,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("balance_plane=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    if let Err(err) = run().await {
        error!(error = %err, "fatal error during startup");
        std::process::exit(1);
    }

    Ok(())
}

async fn run() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!(path = %config_path, "loading configuration");
    let config = config::load_config(&config_path)
        .await
        .context("failed to load configuration")?;

    let backend_specs: Vec<BackendSpec> = config
        .backend_servers
        .iter()
        .map(|b| BackendSpec {
            id: b.id.clone(),
            url: b.url.clone(),
            weight: b.weight,
        })
        .collect();
    let registry = Registry::with_backends(backend_specs)
        .context("failed to bootstrap backend registry")?;
    let registry = Arc::new(registry);

    let metrics_registry =
        Arc::new(MetricsRegistry::new().context("failed to initialize metrics registry")?);
    let metrics = metrics_registry.collector();

    let strategy = Strategy::new(config.load_balancing_algorithm);
    let engine = Arc::new(ProxyEngine::new(
        registry.clone(),
        strategy,
        metrics.clone(),
        config.max_retries,
        config.request_timeout(),
    ));

    let supervisor = Arc::new(HealthSupervisor::new(
        config.health_check.clone(),
        registry.clone(),
        metrics.clone(),
    ));
    tokio::spawn(supervisor.clone().run());

    let api = Arc::new(ManagementApi::new(
        registry.clone(),
        engine.clone(),
        metrics_registry.clone(),
        &config,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let proxy_addr: SocketAddr = ([0, 0, 0, 0], config.load_balancer_port).into();
    let proxy_engine = engine.clone();
    let proxy_shutdown = shutdown_rx.clone();
    let proxy_task = tokio::spawn(async move {
        ServerBuilder::new(proxy_addr)
            .with_handler_factory(move |peer| RequestHandler::new(proxy_engine.clone(), peer))
            .with_shutdown(proxy_shutdown)
            .serve()
            .await
    });

    let api_addr: SocketAddr = ([0, 0, 0, 0], config.api_port).into();
    let api_for_listener = api.clone();
    let api_shutdown = shutdown_rx.clone();
    let api_task = tokio::spawn(async move {
        ServerBuilder::new(api_addr)
            .with_handler_factory(move |_peer| ManagementHandler::new(api_for_listener.clone()))
            .with_shutdown(api_shutdown)
            .serve()
            .await
    });

    info!(proxy = %proxy_addr, management = %api_addr, "load balancer started");

    shutdown_signal().await;
    info!("shutdown signal received, draining in-flight requests");

    let _ = shutdown_tx.send(true);
    supervisor.stop();

    let grace = config.shutdown_grace_period();
    let deadline = tokio::time::Instant::now() + grace;
    while metrics.snapshot().active_requests > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    if metrics.snapshot().active_requests > 0 {
        warn!("shutdown grace period elapsed with requests still in flight");
    }

    for task in [proxy_task, api_task] {
        task.abort();
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
