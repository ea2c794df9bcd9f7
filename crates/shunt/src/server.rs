//! Server wiring: rules store, master backend, routing table, control
//! API and pipeline, torn down in reverse on the first shutdown signal.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use shunt_api::AppState;
use shunt_backend::Backend;
use shunt_config::{NodeSpec, RulesStore};
use shunt_pipeline::{Pipeline, PipelineConfig};
use shunt_routing::RoutingTable;
use tokio::net::lookup_host;
use tokio::signal;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::Cli;

/// Bring the router up and run until a shutdown signal arrives
pub async fn run(cli: Cli, master: NodeSpec) -> Result<()> {
    let cancel = CancellationToken::new();
    let probe_interval = Duration::from_secs(cli.check_interval);

    let store = RulesStore::open(&cli.config).context("failed to open rules file")?;

    // The master backend is mandatory; failing to build it is fatal
    let master_backend = Arc::new(
        Backend::connect(master, probe_interval, &cancel)
            .await
            .context("failed to create master backend")?,
    );

    let table = Arc::new(RoutingTable::new(probe_interval, cancel.clone()));
    table
        .update(store.document())
        .await
        .context("failed to populate routing table from rules file")?;

    let snapshot = table.snapshot();
    info!(
        rule_count = snapshot.rule_count(),
        backend_count = snapshot.backend_count(),
        "routing table populated"
    );

    // Control API
    let api_addr = resolve_addr(&cli.bind_address, cli.api_port)
        .await
        .context("failed to resolve control API address")?;
    let state = AppState::new(Arc::clone(&table), Arc::new(Mutex::new(store)));
    let api_task = tokio::spawn(shunt_api::serve(state, api_addr, cancel.clone()));

    // Dataplane
    let pipeline_config = PipelineConfig {
        bind_address: cli.bind_address.clone(),
        port: cli.port,
        debug_stats: cli.debug,
    };
    let pipeline = Pipeline::start(
        pipeline_config,
        Arc::clone(&table),
        master_backend,
        cancel.clone(),
    )
    .await
    .context("failed to start pipeline")?;

    info!(
        listen = %pipeline.local_addr(),
        api = %api_addr,
        "shunt running"
    );

    wait_for_shutdown().await;
    info!("shutdown signal received, stopping");

    cancel.cancel();
    pipeline.shutdown().await;

    match api_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "control API error"),
        Err(e) => error!(error = %e, "control API task panicked"),
    }

    Ok(())
}

/// Resolve a bind address and port to a socket address
async fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr> {
    lookup_host(format!("{host}:{port}"))
        .await?
        .next()
        .with_context(|| format!("'{host}:{port}' did not resolve to any address"))
}

/// Wait for SIGINT or SIGTERM; SIGHUP is logged and ignored
async fn wait_for_shutdown() {
    #[cfg(unix)]
    tokio::spawn(async {
        let Ok(mut hangup) = signal::unix::signal(signal::unix::SignalKind::hangup()) else {
            warn!("failed to install SIGHUP handler");
            return;
        };
        while hangup.recv().await.is_some() {
            info!("SIGHUP received; live reload is not supported, use the control API");
        }
    });

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
