use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use vmsync::config::SyncConfig;
use vmsync::routes::{router, AppState};
use vmsync_connector_netbox::NetBoxConnector;
use vmsync_connector_vsphere::VsphereConnector;
use vmsync_reconcile::reconciliation::{run_scheduler, SnapshotCache};
use vmsync_reconcile::{ReconciliationEngine, RunCoordinator};

/// Sync vCenter VM inventory into NetBox.
#[derive(Debug, Parser)]
#[command(name = "vmsync", version)]
struct Cli {
    /// Run a single reconciliation and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,vmsync=debug")),
        )
        .init();

    let config = SyncConfig::from_env().context("configuration error")?;

    tracing::info!(
        netbox = %config.netbox.base_url,
        vcenter = %config.vsphere.host,
        snapshot = ?config.output_file,
        orphan_policy = %config.reconciliation.orphan_policy,
        bind_ipv6 = config.reconciliation.bind_ipv6,
        "starting vmsync"
    );

    let registry = NetBoxConnector::new(config.netbox.clone()).context("NetBox client")?;
    let source = VsphereConnector::new(config.vsphere.clone()).context("vSphere client")?;

    let mut engine = ReconciliationEngine::new(Arc::new(source), Arc::new(registry))
        .with_config(config.reconciliation.clone());
    if let Some(path) = &config.output_file {
        engine = engine.with_snapshot(SnapshotCache::new(path));
    }
    let coordinator = Arc::new(RunCoordinator::new(engine));

    if cli.once {
        let report = coordinator.run_now().await.context("reconciliation failed")?;
        for line in report.log_lines() {
            println!("{line}");
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = tokio::spawn(run_scheduler(
        Arc::clone(&coordinator),
        config.schedule.clone(),
        wait_for_shutdown(shutdown_rx),
    ));

    let app = router(AppState { coordinator });
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    tracing::info!(listen_addr = %config.listen_addr, "vmsync listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("server error")?;

    let _ = scheduler.await;
    Ok(())
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    loop {
        let stopping = *rx.borrow();
        if stopping || rx.changed().await.is_err() {
            return;
        }
    }
}
