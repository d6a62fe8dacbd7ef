use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pickabook_worker::config::WorkerConfig;
use pickabook_worker::runner::OrderRunner;
use pickabook_worker::services::build_controller;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pickabook_worker=debug,pickabook_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    tracing::info!(
        assets_root = %config.assets_root.display(),
        orders_root = %config.orders_root.display(),
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = pickabook_db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    pickabook_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    pickabook_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    // --- Runner ---
    let controller = build_controller(&config, pool.clone())
        .await
        .context("Failed to build HTTP client")?;
    let runner = OrderRunner::new(pool, controller, config.poll_interval)
        .with_reclaim(config.stale_after, config.max_order_attempts);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown requested, finishing current order");
        signal_cancel.cancel();
    });

    runner.run(cancel).await;
    tracing::info!("Worker stopped");
    Ok(())
}

/// Resolve on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
