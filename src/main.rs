use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::cli::{CommonArgs, CommonCommands, utils};
use common::config::Configuration;
use janitor::Reconciler;
use router::{CleanupResponse, JanitorState, create_router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "storage-janitor")]
#[command(about = "Deletes objects in an object store that no database row references")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP trigger, and sweep on a schedule when cleanup is enabled
    Serve,
    /// Run a single sweep and print the result as JSON
    Run,
    #[command(flatten)]
    Common(CommonCommands),
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = sigint.recv() => log::info!("Received SIGINT"),
            _ = sigterm.recv() => log::info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        log::info!("Received Ctrl+C");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on CLI arguments
    utils::init_logging(&cli.common);

    let config = utils::load_config(cli.common.config.as_ref())?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Run => run_once(config).await,
        Commands::Common(command) => utils::handle_common_command(&command, &config),
    }
}

async fn serve(config: Configuration) -> Result<()> {
    log::info!("Starting storage janitor");

    let reconciler = Arc::new(
        Reconciler::connect(&config)
            .await
            .context("Failed to initialize reconciler")?,
    );

    let http_addr: SocketAddr = config
        .server
        .bind
        .parse()
        .context("Invalid server bind address")?;

    let shutdown = CancellationToken::new();
    let state = JanitorState::from_config(reconciler.clone(), &config.server, shutdown.clone());
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server to {http_addr}"))?;
    log::info!("HTTP server listening on {http_addr}");

    let server_shutdown = shutdown.clone();
    let mut http_handle = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                server_shutdown.cancelled().await;
                log::info!("HTTP server shutting down gracefully");
            })
            .await
    });

    let schedule_handle = if config.cleanup.enabled {
        log::info!(
            "Scheduled cleanup enabled with interval: {:?}",
            config.cleanup.interval
        );
        Some(tokio::spawn(run_schedule(
            reconciler,
            config.cleanup.interval,
            shutdown.clone(),
        )))
    } else {
        log::info!("Scheduled cleanup disabled, serving HTTP trigger only");
        None
    };

    tokio::select! {
        signal = wait_for_shutdown_signal() => signal?,
        served = &mut http_handle => {
            shutdown.cancel();
            return served
                .context("HTTP server task failed")?
                .context("HTTP server error");
        }
    }

    log::info!("Shutting down storage janitor...");
    shutdown.cancel();

    if let Some(handle) = schedule_handle {
        if let Err(e) = handle.await {
            log::error!("Cleanup scheduler task failed: {e}");
        }
    }

    http_handle
        .await
        .context("HTTP server task failed")?
        .context("HTTP server error")?;

    log::info!("Storage janitor stopped gracefully");

    Ok(())
}

/// Sweep every `every` until `shutdown` is cancelled. The first sweep starts
/// immediately.
async fn run_schedule(reconciler: Arc<Reconciler>, every: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        log::debug!("Running scheduled cleanup");

        match reconciler.run_until_cancelled(&shutdown).await {
            Ok(outcome) => log::info!(
                "Scheduled cleanup finished with status {:?}: deleted {} of {} orphaned files",
                outcome.status,
                outcome.result.deleted_files,
                outcome.result.orphaned_files
            ),
            Err(e) => log::error!("Scheduled cleanup failed: {e}"),
        }
    }

    log::info!("Cleanup scheduler stopped");
}

async fn run_once(config: Configuration) -> Result<()> {
    let reconciler = Reconciler::connect(&config)
        .await
        .context("Failed to initialize reconciler")?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(()) => signal_cancel.cancel(),
            Err(e) => log::warn!("Running without signal handling: {e:#}"),
        }
    });

    let response = CleanupResponse::from_outcome(reconciler.run_until_cancelled(&cancel).await);
    let rendered =
        serde_json::to_string_pretty(&response).context("Failed to serialize cleanup result")?;
    println!("{rendered}");

    if !response.success {
        anyhow::bail!("Cleanup run failed");
    }

    Ok(())
}
