use std::error::Error;
use std::pin::Pin;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use tilehawk_application::infrastructure_config::Config;
use tilehawk_application::ports::incoming::monitor::{
    MonitorUseCase, PollOutcome, RebuildUseCase,
};
use watcher::bootstrap::state::AppState;
use watcher::cli::{Cli, Command};
use watcher::config_loader;
use watcher::observability;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = config_loader::load_config()?;

    observability::tracing::setup_logging(&config)?;

    info!("Starting Tilehawk");
    info!("Database URL: {}", config.db.database_url);

    let state = AppState::new(config).await?;

    match cli.command {
        Command::Monitor => run_monitor(state).await,
        Command::Rebuild => run_rebuild(&state).await,
    }
}

async fn run_rebuild(state: &AppState) -> Result<(), Box<dyn Error>> {
    let summary = state.rebuild_service.rebuild().await?;
    info!(
        "Rebuild finished: {} projects, {} tiles, {} links, {} history rows inferred",
        summary.projects_created,
        summary.tiles_created,
        summary.links_created,
        summary.history_inferred
    );
    Ok(())
}

async fn run_monitor(mut state: AppState) -> Result<(), Box<dyn Error>> {
    let config = state.config;
    state.watch_service.start().await?;
    observability::startup_info::print_monitor_info(&config);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        if let Err(e) = state.watch_service.sync_projects().await {
            error!("Project sync failed: {}", e);
            if sleep_or_shutdown(&mut shutdown, config.watch.error_sleep_secs).await {
                break;
            }
            continue;
        }

        let mut idle = false;
        for _ in 0..config.watch.polls_per_cycle {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Monitor shutdown completed");
                    return Ok(());
                }
                polled = state.watch_service.poll_once() => match polled {
                    Ok(PollOutcome::Idle) => {
                        idle = true;
                        break;
                    }
                    Ok(PollOutcome::Polled { .. }) => {}
                    Err(e) => {
                        // Recoverable per the error policy: log, sleep,
                        // resume the loop.
                        error!("Tile poll failed: {}", e);
                        if sleep_or_shutdown(&mut shutdown, config.watch.error_sleep_secs).await {
                            info!("Monitor shutdown completed");
                            return Ok(());
                        }
                        break;
                    }
                }
            }
        }

        let pause = pause_secs(&config, idle);
        if sleep_or_shutdown(&mut shutdown, pause).await {
            break;
        }
    }

    info!("Monitor shutdown completed");
    Ok(())
}

fn pause_secs(config: &Config, idle: bool) -> u64 {
    if idle {
        config.watch.idle_sleep_secs
    } else {
        config.cycle_sleep_with_jitter()
    }
}

/// Sleeps for `secs`, returning true if shutdown fired first.
async fn sleep_or_shutdown(
    shutdown: &mut Pin<&mut impl Future<Output = ()>>,
    secs: u64,
) -> bool {
    tokio::select! {
        () = shutdown.as_mut() => true,
        () = tokio::time::sleep(Duration::from_secs(secs)) => false,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
            }
        }
    };

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, starting graceful shutdown...");
        },
        () = terminate => {
            info!("Received terminate signal, starting graceful shutdown...");
        },
    }
}
