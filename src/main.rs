use std::path::PathBuf;

use clap::Parser;
use export_lifecycle::{AppState, build_app, config::LifecycleConfig, db, observability};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Config file looked up in the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "export-lifecycle.toml";

/// CLI arguments for the export lifecycle service
#[derive(Parser, Debug)]
#[command(version, about = "Export lifecycle and retention service", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./export-lifecycle.toml if it exists,
    /// otherwise built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run the scheduler and the admin server (default)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Run one full maintenance sweep and exit
    Maintain,
    /// Run one emergency cleanup and exit
    Cleanup,
    /// Print storage, record counts and job status as JSON
    Status,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config_path = args.config.as_deref();

    match args.command {
        Some(Command::Migrate) => run_migrate(config_path).await,
        Some(Command::Maintain) => run_once(config_path, OneShot::Maintain).await,
        Some(Command::Cleanup) => run_once(config_path, OneShot::Cleanup).await,
        Some(Command::Status) => run_once(config_path, OneShot::Status).await,
        Some(Command::Serve) | None => run_server(config_path).await,
    }
}

/// Load the config file, or the defaults when none is given or found.
fn load_config(explicit_path: Option<&str>) -> (LifecycleConfig, Option<PathBuf>) {
    let path = match explicit_path {
        Some(p) => Some(PathBuf::from(p)),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.exists().then_some(default)
        }
    };

    let Some(path) = path else {
        return (LifecycleConfig::default(), None);
    };

    match LifecycleConfig::from_file(&path) {
        Ok(config) => (config, Some(path)),
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn init_observability(config: &LifecycleConfig) {
    observability::init_tracing(&config.observability).expect("Failed to initialize tracing");

    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::warn!(error = %e, "Failed to initialize metrics: {e}");
    }
}

async fn init_state(config: LifecycleConfig) -> AppState {
    match AppState::new(config).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize services");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_server(explicit_config_path: Option<&str>) {
    let (config, config_path) = load_config(explicit_config_path);
    init_observability(&config);

    tracing::info!(
        config_file = %config_path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<defaults>".to_string()),
        "Starting export lifecycle service"
    );
    if config.retention.safety.dry_run {
        tracing::warn!("DRY RUN mode: no export will be transitioned, evicted or audited");
    }

    let state = init_state(config.clone()).await;
    let shutdown = state.shutdown.clone();
    let task_tracker = state.task_tracker.clone();
    let grace = config.scheduler.shutdown_grace();

    state.scheduler.spawn(&task_tracker, &shutdown);

    if !config.server.enabled {
        tracing::info!("Admin server disabled, running scheduler only");
        shutdown_signal(shutdown, task_tracker, grace).await;
        return;
    }

    let app = build_app(&config, state);
    let bind_addr = config.server.socket_addr();
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Admin server listening on http://{}", bind_addr);

    // Graceful shutdown: wait for SIGINT/SIGTERM, then wait for the scheduler loops
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown, task_tracker, grace))
        .await
        .expect("Server error");
}

async fn wait_for_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
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

async fn shutdown_signal(
    shutdown: CancellationToken,
    task_tracker: TaskTracker,
    grace: std::time::Duration,
) {
    wait_for_signal().await;

    tracing::info!("Shutdown signal received, waiting for background jobs to finish...");

    // Running sweeps finish their current record and stop
    shutdown.cancel();
    task_tracker.close();

    match tokio::time::timeout(grace, task_tracker.wait()).await {
        Ok(()) => tracing::info!("All background jobs completed"),
        Err(_) => {
            tracing::warn!("Timeout waiting for background jobs, some may not have completed")
        }
    }

    tracing::info!("Shutdown complete");
}

#[derive(Debug, Clone, Copy)]
enum OneShot {
    Maintain,
    Cleanup,
    Status,
}

/// Run a single job against the configured database and print the result.
async fn run_once(explicit_config_path: Option<&str>, job: OneShot) {
    let (config, _) = load_config(explicit_config_path);
    init_observability(&config);
    let state = init_state(config).await;

    // Ctrl+C stops a long sweep between records
    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.cancel();
    });

    let output = match job {
        OneShot::Maintain => state
            .scheduler
            .run_maintenance(&state.shutdown)
            .await
            .map_err(|e| e.to_string())
            .and_then(|r| serde_json::to_string_pretty(&r).map_err(|e| e.to_string())),
        OneShot::Cleanup => state
            .scheduler
            .run_emergency_cleanup(&state.shutdown)
            .await
            .map_err(|e| e.to_string())
            .and_then(|r| serde_json::to_string_pretty(&r).map_err(|e| e.to_string())),
        OneShot::Status => state
            .scheduler
            .status()
            .await
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::to_string_pretty(&s).map_err(|e| e.to_string())),
    };

    match output {
        Ok(json) => println!("{}", json),
        Err(e) => {
            tracing::error!(job = ?job, error = %e, "Job failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_migrate(explicit_config_path: Option<&str>) {
    let (config, _) = load_config(explicit_config_path);
    init_observability(&config);

    tracing::info!("Running database migrations");

    if config.database.is_none() {
        eprintln!("Error: Database is not configured. Nothing to migrate.");
        std::process::exit(1);
    }

    match db::DbPool::from_config(&config.database).await {
        Ok(pool) => match pool.run_migrations().await {
            Ok(()) => {
                tracing::info!("Database migrations completed successfully");
            }
            Err(e) => {
                tracing::error!(error = %e, "Database migrations failed");
                eprintln!("Error: Database migrations failed: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            eprintln!("Error: Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    }
}
