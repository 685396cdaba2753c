//! Export lifecycle service.
//!
//! Tracks generated export artifacts from registration to deletion: computes
//! retention periods from policy, moves records through
//! `active → expiring → expired → deleted`, evicts files on schedule or under
//! storage pressure, and writes an append-only audit trail of every step.

use std::sync::Arc;

use axum::{Router, routing::get};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower_http::trace::TraceLayer;

pub mod clock;
pub mod config;
pub mod db;
pub mod jobs;
pub mod models;
pub mod observability;
pub mod retention;
pub mod routes;
pub mod services;
pub mod storage;

use crate::{
    clock::{SharedClock, SystemClock},
    config::LifecycleConfig,
    db::DbPool,
    jobs::Scheduler,
    services::{ArtifactStore, FilesystemArtifactStore, Services},
    storage::{DiskProbe, StatvfsProbe},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<LifecycleConfig>,
    pub db: Arc<DbPool>,
    pub services: Services,
    pub scheduler: Arc<Scheduler>,
    /// Cancelled on shutdown. Sweeps stop at the next record boundary.
    pub shutdown: CancellationToken,
    /// Tracks the scheduler loops so shutdown can wait for them.
    pub task_tracker: TaskTracker,
}

impl AppState {
    /// Connect to the database, run migrations if configured, and wire the
    /// services against the real filesystem and clock.
    pub async fn new(config: LifecycleConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db = DbPool::from_config(&config.database)
            .await
            .map_err(|e| format!("Failed to connect to database: {}", e))?;
        if config.database.run_migrations() {
            db.run_migrations().await?;
        }

        let artifacts = Arc::new(FilesystemArtifactStore::new(
            config.retention.safety.file_delete_timeout(),
        ));
        let state = Self::from_parts(
            config,
            Arc::new(db),
            artifacts,
            Arc::new(StatvfsProbe),
            Arc::new(SystemClock),
        );

        if let Err(e) = state.services.policies.refresh().await {
            tracing::warn!(error = %e, "Failed to load retention policies, using configured defaults");
        }

        tracing::info!(
            export_dir = %state.config.storage.export_dir.display(),
            dry_run = state.config.retention.safety.dry_run,
            "Export lifecycle services initialized"
        );
        Ok(state)
    }

    /// Wire the services from already-built parts.
    pub fn from_parts(
        config: LifecycleConfig,
        db: Arc<DbPool>,
        artifacts: Arc<dyn ArtifactStore>,
        probe: Arc<dyn DiskProbe>,
        clock: SharedClock,
    ) -> Self {
        let config = Arc::new(config);
        let services = Services::new(Arc::clone(&db), &config, artifacts, probe, clock.clone());
        let scheduler = Arc::new(Scheduler::new(
            services.clone(),
            Arc::clone(&config),
            clock,
        ));

        Self {
            config,
            db,
            services,
            scheduler,
            shutdown: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        }
    }
}

pub fn build_app(config: &LifecycleConfig, state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/health/live", get(routes::health::liveness));

    if config.observability.metrics.enabled {
        let metrics_path = config
            .observability
            .metrics
            .prometheus
            .as_ref()
            .map(|p| p.path.clone())
            .unwrap_or_else(|| "/metrics".to_string());

        app = app.route(&metrics_path, get(routes::health::metrics));
    }

    app.nest("/admin", routes::admin::get_admin_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
