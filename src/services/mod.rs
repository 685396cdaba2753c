mod artifact_storage;
mod audit_entries;
mod exports;
mod retention_policies;

use std::sync::Arc;

pub use artifact_storage::{
    ArtifactStorageError, ArtifactStorageResult, ArtifactStore, FilesystemArtifactStore,
};
pub use audit_entries::AuditSink;
pub use exports::{
    EvictOutcome, EvictReason, ExportRecordManager, LifecycleError, LifecycleResult,
};
pub use retention_policies::{PolicyError, PolicyStore};

use crate::{
    clock::SharedClock,
    config::LifecycleConfig,
    db::DbPool,
    storage::{DiskProbe, StorageMonitor},
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub exports: Arc<ExportRecordManager>,
    pub policies: Arc<PolicyStore>,
    pub audit: AuditSink,
    pub storage: Arc<StorageMonitor>,
}

impl Services {
    pub fn new(
        db: Arc<DbPool>,
        config: &LifecycleConfig,
        artifacts: Arc<dyn ArtifactStore>,
        probe: Arc<dyn DiskProbe>,
        clock: SharedClock,
    ) -> Self {
        let policies = Arc::new(PolicyStore::new(
            db.clone(),
            &config.retention,
            clock.clone(),
        ));
        let audit = AuditSink::new(db.clone());
        let exports = Arc::new(ExportRecordManager::new(
            db,
            artifacts,
            policies.clone(),
            audit.clone(),
            clock.clone(),
            config.retention.expiring_window(),
        ));
        let storage = Arc::new(StorageMonitor::new(&config.storage, probe, clock));

        Self {
            exports,
            policies,
            audit,
            storage,
        }
    }
}
