//! Wires the registry, the store, the worker pool and a gateway together from
//! an [`EngineConfig`].

use crate::snapshot::api::{
    BackupRequest, BackupResponse, RegisterRequest, RegisterResponse, RestoreRequest,
    RestoreResponse,
};
use crate::snapshot::application::FileAppRegistry;
use crate::snapshot::artifact_store::{ArtifactStore, BackupId};
use crate::snapshot::backup::BackupOrchestrator;
use crate::snapshot::engine_config::EngineConfig;
use crate::snapshot::fetch::Fetcher;
use crate::snapshot::gateway::Gateway;
use crate::snapshot::restore::RestoreOrchestrator;
use crate::snapshot::result_error::result::Result;
use crate::snapshot::worker_pool::WorkerPool;
use getset::Getters;
use std::sync::Arc;
use validator::Validate;

#[derive(Getters)]
#[getset(get = "pub")]
pub struct Engine {
    apps: Arc<FileAppRegistry>,
    backup: BackupOrchestrator,
    restore: RestoreOrchestrator,
}

impl Engine {
    /// Starts the worker pool. The pool lives as long as the engine.
    pub fn new(config: &EngineConfig, gateway: Arc<dyn Gateway>) -> Result<Self> {
        let apps = Arc::new(FileAppRegistry::new(config.apps_dir()));
        let store = ArtifactStore::new(config.backups_dir());

        let fetcher = Fetcher::builder()
            .gateway(gateway.clone())
            .store(store.clone())
            .retry(config.retry().clone())
            .build();
        let pool = WorkerPool::start(config.worker_pool(), fetcher)?;

        let backup = BackupOrchestrator::builder()
            .apps(apps.clone())
            .store(store.clone())
            .pool(pool)
            .maybe_timeout(*config.backup_timeout())
            .build();
        let restore = RestoreOrchestrator::builder()
            .gateway(gateway)
            .store(store)
            .retry(config.retry().clone())
            .build();

        Ok(Self {
            apps,
            backup,
            restore,
        })
    }

    pub fn register_application(&self, request: &RegisterRequest) -> Result<RegisterResponse> {
        let app_id = self.apps.register(request)?;
        Ok(RegisterResponse { app_id })
    }

    pub fn create_backup(&self, request: &BackupRequest) -> Result<BackupResponse> {
        let outcome = self.backup.create_backup(&request.app_id)?;
        Ok(BackupResponse::from_outcome(&request.app_id, outcome))
    }

    pub fn restore_backup(&self, request: &RestoreRequest) -> Result<RestoreResponse> {
        request.validate()?;
        let outcome = self
            .restore
            .restore_backup(&request.backup_id, &request.namespace)?;
        Ok(RestoreResponse::from_outcome(request, outcome))
    }

    pub fn list_backups(&self) -> Result<Vec<BackupId>> {
        self.restore.store().list_backups()
    }
}
