//! Sequential replay of a stored backup into a namespace.
//!
//! Kinds are replayed in [`RESTORE_ORDER`](crate::snapshot::kind::RESTORE_ORDER),
//! artifacts within a kind in name order. An object that already exists counts
//! as restored, so replaying the same backup twice is harmless. Any other
//! failure stops the restore where it is. Stored artifacts are only ever read.

use crate::snapshot::artifact_store::{ArtifactStore, BackupId};
use crate::snapshot::function_path;
use crate::snapshot::gateway::{Gateway, object_name, scrub_for_restore};
use crate::snapshot::kind::ResourceKind;
use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::Result;
use crate::snapshot::result_error::{AddFunctionName, WithMsg};
use crate::snapshot::retry::{RetryConfig, retry_with_backoff};
use bon::Builder;
use function_name::named;
use getset::Getters;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct RestoredObject {
    pub kind: ResourceKind,
    pub name: String,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct RestoreReport {
    pub created: Vec<RestoredObject>,
    pub already_existed: Vec<RestoredObject>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored(RestoreReport),
    BackupNotFound,
}

enum Created {
    New,
    AlreadyExisted,
}

#[derive(Builder, Getters)]
#[getset(get = "pub")]
pub struct RestoreOrchestrator {
    gateway: Arc<dyn Gateway>,
    store: ArtifactStore,
    #[builder(default)]
    retry: RetryConfig,
}

impl RestoreOrchestrator {
    #[named]
    pub fn restore_backup(&self, backup_id: &BackupId, namespace: &str) -> Result<RestoreOutcome> {
        if !self.store.exists(backup_id) {
            info!(backup_id = %backup_id, "Backup not found, nothing to restore");
            return Ok(RestoreOutcome::BackupNotFound);
        }
        info!(backup_id = %backup_id, namespace, "Starting restore");

        let kinds = self
            .store
            .kinds(backup_id)
            .add_fn_name(function_path!())?;
        debug!(backup_id = %backup_id, kinds = ?kinds, "Kinds to restore");

        let mut report = RestoreReport::default();
        for kind in kinds {
            let artifacts = self
                .store
                .list(backup_id, kind)
                .with_msg(format!("Listing {kind} artifacts of backup {backup_id}"))
                .add_fn_name(function_path!())?
                .unwrap_or_default();
            if artifacts.is_empty() {
                continue;
            }
            if !self.gateway.supports(kind) {
                return Err(Error::UnsupportedKind(kind.to_string()))
                    .with_msg(format!("Restoring backup {backup_id}"))
                    .add_fn_name(function_path!());
            }

            for path in artifacts {
                let (name, created) = self
                    .restore_artifact(kind, namespace, &path)
                    .with_msg(format!("Restoring backup {backup_id} into namespace {namespace:?}"))
                    .add_fn_name(function_path!())?;
                let restored = RestoredObject { kind, name };
                match created {
                    Created::New => report.created.push(restored),
                    Created::AlreadyExisted => report.already_existed.push(restored),
                }
            }
        }

        info!(
            backup_id = %backup_id,
            namespace,
            created = report.created.len(),
            already_existed = report.already_existed.len(),
            "Backup restored"
        );
        Ok(RestoreOutcome::Restored(report))
    }

    fn restore_artifact(
        &self,
        kind: ResourceKind,
        namespace: &str,
        path: &Path,
    ) -> Result<(String, Created)> {
        let mut object = self.store.read(path)?;
        scrub_for_restore(kind, namespace, &mut object)?;
        let name = object_name(&object)
            .ok_or(Error::MissingObjectName)
            .with_msg(format!("Artifact {path:?}"))?
            .to_string();

        let operation = format!("create {kind} {name}");
        match retry_with_backoff(&self.retry, &operation, None, || {
            self.gateway.create(kind, namespace, &object)
        }) {
            Ok(()) => {
                debug!(kind = %kind, name = %name, "Created");
                Ok((name, Created::New))
            }
            Err(e) if e.is_already_exists() => {
                debug!(kind = %kind, name = %name, "Already exists");
                Ok((name, Created::AlreadyExisted))
            }
            Err(e) => Err(Error::from(e).with_msg(format!("Creating {kind} {name:?}"))),
        }
    }
}
