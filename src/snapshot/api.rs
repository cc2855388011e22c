//! Request and response bodies exchanged with callers, in their JSON wire form.

use crate::snapshot::application::Application;
use crate::snapshot::artifact_store::BackupId;
use crate::snapshot::backup::{BackupOutcome, BackupReport, BackupStatus};
use crate::snapshot::restore::{RestoreOutcome, RestoreReport};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use validator::Validate;

pub static BACKUP_CREATED: &str = "Backup created successfully";
pub static APPLICATION_NOT_FOUND: &str = "Application data not found";
pub static BACKUP_RESTORED: &str = "Backup restored successfully";
pub static BACKUP_NOT_FOUND: &str = "Backup not found";

/// Registering takes the [`Application`] record itself as its body.
pub type RegisterRequest = Application;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterResponse {
    #[serde(rename = "appId")]
    pub app_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupRequest {
    #[serde(rename = "app")]
    pub app_id: String,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupResponse {
    #[serde(rename = "app")]
    pub app_id: String,
    #[serde(rename = "backupId")]
    pub backup_id: String,
    pub message: String,
    #[serde(skip_deserializing)]
    pub report: Option<BackupReport>,
}

impl BackupResponse {
    pub fn from_outcome(app_id: &str, outcome: BackupOutcome) -> Self {
        let (message, report) = match outcome.status {
            BackupStatus::Created(report) => (BACKUP_CREATED, Some(report)),
            BackupStatus::ApplicationNotFound => (APPLICATION_NOT_FOUND, None),
        };
        Self {
            app_id: app_id.to_string(),
            backup_id: outcome.backup_id.to_string(),
            message: message.to_string(),
            report,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.message == APPLICATION_NOT_FOUND
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate, PartialEq, Eq)]
pub struct RestoreRequest {
    #[validate(length(min = 1))]
    pub namespace: String,
    #[serde(rename = "backupId")]
    pub backup_id: BackupId,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestoreResponse {
    pub namespace: String,
    #[serde(rename = "backupId")]
    pub backup_id: String,
    pub message: String,
    #[serde(skip_deserializing)]
    pub report: Option<RestoreReport>,
}

impl RestoreResponse {
    pub fn from_outcome(request: &RestoreRequest, outcome: RestoreOutcome) -> Self {
        let (message, report) = match outcome {
            RestoreOutcome::Restored(report) => (BACKUP_RESTORED, Some(report)),
            RestoreOutcome::BackupNotFound => (BACKUP_NOT_FOUND, None),
        };
        Self {
            namespace: request.namespace.clone(),
            backup_id: request.backup_id.to_string(),
            message: message.to_string(),
            report,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.message == BACKUP_NOT_FOUND
    }
}
