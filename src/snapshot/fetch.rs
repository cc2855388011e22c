//! The body of one backup job: list a kind in a namespace and store every
//! object as an artifact.
//!
//! Nothing in here is fatal. Listing failures and per-object failures are
//! collected into the [`JobReport`] so the job always completes.

use crate::snapshot::artifact_store::ArtifactStore;
use crate::snapshot::function_path;
use crate::snapshot::gateway::{Gateway, object_name, stamp_type_meta};
use crate::snapshot::kind::ResourceKind;
use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::{AddFunctionName, WithMsg};
use crate::snapshot::retry::{RetryConfig, retry_with_backoff};
use crate::snapshot::worker_pool::BackupJob;
use bon::Builder;
use function_name::named;
use getset::Getters;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct StoredArtifact {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct JobFailure {
    /// `None` when the failure is not tied to one object (listing, cancellation).
    pub name: Option<String>,
    pub error: Error,
}

#[derive(Debug)]
pub struct JobReport {
    pub kind: ResourceKind,
    pub stored: Vec<StoredArtifact>,
    pub failures: Vec<JobFailure>,
}

impl JobReport {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            stored: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn failed(kind: ResourceKind, error: Error) -> Self {
        let mut report = Self::new(kind);
        report.fail(None, error);
        report
    }

    pub fn fail(&mut self, name: Option<String>, error: Error) {
        self.failures.push(JobFailure { name, error });
    }
}

#[derive(Clone, Builder, Getters)]
#[getset(get = "pub")]
pub struct Fetcher {
    gateway: Arc<dyn Gateway>,
    store: ArtifactStore,
    #[builder(default)]
    retry: RetryConfig,
}

impl Fetcher {
    #[named]
    pub fn fetch_and_store(&self, job: &BackupJob) -> JobReport {
        let kind = job.kind;
        let mut report = JobReport::new(kind);

        if job.cancel.is_cancelled() {
            report.fail(None, Error::Cancelled);
            return report;
        }
        if !self.gateway.supports(kind) {
            report.fail(None, Error::UnsupportedKind(kind.to_string()));
            return report;
        }

        let operation = format!("list {} in {}", kind.plural(), job.namespace);
        let objects = match retry_with_backoff(&self.retry, &operation, Some(&job.cancel), || {
            self.gateway.list(kind, &job.namespace)
        }) {
            Ok(objects) => objects,
            Err(e) => {
                report.fail(
                    None,
                    Error::from(e)
                        .with_msg(format!("Listing {kind} in namespace {:?}", job.namespace))
                        .add_fn_name(function_path!()),
                );
                return report;
            }
        };
        debug!(kind = %kind, backup_id = %job.backup_id, count = objects.len(), "Listed objects");

        for mut object in objects {
            if job.cancel.is_cancelled() {
                report.fail(None, Error::Cancelled);
                break;
            }

            let Some(name) = object_name(&object).map(str::to_string) else {
                report.fail(None, Error::MissingObjectName);
                continue;
            };
            let stored = stamp_type_meta(kind, &mut object)
                .and_then(|_| self.store.write(&job.backup_id, kind, &name, &object));
            match stored {
                Ok(path) => {
                    debug!(kind = %kind, name = %name, path = ?path, "Stored artifact");
                    report.stored.push(StoredArtifact { name, path });
                }
                Err(e) => report.fail(Some(name), e),
            }
        }

        report
    }
}
