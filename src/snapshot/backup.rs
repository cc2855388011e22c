//! Backup orchestration: resolve the application, fan one job per kind out to
//! the worker pool and wait for every job to report back.
//!
//! A backup is best effort. Whatever the individual jobs hit is collected into
//! a [`BackupReport`]; only a failure before any job runs, or a missed
//! deadline, fails the request itself.

use crate::snapshot::application::AppRegistry;
use crate::snapshot::artifact_store::{ArtifactStore, BackupId};
use crate::snapshot::cancel::CancellationToken;
use crate::snapshot::fetch::JobReport;
use crate::snapshot::function_path;
use crate::snapshot::kind::ResourceKind;
use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::Result;
use crate::snapshot::result_error::{AddFunctionName, WithMsg};
use crate::snapshot::worker_pool::{BackupJob, WorkerPool};
use bon::Builder;
use function_name::named;
use getset::Getters;
use serde::Serialize;
use serde_with::skip_serializing_none;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct StoredItem {
    pub kind: ResourceKind,
    pub name: String,
    pub path: PathBuf,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct FailedItem {
    pub kind: ResourceKind,
    pub name: Option<String>,
    pub reason: String,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct BackupReport {
    pub succeeded: Vec<StoredItem>,
    pub failed: Vec<FailedItem>,
}

impl BackupReport {
    fn from_jobs(mut jobs: Vec<JobReport>) -> Self {
        jobs.sort_by_key(|j| j.kind);
        let mut report = Self::default();
        for job in jobs {
            let kind = job.kind;
            report
                .succeeded
                .extend(job.stored.into_iter().map(|s| StoredItem {
                    kind,
                    name: s.name,
                    path: s.path,
                }));
            report
                .failed
                .extend(job.failures.into_iter().map(|f| FailedItem {
                    kind,
                    name: f.name,
                    reason: f.error.to_string(),
                }));
        }
        report
    }

    /// True when no job reported any failure.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn count(&self, kind: ResourceKind) -> usize {
        self.succeeded.iter().filter(|s| s.kind == kind).count()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackupStatus {
    Created(BackupReport),
    ApplicationNotFound,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupOutcome {
    pub backup_id: BackupId,
    pub status: BackupStatus,
}

impl BackupOutcome {
    pub fn report(&self) -> Option<&BackupReport> {
        match &self.status {
            BackupStatus::Created(report) => Some(report),
            BackupStatus::ApplicationNotFound => None,
        }
    }
}

#[derive(Builder, Getters)]
#[getset(get = "pub")]
pub struct BackupOrchestrator {
    apps: Arc<dyn AppRegistry>,
    store: ArtifactStore,
    pool: WorkerPool,
    /// Deadline for the whole fan-out. `None` waits until every job reports.
    timeout: Option<Duration>,
}

impl BackupOrchestrator {
    pub fn create_backup(&self, app_id: &str) -> Result<BackupOutcome> {
        self.create_backup_with_id(BackupId::generate(), app_id)
    }

    #[named]
    pub fn create_backup_with_id(&self, backup_id: BackupId, app_id: &str) -> Result<BackupOutcome> {
        let Some(namespace) = self
            .apps
            .resolve_namespace(app_id)
            .with_msg(format!("Resolving application {app_id:?}"))
            .add_fn_name(function_path!())?
        else {
            info!(app_id, "Application not found, nothing to back up");
            return Ok(BackupOutcome {
                backup_id,
                status: BackupStatus::ApplicationNotFound,
            });
        };

        self.store
            .create_backup_dir(&backup_id)
            .add_fn_name(function_path!())?;
        info!(app_id, namespace = %namespace, backup_id = %backup_id, "Starting backup");

        let started = Instant::now();
        let deadline = self.timeout.map(|t| started + t);
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = mpsc::channel();

        let total = ResourceKind::all().count();
        let mut submitted = Vec::with_capacity(total);
        for kind in ResourceKind::all() {
            let job = BackupJob::new(
                kind,
                backup_id.clone(),
                namespace.as_str(),
                cancel.clone(),
                done_tx.clone(),
            );
            let queued = match deadline {
                None => self.pool.submit(job).map(|_| true),
                Some(deadline) => self.pool.submit_before(job, deadline),
            };
            match queued {
                Ok(true) => submitted.push(kind),
                Ok(false) => {
                    cancel.cancel();
                    drop(done_tx);
                    let finished = done_rx.try_iter().count();
                    return Err(self.timeout_error(&backup_id, total - finished))
                        .add_fn_name(function_path!());
                }
                Err(e) => {
                    cancel.cancel();
                    return Err(e)
                        .with_msg(format!("Submitting {kind} job of backup {backup_id}"))
                        .add_fn_name(function_path!());
                }
            }
        }
        drop(done_tx);
        debug!(backup_id = %backup_id, jobs = submitted.len(), "Submitted backup jobs");

        let reports = match collect_reports(&done_rx, &submitted, deadline) {
            Ok(reports) => reports,
            Err(pending) => {
                cancel.cancel();
                return Err(self.timeout_error(&backup_id, pending)).add_fn_name(function_path!());
            }
        };

        let report = BackupReport::from_jobs(reports);
        if report.is_complete() {
            info!(
                backup_id = %backup_id,
                stored = report.succeeded.len(),
                elapsed = ?started.elapsed(),
                "Backup created"
            );
        } else {
            warn!(
                backup_id = %backup_id,
                stored = report.succeeded.len(),
                failed = report.failed.len(),
                elapsed = ?started.elapsed(),
                "Backup created with failures"
            );
        }
        Ok(BackupOutcome {
            backup_id,
            status: BackupStatus::Created(report),
        })
    }

    fn timeout_error(&self, backup_id: &BackupId, pending: usize) -> Error {
        warn!(backup_id = %backup_id, pending, "Backup deadline passed, cancelling its jobs");
        Error::BackupTimeout {
            backup_id: backup_id.to_string(),
            timeout: self.timeout.unwrap_or_default(),
            pending,
        }
    }
}

/// Waits for one report per submitted kind. Returns the number of jobs still
/// pending if the deadline passes first. Jobs that went away without reporting
/// are filled in as failures.
fn collect_reports(
    done_rx: &Receiver<JobReport>,
    submitted: &[ResourceKind],
    deadline: Option<Instant>,
) -> std::result::Result<Vec<JobReport>, usize> {
    let mut reports: Vec<JobReport> = Vec::with_capacity(submitted.len());
    while reports.len() < submitted.len() {
        let next = match deadline {
            None => done_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            Some(deadline) => {
                done_rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
            }
        };
        match next {
            Ok(report) => reports.push(report),
            Err(RecvTimeoutError::Timeout) => return Err(submitted.len() - reports.len()),
            Err(RecvTimeoutError::Disconnected) => {
                let missing = submitted
                    .iter()
                    .filter(|kind| !reports.iter().any(|r| r.kind == **kind))
                    .copied()
                    .collect::<Vec<_>>();
                reports.extend(
                    missing
                        .into_iter()
                        .map(|kind| JobReport::failed(kind, Error::JobDropped)),
                );
                break;
            }
        }
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::application::{Application, FileAppRegistry};
    use crate::snapshot::fetch::Fetcher;
    use crate::snapshot::gateway::GatewayError;
    use crate::snapshot::gateway::memory::InMemoryGateway;
    use crate::snapshot::worker_pool::WorkerPoolConfig;
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
        gateway: Arc<InMemoryGateway>,
        orchestrator: BackupOrchestrator,
    }

    fn fixture_with(workers: usize, queue_capacity: usize, timeout: Option<Duration>) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let apps = FileAppRegistry::new(tmp.path().join("apps"));
        apps.register(&Application::builder().name("app1").namespace("ns1").build())
            .unwrap();

        let gateway = Arc::new(InMemoryGateway::new());
        let store = ArtifactStore::new(tmp.path().join("backups"));
        let fetcher = Fetcher::builder()
            .gateway(gateway.clone())
            .store(store.clone())
            .build();
        let pool = WorkerPool::start(
            &WorkerPoolConfig::builder()
                .workers(workers)
                .queue_capacity(queue_capacity)
                .build(),
            fetcher,
        )
        .unwrap();

        let orchestrator = BackupOrchestrator::builder()
            .apps(Arc::new(apps))
            .store(store)
            .pool(pool)
            .maybe_timeout(timeout)
            .build();
        Fixture {
            tmp,
            gateway,
            orchestrator,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(3, 4, None)
    }

    fn yaml_files(dir: PathBuf) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == "yaml")
            })
            .count()
    }

    #[test]
    fn test_two_pods_and_a_service() {
        let f = fixture();
        f.gateway
            .insert(ResourceKind::Pod, "ns1", json!({"metadata": {"name": "web-0"}}))
            .insert(ResourceKind::Pod, "ns1", json!({"metadata": {"name": "web-1"}}))
            .insert(ResourceKind::Service, "ns1", json!({"metadata": {"name": "web"}}));

        let outcome = f
            .orchestrator
            .create_backup_with_id("b1".parse().unwrap(), "app1-ns1")
            .unwrap();
        let report = outcome.report().unwrap();
        assert!(report.is_complete(), "{:?}", report.failed);
        assert_eq!(report.count(ResourceKind::Pod), 2);
        assert_eq!(report.count(ResourceKind::Service), 1);

        let backup = f.tmp.path().join("backups/b1");
        assert_eq!(yaml_files(backup.join("Pod")), 2);
        assert_eq!(yaml_files(backup.join("Service")), 1);
        assert!(!backup.join("Deployment").exists());
    }

    #[test]
    fn test_every_kind_is_listed_once() {
        let f = fixture();
        f.orchestrator.create_backup("app1-ns1").unwrap();

        let mut listed: Vec<_> = f.gateway.calls().iter().map(|c| c.kind()).collect();
        listed.sort();
        assert_eq!(listed, ResourceKind::all().collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_backup_still_exists() {
        let f = fixture();
        let outcome = f.orchestrator.create_backup("app1-ns1").unwrap();
        assert!(outcome.report().unwrap().succeeded.is_empty());
        assert!(f.orchestrator.store().exists(&outcome.backup_id));
    }

    #[test]
    fn test_unknown_app_submits_nothing() {
        let f = fixture();
        let outcome = f.orchestrator.create_backup("missing-app").unwrap();
        assert_eq!(outcome.status, BackupStatus::ApplicationNotFound);
        assert!(f.gateway.calls().is_empty());
        assert!(f.orchestrator.store().list_backups().unwrap().is_empty());
    }

    #[test]
    fn test_partial_failures_are_reported_not_raised() {
        let f = fixture();
        f.gateway
            .fail_list(ResourceKind::Secret, GatewayError::Rejected("forbidden".into()))
            .insert(ResourceKind::Pod, "ns1", json!({"metadata": {"name": "web"}}))
            .insert(ResourceKind::ConfigMap, "ns1", json!({"metadata": {}}));

        let outcome = f.orchestrator.create_backup("app1-ns1").unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.count(ResourceKind::Pod), 1);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].kind, ResourceKind::Secret);
        assert_eq!(report.failed[1].kind, ResourceKind::ConfigMap);
        assert!(report.failed[0].reason.contains("forbidden"));
    }

    #[test]
    fn test_report_serializes_without_empty_names() {
        let report = BackupReport {
            succeeded: vec![],
            failed: vec![FailedItem {
                kind: ResourceKind::Secret,
                name: None,
                reason: "forbidden".into(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"succeeded": [], "failed": [{"kind": "Secret", "reason": "forbidden"}]})
        );
    }

    #[test]
    fn test_round_trip_law() {
        let f = fixture();
        let fixtures = [
            (ResourceKind::Deployment, json!({"metadata": {"name": "api"}, "spec": {"replicas": 2}})),
            (ResourceKind::Secret, json!({"metadata": {"name": "token"}, "data": {"k": "dg=="}})),
            (ResourceKind::PersistentVolume, json!({"metadata": {"name": "pv-1"}, "spec": {"capacity": {"storage": "1Gi"}}})),
            (ResourceKind::ServiceAccount, json!({"metadata": {"name": "runner"}})),
        ];
        for (kind, obj) in &fixtures {
            f.gateway.insert(*kind, "ns1", obj.clone());
        }

        let outcome = f.orchestrator.create_backup("app1-ns1").unwrap();
        let store = f.orchestrator.store();
        for kind in ResourceKind::all() {
            let files = store.list(&outcome.backup_id, kind).unwrap().unwrap_or_default();
            assert_eq!(files.len(), f.gateway.count(kind, "ns1"), "{kind}");
        }
        for (kind, obj) in fixtures {
            let name = obj["metadata"]["name"].as_str().unwrap();
            let mut expected = obj.clone();
            expected["apiVersion"] = kind.api_version().into();
            expected["kind"] = kind.label().into();
            let stored = store
                .read(store.artifact_path(&outcome.backup_id, kind, name))
                .unwrap();
            assert_eq!(stored, expected);
        }
    }

    #[test]
    fn test_reused_backup_id_is_rejected() {
        let f = fixture();
        f.orchestrator
            .create_backup_with_id("b1".parse().unwrap(), "app1-ns1")
            .unwrap();
        let err = f
            .orchestrator
            .create_backup_with_id("b1".parse().unwrap(), "app1-ns1")
            .unwrap_err();
        assert!(matches!(err.root(), Error::BackupAlreadyExists(_)));
    }

    #[test]
    fn test_deadline_fails_instead_of_hanging() {
        let f = fixture_with(1, 4, Some(Duration::from_millis(30)));
        f.gateway.set_list_delay(Duration::from_millis(100));

        let err = f.orchestrator.create_backup("app1-ns1").unwrap_err();
        match err.root() {
            Error::BackupTimeout { pending, .. } => assert!(*pending > 0),
            e => panic!("Expected BackupTimeout, got {e}"),
        }
    }

    #[test]
    fn test_deadline_covers_a_full_queue() {
        let f = fixture_with(1, 1, Some(Duration::from_millis(50)));
        f.gateway.set_list_delay(Duration::from_millis(300));

        let started = Instant::now();
        let err = f.orchestrator.create_backup("app1-ns1").unwrap_err();
        assert!(started.elapsed() < Duration::from_millis(250), "{:?}", started.elapsed());
        match err.root() {
            Error::BackupTimeout { pending, .. } => {
                assert!(*pending > 1);
                assert!(*pending <= ResourceKind::all().count());
            }
            e => panic!("Expected BackupTimeout, got {e}"),
        }
    }

    #[test]
    fn test_dropped_jobs_are_reported() {
        let (tx, rx) = mpsc::channel();
        tx.send(JobReport::new(ResourceKind::Pod)).unwrap();
        drop(tx);

        let reports =
            collect_reports(&rx, &[ResourceKind::Pod, ResourceKind::Service], None).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports[0].failures.is_empty());
        assert_eq!(reports[1].kind, ResourceKind::Service);
        assert!(matches!(reports[1].failures[0].error, Error::JobDropped));
    }

    #[test]
    fn test_collect_reports_times_out() {
        let (tx, rx) = mpsc::channel::<JobReport>();
        let pending = collect_reports(
            &rx,
            &[ResourceKind::Pod],
            Some(Instant::now() + Duration::from_millis(10)),
        )
        .unwrap_err();
        assert_eq!(pending, 1);
        drop(tx);
    }
}
