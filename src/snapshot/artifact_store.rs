//! On-disk layout of backups.
//!
//! ```text
//! {root}/{backup_id}/{kind}/{resource_name}.yaml
//! ```
//!
//! A backup exists iff its root directory exists. Directories are created on
//! first write. Each (backup, kind, name) is written by a single worker, and only
//! read once the backup that produced it has finished, so no locking is needed.

use crate::snapshot::function_path;
use crate::snapshot::gateway::RawObject;
use crate::snapshot::kind::ResourceKind;
use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::{Result, convert_error_vec};
use crate::snapshot::result_error::{AddFunctionName, WithMsg};
use crate::snapshot::validate::validate_path_component;
use derive_more::Display;
use function_name::named;
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;
use uuid::Uuid;

pub static ARTIFACT_EXT: &str = "yaml";

/// Identifier of one backup. Always a valid single path component.
#[derive(Clone, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BackupId(String);

impl BackupId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for BackupId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        validate_path_component(s)
            .map(|_| Self(s.to_string()))
            .map_err(|e| Error::InvalidBackupId {
                id: s.to_string(),
                reason: e.to_string(),
            })
    }
}

impl TryFrom<String> for BackupId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BackupId> for String {
    fn from(value: BackupId) -> Self {
        value.0
    }
}

impl AsRef<str> for BackupId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn backup_dir(&self, backup_id: &BackupId) -> PathBuf {
        self.root.join(backup_id.as_str())
    }

    pub fn kind_dir(&self, backup_id: &BackupId, kind: ResourceKind) -> PathBuf {
        self.backup_dir(backup_id).join(kind.label())
    }

    pub fn artifact_path(&self, backup_id: &BackupId, kind: ResourceKind, name: &str) -> PathBuf {
        self.kind_dir(backup_id, kind)
            .join(format!("{name}.{ARTIFACT_EXT}"))
    }

    pub fn exists(&self, backup_id: &BackupId) -> bool {
        self.backup_dir(backup_id).is_dir()
    }

    /// Creates the root directory of a new backup, so a backup that captured no
    /// object still exists. Fails if the id is already taken.
    #[named]
    pub fn create_backup_dir(&self, backup_id: &BackupId) -> Result<PathBuf> {
        let dir = self.backup_dir(backup_id);
        let create = || -> Result<()> {
            std::fs::create_dir_all(&self.root)?;
            match std::fs::create_dir(&dir) {
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    Err(Error::BackupAlreadyExists(backup_id.to_string()))
                }
                res => res.map_err(Error::from),
            }
        };
        create()
            .with_msg(format!("Creating backup directory {dir:?}"))
            .add_fn_name(function_path!())?;
        Ok(dir)
    }

    /// Serializes `object` and stores it, replacing any artifact already stored
    /// under the same name. The file only appears once fully written.
    #[named]
    pub fn write(
        &self,
        backup_id: &BackupId,
        kind: ResourceKind,
        name: &str,
        object: &RawObject,
    ) -> Result<PathBuf> {
        validate_path_component(name).map_err(|e| Error::InvalidResourceName {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        let write = || -> Result<PathBuf> {
            let dir = self.kind_dir(backup_id, kind);
            std::fs::create_dir_all(&dir)?;

            let yaml = serde_yml::to_string(object)?;
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(yaml.as_bytes())?;
            tmp.as_file().sync_all()?;

            let path = self.artifact_path(backup_id, kind, name);
            tmp.persist(&path).map_err(|e| Error::from(e.error))?;
            Ok(path)
        };

        write()
            .with_msg(format!("Storing {kind} {name:?} in backup {backup_id}"))
            .add_fn_name(function_path!())
    }

    /// Artifacts of `kind` in lexicographic name order, or `None` when the backup
    /// holds no directory for that kind.
    pub fn list(&self, backup_id: &BackupId, kind: ResourceKind) -> Result<Option<Vec<PathBuf>>> {
        let dir = self.kind_dir(backup_id, kind);
        if !dir.is_dir() {
            return Ok(None);
        }

        let mut files = std::fs::read_dir(&dir)
            .map_err(Error::from)
            .with_msg(format!("Listing {dir:?}"))?
            .map(|entry| entry.map(|e| e.path()).map_err(Error::from))
            .filter(|res| match res {
                Ok(p) => p.is_file() && p.extension().is_some_and(|ext| ext == ARTIFACT_EXT),
                Err(_) => true,
            })
            .collect::<Result<Vec<_>>>()?;
        files.sort_by(|a, b| a.file_stem().cmp(&b.file_stem()));
        Ok(Some(files))
    }

    /// Kinds the backup holds a directory for, in restore order. A directory
    /// that does not name a supported kind is an error.
    pub fn kinds(&self, backup_id: &BackupId) -> Result<Vec<ResourceKind>> {
        let dir = self.backup_dir(backup_id);
        let mut kinds = Vec::new();
        let mut unknown = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .map_err(Error::from)
            .with_msg(format!("Listing {dir:?}"))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            match name.parse::<ResourceKind>() {
                Ok(kind) if kind.label() == name => kinds.push(kind),
                _ => unknown.push(Error::UnsupportedKind(name)),
            }
        }
        convert_error_vec(unknown).with_msg(format!("Backup {backup_id} holds unknown kinds"))?;

        kinds.sort_by_key(|k| k.restore_rank());
        Ok(kinds)
    }

    pub fn read<P: AsRef<Path>>(&self, path: P) -> Result<RawObject> {
        let path = path.as_ref();
        File::open(path)
            .map_err(Error::from)
            .and_then(|f| serde_yml::from_reader::<_, RawObject>(f).map_err(Error::from))
            .with_msg(format!("Reading artifact {path:?}"))
    }

    /// Every backup currently in the store, sorted.
    pub fn list_backups(&self) -> Result<Vec<BackupId>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(id) = entry.file_name().to_str().and_then(|n| n.parse().ok()) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store() -> (TempDir, ArtifactStore) {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path().join("backups"));
        (tmp, store)
    }

    fn id(s: &str) -> BackupId {
        s.parse().unwrap()
    }

    #[test]
    fn test_backup_id_validation() {
        assert!("b1".parse::<BackupId>().is_ok());
        assert!("../apps".parse::<BackupId>().is_err());
        assert!("".parse::<BackupId>().is_err());
        assert!(BackupId::generate().as_str().parse::<BackupId>().is_ok());
        assert_ne!(BackupId::generate(), BackupId::generate());
    }

    #[test]
    fn test_backup_id_serde_validates() {
        assert!(serde_json::from_str::<BackupId>("\"b1\"").is_ok());
        assert!(serde_json::from_str::<BackupId>("\"a/b\"").is_err());
        assert_eq!(serde_json::to_string(&id("b1")).unwrap(), "\"b1\"");
    }

    #[test]
    fn test_path_layout() {
        let store = ArtifactStore::new("store/backups");
        assert_eq!(
            store.artifact_path(&id("b1"), ResourceKind::Pod, "web"),
            PathBuf::from("store/backups/b1/Pod/web.yaml")
        );
        assert_eq!(
            store.kind_dir(&id("b1"), ResourceKind::PersistentVolumeClaim),
            PathBuf::from("store/backups/b1/PersistentVolumeClaim")
        );
    }

    #[test]
    fn test_write_then_read_round_trips() {
        let (_tmp, store) = store();
        let obj = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "settings", "labels": {"app.kubernetes.io/name": "web"}},
            "data": {"replicas": "3", "mode": "fast"}
        });

        let path = store.write(&id("b1"), ResourceKind::ConfigMap, "settings", &obj).unwrap();
        assert!(path.ends_with("b1/ConfigMap/settings.yaml"));
        assert_eq!(store.read(&path).unwrap(), obj);
    }

    #[test]
    fn test_exists_follows_root_directory() {
        let (_tmp, store) = store();
        assert!(!store.exists(&id("b1")));
        store
            .write(&id("b1"), ResourceKind::Pod, "web", &json!({"metadata": {"name": "web"}}))
            .unwrap();
        assert!(store.exists(&id("b1")));
        assert!(!store.exists(&id("b2")));
    }

    #[test]
    fn test_second_write_overwrites() {
        let (_tmp, store) = store();
        let b1 = id("b1");
        store.write(&b1, ResourceKind::Pod, "web", &json!({"v": 1})).unwrap();
        store.write(&b1, ResourceKind::Pod, "web", &json!({"v": 2})).unwrap();

        let files = store.list(&b1, ResourceKind::Pod).unwrap().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(store.read(&files[0]).unwrap()["v"], 2);
    }

    #[test]
    fn test_list_is_sorted_and_skips_foreign_files() {
        let (_tmp, store) = store();
        let b1 = id("b1");
        for name in ["web-c", "web-1", "web-a", "web", "web-b"] {
            store.write(&b1, ResourceKind::Pod, name, &json!({})).unwrap();
        }
        std::fs::write(store.kind_dir(&b1, ResourceKind::Pod).join("notes.txt"), "x").unwrap();

        let names: Vec<_> = store
            .list(&b1, ResourceKind::Pod)
            .unwrap()
            .unwrap()
            .iter()
            .map(|p| p.file_stem().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["web", "web-1", "web-a", "web-b", "web-c"]);
    }

    #[test]
    fn test_list_missing_kind_is_none() {
        let (_tmp, store) = store();
        let b1 = id("b1");
        store.write(&b1, ResourceKind::Pod, "web", &json!({})).unwrap();
        assert!(store.list(&b1, ResourceKind::Service).unwrap().is_none());
    }

    #[test]
    fn test_kinds_do_not_collide() {
        let (_tmp, store) = store();
        let b1 = id("b1");
        store.write(&b1, ResourceKind::Service, "web", &json!({"k": "svc"})).unwrap();
        store.write(&b1, ResourceKind::Deployment, "web", &json!({"k": "deploy"})).unwrap();

        let svc = store.list(&b1, ResourceKind::Service).unwrap().unwrap();
        let deploy = store.list(&b1, ResourceKind::Deployment).unwrap().unwrap();
        assert_eq!(store.read(&svc[0]).unwrap()["k"], "svc");
        assert_eq!(store.read(&deploy[0]).unwrap()["k"], "deploy");
    }

    #[test]
    fn test_invalid_resource_name_is_rejected() {
        let (_tmp, store) = store();
        let err = store
            .write(&id("b1"), ResourceKind::Pod, "../escape", &json!({}))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidResourceName { .. }));
        assert!(!store.exists(&id("b1")));
    }

    #[test]
    fn test_no_temporary_files_left_behind() {
        let (_tmp, store) = store();
        let b1 = id("b1");
        store.write(&b1, ResourceKind::Secret, "token", &json!({})).unwrap();
        let entries = std::fs::read_dir(store.kind_dir(&b1, ResourceKind::Secret))
            .unwrap()
            .count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_create_backup_dir_claims_the_id() {
        let (_tmp, store) = store();
        let b1 = id("b1");
        store.create_backup_dir(&b1).unwrap();
        assert!(store.exists(&b1));

        let err = store.create_backup_dir(&b1).unwrap_err();
        assert!(matches!(err.root(), Error::BackupAlreadyExists(_)));
    }

    #[test]
    fn test_kinds_in_restore_order() {
        let (_tmp, store) = store();
        let b1 = id("b1");
        for kind in [ResourceKind::Service, ResourceKind::Pod, ResourceKind::Secret] {
            store.write(&b1, kind, "a", &json!({})).unwrap();
        }
        assert_eq!(
            store.kinds(&b1).unwrap(),
            vec![ResourceKind::Secret, ResourceKind::Pod, ResourceKind::Service]
        );
    }

    #[test]
    fn test_unknown_kind_directory_is_an_error() {
        let (_tmp, store) = store();
        let b1 = id("b1");
        store.write(&b1, ResourceKind::Pod, "a", &json!({})).unwrap();
        std::fs::create_dir(store.backup_dir(&b1).join("Ingress")).unwrap();
        std::fs::create_dir(store.backup_dir(&b1).join("pods")).unwrap();

        let err = store.kinds(&b1).unwrap_err();
        match err.root() {
            Error::LotsOfError(errors) => assert_eq!(errors.len(), 2),
            e => panic!("Expected LotsOfError, got {e}"),
        }
    }

    #[test]
    fn test_list_backups() {
        let (_tmp, store) = store();
        assert!(store.list_backups().unwrap().is_empty());
        store.write(&id("b2"), ResourceKind::Pod, "a", &json!({})).unwrap();
        store.write(&id("b1"), ResourceKind::Pod, "a", &json!({})).unwrap();
        assert_eq!(store.list_backups().unwrap(), vec![id("b1"), id("b2")]);
    }

    #[test]
    fn test_read_reports_path_on_error() {
        let (_tmp, store) = store();
        let msg = store.read("/nonexistent/artifact.yaml").unwrap_err().to_string();
        assert!(msg.contains("/nonexistent/artifact.yaml"));
    }
}
