//! Registered applications and the lookup from application id to namespace.

use crate::snapshot::function_path;
use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::Result;
use crate::snapshot::result_error::{AddFunctionName, WithMsg};
use crate::snapshot::validate::validate_path_component;
use bon::Builder;
use function_name::named;
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use validator::Validate;

#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters, PartialEq, Eq)]
#[getset(get = "pub")]
pub struct Application {
    #[validate(custom(function = validate_path_component))]
    #[builder(into)]
    namespace: String,
    #[validate(custom(function = validate_path_component))]
    #[builder(into)]
    name: String,
}

impl Application {
    /// `name-namespace`, the key the application is registered under.
    pub fn id(&self) -> String {
        format!("{}-{}", self.name, self.namespace)
    }
}

pub trait AppRegistry: Send + Sync {
    /// Namespace of a registered application, `None` when it is unknown.
    fn resolve_namespace(&self, app_id: &str) -> Result<Option<String>>;
}

/// One JSON record per application under `dir`, named by the application id.
#[derive(Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct FileAppRegistry {
    dir: PathBuf,
}

impl FileAppRegistry {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, app_id: &str) -> Option<PathBuf> {
        validate_path_component(app_id)
            .ok()
            .map(|_| self.dir.join(app_id))
    }

    /// Stores the record once. Registering the same application again leaves the
    /// existing record untouched and returns the same id.
    #[named]
    pub fn register(&self, app: &Application) -> Result<String> {
        app.validate()?;
        let app_id = app.id();
        let path = self
            .record_path(&app_id)
            .ok_or_else(|| Error::InvalidResourceName {
                name: app_id.clone(),
                reason: "not usable as an application id".into(),
            })?;

        if path.exists() {
            debug!(app_id = %app_id, "Application already registered");
            return Ok(app_id);
        }

        let store = || -> Result<()> {
            std::fs::create_dir_all(&self.dir)?;
            let mut tmp = NamedTempFile::new_in(&self.dir)?;
            tmp.write_all(&serde_json::to_vec(app)?)?;
            match tmp.persist_noclobber(&path) {
                Ok(_) => Ok(()),
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(()),
                Err(e) => Err(e.error.into()),
            }
        };
        store()
            .with_msg(format!("Storing application record {path:?}"))
            .add_fn_name(function_path!())?;

        info!(app_id = %app_id, namespace = %app.namespace, "Registered application");
        Ok(app_id)
    }
}

impl AppRegistry for FileAppRegistry {
    fn resolve_namespace(&self, app_id: &str) -> Result<Option<String>> {
        let Some(path) = self.record_path(app_id) else {
            return Ok(None);
        };
        if !path.is_file() {
            return Ok(None);
        }

        let app: Application = File::open(&path)
            .map_err(Error::from)
            .and_then(|f| serde_json::from_reader(f).map_err(Error::from))
            .with_msg(format!("Reading application record {path:?}"))?;
        Ok(Some(app.namespace).filter(|ns| !ns.is_empty()))
    }
}
