use crate::snapshot::function_path;
use crate::snapshot::gateway::kubectl::KubectlGateway;
use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::Result;
use crate::snapshot::result_error::{AddFunctionName, WithMsg};
use crate::snapshot::retry::RetryConfig;
use crate::snapshot::validate::validate_dir_exist_or_created;
use crate::snapshot::worker_pool::WorkerPoolConfig;
use bon::Builder;
use function_name::named;
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters, PartialEq)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct EngineConfig {
    /// Holds `apps/` and `backups/`.
    #[validate(custom(function = validate_dir_exist_or_created))]
    #[serde(default = "default_store_dir")]
    #[builder(default = default_store_dir(), into)]
    store_dir: PathBuf,
    #[validate(nested)]
    #[serde(default)]
    #[builder(default)]
    worker_pool: WorkerPoolConfig,
    #[serde(default, with = "humantime_serde")]
    backup_timeout: Option<Duration>,
    #[validate(nested)]
    #[serde(default)]
    #[builder(default)]
    retry: RetryConfig,
    #[validate(nested)]
    #[serde(default)]
    #[builder(default)]
    kubectl: KubectlGateway,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("store")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl EngineConfig {
    pub fn apps_dir(&self) -> PathBuf {
        self.store_dir.join("apps")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.store_dir.join("backups")
    }

    /// Reads a YAML config file and validates it. The store directory is created
    /// if it does not exist yet.
    #[named]
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = File::open(path)
            .map_err(Error::from)
            .and_then(|f| serde_yml::from_reader::<_, EngineConfig>(f).map_err(Error::from))
            .with_msg(format!("Parse YAML config failed: {path:?}"))
            .add_fn_name(function_path!())?;
        config.checked().with_msg(format!("Config validation failed: {path:?}"))
    }

    pub fn checked(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }
}
