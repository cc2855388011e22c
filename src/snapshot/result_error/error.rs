use crate::snapshot::gateway::GatewayError;
use crate::snapshot::result_error::{AddFunctionName, WithMsg};
use itertools::Itertools;
use std::fmt::Debug;
use std::sync::mpsc::SendError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    ThreadPoolBuildError(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("Unsupported resource kind: {0}")]
    UnsupportedKind(String),
    #[error("Invalid resource name {name:?}: {reason}")]
    InvalidResourceName { name: String, reason: String },
    #[error("Invalid backup id {id:?}: {reason}")]
    InvalidBackupId { id: String, reason: String },
    #[error("Object has no metadata.name")]
    MissingObjectName,
    #[error("Object is not a mapping")]
    NotAnObject,
    #[error("Backup {0} already exists")]
    BackupAlreadyExists(String),
    #[error("Backup {backup_id} timed out after {timeout:?} with {pending} job(s) still pending")]
    BackupTimeout {
        backup_id: String,
        timeout: Duration,
        pending: usize,
    },
    #[error("Job cancelled")]
    Cancelled,
    #[error("Worker panicked: {0}")]
    WorkerPanic(String),
    #[error("Job was dropped before reporting back")]
    JobDropped,
    #[error("{0}")]
    ChannelSendError(String),
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{} failed:\n{}", fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithFnName { error: Box<Error>, fn_name: String },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

impl<S: Into<String>> AddFunctionName<S> for Error {
    fn add_fn_name(self, fn_name: S) -> Self {
        Error::WithFnName {
            error: Box::new(self),
            fn_name: fn_name.into(),
        }
    }
}

impl<S: Into<String>> WithMsg<S> for Error {
    fn with_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl<D: Debug> From<SendError<D>> for Error {
    fn from(value: SendError<D>) -> Self {
        Self::ChannelSendError(format!("Failed to send {:?}", value.0))
    }
}

impl From<Vec<Error>> for Error {
    fn from(errors: Vec<Error>) -> Self {
        if errors.is_empty() {
            panic!("Should not create lots of errors when error is empty")
        }
        Self::LotsOfError(errors.into_iter().flat_map(|e| e.into_iter()).collect_vec())
    }
}

impl Error {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(|e| e.into_iter())),
            e => Box::new(std::iter::once(e)),
        }
    }

    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect_vec())
    }

    /// Innermost error once message and function-name wrappers are peeled off.
    pub fn root(&self) -> &Error {
        match self {
            Error::WithMsg { error, .. } | Error::WithFnName { error, .. } => error.root(),
            e => e,
        }
    }

    pub fn gateway_error(&self) -> Option<&GatewayError> {
        match self.root() {
            Error::Gateway(e) => Some(e),
            _ => None,
        }
    }
}
