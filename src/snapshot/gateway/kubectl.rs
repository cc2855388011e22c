//! Gateway backed by the `kubectl` binary.

use crate::snapshot::gateway::{Gateway, GatewayError, GatewayResult, RawObject, object_name};
use crate::snapshot::kind::ResourceKind;
use bon::Builder;
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use validator::Validate;

/// Lower-cased stderr fragments that mark a failure as worth retrying.
static TRANSIENT_MARKERS: [&str; 9] = [
    "connection refused",
    "connection reset by peer",
    "i/o timeout",
    "tls handshake timeout",
    "serviceunavailable",
    "the server is currently unable to handle the request",
    "etcdserver: request timed out",
    "too many requests",
    "unable to connect to the server",
];

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct KubectlGateway {
    #[serde(default = "default_binary")]
    #[builder(default = default_binary(), into)]
    binary: PathBuf,
    #[builder(into)]
    kubeconfig: Option<PathBuf>,
    #[builder(into)]
    context: Option<String>,
}

fn default_binary() -> PathBuf {
    PathBuf::from("kubectl")
}

impl Default for KubectlGateway {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl KubectlGateway {
    fn command(&self, kind: ResourceKind, namespace: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(kubeconfig) = &self.kubeconfig {
            cmd.arg("--kubeconfig").arg(kubeconfig);
        }
        if let Some(context) = &self.context {
            cmd.arg("--context").arg(context);
        }
        if kind.is_namespaced() {
            cmd.args(["-n", namespace]);
        }
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> GatewayError {
        if e.kind() == std::io::ErrorKind::NotFound {
            GatewayError::Rejected(format!("{:?} not found: {e}", self.binary))
        } else {
            GatewayError::Transient(format!("running {:?} failed: {e}", self.binary))
        }
    }
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

pub fn classify_failure(kind: ResourceKind, name: &str, stderr: &str) -> GatewayError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("alreadyexists") || lower.contains("already exists") {
        GatewayError::AlreadyExists {
            kind,
            name: name.to_string(),
        }
    } else if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
        GatewayError::Transient(stderr.to_string())
    } else {
        GatewayError::Rejected(stderr.to_string())
    }
}

impl Gateway for KubectlGateway {
    fn list(&self, kind: ResourceKind, namespace: &str) -> GatewayResult<Vec<RawObject>> {
        let output = self
            .command(kind, namespace)
            .args(["get", kind.plural(), "-o", "json"])
            .output()
            .map_err(|e| self.spawn_error(e))?;
        if !output.status.success() {
            return Err(classify_failure(kind, "", &stderr_of(&output)));
        }

        let list: RawObject = serde_json::from_slice(&output.stdout).map_err(|e| {
            GatewayError::Rejected(format!("unparseable {} list output: {e}", kind.plural()))
        })?;
        match list {
            RawObject::Object(mut map) => match map.remove("items") {
                Some(RawObject::Array(items)) => Ok(items),
                _ => Ok(Vec::new()),
            },
            _ => Err(GatewayError::Rejected(format!(
                "{} list output is not an object",
                kind.plural()
            ))),
        }
    }

    fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        object: &RawObject,
    ) -> GatewayResult<()> {
        let name = object_name(object).unwrap_or_default();
        let mut child = self
            .command(kind, namespace)
            .args(["create", "-f", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        // stdin is closed when the handle drops at the end of this block
        let written = match child.stdin.take() {
            Some(mut stdin) => serde_json::to_vec(object)
                .map_err(|e| GatewayError::Rejected(format!("encoding {kind} {name:?}: {e}")))
                .and_then(|bytes| {
                    stdin
                        .write_all(&bytes)
                        .map_err(|e| GatewayError::Transient(format!("writing to kubectl: {e}")))
                }),
            None => Ok(()),
        };

        let output = child.wait_with_output().map_err(|e| self.spawn_error(e))?;
        if !output.status.success() {
            return Err(classify_failure(kind, name, &stderr_of(&output)));
        }
        written
    }
}
