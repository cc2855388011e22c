//! Boundary to the cluster orchestrator.
//!
//! The engine only ever lists objects of one kind in one namespace and creates
//! objects from a payload. Everything else about the cluster (authentication,
//! transport) stays behind the [`Gateway`] trait.

pub mod kubectl;
pub mod memory;

use crate::snapshot::kind::ResourceKind;
use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::Result;
use thiserror::Error;

/// An orchestrator object as fetched from (or sent to) the cluster.
pub type RawObject = serde_json::Value;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: ResourceKind, name: String },
    /// Worth retrying: connection refused, timeouts, server unavailable.
    #[error("transient gateway failure: {0}")]
    Transient(String),
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, GatewayError::AlreadyExists { .. })
    }
}

pub trait Gateway: Send + Sync {
    /// Whether this gateway is configured to handle `kind` at all.
    fn supports(&self, _kind: ResourceKind) -> bool {
        true
    }

    /// Lists every object of `kind` in `namespace`. Cluster-scoped kinds ignore
    /// the namespace.
    fn list(&self, kind: ResourceKind, namespace: &str) -> GatewayResult<Vec<RawObject>>;

    /// Creates `object` in `namespace`. Must return [`GatewayError::AlreadyExists`]
    /// when an object with the same name is already present.
    fn create(&self, kind: ResourceKind, namespace: &str, object: &RawObject)
    -> GatewayResult<()>;
}

pub fn object_name(object: &RawObject) -> Option<&str> {
    object
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(|n| n.as_str())
        .filter(|n| !n.is_empty())
}

/// Sets `apiVersion` and `kind` from the registry. List responses leave them empty
/// on the items, so every fetched object is stamped before it is stored.
pub fn stamp_type_meta(kind: ResourceKind, object: &mut RawObject) -> Result<()> {
    let map = object.as_object_mut().ok_or(Error::NotAnObject)?;
    map.insert("apiVersion".into(), kind.api_version().into());
    map.insert("kind".into(), kind.label().into());
    Ok(())
}

const SCRUBBED_METADATA: [&str; 6] = [
    "resourceVersion",
    "uid",
    "selfLink",
    "creationTimestamp",
    "generation",
    "managedFields",
];

/// Drops the server-assigned fields that make a create call fail or that carry
/// no meaning on the restore target, and points the object at `namespace`.
pub fn scrub_for_restore(kind: ResourceKind, namespace: &str, object: &mut RawObject) -> Result<()> {
    let map = object.as_object_mut().ok_or(Error::NotAnObject)?;
    map.remove("status");

    let metadata = map
        .entry("metadata")
        .or_insert_with(|| serde_json::json!({}))
        .as_object_mut()
        .ok_or(Error::NotAnObject)?;
    for field in SCRUBBED_METADATA {
        metadata.remove(field);
    }
    if kind.is_namespaced() {
        metadata.insert("namespace".into(), namespace.into());
    } else {
        metadata.remove("namespace");
    }
    Ok(())
}
