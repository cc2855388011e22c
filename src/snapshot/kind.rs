//! Supported resource kinds and their static metadata.
//!
//! Every kind carries the API group/version it is re-serialized with, the label
//! used both as `kind:` on the object and as the artifact directory name, and its
//! position in the restore order.

use crate::snapshot::result_error::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Pod,
    Deployment,
    ReplicaSet,
    StatefulSet,
    Service,
    Secret,
    ConfigMap,
    PersistentVolume,
    PersistentVolumeClaim,
    ServiceAccount,
}

/// Static metadata for one kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KindSpec {
    pub kind: ResourceKind,
    pub api_version: &'static str,
    pub label: &'static str,
    pub plural: &'static str,
    pub namespaced: bool,
}

/// Registry table. Backup fans out over this in declaration order.
static KIND_SPECS: [KindSpec; 10] = [
    KindSpec::new(ResourceKind::Pod, "v1", "Pod", "pods", true),
    KindSpec::new(ResourceKind::Deployment, "apps/v1", "Deployment", "deployments", true),
    KindSpec::new(ResourceKind::ReplicaSet, "apps/v1", "ReplicaSet", "replicasets", true),
    KindSpec::new(ResourceKind::StatefulSet, "apps/v1", "StatefulSet", "statefulsets", true),
    KindSpec::new(ResourceKind::Service, "v1", "Service", "services", true),
    KindSpec::new(ResourceKind::Secret, "v1", "Secret", "secrets", true),
    KindSpec::new(ResourceKind::ConfigMap, "v1", "ConfigMap", "configmaps", true),
    KindSpec::new(
        ResourceKind::PersistentVolume,
        "v1",
        "PersistentVolume",
        "persistentvolumes",
        false,
    ),
    KindSpec::new(
        ResourceKind::PersistentVolumeClaim,
        "v1",
        "PersistentVolumeClaim",
        "persistentvolumeclaims",
        true,
    ),
    KindSpec::new(
        ResourceKind::ServiceAccount,
        "v1",
        "ServiceAccount",
        "serviceaccounts",
        true,
    ),
];

/// Restore order: identity and credentials, then storage, then workload
/// controllers, then networking. Dependents must come after what they reference.
pub static RESTORE_ORDER: [ResourceKind; 10] = [
    ResourceKind::ServiceAccount,
    ResourceKind::Secret,
    ResourceKind::ConfigMap,
    ResourceKind::PersistentVolume,
    ResourceKind::PersistentVolumeClaim,
    ResourceKind::StatefulSet,
    ResourceKind::Deployment,
    ResourceKind::ReplicaSet,
    ResourceKind::Pod,
    ResourceKind::Service,
];

impl KindSpec {
    const fn new(
        kind: ResourceKind,
        api_version: &'static str,
        label: &'static str,
        plural: &'static str,
        namespaced: bool,
    ) -> Self {
        Self {
            kind,
            api_version,
            label,
            plural,
            namespaced,
        }
    }
}

impl ResourceKind {
    pub fn all() -> impl Iterator<Item = ResourceKind> {
        KIND_SPECS.iter().map(|s| s.kind)
    }

    pub fn spec(self) -> &'static KindSpec {
        // KIND_SPECS is indexed in declaration order of the enum
        &KIND_SPECS[self as usize]
    }

    pub fn api_version(self) -> &'static str {
        self.spec().api_version
    }

    pub fn label(self) -> &'static str {
        self.spec().label
    }

    pub fn plural(self) -> &'static str {
        self.spec().plural
    }

    pub fn is_namespaced(self) -> bool {
        self.spec().namespaced
    }

    pub fn restore_rank(self) -> usize {
        RESTORE_ORDER
            .iter()
            .position(|k| *k == self)
            .unwrap_or(RESTORE_ORDER.len())
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    /// Accepts the kind label, the plural resource name, or the usual short
    /// names, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let alias = match lower.as_str() {
            "po" => Some(ResourceKind::Pod),
            "deploy" => Some(ResourceKind::Deployment),
            "rs" => Some(ResourceKind::ReplicaSet),
            "sts" => Some(ResourceKind::StatefulSet),
            "svc" => Some(ResourceKind::Service),
            "cm" => Some(ResourceKind::ConfigMap),
            "pv" => Some(ResourceKind::PersistentVolume),
            "pvc" => Some(ResourceKind::PersistentVolumeClaim),
            "sa" => Some(ResourceKind::ServiceAccount),
            _ => None,
        };

        alias
            .or_else(|| {
                KIND_SPECS
                    .iter()
                    .find(|spec| spec.label.eq_ignore_ascii_case(&lower) || spec.plural == lower)
                    .map(|spec| spec.kind)
            })
            .ok_or_else(|| Error::UnsupportedKind(s.to_string()))
    }
}
