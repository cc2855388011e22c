//! A thread-safe fake cluster.
//!
//! Objects are kept per (kind, namespace, name); cluster-scoped kinds use an empty
//! namespace. Every call is recorded in order, and failures or delays can be
//! injected per kind.

use crate::snapshot::gateway::{Gateway, GatewayError, GatewayResult, RawObject, object_name};
use crate::snapshot::kind::ResourceKind;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    List {
        kind: ResourceKind,
        namespace: String,
    },
    Create {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },
}

impl GatewayCall {
    pub fn kind(&self) -> ResourceKind {
        match self {
            GatewayCall::List { kind, .. } | GatewayCall::Create { kind, .. } => *kind,
        }
    }
}

type ObjectKey = (ResourceKind, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, RawObject>,
    calls: Vec<GatewayCall>,
    unsupported: HashSet<ResourceKind>,
    panicking: HashSet<ResourceKind>,
    list_failures: HashMap<ResourceKind, GatewayError>,
    create_failures: HashMap<ResourceKind, VecDeque<GatewayError>>,
    list_delay: Option<Duration>,
    next_uid: u64,
}

#[derive(Default)]
pub struct InMemoryGateway {
    state: Mutex<State>,
}

fn scope(kind: ResourceKind, namespace: &str) -> String {
    if kind.is_namespaced() {
        namespace.to_string()
    } else {
        String::new()
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // an injected panic must not take the fake cluster down with it
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds an object directly, bypassing call recording.
    pub fn insert(&self, kind: ResourceKind, namespace: &str, object: RawObject) -> &Self {
        let name = object_name(&object).unwrap_or_default().to_string();
        self.state()
            .objects
            .insert((kind, scope(kind, namespace), name), object);
        self
    }

    pub fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<RawObject> {
        self.state()
            .objects
            .get(&(kind, scope(kind, namespace), name.to_string()))
            .cloned()
    }

    pub fn count(&self, kind: ResourceKind, namespace: &str) -> usize {
        let scope = scope(kind, namespace);
        self.state()
            .objects
            .keys()
            .filter(|(k, ns, _)| *k == kind && *ns == scope)
            .count()
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().calls.clone()
    }

    pub fn set_unsupported(&self, kind: ResourceKind) -> &Self {
        self.state().unsupported.insert(kind);
        self
    }

    pub fn panic_on_list(&self, kind: ResourceKind) -> &Self {
        self.state().panicking.insert(kind);
        self
    }

    pub fn fail_list(&self, kind: ResourceKind, error: GatewayError) -> &Self {
        self.state().list_failures.insert(kind, error);
        self
    }

    /// Queues errors returned by the next create calls for `kind`, one per call.
    pub fn fail_next_creates<I: IntoIterator<Item = GatewayError>>(
        &self,
        kind: ResourceKind,
        errors: I,
    ) -> &Self {
        self.state()
            .create_failures
            .entry(kind)
            .or_default()
            .extend(errors);
        self
    }

    pub fn set_list_delay(&self, delay: Duration) -> &Self {
        self.state().list_delay = Some(delay);
        self
    }
}

impl Gateway for InMemoryGateway {
    fn supports(&self, kind: ResourceKind) -> bool {
        !self.state().unsupported.contains(&kind)
    }

    fn list(&self, kind: ResourceKind, namespace: &str) -> GatewayResult<Vec<RawObject>> {
        let (delay, panics) = {
            let mut state = self.state();
            state.calls.push(GatewayCall::List {
                kind,
                namespace: namespace.to_string(),
            });
            (state.list_delay, state.panicking.contains(&kind))
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if panics {
            panic!("injected panic while listing {kind}");
        }

        let state = self.state();
        if let Some(e) = state.list_failures.get(&kind) {
            return Err(e.clone());
        }
        let scope = scope(kind, namespace);
        Ok(state
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && *ns == scope)
            .map(|(_, obj)| {
                // list items come back without type meta, like the real API
                let mut obj = obj.clone();
                if let Some(map) = obj.as_object_mut() {
                    map.remove("apiVersion");
                    map.remove("kind");
                }
                obj
            })
            .collect())
    }

    fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        object: &RawObject,
    ) -> GatewayResult<()> {
        let name = object_name(object)
            .ok_or_else(|| GatewayError::Rejected("metadata.name is required".into()))?
            .to_string();

        let mut state = self.state();
        state.calls.push(GatewayCall::Create {
            kind,
            namespace: namespace.to_string(),
            name: name.clone(),
        });
        if let Some(e) = state
            .create_failures
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
        {
            return Err(e);
        }

        let key = (kind, scope(kind, namespace), name.clone());
        if state.objects.contains_key(&key) {
            return Err(GatewayError::AlreadyExists { kind, name });
        }
        if object
            .get("metadata")
            .and_then(|m| m.get("resourceVersion"))
            .is_some()
        {
            return Err(GatewayError::Rejected(
                "resourceVersion should not be set on objects to be created".into(),
            ));
        }

        state.next_uid += 1;
        let mut stored = object.clone();
        if let Some(metadata) = stored.get_mut("metadata").and_then(|m| m.as_object_mut()) {
            metadata.insert("uid".into(), format!("uid-{}", state.next_uid).into());
            metadata.insert("resourceVersion".into(), "1".into());
        }
        state.objects.insert(key, stored);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_filters_by_kind_and_namespace() {
        let gw = InMemoryGateway::new();
        gw.insert(ResourceKind::Pod, "ns1", json!({"metadata": {"name": "a"}}))
            .insert(ResourceKind::Pod, "ns2", json!({"metadata": {"name": "b"}}))
            .insert(ResourceKind::Service, "ns1", json!({"metadata": {"name": "c"}}));

        let pods = gw.list(ResourceKind::Pod, "ns1").unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(object_name(&pods[0]), Some("a"));
    }

    #[test]
    fn test_list_strips_type_meta() {
        let gw = InMemoryGateway::new();
        gw.insert(
            ResourceKind::Pod,
            "ns1",
            json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "a"}}),
        );
        let pods = gw.list(ResourceKind::Pod, "ns1").unwrap();
        assert!(pods[0].get("kind").is_none());
    }

    #[test]
    fn test_cluster_scoped_kinds_ignore_namespace() {
        let gw = InMemoryGateway::new();
        gw.insert(ResourceKind::PersistentVolume, "", json!({"metadata": {"name": "pv0"}}));
        assert_eq!(gw.list(ResourceKind::PersistentVolume, "any").unwrap().len(), 1);
    }

    #[test]
    fn test_create_reports_already_exists() {
        let gw = InMemoryGateway::new();
        let obj = json!({"metadata": {"name": "web"}});
        gw.create(ResourceKind::Service, "ns1", &obj).unwrap();

        let err = gw.create(ResourceKind::Service, "ns1", &obj).unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(gw.count(ResourceKind::Service, "ns1"), 1);
        assert_eq!(
            gw.get(ResourceKind::Service, "ns1", "web").unwrap()["metadata"]["resourceVersion"],
            "1"
        );
    }

    #[test]
    fn test_create_rejects_stale_resource_version() {
        let gw = InMemoryGateway::new();
        let obj = json!({"metadata": {"name": "web", "resourceVersion": "42"}});
        let err = gw.create(ResourceKind::Service, "ns1", &obj).unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(_)));
    }

    #[test]
    fn test_injected_create_failures_are_consumed_in_order() {
        let gw = InMemoryGateway::new();
        gw.fail_next_creates(
            ResourceKind::Secret,
            [GatewayError::Transient("blip".into())],
        );
        let obj = json!({"metadata": {"name": "token"}});

        assert!(gw.create(ResourceKind::Secret, "ns1", &obj).unwrap_err().is_transient());
        gw.create(ResourceKind::Secret, "ns1", &obj).unwrap();
        assert_eq!(gw.calls().len(), 2);
    }

    #[test]
    fn test_list_failure_is_recorded_as_call() {
        let gw = InMemoryGateway::new();
        gw.fail_list(ResourceKind::Pod, GatewayError::Rejected("forbidden".into()));
        assert!(gw.list(ResourceKind::Pod, "ns1").is_err());
        assert_eq!(
            gw.calls(),
            vec![GatewayCall::List {
                kind: ResourceKind::Pod,
                namespace: "ns1".into()
            }]
        );
    }
}
