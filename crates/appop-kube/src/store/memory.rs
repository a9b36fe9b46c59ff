//! In-memory object store
//!
//! Keeps objects as JSON keyed by kind and identity and mimics the parts of
//! the API server the reconcile driver depends on: resource versions with
//! optimistic concurrency, `AlreadyExists` on duplicate creates, a status
//! write that leaves the spec alone and the Service port validation. Counts
//! every call for assertions and can inject faults into the next matching call.
//!
//! The call history grows with every call until [`MemoryStore::reset_counts`],
//! so the store is meant for tests only.

use appop_core::{App, ObjectIdentity};
use async_trait::async_trait;
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use super::{ObjectStore, identity_of};
use crate::builders::HEADLESS_CLUSTER_IP;
use crate::diff::ManagedResource;
use crate::error::{KubeError, Result};

/// Store operation, for fault injection and call history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Create,
    Update,
    UpdateStatus,
}

/// Failure injected into a store call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Backend unreachable
    Unavailable,
    /// Optimistic-concurrency collision
    Conflict,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub creates: usize,
    pub updates: usize,
    pub status_updates: usize,
}

impl OperationCounts {
    /// Number of calls that changed (or tried to change) the store
    pub fn mutations(&self) -> usize {
        self.creates + self.updates + self.status_updates
    }
}

type ObjectKey = (String, String, String);

#[derive(Default)]
struct State {
    /// (kind, namespace, name) -> object JSON
    objects: HashMap<ObjectKey, serde_json::Value>,
    /// Last resource version handed out
    resource_version: u64,
    counts: OperationCounts,
    /// Successful and failed calls, in order
    history: Vec<(StoreOp, String)>,
    faults: Vec<(StoreOp, String, Fault)>,
}

impl State {
    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    /// Record a call and return the fault injected for it, if any
    fn record(&mut self, op: StoreOp, kind: &str) -> Option<Fault> {
        match op {
            StoreOp::Get => self.counts.gets += 1,
            StoreOp::Create => self.counts.creates += 1,
            StoreOp::Update => self.counts.updates += 1,
            StoreOp::UpdateStatus => self.counts.status_updates += 1,
        }
        self.history.push((op, kind.to_string()));

        let position = self
            .faults
            .iter()
            .position(|(o, k, _)| *o == op && k == kind)?;
        Some(self.faults.remove(position).2)
    }
}

fn key(kind: &str, id: &ObjectIdentity) -> ObjectKey {
    (kind.to_string(), id.namespace.clone(), id.name.clone())
}

fn fault_error(fault: Fault, kind: &str, id: &ObjectIdentity) -> KubeError {
    match fault {
        Fault::Unavailable => KubeError::Unavailable {
            kind: kind.to_string(),
            identity: id.clone(),
            message: "injected fault: backend unavailable".to_string(),
        },
        Fault::Conflict => KubeError::Conflict {
            kind: kind.to_string(),
            identity: id.clone(),
        },
    }
}

fn kind_of<K: Resource<DynamicType = ()>>() -> String {
    K::kind(&()).into_owned()
}

fn resource_version(value: &serde_json::Value) -> Option<&str> {
    value.pointer("/metadata/resourceVersion")?.as_str()
}

/// Reject a Service without ports unless it is headless, as the API server does
fn admit(kind: &str, id: &ObjectIdentity, incoming: &serde_json::Value) -> Result<()> {
    if kind != "Service" {
        return Ok(());
    }

    let has_ports = incoming
        .pointer("/spec/ports")
        .and_then(|p| p.as_array())
        .is_some_and(|p| !p.is_empty());
    let headless = incoming.pointer("/spec/clusterIP").and_then(|ip| ip.as_str())
        == Some(HEADLESS_CLUSTER_IP);

    if has_ports || headless {
        Ok(())
    } else {
        Err(KubeError::Rejected {
            kind: kind.to_string(),
            identity: id.clone(),
            code: 422,
            message: "spec.ports: Required value".to_string(),
        })
    }
}

/// In-memory store for tests
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put an object into the store without counting it as a call
    ///
    /// Missing uid and resource version are filled in the way the API server
    /// would on create.
    pub fn insert<K>(&self, obj: K) -> Result<K>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    {
        let kind = kind_of::<K>();
        let id = identity_of(&obj, &kind)?;
        let mut state = self.state();
        let stored = Self::stamp(&mut state, obj, &id)?;
        state
            .objects
            .insert(key(&kind, &id), serde_json::to_value(&stored)?);
        Ok(stored)
    }

    /// Read an object without counting it as a call
    pub fn object<K>(&self, id: &ObjectIdentity) -> Result<Option<K>>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let state = self.state();
        state
            .objects
            .get(&key(&kind_of::<K>(), id))
            .map(|value| serde_json::from_value(value.clone()).map_err(KubeError::from))
            .transpose()
    }

    /// Change a stored object the way another writer would
    ///
    /// Bumps the resource version, so updates based on earlier reads conflict.
    pub fn modify<K, F>(&self, id: &ObjectIdentity, f: F) -> Result<K>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
        F: FnOnce(&mut K),
    {
        let kind = kind_of::<K>();
        let mut state = self.state();
        let value = state
            .objects
            .get(&key(&kind, id))
            .cloned()
            .ok_or_else(|| KubeError::Unavailable {
                kind: kind.clone(),
                identity: id.clone(),
                message: "not found".to_string(),
            })?;

        let mut obj: K = serde_json::from_value(value)?;
        f(&mut obj);
        obj.meta_mut().resource_version = Some(state.next_version());
        state
            .objects
            .insert(key(&kind, id), serde_json::to_value(&obj)?);
        Ok(obj)
    }

    /// Fail the next `op` on `kind` with `fault`
    pub fn inject_fault(&self, op: StoreOp, kind: &str, fault: Fault) {
        self.state().faults.push((op, kind.to_string(), fault));
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.state().counts.clone()
    }

    /// Number of `op` calls made for `kind`
    pub fn calls(&self, op: StoreOp, kind: &str) -> usize {
        self.state()
            .history
            .iter()
            .filter(|(o, k)| *o == op && k == kind)
            .count()
    }

    /// Reset operation counts and clear the call history
    pub fn reset_counts(&self) {
        let mut state = self.state();
        state.counts = OperationCounts::default();
        state.history.clear();
    }

    /// Count stored objects of every kind
    pub fn object_count(&self) -> usize {
        self.state().objects.len()
    }

    fn stamp<K>(state: &mut State, mut obj: K, id: &ObjectIdentity) -> Result<K>
    where
        K: Resource<DynamicType = ()>,
    {
        let version = state.next_version();
        let meta = obj.meta_mut();
        if meta.uid.is_none() {
            meta.uid = Some(format!("{}-{}-{}", id.namespace, id.name, version));
        }
        if meta.generation.is_none() {
            meta.generation = Some(1);
        }
        meta.resource_version = Some(version);
        Ok(obj)
    }

    fn read<K>(&self, op_kind: &str, id: &ObjectIdentity) -> Result<Option<K>>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let mut state = self.state();
        if let Some(fault) = state.record(StoreOp::Get, op_kind) {
            return Err(fault_error(fault, op_kind, id));
        }
        state
            .objects
            .get(&key(op_kind, id))
            .map(|value| serde_json::from_value(value.clone()).map_err(KubeError::from))
            .transpose()
    }

    fn write<K>(&self, op: StoreOp, obj: &K) -> Result<K>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    {
        let kind = kind_of::<K>();
        let id = identity_of(obj, &kind)?;
        let mut state = self.state();
        if let Some(fault) = state.record(op, &kind) {
            return Err(fault_error(fault, &kind, &id));
        }

        let existing = state.objects.get(&key(&kind, &id)).cloned();
        let incoming = serde_json::to_value(obj)?;
        if op != StoreOp::UpdateStatus {
            admit(&kind, &id, &incoming)?;
        }

        let stored = match (op, existing) {
            (StoreOp::Create, Some(_)) => {
                return Err(KubeError::AlreadyExists {
                    kind,
                    identity: id,
                });
            }
            (StoreOp::Create, None) => {
                let obj: K = serde_json::from_value(incoming)?;
                Self::stamp(&mut state, obj, &id)?
            }
            (_, None) => {
                return Err(KubeError::Unavailable {
                    kind,
                    identity: id,
                    message: "not found".to_string(),
                });
            }
            (_, Some(current)) => {
                // Writes without a resource version are unconditional.
                if let Some(version) = resource_version(&incoming) {
                    if Some(version) != resource_version(&current) {
                        return Err(KubeError::Conflict {
                            kind,
                            identity: id,
                        });
                    }
                }

                let mut next = current.clone();
                if op == StoreOp::UpdateStatus {
                    next["status"] = incoming.get("status").cloned().unwrap_or_default();
                } else {
                    let spec_changed = incoming.get("spec") != current.get("spec");
                    next = incoming;
                    next["status"] = current.get("status").cloned().unwrap_or_default();
                    if spec_changed {
                        let generation = current
                            .pointer("/metadata/generation")
                            .and_then(|g| g.as_i64())
                            .unwrap_or(0);
                        next["metadata"]["generation"] = (generation + 1).into();
                    }
                }
                next["metadata"]["resourceVersion"] = state.next_version().into();
                serde_json::from_value(next)?
            }
        };

        state
            .objects
            .insert(key(&kind, &id), serde_json::to_value(&stored)?);
        Ok(stored)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_owner(&self, id: &ObjectIdentity) -> Result<Option<App>> {
        self.read::<App>("App", id)
    }

    async fn update_owner_status(&self, app: &App) -> Result<App> {
        self.write(StoreOp::UpdateStatus, app)
    }

    async fn get<K: ManagedResource>(&self, id: &ObjectIdentity) -> Result<Option<K>> {
        self.read::<K>(&K::kind_name(), id)
    }

    async fn create<K: ManagedResource>(&self, obj: &K) -> Result<K> {
        self.write(StoreOp::Create, obj)
    }

    async fn update<K: ManagedResource>(&self, obj: &K) -> Result<K> {
        self.write(StoreOp::Update, obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appop_core::{AppSpec, AppStatus};
    use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};

    fn id() -> ObjectIdentity {
        ObjectIdentity::new("default", "web")
    }

    fn service() -> Service {
        Service {
            metadata: kube::api::ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    port: 80,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn app() -> App {
        let mut app = App::new(
            "web",
            AppSpec {
                image: "nginx:1.0".to_string(),
                ..Default::default()
            },
        );
        app.metadata.namespace = Some("default".to_string());
        app
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryStore::new();
        let created = store.create(&service()).await.unwrap();
        assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));
        assert!(created.metadata.uid.is_some());

        let fetched: Service = store.get(&id()).await.unwrap().unwrap();
        assert_eq!(fetched, created);

        let counts = store.operation_counts();
        assert_eq!(counts.creates, 1);
        assert_eq!(counts.gets, 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = MemoryStore::new();
        let fetched: Option<Service> = store.get(&id()).await.unwrap();
        assert!(fetched.is_none());
        assert!(store.get_owner(&id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_duplicate_fails() {
        let store = MemoryStore::new();
        store.create(&service()).await.unwrap();
        let result = store.create(&service()).await;
        assert!(matches!(result, Err(KubeError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_update_with_stale_version_conflicts() {
        let store = MemoryStore::new();
        let created = store.create(&service()).await.unwrap();

        store
            .modify::<Service, _>(&id(), |svc| {
                svc.spec.as_mut().unwrap().cluster_ip = Some("10.0.0.1".to_string());
            })
            .unwrap();

        let result = store.update(&created).await;
        assert!(matches!(result, Err(KubeError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_generation() {
        let store = MemoryStore::new();
        let mut svc = store.create(&service()).await.unwrap();
        svc.spec.as_mut().unwrap().type_ = Some("NodePort".to_string());

        let updated = store.update(&svc).await.unwrap();
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("2"));
        assert_eq!(updated.metadata.generation, Some(2));
    }

    #[tokio::test]
    async fn test_update_missing_fails() {
        let store = MemoryStore::new();
        let result = store.update(&service()).await;
        assert!(matches!(result, Err(KubeError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_status_update_leaves_spec() {
        let store = MemoryStore::new();
        let stored = store.insert(app()).unwrap();

        let mut changed = stored.clone();
        changed.spec.image = "ignored".to_string();
        changed.status = Some(AppStatus {
            last_applied_spec: Some("token".to_string()),
            ..Default::default()
        });

        let updated = store.update_owner_status(&changed).await.unwrap();
        assert_eq!(updated.spec.image, "nginx:1.0");
        assert_eq!(
            updated.status.unwrap().last_applied_spec.as_deref(),
            Some("token")
        );
        assert_eq!(store.operation_counts().status_updates, 1);
    }

    #[tokio::test]
    async fn test_service_without_ports_is_rejected() {
        let store = MemoryStore::new();
        let mut svc = service();
        svc.spec.as_mut().unwrap().ports = None;

        let result = store.create(&svc).await;
        assert!(matches!(result, Err(KubeError::Rejected { code: 422, .. })));
        assert_eq!(store.object_count(), 0);
    }

    #[tokio::test]
    async fn test_headless_service_without_ports_is_admitted() {
        let store = MemoryStore::new();
        let mut svc = service();
        let spec = svc.spec.as_mut().unwrap();
        spec.ports = None;
        spec.cluster_ip = Some(HEADLESS_CLUSTER_IP.to_string());

        let created = store.create(&svc).await.unwrap();
        assert_eq!(
            created.spec.unwrap().cluster_ip.as_deref(),
            Some(HEADLESS_CLUSTER_IP)
        );
    }

    #[tokio::test]
    async fn test_update_dropping_ports_is_rejected() {
        let store = MemoryStore::new();
        let mut svc = store.create(&service()).await.unwrap();
        svc.spec.as_mut().unwrap().ports = Some(vec![]);

        let result = store.update(&svc).await;
        assert!(matches!(result, Err(KubeError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_injected_fault_fires_once() {
        let store = MemoryStore::new();
        store.inject_fault(StoreOp::Get, "Service", Fault::Unavailable);

        let first: Result<Option<Service>> = store.get(&id()).await;
        assert!(matches!(first, Err(KubeError::Unavailable { .. })));

        let second: Option<Service> = store.get(&id()).await.unwrap();
        assert!(second.is_none());
        assert_eq!(store.calls(StoreOp::Get, "Service"), 2);
    }

    #[tokio::test]
    async fn test_insert_is_not_counted() {
        let store = MemoryStore::new();
        store.insert(app()).unwrap();
        assert_eq!(store.operation_counts(), OperationCounts::default());
        assert_eq!(store.object_count(), 1);

        let app: Option<App> = store.object(&id()).unwrap();
        assert_eq!(app.unwrap().metadata.generation, Some(1));
    }

    #[tokio::test]
    async fn test_reset_counts() {
        let store = MemoryStore::new();
        store.create(&service()).await.unwrap();
        store.reset_counts();
        assert_eq!(store.operation_counts().mutations(), 0);
        assert_eq!(store.calls(StoreOp::Create, "Service"), 0);
    }
}
