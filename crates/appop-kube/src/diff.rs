//! Diff engine deciding how each managed resource converges
//!
//! Drift is detected once per reconciliation, at the spec level: the current
//! App spec is compared with the last-applied snapshot, never with the live
//! payload of a managed resource. The verdict then applies uniformly to every
//! managed kind:
//! - resource absent: create it from the desired payload
//! - resource present, spec drifted: merge the desired payload into the live
//!   object and update it
//! - resource present, spec in sync: leave it alone
//!
//! A change to any spec field rebuilds every managed resource. Merging keeps
//! whatever the builders do not control, in particular values the cluster
//! assigned after creation.

use appop_core::snapshot::SnapshotSource;
use appop_core::{App, AppSpec, ObjectIdentity, StoredSnapshot};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Service, ServicePort};
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

use crate::builders::DesiredResources;
use crate::error::ReconcileError;

/// A resource kind reconciled on behalf of an App
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + fmt::Debug
    + PartialEq
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Overlay the builder-controlled part of `desired` onto `live`
    ///
    /// The result keeps the live metadata (resource version for optimistic
    /// concurrency, owner references, third-party labels) and every field
    /// assigned outside the builder's control.
    fn merge_preserving(desired: Self, live: Self) -> Self;

    /// Kind name used in logs and plans
    fn kind_name() -> String {
        Self::kind(&()).into_owned()
    }
}

impl ManagedResource for Deployment {
    fn merge_preserving(desired: Self, live: Self) -> Self {
        let mut spec = desired.spec;

        // An App without replicas leaves scaling to whoever set the live count.
        if let Some(spec) = spec.as_mut().filter(|s| s.replicas.is_none()) {
            spec.replicas = live.spec.as_ref().and_then(|s| s.replicas);
        }

        Deployment {
            metadata: live.metadata,
            spec,
            status: None,
        }
    }
}

impl ManagedResource for Service {
    fn merge_preserving(desired: Self, live: Self) -> Self {
        let live_spec = live.spec.unwrap_or_default();
        let mut spec = desired.spec.unwrap_or_default();

        // Allocated by the cluster at creation; immutable afterwards.
        spec.cluster_ip = live_spec.cluster_ip;
        spec.cluster_ips = live_spec.cluster_ips;
        spec.ip_families = live_spec.ip_families;
        spec.ip_family_policy = live_spec.ip_family_policy;

        if spec.health_check_node_port.is_none() {
            spec.health_check_node_port = live_spec.health_check_node_port;
        }

        let live_ports = live_spec.ports.unwrap_or_default();
        for port in spec.ports.iter_mut().flatten() {
            if port.node_port.is_some() {
                continue;
            }
            let allocated = live_ports
                .iter()
                .find(|live| same_port(live, port))
                .and_then(|live| live.node_port);
            port.node_port = allocated;
        }

        Service {
            metadata: live.metadata,
            spec: Some(spec),
            status: None,
        }
    }
}

fn same_port(a: &ServicePort, b: &ServicePort) -> bool {
    fn protocol(p: &ServicePort) -> &str {
        p.protocol.as_deref().unwrap_or("TCP")
    }
    a.port == b.port && protocol(a) == protocol(b)
}

/// Spec-level drift verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drift {
    /// The spec equals the last-applied snapshot
    InSync,
    /// The spec changed since the last apply, or was never applied
    Changed,
}

impl Drift {
    /// Structural comparison of the current spec with the last-applied one
    pub fn detect(current: &AppSpec, last_applied: Option<&AppSpec>) -> Self {
        match last_applied {
            Some(previous) if previous == current => Drift::InSync,
            _ => Drift::Changed,
        }
    }

    pub fn is_changed(self) -> bool {
        self == Drift::Changed
    }
}

/// Drift of an App together with where its snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriftCheck {
    pub drift: Drift,
    /// `None` when the App was never reconciled
    pub source: Option<SnapshotSource>,
}

impl DriftCheck {
    /// Decode the App's stored snapshot and compare it with the current spec
    ///
    /// A snapshot that does not decode is a fault, not an absent snapshot.
    pub fn for_app(app: &App, identity: &ObjectIdentity) -> Result<Self, ReconcileError> {
        let Some(stored) = StoredSnapshot::find(app) else {
            return Ok(Self {
                drift: Drift::Changed,
                source: None,
            });
        };

        let previous = stored
            .decode()
            .map_err(|source| ReconcileError::DecodeFault {
                identity: identity.clone(),
                source,
            })?;

        Ok(Self {
            drift: Drift::detect(&app.spec, Some(&previous)),
            source: Some(stored.source),
        })
    }

    /// Whether the snapshot has to be (re)written after applying
    pub fn needs_persist(&self) -> bool {
        self.drift.is_changed() || self.source != Some(SnapshotSource::Status)
    }
}

/// What to do with one managed resource
#[derive(Debug, Clone, PartialEq)]
pub enum Action<K> {
    /// Resource is absent: create the desired payload
    Create(K),
    /// Resource drifted: update with the merged payload
    UpdateWithMerge(K),
    /// Nothing to do
    NoOp,
}

impl<K> Action<K> {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Create(_) => ActionKind::Create,
            Action::UpdateWithMerge(_) => ActionKind::Update,
            Action::NoOp => ActionKind::NoOp,
        }
    }
}

/// Decide the action for one managed resource
pub fn diff<K: ManagedResource>(desired: K, live: Option<K>, drift: Drift) -> Action<K> {
    match (live, drift) {
        (None, _) => Action::Create(desired),
        (Some(live), Drift::Changed) => Action::UpdateWithMerge(K::merge_preserving(desired, live)),
        (Some(_), Drift::InSync) => Action::NoOp,
    }
}

/// Payload-free view of an [`Action`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Create,
    Update,
    #[serde(rename = "unchanged")]
    NoOp,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Create => write!(f, "create"),
            ActionKind::Update => write!(f, "update"),
            ActionKind::NoOp => write!(f, "unchanged"),
        }
    }
}

/// Action decided for one managed resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedChange {
    pub kind: String,
    pub identity: ObjectIdentity,
    pub action: ActionKind,
}

impl fmt::Display for PlannedChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.identity, self.action)
    }
}

/// Actions for every managed resource of an App, in apply order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub changes: Vec<PlannedChange>,
}

impl Plan {
    /// Whether no mutating call is needed
    pub fn is_noop(&self) -> bool {
        self.changes.iter().all(|c| c.action == ActionKind::NoOp)
    }

    fn count(&self, action: ActionKind) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }

    /// Generate a human-readable summary
    pub fn summary(&self) -> String {
        let created = self.count(ActionKind::Create);
        let updated = self.count(ActionKind::Update);

        let mut parts = Vec::with_capacity(2);
        if created > 0 {
            parts.push(format!("{} to create", created));
        }
        if updated > 0 {
            parts.push(format!("{} to update", updated));
        }

        if parts.is_empty() {
            "No changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, change) in self.changes.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", change)?;
        }
        Ok(())
    }
}

/// Compute the plan for an App against the given live objects, without I/O
pub fn plan(
    app: &App,
    live_deployment: Option<Deployment>,
    live_service: Option<Service>,
) -> Result<Plan, ReconcileError> {
    let identity = ObjectIdentity::of(app).unwrap_or_else(|| {
        ObjectIdentity::new(
            app.metadata.namespace.clone().unwrap_or_default(),
            app.metadata.name.clone().unwrap_or_default(),
        )
    });

    let check = DriftCheck::for_app(app, &identity)?;
    let desired = DesiredResources::build(app).map_err(|source| {
        ReconcileError::BuilderInvariantViolation {
            identity: identity.clone(),
            source,
        }
    })?;

    let changes = vec![
        PlannedChange {
            kind: Deployment::kind_name(),
            identity: identity.clone(),
            action: diff(desired.deployment, live_deployment, check.drift).kind(),
        },
        PlannedChange {
            kind: Service::kind_name(),
            identity,
            action: diff(desired.service, live_service, check.drift).kind(),
        },
    ];

    Ok(Plan { changes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::fixtures::web_app;
    use crate::builders::{build_deployment, build_service};
    use appop_core::AppStatus;
    use appop_core::snapshot::{self, LEGACY_SPEC_ANNOTATION};
    use k8s_openapi::api::core::v1::ServiceSpec;
    use std::collections::BTreeMap;

    fn applied(mut app: App) -> App {
        let token = snapshot::encode(&app.spec).unwrap().into_string();
        app.status = Some(AppStatus {
            last_applied_spec: Some(token),
            ..Default::default()
        });
        app
    }

    fn live_service(app: &App) -> Service {
        let mut service = build_service(app).unwrap();
        service.metadata.resource_version = Some("42".to_string());
        service.metadata.labels = Some(BTreeMap::from([(
            "team".to_string(),
            "platform".to_string(),
        )]));
        let spec = service.spec.as_mut().unwrap();
        spec.cluster_ip = Some("10.96.0.15".to_string());
        spec.cluster_ips = Some(vec!["10.96.0.15".to_string()]);
        spec.ip_families = Some(vec!["IPv4".to_string()]);
        spec.ip_family_policy = Some("SingleStack".to_string());
        spec.type_ = Some("ClusterIP".to_string());
        service
    }

    #[test]
    fn test_drift_detect() {
        let app = web_app("nginx:1.0");
        assert_eq!(Drift::detect(&app.spec, None), Drift::Changed);
        assert_eq!(Drift::detect(&app.spec, Some(&app.spec)), Drift::InSync);

        let other = web_app("nginx:2.0");
        assert_eq!(Drift::detect(&app.spec, Some(&other.spec)), Drift::Changed);
    }

    #[test]
    fn test_diff_absent_creates() {
        let desired = build_deployment(&web_app("nginx:1.0")).unwrap();
        let action = diff(desired.clone(), None, Drift::InSync);
        assert_eq!(action, Action::Create(desired));
    }

    #[test]
    fn test_diff_in_sync_is_noop() {
        let desired = build_deployment(&web_app("nginx:1.0")).unwrap();
        let live = desired.clone();
        assert_eq!(diff(desired, Some(live), Drift::InSync), Action::NoOp);
    }

    #[test]
    fn test_deployment_merge_keeps_live_metadata() {
        let mut live = build_deployment(&web_app("nginx:1.0")).unwrap();
        live.metadata.resource_version = Some("7".to_string());
        live.metadata.owner_references = None;

        let desired = build_deployment(&web_app("nginx:2.0")).unwrap();
        let Action::UpdateWithMerge(merged) = diff(desired.clone(), Some(live), Drift::Changed)
        else {
            panic!("expected an update");
        };

        assert_eq!(merged.metadata.resource_version.as_deref(), Some("7"));
        assert_eq!(merged.metadata.owner_references, None);
        assert_eq!(merged.spec, desired.spec);
        assert!(merged.status.is_none());
    }

    #[test]
    fn test_deployment_merge_keeps_live_replicas_when_unset() {
        let mut live = build_deployment(&web_app("nginx:1.0")).unwrap();
        live.spec.as_mut().unwrap().replicas = Some(5);

        let mut app = web_app("nginx:2.0");
        app.spec.replicas = None;
        let desired = build_deployment(&app).unwrap();

        let merged = Deployment::merge_preserving(desired, live);
        let spec = merged.spec.unwrap();
        assert_eq!(spec.replicas, Some(5));
        assert_eq!(
            spec.template.spec.unwrap().containers[0].image.as_deref(),
            Some("nginx:2.0")
        );
    }

    #[test]
    fn test_deployment_merge_declared_replicas_win() {
        let mut live = build_deployment(&web_app("nginx:1.0")).unwrap();
        live.spec.as_mut().unwrap().replicas = Some(5);

        let desired = build_deployment(&web_app("nginx:1.0")).unwrap();
        let merged = Deployment::merge_preserving(desired, live);
        assert_eq!(merged.spec.unwrap().replicas, Some(2));
    }

    #[test]
    fn test_service_merge_preserves_allocated_address() {
        let live = live_service(&web_app("nginx:1.0"));

        let mut app = web_app("nginx:1.0");
        app.spec.ports[0].port = 8000;
        let desired = build_service(&app).unwrap();

        let merged = Service::merge_preserving(desired, live);
        let spec = merged.spec.unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("10.96.0.15"));
        assert_eq!(spec.cluster_ips, Some(vec!["10.96.0.15".to_string()]));
        assert_eq!(spec.ip_families, Some(vec!["IPv4".to_string()]));
        assert_eq!(spec.ports.unwrap()[0].port, 8000);
        assert_eq!(merged.metadata.resource_version.as_deref(), Some("42"));
        assert_eq!(
            merged.metadata.labels.unwrap().get("team").map(String::as_str),
            Some("platform")
        );
    }

    #[test]
    fn test_service_merge_keeps_node_ports_of_matching_ports() {
        let app = web_app("nginx:1.0");
        let mut live = live_service(&app);
        let spec = live.spec.as_mut().unwrap();
        spec.type_ = Some("NodePort".to_string());
        spec.ports.as_mut().unwrap()[0].node_port = Some(31080);

        let mut changed = web_app("nginx:1.0");
        changed.spec.ports.push(ServicePort {
            name: Some("admin".to_string()),
            port: 9000,
            ..Default::default()
        });
        let desired = build_service(&changed).unwrap();

        let merged = Service::merge_preserving(desired, live);
        let ports = merged.spec.unwrap().ports.unwrap();
        assert_eq!(ports[0].node_port, Some(31080));
        assert_eq!(ports[1].node_port, None);
    }

    #[test]
    fn test_service_merge_does_not_match_other_protocol() {
        let app = web_app("nginx:1.0");
        let mut live = live_service(&app);
        live.spec.as_mut().unwrap().ports.as_mut().unwrap()[0].node_port = Some(31080);

        let mut changed = web_app("nginx:1.0");
        changed.spec.ports[0].protocol = Some("UDP".to_string());
        let merged = Service::merge_preserving(build_service(&changed).unwrap(), live);
        assert_eq!(merged.spec.unwrap().ports.unwrap()[0].node_port, None);
    }

    #[test]
    fn test_service_merge_from_empty_live_spec() {
        let app = web_app("nginx:1.0");
        let live = Service {
            metadata: build_service(&app).unwrap().metadata,
            spec: Some(ServiceSpec::default()),
            status: None,
        };
        let merged = Service::merge_preserving(build_service(&app).unwrap(), live);
        assert_eq!(merged.spec.unwrap().cluster_ip, None);
    }

    #[test]
    fn test_drift_check_never_reconciled() {
        let app = web_app("nginx:1.0");
        let check = DriftCheck::for_app(&app, &ObjectIdentity::new("default", "web")).unwrap();
        assert_eq!(check.drift, Drift::Changed);
        assert_eq!(check.source, None);
        assert!(check.needs_persist());
    }

    #[test]
    fn test_drift_check_in_sync() {
        let app = applied(web_app("nginx:1.0"));
        let check = DriftCheck::for_app(&app, &ObjectIdentity::new("default", "web")).unwrap();
        assert_eq!(check.drift, Drift::InSync);
        assert!(!check.needs_persist());
    }

    #[test]
    fn test_drift_check_legacy_snapshot_needs_migration() {
        let mut app = web_app("nginx:1.0");
        let token = snapshot::encode(&app.spec).unwrap().into_string();
        app.metadata.annotations = Some(BTreeMap::from([(LEGACY_SPEC_ANNOTATION.to_string(), token)]));

        let check = DriftCheck::for_app(&app, &ObjectIdentity::new("default", "web")).unwrap();
        assert_eq!(check.drift, Drift::InSync);
        assert_eq!(check.source, Some(SnapshotSource::LegacyAnnotation));
        assert!(check.needs_persist());
    }

    #[test]
    fn test_drift_check_corrupt_snapshot() {
        let mut app = web_app("nginx:1.0");
        app.status = Some(AppStatus {
            last_applied_spec: Some("{\"image\":".to_string()),
            ..Default::default()
        });
        let result = DriftCheck::for_app(&app, &ObjectIdentity::new("default", "web"));
        assert!(matches!(result, Err(ReconcileError::DecodeFault { .. })));
    }

    #[test]
    fn test_plan_fresh_app() {
        let plan = plan(&web_app("nginx:1.0"), None, None).unwrap();
        assert_eq!(plan.summary(), "2 to create");
        insta::assert_snapshot!(plan.to_string(), @r"
        Deployment default/web: create
        Service default/web: create
        ");
    }

    #[test]
    fn test_plan_image_change() {
        let old = web_app("nginx:1.0");
        let mut app = applied(old.clone());
        app.spec.image = "nginx:2.0".to_string();

        let plan = plan(
            &app,
            Some(build_deployment(&old).unwrap()),
            Some(live_service(&old)),
        )
        .unwrap();
        assert_eq!(plan.summary(), "2 to update");
        assert!(!plan.is_noop());
    }

    #[test]
    fn test_plan_unchanged() {
        let app = applied(web_app("nginx:1.0"));
        let plan = plan(
            &app,
            Some(build_deployment(&app).unwrap()),
            Some(live_service(&app)),
        )
        .unwrap();
        assert!(plan.is_noop());
        assert_eq!(plan.summary(), "No changes");
    }

    #[test]
    fn test_plan_recreates_missing_child_without_drift() {
        let app = applied(web_app("nginx:1.0"));
        let plan = plan(&app, Some(build_deployment(&app).unwrap()), None).unwrap();
        insta::assert_snapshot!(plan.to_string(), @r"
        Deployment default/web: unchanged
        Service default/web: create
        ");
    }

    #[test]
    fn test_plan_invalid_spec() {
        let mut app = web_app("nginx:1.0");
        app.spec.image.clear();
        let result = plan(&app, None, None);
        assert!(matches!(
            result,
            Err(ReconcileError::BuilderInvariantViolation { .. })
        ));
    }
}
