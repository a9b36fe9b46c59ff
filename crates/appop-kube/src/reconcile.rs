//! Reconcile driver
//!
//! One pass over one App:
//! 1. fetch the App; stop if it is gone or being deleted
//! 2. decode its last-applied snapshot and decide drift
//! 3. build the desired Deployment and Service (nothing is written if that fails)
//! 4. converge the Deployment, then the Service
//! 5. record the applied spec and Ready condition in the App status
//!
//! The snapshot is only written after every managed resource converged, so a
//! failed pass is retried with the same drift verdict.

use appop_core::snapshot;
use appop_core::{App, ObjectIdentity};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use tracing::{debug, info, instrument, warn};

use crate::builders::DesiredResources;
use crate::diff::{Action, ActionKind, Drift, DriftCheck, ManagedResource, PlannedChange, diff};
use crate::error::ReconcileError;
use crate::ownership::is_owned_by;
use crate::status;
use crate::store::ObjectStore;

/// How a reconciliation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// The App does not exist (anymore)
    OwnerMissing,
    /// The App is being deleted; garbage collection removes its resources
    OwnerDeleting,
    /// Every managed resource matches the App
    Converged,
}

/// Result of a successful reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub kind: OutcomeKind,
    /// Action taken per managed resource, in apply order
    pub changes: Vec<PlannedChange>,
    /// Whether the App status was written
    pub snapshot_persisted: bool,
}

impl ReconcileOutcome {
    fn skipped(kind: OutcomeKind) -> Self {
        Self {
            kind,
            changes: Vec::new(),
            snapshot_persisted: false,
        }
    }

    /// Whether any managed resource was created or updated
    pub fn applied_changes(&self) -> bool {
        self.changes.iter().any(|c| c.action != ActionKind::NoOp)
    }
}

/// Drives Apps towards their desired state through an [`ObjectStore`]
pub struct Reconciler<S> {
    store: S,
}

impl<S: ObjectStore> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reconcile the App with the given identity
    #[instrument(skip_all, fields(app = %id))]
    pub async fn reconcile(&self, id: &ObjectIdentity) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(app) = self.store.get_owner(id).await? else {
            debug!("App not found, nothing to do");
            return Ok(ReconcileOutcome::skipped(OutcomeKind::OwnerMissing));
        };

        if app.is_deleting() {
            debug!("App is being deleted, skipping");
            return Ok(ReconcileOutcome::skipped(OutcomeKind::OwnerDeleting));
        }

        let check = DriftCheck::for_app(&app, id)?;
        let desired = DesiredResources::build(&app).map_err(|source| {
            ReconcileError::BuilderInvariantViolation {
                identity: id.clone(),
                source,
            }
        })?;

        debug!(drift = ?check.drift, source = ?check.source, "drift decided");

        let changes = vec![
            self.converge::<Deployment>(&app, id, desired.deployment, check.drift)
                .await?,
            self.converge::<Service>(&app, id, desired.service, check.drift)
                .await?,
        ];

        let snapshot_persisted = if check.needs_persist() || !status::is_ready(&app) {
            self.persist(app, id).await?;
            true
        } else {
            false
        };

        Ok(ReconcileOutcome {
            kind: OutcomeKind::Converged,
            changes,
            snapshot_persisted,
        })
    }

    async fn converge<K: ManagedResource>(
        &self,
        app: &App,
        id: &ObjectIdentity,
        desired: K,
        drift: Drift,
    ) -> Result<PlannedChange, ReconcileError> {
        let kind = K::kind_name();
        let live = self.store.get::<K>(id).await?;

        if let Some(live) = &live {
            if !is_owned_by(live.meta(), app) {
                warn!(kind = %kind, "existing object is not controlled by this App");
            }
        }

        let action = diff(desired, live, drift);
        let change = PlannedChange {
            kind: kind.clone(),
            identity: id.clone(),
            action: action.kind(),
        };

        match action {
            Action::Create(obj) => {
                self.store.create(&obj).await?;
                info!(kind = %kind, "created");
            }
            Action::UpdateWithMerge(obj) => {
                self.store.update(&obj).await?;
                info!(kind = %kind, "updated");
            }
            Action::NoOp => debug!(kind = %kind, "unchanged"),
        }

        Ok(change)
    }

    /// Record the applied spec and mark the App ready
    async fn persist(&self, mut app: App, id: &ObjectIdentity) -> Result<(), ReconcileError> {
        let token = snapshot::encode(&app.spec).map_err(|source| ReconcileError::EncodeFault {
            identity: id.clone(),
            source,
        })?;

        let generation = app.metadata.generation;
        let app_status = status::status_mut(&mut app);
        app_status.last_applied_spec = Some(token.into_string());
        app_status.observed_generation = generation;
        status::upsert(&mut app_status.conditions, status::ready(generation));

        self.store.update_owner_status(&app).await?;
        info!("snapshot persisted");
        Ok(())
    }

    /// Best-effort Ready=False on the App after a failed reconciliation
    ///
    /// Failures here are logged and otherwise ignored; the next pass reports
    /// again.
    pub async fn report_failure(&self, id: &ObjectIdentity, err: &ReconcileError) {
        let mut app = match self.store.get_owner(id).await {
            Ok(Some(app)) if !app.is_deleting() => app,
            Ok(_) => return,
            Err(e) => {
                warn!(app = %id, error = %e, "could not fetch App to report failure");
                return;
            }
        };

        let generation = app.metadata.generation;
        let condition = status::failed(err.reason(), err.to_string(), generation);
        status::upsert(&mut status::status_mut(&mut app).conditions, condition);

        if let Err(e) = self.store.update_owner_status(&app).await {
            warn!(app = %id, error = %e, "could not report failure on App status");
        }
    }
}
