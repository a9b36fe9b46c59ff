//! Watch loop wiring the reconcile driver into kube-runtime
//!
//! kube-runtime queues one reconciliation per App identity at a time and
//! triggers it on changes to the App or to any Deployment or Service it owns.

use appop_core::{App, ObjectIdentity};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::error::{KubeError, ReconcileError, Result};
use crate::reconcile::{OutcomeKind, Reconciler};
use crate::store::KubeStore;

/// Shared state handed to every reconciliation
pub struct Context {
    reconciler: Reconciler<KubeStore>,
    config: ControllerConfig,
}

impl Context {
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        Self {
            reconciler: Reconciler::new(KubeStore::with_client(client)),
            config,
        }
    }
}

fn api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <K as kube::Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

async fn reconcile(app: Arc<App>, ctx: Arc<Context>) -> std::result::Result<Action, ReconcileError> {
    let id = ObjectIdentity::of(app.as_ref()).ok_or_else(|| KubeError::MissingIdentity {
        kind: "App".to_string(),
    })?;

    match ctx.reconciler.reconcile(&id).await {
        Ok(outcome) => match outcome.kind {
            OutcomeKind::Converged => Ok(Action::requeue(ctx.config.resync_interval)),
            OutcomeKind::OwnerMissing | OutcomeKind::OwnerDeleting => Ok(Action::await_change()),
        },
        Err(e) => {
            if !e.is_retryable() {
                ctx.reconciler.report_failure(&id, &e).await;
            }
            Err(e)
        }
    }
}

fn error_policy(app: Arc<App>, err: &ReconcileError, ctx: Arc<Context>) -> Action {
    if err.is_retryable() {
        warn!(
            app = %app.name_any(),
            reason = err.reason(),
            error = %err,
            "reconciliation failed, retrying"
        );
        Action::requeue(ctx.config.retry_backoff)
    } else {
        error!(
            app = %app.name_any(),
            reason = err.reason(),
            error = %err,
            "reconciliation failed, App needs to change"
        );
        Action::requeue(ctx.config.fatal_backoff)
    }
}

/// Run the controller until a termination signal arrives
pub async fn run(client: Client, config: ControllerConfig) -> Result<()> {
    config.validate()?;

    let namespace = config.namespace.clone();
    let apps: Api<App> = api(&client, namespace.as_deref());
    let deployments: Api<Deployment> = api(&client, namespace.as_deref());
    let services: Api<Service> = api(&client, namespace.as_deref());

    // Fail fast when the CRD is not installed
    apps.list(&kube::api::ListParams::default().limit(1))
        .await
        .map_err(KubeError::Api)?;

    info!(
        namespace = namespace.as_deref().unwrap_or("*"),
        "starting App controller"
    );

    let ctx = Arc::new(Context::new(client, config));

    Controller::new(apps, watcher::Config::default())
        .owns(deployments, watcher::Config::default())
        .owns(services, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _)) => debug!(app = %obj, "reconciled"),
                Err(e) => debug!(error = %e, "reconcile loop error"),
            }
        })
        .await;

    info!("App controller stopped");
    Ok(())
}
