//! appop Kube - Kubernetes integration for the App operator
//!
//! This crate provides:
//! - **Builders**: Deterministic Deployment and Service payloads for an App
//! - **Diff Engine**: Spec-level drift detection and merge-preserving updates
//! - **Object Stores**: The Kubernetes API server, or an in-memory store for tests
//! - **Reconcile Driver**: One convergence pass over one App
//! - **Controller**: The kube-runtime watch loop around the driver

pub mod builders;
pub mod config;
pub mod controller;
pub mod diff;
pub mod error;
pub mod ownership;
pub mod reconcile;
pub mod status;
pub mod store;

pub use builders::{APP_LABEL, DesiredResources, build_deployment, build_service, pod_labels};
pub use config::{ControllerConfig, parse_duration};
pub use diff::{Action, ActionKind, Drift, DriftCheck, ManagedResource, Plan, PlannedChange, diff, plan};
pub use error::{KubeError, ReconcileError, Result};
pub use reconcile::{OutcomeKind, ReconcileOutcome, Reconciler};
pub use store::{Fault, KubeStore, MemoryStore, ObjectStore, OperationCounts, StoreOp};
