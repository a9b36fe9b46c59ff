//! appop Core - Core types for the App operator
//!
//! This crate provides the foundational types used throughout appop:
//! - `App`: The user-declared custom resource (spec + status)
//! - `ObjectIdentity`: Namespace/name identity shared by an App and its children
//! - `snapshot`: The last-applied spec codec used for drift detection
//! - `validate`: Invariants a spec must satisfy before resources are built

pub mod app;
pub mod error;
pub mod identity;
pub mod snapshot;
pub mod validate;

pub use app::{App, AppSpec, AppStatus, READY_CONDITION};
pub use error::{CoreError, Result};
pub use identity::ObjectIdentity;
pub use snapshot::{SnapshotError, SnapshotSource, SnapshotToken, StoredSnapshot};
pub use validate::BuilderError;
