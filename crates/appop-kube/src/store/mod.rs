//! Object stores holding Apps and the resources they manage
//!
//! The reconcile driver only talks to an [`ObjectStore`]:
//! - **Kube**: the Kubernetes API server, through `kube::Api`
//! - **Memory**: an in-process store for tests
//!
//! Both honor optimistic concurrency: an update carrying a stale resource
//! version fails with a conflict instead of overwriting a newer object.

mod cluster;
mod memory;

pub use cluster::KubeStore;
pub use memory::{Fault, MemoryStore, OperationCounts, StoreOp};

use appop_core::{App, ObjectIdentity};
use async_trait::async_trait;

use crate::diff::ManagedResource;
use crate::error::{KubeError, Result};

/// Field manager recorded on every object the operator writes
pub const FIELD_MANAGER: &str = "appop";

/// Get/create/update access to Apps and their managed resources
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an App; `None` if it does not exist
    async fn get_owner(&self, id: &ObjectIdentity) -> Result<Option<App>>;

    /// Replace the status of an App
    ///
    /// Fails with a conflict if the App changed since it was fetched.
    async fn update_owner_status(&self, app: &App) -> Result<App>;

    /// Fetch a managed resource; `None` if it does not exist
    async fn get<K: ManagedResource>(&self, id: &ObjectIdentity) -> Result<Option<K>>;

    /// Create a managed resource
    async fn create<K: ManagedResource>(&self, obj: &K) -> Result<K>;

    /// Replace a managed resource
    ///
    /// Fails with a conflict if the object changed since it was fetched.
    async fn update<K: ManagedResource>(&self, obj: &K) -> Result<K>;
}

/// Identity of an object about to be written
pub(crate) fn identity_of<K: kube::Resource>(obj: &K, kind: &str) -> Result<ObjectIdentity> {
    ObjectIdentity::of(obj).ok_or_else(|| KubeError::MissingIdentity {
        kind: kind.to_string(),
    })
}
