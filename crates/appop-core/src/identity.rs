//! Object identity shared by an App and the resources it manages

use kube::Resource;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace + name of a namespaced object
///
/// Managed resources never get an identity of their own: they reuse the
/// identity of the App that owns them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectIdentity {
    pub namespace: String,
    pub name: String,
}

impl ObjectIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Identity of an object, if it carries both a name and a namespace
    pub fn of<K: Resource>(obj: &K) -> Option<Self> {
        let meta = obj.meta();
        match (&meta.namespace, &meta.name) {
            (Some(namespace), Some(name)) => Some(Self::new(namespace, name)),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
