//! Error types for appop-kube

use appop_core::{BuilderError, ObjectIdentity, SnapshotError};
use thiserror::Error;

/// Result type for object store operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors reported by an object store
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error outside any single object operation (client setup, watches)
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Optimistic-concurrency collision: the object changed since it was read
    #[error("{kind} '{identity}' was modified concurrently")]
    Conflict { kind: String, identity: ObjectIdentity },

    /// Create raced with another writer
    #[error("{kind} '{identity}' already exists")]
    AlreadyExists { kind: String, identity: ObjectIdentity },

    /// Transport or backend failure
    #[error("{kind} '{identity}' is unavailable: {message}")]
    Unavailable {
        kind: String,
        identity: ObjectIdentity,
        message: String,
    },

    /// The API server refused the object or the request as invalid or forbidden
    #[error("{kind} '{identity}' was rejected ({code}): {message}")]
    Rejected {
        kind: String,
        identity: ObjectIdentity,
        code: u16,
        message: String,
    },

    /// Object handed to the store has no name or namespace
    #[error("{kind} object has no name or namespace")]
    MissingIdentity { kind: String },

    /// Object payload could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Classify a failed API call on a single object
    pub fn from_api(kind: &str, identity: &ObjectIdentity, err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
                KubeError::AlreadyExists {
                    kind: kind.to_string(),
                    identity: identity.clone(),
                }
            }
            kube::Error::Api(resp) if resp.code == 409 => KubeError::Conflict {
                kind: kind.to_string(),
                identity: identity.clone(),
            },
            kube::Error::Api(resp) if matches!(resp.code, 400 | 403 | 422) => {
                KubeError::Rejected {
                    kind: kind.to_string(),
                    identity: identity.clone(),
                    code: resp.code,
                    message: resp.message.clone(),
                }
            }
            kube::Error::SerdeError(e) => KubeError::Serialization(e.to_string()),
            _ => KubeError::Unavailable {
                kind: kind.to_string(),
                identity: identity.clone(),
                message: err.to_string(),
            },
        }
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Conflict { .. })
    }

    /// Whether a fresh attempt may succeed without user intervention
    pub fn is_retryable(&self) -> bool {
        match self {
            KubeError::Api(_)
            | KubeError::Conflict { .. }
            | KubeError::AlreadyExists { .. }
            | KubeError::Unavailable { .. } => true,
            KubeError::Rejected { .. }
            | KubeError::MissingIdentity { .. }
            | KubeError::Serialization(_)
            | KubeError::InvalidConfig(_) => false,
        }
    }
}

/// Errors that abort a single reconciliation
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The stored last-applied snapshot does not decode
    #[error("stored snapshot of App '{identity}' is corrupt: {source}")]
    DecodeFault {
        identity: ObjectIdentity,
        #[source]
        source: SnapshotError,
    },

    /// The declared App cannot be turned into managed resources
    #[error("App '{identity}' cannot be built: {source}")]
    BuilderInvariantViolation {
        identity: ObjectIdentity,
        #[source]
        source: BuilderError,
    },

    /// The last-applied snapshot could not be encoded
    #[error("snapshot of App '{identity}' cannot be encoded: {source}")]
    EncodeFault {
        identity: ObjectIdentity,
        #[source]
        source: SnapshotError,
    },

    /// A store call failed
    #[error(transparent)]
    Store(#[from] KubeError),
}

impl ReconcileError {
    /// Whether the scheduler should retry this reconciliation
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Store(e) => e.is_retryable(),
            ReconcileError::DecodeFault { .. }
            | ReconcileError::BuilderInvariantViolation { .. }
            | ReconcileError::EncodeFault { .. } => false,
        }
    }

    /// CamelCase reason used in status conditions and logs
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileError::DecodeFault { .. } => "DecodeFault",
            ReconcileError::BuilderInvariantViolation { .. } => "BuilderInvariantViolation",
            ReconcileError::EncodeFault { .. } => "EncodeFault",
            ReconcileError::Store(KubeError::Conflict { .. }) => "StoreConflict",
            ReconcileError::Store(KubeError::AlreadyExists { .. }) => "AlreadyExists",
            ReconcileError::Store(KubeError::Rejected { .. }) => "StoreRejected",
            ReconcileError::Store(KubeError::Serialization(_)) => "StoreSerialization",
            ReconcileError::Store(KubeError::MissingIdentity { .. }) => "MissingIdentity",
            ReconcileError::Store(KubeError::InvalidConfig(_)) => "InvalidConfig",
            ReconcileError::Store(_) => "StoreUnavailable",
        }
    }
}
