//! Last-applied spec snapshots
//!
//! After every successful reconciliation the operator records the spec it
//! applied as an opaque token in `status.lastAppliedSpec`. The next pass
//! decodes that token and compares it with the current spec to decide
//! whether the managed resources have to be rebuilt.
//!
//! Tokens are compact JSON of the spec alone (annotations and status never
//! take part). Field order follows the spec declaration and every map in the
//! spec is ordered, so encoding the same spec always yields the same bytes.

use std::fmt;
use thiserror::Error;

use crate::app::{App, AppSpec};

/// Annotation under which earlier operator versions stored the snapshot
///
/// It is only read, as a fallback when the status field is absent. The next
/// successful reconciliation moves the snapshot into the status.
pub const LEGACY_SPEC_ANNOTATION: &str = "spec";

/// Errors decoding a stored snapshot
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot token is empty")]
    Empty,

    #[error("malformed snapshot token: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("failed to encode spec: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Serialized spec, comparable byte for byte
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotToken(String);

impl SnapshotToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SnapshotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encode a spec into a snapshot token
pub fn encode(spec: &AppSpec) -> Result<SnapshotToken, SnapshotError> {
    serde_json::to_string(spec)
        .map(SnapshotToken)
        .map_err(SnapshotError::Encode)
}

/// Decode a snapshot token back into a spec
///
/// An empty or malformed token is an error, never "no snapshot".
pub fn decode(token: &str) -> Result<AppSpec, SnapshotError> {
    if token.trim().is_empty() {
        return Err(SnapshotError::Empty);
    }
    serde_json::from_str(token).map_err(SnapshotError::Malformed)
}

/// Where a stored snapshot was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    /// `status.lastAppliedSpec`
    Status,
    /// The legacy `spec` annotation
    LegacyAnnotation,
}

/// Raw snapshot token stored on an App
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredSnapshot<'a> {
    pub source: SnapshotSource,
    pub token: &'a str,
}

impl<'a> StoredSnapshot<'a> {
    /// Locate the snapshot stored on an App, preferring the status field
    pub fn find(app: &'a App) -> Option<Self> {
        if let Some(token) = app
            .status
            .as_ref()
            .and_then(|s| s.last_applied_spec.as_deref())
        {
            return Some(Self {
                source: SnapshotSource::Status,
                token,
            });
        }

        app.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(LEGACY_SPEC_ANNOTATION))
            .map(|token| Self {
                source: SnapshotSource::LegacyAnnotation,
                token: token.as_str(),
            })
    }

    pub fn decode(&self) -> Result<AppSpec, SnapshotError> {
        decode(self.token)
    }
}
