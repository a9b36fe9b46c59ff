//! CLI error types with exit code handling
//!
//! This module provides a unified error type for CLI operations that
//! maps errors to appropriate exit codes.

use appop_core::CoreError;
use appop_kube::{KubeError, ReconcileError};
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// The App violates an invariant the builders rely on
    #[error("Validation failed: {message}")]
    #[diagnostic(code(appop::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// An input file is not a valid manifest
    #[error("Manifest error: {message}")]
    #[diagnostic(code(appop::cli::manifest))]
    Manifest {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(appop::cli::io))]
    Io { message: String },

    /// Kubernetes API failure
    #[error("Cluster error: {message}")]
    #[diagnostic(code(appop::cli::cluster))]
    Cluster {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Invalid combination of options
    #[error("Invalid usage: {message}")]
    #[diagnostic(code(appop::cli::usage))]
    Usage { message: String },

    /// `diff --exit-code` found pending changes
    #[error("{count} resource(s) would change")]
    #[diagnostic(code(appop::cli::diff))]
    DiffChanges { count: usize },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(appop::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::Manifest { .. } => exit_codes::MANIFEST_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::DiffChanges { .. } => exit_codes::DIFF_CHANGES,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a manifest error with help text
    pub fn manifest_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Manifest {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AppNotFound { .. } | CoreError::Io(_) => CliError::Io {
                message: err.to_string(),
            },
            _ => CliError::Manifest {
                message: err.to_string(),
                help: Some("expected a single App document (apiVersion: app.example.com/v1)".to_string()),
            },
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::InvalidConfig(message) => CliError::Usage { message },
            KubeError::Serialization(message) => CliError::Manifest {
                message,
                help: None,
            },
            rejected @ KubeError::Rejected { .. } => CliError::Cluster {
                message: rejected.to_string(),
                help: Some("the API server refused the object; fix the App and apply it again".to_string()),
            },
            other => CliError::Cluster {
                message: other.to_string(),
                help: Some("check your kubeconfig and that the App CRD is installed (appop crd | kubectl apply -f -)".to_string()),
            },
        }
    }
}

impl From<ReconcileError> for CliError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::BuilderInvariantViolation { .. } => CliError::Validation {
                message: err.to_string(),
                help: None,
            },
            ReconcileError::DecodeFault { .. } => CliError::Validation {
                message: err.to_string(),
                help: Some("clear status.lastAppliedSpec to let the operator re-apply the App".to_string()),
            },
            ReconcileError::EncodeFault { .. } => CliError::internal(err.to_string()),
            ReconcileError::Store(e) => CliError::from(e),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
