//! Spec invariants the resource builders rely on
//!
//! A spec that violates one of these cannot be turned into a Deployment and
//! a Service. Retrying does not help; the user has to fix the App.

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::HashSet;
use thiserror::Error;

use crate::app::AppSpec;

/// A declared App that the builders cannot represent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum BuilderError {
    #[error("spec.image must not be empty")]
    EmptyImage,

    #[error("spec.replicas must not be negative (got {0})")]
    NegativeReplicas(i32),

    #[error("port {port} is outside 1-65535")]
    PortOutOfRange { port: i32 },

    #[error("port {port} targets named port '{target}', but the generated container has no named ports")]
    NamedTargetPort { port: i32, target: String },

    #[error("port {port} targets {target}, which is outside 1-65535")]
    TargetPortOutOfRange { port: i32, target: i32 },

    #[error("port {port} needs a name when more than one port is declared")]
    UnnamedPort { port: i32 },

    #[error("port name '{0}' is declared more than once")]
    DuplicatePortName(String),

    #[error("App is missing metadata.{0}")]
    MissingOwnerField(&'static str),
}

fn in_port_range(port: i32) -> bool {
    (1..=65535).contains(&port)
}

impl AppSpec {
    /// Check every invariant the builders rely on
    pub fn validate(&self) -> Result<(), BuilderError> {
        if self.image.trim().is_empty() {
            return Err(BuilderError::EmptyImage);
        }

        if let Some(replicas) = self.replicas {
            if replicas < 0 {
                return Err(BuilderError::NegativeReplicas(replicas));
            }
        }

        let mut names = HashSet::new();
        for port in &self.ports {
            if !in_port_range(port.port) {
                return Err(BuilderError::PortOutOfRange { port: port.port });
            }

            match &port.target_port {
                Some(IntOrString::String(target)) => {
                    return Err(BuilderError::NamedTargetPort {
                        port: port.port,
                        target: target.clone(),
                    });
                }
                Some(IntOrString::Int(target)) if !in_port_range(*target) => {
                    return Err(BuilderError::TargetPortOutOfRange {
                        port: port.port,
                        target: *target,
                    });
                }
                _ => {}
            }

            match port.name.as_deref() {
                Some(name) if !name.is_empty() => {
                    if !names.insert(name) {
                        return Err(BuilderError::DuplicatePortName(name.to_string()));
                    }
                }
                _ if self.ports.len() > 1 => {
                    return Err(BuilderError::UnnamedPort { port: port.port });
                }
                _ => {}
            }
        }

        Ok(())
    }
}
