//! The `App` custom resource
//!
//! An App declares one containerized workload and the ports it serves. The
//! operator derives a `Deployment` and a `Service` from it, both named after
//! the App and living in the same namespace.

use k8s_openapi::api::core::v1::{EnvVar, ResourceRequirements, ServicePort};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CoreError, Result};

/// Condition type reporting whether the last reconciliation converged
pub const READY_CONDITION: &str = "Ready";

/// Declared state of an App
///
/// Every field takes part in drift detection: two specs are in sync only when
/// they are structurally equal.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "app.example.com",
    version = "v1",
    kind = "App",
    namespaced,
    status = "AppStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    /// Desired number of pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Container image
    pub image: String,

    /// Ports exposed by the Service; each one also opens a container port
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ServicePort>,

    /// Environment of the container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub envs: Vec<EnvVar>,

    /// Compute requests and limits of the container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

/// Observed state of an App, written only by the operator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppStatus {
    /// Snapshot token of the spec at the last successful reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied_spec: Option<String>,

    /// Generation of the App that `last_applied_spec` was taken from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl App {
    /// Parse an App from a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let app: App = serde_yaml::from_str(content)?;
        if app.metadata.name.is_none() {
            return Err(CoreError::InvalidApp {
                message: "metadata.name is required".to_string(),
            });
        }
        Ok(app)
    }

    /// Load an App from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::AppNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Whether deletion of this App has been requested
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// The Ready condition, if one has been reported
    pub fn ready_condition(&self) -> Option<&Condition> {
        self.status
            .as_ref()?
            .conditions
            .iter()
            .find(|c| c.type_ == READY_CONDITION)
    }
}
