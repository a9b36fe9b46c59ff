//! Workload builder

use appop_core::{App, BuilderError};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::pod_labels;
use crate::ownership::managed_metadata;

const IMAGE_PULL_POLICY: &str = "IfNotPresent";

/// Build the Deployment running an App
pub fn build_deployment(app: &App) -> Result<Deployment, BuilderError> {
    let labels = pod_labels(app)?;

    Ok(Deployment {
        metadata: managed_metadata(app)?,
        spec: Some(DeploymentSpec {
            replicas: app.spec.replicas,
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container(app)?],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    })
}

fn container(app: &App) -> Result<Container, BuilderError> {
    let name = app
        .metadata
        .name
        .clone()
        .ok_or(BuilderError::MissingOwnerField("name"))?;

    Ok(Container {
        name,
        image: Some(app.spec.image.clone()),
        image_pull_policy: Some(IMAGE_PULL_POLICY.to_string()),
        ports: Some(container_ports(app)?),
        env: (!app.spec.envs.is_empty()).then(|| app.spec.envs.clone()),
        resources: app.spec.resources.clone(),
        ..Default::default()
    })
}

/// One container port per declared service port
///
/// The container listens on the numeric target port, or on the service port
/// itself when no target is given.
fn container_ports(app: &App) -> Result<Vec<ContainerPort>, BuilderError> {
    app.spec
        .ports
        .iter()
        .map(|port| {
            let container_port = match &port.target_port {
                None => port.port,
                Some(IntOrString::Int(target)) => *target,
                Some(IntOrString::String(target)) => {
                    return Err(BuilderError::NamedTargetPort {
                        port: port.port,
                        target: target.clone(),
                    });
                }
            };
            Ok(ContainerPort {
                container_port,
                protocol: port.protocol.clone(),
                ..Default::default()
            })
        })
        .collect()
}
