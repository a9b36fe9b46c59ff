//! Resource builders
//!
//! Pure functions from an App to the payload of every resource managed on its
//! behalf. Builders never look at live cluster state, and the same App always
//! yields the same payload.

mod deployment;
mod service;

pub use deployment::build_deployment;
pub use service::{HEADLESS_CLUSTER_IP, build_service};

use appop_core::{App, BuilderError};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use std::collections::BTreeMap;

/// Label key selecting the pods of an App
pub const APP_LABEL: &str = "app.example.com/v1";

/// Labels put on the pods of an App and used as Service/Deployment selector
pub fn pod_labels(app: &App) -> Result<BTreeMap<String, String>, BuilderError> {
    let name = app
        .metadata
        .name
        .clone()
        .ok_or(BuilderError::MissingOwnerField("name"))?;
    Ok(BTreeMap::from([(APP_LABEL.to_string(), name)]))
}

/// Desired payloads of every managed resource kind
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredResources {
    pub deployment: Deployment,
    pub service: Service,
}

impl DesiredResources {
    /// Validate the App and build every managed resource
    ///
    /// Nothing is built unless the whole App is representable.
    pub fn build(app: &App) -> Result<Self, BuilderError> {
        app.spec.validate()?;
        Ok(Self {
            deployment: build_deployment(app)?,
            service: build_service(app)?,
        })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use appop_core::{App, AppSpec};
    use k8s_openapi::api::core::v1::ServicePort;
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

    /// The `web` App used throughout the tests
    pub fn web_app(image: &str) -> App {
        let mut app = App::new(
            "web",
            AppSpec {
                replicas: Some(2),
                image: image.to_string(),
                ports: vec![ServicePort {
                    name: Some("http".to_string()),
                    port: 80,
                    target_port: Some(IntOrString::Int(8080)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            },
        );
        app.metadata.namespace = Some("default".to_string());
        app.metadata.uid = Some("1b4e28ba-2fa1-11d2-883f-0016d3cca427".to_string());
        app.metadata.generation = Some(1);
        app
    }
}
