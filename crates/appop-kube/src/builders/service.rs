//! Network-endpoint builder

use appop_core::{App, BuilderError};
use k8s_openapi::api::core::v1::{Service, ServiceSpec};

use super::pod_labels;
use crate::ownership::managed_metadata;

/// `clusterIP` value of a Service without a virtual IP
pub const HEADLESS_CLUSTER_IP: &str = "None";

/// Build the Service exposing an App
///
/// Fields the cluster allocates (cluster IPs, node ports, health check node
/// port) are left empty; updates copy them over from the live object.
///
/// An App without ports gets a headless Service: the API server only accepts
/// a Service without ports when it has no cluster IP.
pub fn build_service(app: &App) -> Result<Service, BuilderError> {
    let (ports, cluster_ip) = if app.spec.ports.is_empty() {
        (None, Some(HEADLESS_CLUSTER_IP.to_string()))
    } else {
        (Some(app.spec.ports.clone()), None)
    };

    Ok(Service {
        metadata: managed_metadata(app)?,
        spec: Some(ServiceSpec {
            ports,
            cluster_ip,
            selector: Some(pod_labels(app)?),
            ..Default::default()
        }),
        status: None,
    })
}
