//! Diff command - show what the operator would do for an App

use appop_core::ObjectIdentity;
use appop_kube::{ActionKind, Plan, plan};
use console::style;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::debug;

use super::load_app;
use crate::error::{CliError, Result};

/// Live objects read from a manifest file
#[derive(Debug, Default)]
pub struct LiveObjects {
    pub deployment: Option<Deployment>,
    pub service: Option<Service>,
}

impl LiveObjects {
    /// Pick the Deployment and Service with `identity` out of a multi-document YAML
    ///
    /// Documents of other kinds or identities are ignored.
    pub fn parse(content: &str, identity: &ObjectIdentity) -> Result<Self> {
        let mut live = Self::default();

        for document in serde_yaml::Deserializer::from_str(content) {
            let value = serde_yaml::Value::deserialize(document).map_err(manifest_error)?;
            if value.is_null() {
                continue;
            }

            match value.get("kind").and_then(|k| k.as_str()) {
                Some("Deployment") => {
                    if let Some(obj) = matching::<Deployment>(value, identity)? {
                        live.deployment = Some(obj);
                    }
                }
                Some("Service") => {
                    if let Some(obj) = matching::<Service>(value, identity)? {
                        live.service = Some(obj);
                    }
                }
                _ => {}
            }
        }

        Ok(live)
    }
}

fn manifest_error(e: serde_yaml::Error) -> CliError {
    CliError::manifest_with_help(
        format!("invalid live objects file: {}", e),
        "pass the output of `kubectl get deployment,service -o yaml` split into documents",
    )
}

fn matching<K>(value: serde_yaml::Value, identity: &ObjectIdentity) -> Result<Option<K>>
where
    K: kube::Resource + DeserializeOwned,
{
    let obj: K = serde_yaml::from_value(value).map_err(manifest_error)?;
    let meta = obj.meta();
    let same = meta.name.as_deref() == Some(identity.name.as_str())
        && meta.namespace.as_deref().unwrap_or(super::DEFAULT_NAMESPACE) == identity.namespace;
    Ok(same.then_some(obj))
}

fn print_plan(plan: &Plan) {
    for change in &plan.changes {
        let marker = match change.action {
            ActionKind::Create => style("+").green().bold(),
            ActionKind::Update => style("~").yellow().bold(),
            ActionKind::NoOp => style("=").dim(),
        };
        println!("{} {}", marker, change);
    }
    println!();
    println!("{}", style(plan.summary()).bold());
}

pub fn run(
    app_path: &Path,
    live_path: Option<&Path>,
    namespace: Option<&str>,
    json: bool,
    exit_code: bool,
) -> Result<()> {
    let app = load_app(app_path, namespace)?;
    let identity = ObjectIdentity::of(&app)
        .ok_or_else(|| CliError::internal("App has no name or namespace"))?;

    let live = match live_path {
        Some(path) => LiveObjects::parse(&std::fs::read_to_string(path)?, &identity)?,
        None => LiveObjects::default(),
    };

    debug!(
        app = %identity,
        live_deployment = live.deployment.is_some(),
        live_service = live.service.is_some(),
        "computing plan"
    );
    let plan = plan(&app, live.deployment, live.service)?;

    if json {
        let output = serde_json::to_string_pretty(&plan)
            .map_err(|e| CliError::internal(e.to_string()))?;
        println!("{}", output);
    } else {
        print_plan(&plan);
    }

    if exit_code && !plan.is_noop() {
        let count = plan
            .changes
            .iter()
            .filter(|c| c.action != ActionKind::NoOp)
            .count();
        return Err(CliError::DiffChanges { count });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIVE: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: default
spec:
  selector:
    matchLabels:
      app.example.com/v1: web
  template:
    metadata:
      labels:
        app.example.com/v1: web
    spec:
      containers:
        - name: web
          image: nginx:1.0
---
apiVersion: v1
kind: Service
metadata:
  name: other
  namespace: default
spec:
  clusterIP: 10.96.0.20
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: web
"#;

    #[test]
    fn test_parse_live_objects_filters_identity() {
        let live = LiveObjects::parse(LIVE, &ObjectIdentity::new("default", "web")).unwrap();
        assert!(live.deployment.is_some());
        assert!(live.service.is_none());
    }

    #[test]
    fn test_parse_live_objects_other_namespace() {
        let live = LiveObjects::parse(LIVE, &ObjectIdentity::new("prod", "web")).unwrap();
        assert!(live.deployment.is_none());
    }

    #[test]
    fn test_parse_live_objects_rejects_garbage() {
        let result = LiveObjects::parse("kind: Deployment\nspec: [", &ObjectIdentity::new("default", "web"));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_empty_file() {
        let live = LiveObjects::parse("", &ObjectIdentity::new("default", "web")).unwrap();
        assert!(live.deployment.is_none() && live.service.is_none());
    }
}
