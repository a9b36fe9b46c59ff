//! Render command - print the resources the operator would apply for an App

use appop_core::ObjectIdentity;
use appop_kube::DesiredResources;
use std::path::Path;

use super::load_app;
use crate::error::{CliError, Result};

/// Output format of rendered resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

pub fn run(app_path: &Path, namespace: Option<&str>, output: OutputFormat) -> Result<()> {
    let app = load_app(app_path, namespace)?;

    let resources = DesiredResources::build(&app).map_err(|e| CliError::Validation {
        message: match ObjectIdentity::of(&app) {
            Some(id) => format!("App '{}': {}", id, e),
            None => e.to_string(),
        },
        help: None,
    })?;

    match output {
        OutputFormat::Yaml => {
            let deployment = serde_yaml::to_string(&resources.deployment)
                .map_err(|e| CliError::internal(e.to_string()))?;
            let service = serde_yaml::to_string(&resources.service)
                .map_err(|e| CliError::internal(e.to_string()))?;
            print!("---\n{}---\n{}", deployment, service);
        }
        OutputFormat::Json => {
            let list = serde_json::json!({
                "apiVersion": "v1",
                "kind": "List",
                "items": [resources.deployment, resources.service],
            });
            let json = serde_json::to_string_pretty(&list)
                .map_err(|e| CliError::internal(e.to_string()))?;
            println!("{}", json);
        }
    }

    Ok(())
}
