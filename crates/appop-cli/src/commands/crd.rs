//! CRD command - print the App CustomResourceDefinition

use appop_core::App;
use kube::CustomResourceExt;

use crate::error::{CliError, Result};

pub fn run() -> Result<()> {
    let yaml = serde_yaml::to_string(&App::crd())
        .map_err(|e| CliError::internal(format!("cannot serialize CRD: {}", e)))?;
    print!("{}", yaml);
    Ok(())
}
