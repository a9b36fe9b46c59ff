//! Run command - start the App controller

use appop_kube::{ControllerConfig, KubeError, controller};
use console::style;
use kube::Client;

use crate::error::Result;

pub async fn run(config: ControllerConfig) -> Result<()> {
    config.validate()?;

    let client = Client::try_default().await.map_err(KubeError::Api)?;

    eprintln!(
        "{} Watching Apps in {}",
        style("→").blue().bold(),
        style(config.namespace.as_deref().unwrap_or("all namespaces")).cyan()
    );

    controller::run(client, config).await?;
    Ok(())
}
