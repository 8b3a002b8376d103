use anyhow::Result;

use egw_plugin::{EventGatewayPlugin, ServiceDeclaration, StackOutputs};

use crate::commands::dashboard;
use crate::output::print_success;

pub async fn deploy(
    plugin: &EventGatewayPlugin,
    declaration: &ServiceDeclaration,
    outputs: &StackOutputs,
) -> Result<()> {
    plugin.configure(declaration, outputs).await?;
    print_success(&format!(
        "Deployed {} ({}) to space \"{}\"",
        declaration.service,
        declaration.stage,
        plugin.config().space
    ));
    dashboard::show(plugin.client()).await
}

pub async fn remove(plugin: &EventGatewayPlugin, declaration: &ServiceDeclaration) -> Result<()> {
    plugin.remove().await?;
    print_success(&format!(
        "Removed all gateway resources of {} ({})",
        declaration.service, declaration.stage
    ));
    Ok(())
}
