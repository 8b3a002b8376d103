//! Deployment-time reconciliation of declared serverless functions and
//! event subscriptions against a remote Event Gateway.
//!
//! The host invokes two hooks: [`package_requirements`] before
//! provisioning (collecting IAM statements and output descriptors for
//! connector targets) and [`EventGatewayPlugin::configure`] after
//! deployment, which extracts the declared model and runs the
//! [`reconcile::Reconciler`] against the live gateway state.

pub mod config;
pub mod connector;
pub mod extract;
pub mod reconcile;

pub use config::{DeclaredEventType, PluginConfig};
pub use connector::{ConnectorInputs, ConnectorKind};
pub use extract::{
    ExtractedModel, FunctionDefinition, PackageRequirements, ServiceDeclaration, StackOutputs,
    extract_model, extract_requirements,
};
pub use reconcile::Reconciler;

use egw_client::EventGatewayClient;
use egw_core::error::Result;

/// Packaging hook: validate connectors and collect their infrastructure
/// requirements. No remote calls are made.
pub fn package_requirements(declaration: &ServiceDeclaration) -> Result<PackageRequirements> {
    extract::extract_requirements(declaration)
}

/// One configured plugin instance, bound to a single service/stage/space.
pub struct EventGatewayPlugin {
    config: PluginConfig,
    client: EventGatewayClient,
}

impl EventGatewayPlugin {
    /// Parse and validate configuration from the host's service declaration.
    /// Fails before any remote call on missing or deprecated settings.
    pub fn from_declaration(declaration: &ServiceDeclaration) -> Result<Self> {
        let config = PluginConfig::from_custom(
            declaration.custom.as_ref(),
            &declaration.service,
            &declaration.stage,
        )?;
        let client = EventGatewayClient::new(config.client_config());
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn client(&self) -> &EventGatewayClient {
        &self.client
    }

    /// Deployment hook: extract the declared model and converge the remote
    /// gateway onto it.
    pub async fn configure(
        &self,
        declaration: &ServiceDeclaration,
        outputs: &StackOutputs,
    ) -> Result<()> {
        let model = extract::extract_model(declaration, &self.config, outputs)?;
        Reconciler::new(&self.client, outputs).reconcile(&model).await
    }

    /// Remove hook: delete every resource owned by this service/stage.
    pub async fn remove(&self) -> Result<()> {
        let outputs = StackOutputs::new();
        Reconciler::new(&self.client, &outputs).remove().await
    }
}
