use std::path::Path;

use anyhow::{Context, Result, bail};

use egw_plugin::{ServiceDeclaration, StackOutputs};

/// Load the service declaration, dispatching on the file extension.
pub fn load_declaration(path: &str) -> Result<ServiceDeclaration> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read service file {path}"))?;
    let declaration = match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML service file {path}"))?,
        Some("json") | None => serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse JSON service file {path}"))?,
        Some(other) => bail!("Unsupported service file extension \"{other}\" (expected json or toml)"),
    };
    Ok(declaration)
}

/// Load stack outputs. A missing `--outputs-file` means no outputs, which is
/// fine for services addressing their functions by explicit ARN.
pub fn load_outputs(path: Option<&str>) -> Result<StackOutputs> {
    let Some(path) = path else {
        return Ok(StackOutputs::new());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read outputs file {path}"))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse outputs file {path}"))
}
