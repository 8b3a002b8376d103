//! Plugin configuration parsed from the host's `custom.eventgateway` block.
//!
//! All configuration errors are fatal and raised before any remote call.

use std::collections::BTreeMap;

use serde_json::Value;

use egw_client::ClientConfig;
use egw_core::error::{GatewayError, Result};

/// Declared event type: a name, optionally bound to an authorizer function
/// (referenced by its local function name).
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredEventType {
    pub name: String,
    pub authorizer: Option<String>,
}

/// Validated connection and ownership settings for one deployment run.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    pub events_url: String,
    pub configuration_url: String,
    pub space: String,
    pub api_key: Option<String>,
    pub service: String,
    pub stage: String,
    pub event_types: Vec<DeclaredEventType>,
}

impl PluginConfig {
    /// Parse and validate the `custom.eventgateway` block.
    pub fn from_custom(custom: Option<&Value>, service: &str, stage: &str) -> Result<Self> {
        let block = custom
            .and_then(|c| c.get("eventgateway"))
            .ok_or_else(|| {
                GatewayError::configuration(
                    "No Event Gateway configuration provided in the service definition",
                )
            })?;

        if block.get("subdomain").is_some() {
            return Err(GatewayError::configuration(
                "the \"subdomain\" property is deprecated. Use \"url\" and \"space\" instead",
            ));
        }

        let events_url = required_string(block, "url")?;
        let space = required_string(block, "space")?;
        validate_space(&space)?;

        let configuration_url = optional_string(block, "configurationUrl")
            .unwrap_or_else(|| events_url.clone());
        let api_key = optional_string(block, "apiKey");

        let event_types = parse_event_types(block.get("eventTypes"))?;

        Ok(Self {
            events_url,
            configuration_url,
            space,
            api_key,
            service: service.to_string(),
            stage: stage.to_string(),
            event_types,
        })
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            events_url: self.events_url.clone(),
            configuration_url: self.configuration_url.clone(),
            space: self.space.clone(),
            api_key: self.api_key.clone(),
            service: self.service.clone(),
            stage: self.stage.clone(),
        }
    }
}

fn required_string(block: &Value, key: &str) -> Result<String> {
    optional_string(block, key).ok_or_else(|| {
        GatewayError::configuration(format!(
            "Required \"{key}\" property is missing from the Event Gateway configuration"
        ))
    })
}

fn optional_string(block: &Value, key: &str) -> Option<String> {
    block
        .get(key)
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
}

fn validate_space(space: &str) -> Result<()> {
    let valid = !space.is_empty()
        && space
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(GatewayError::configuration(format!(
            "invalid space \"{space}\": only lowercase letters, digits and dashes are allowed"
        )))
    }
}

/// `eventTypes` maps names to either `null` or `{ authorizer: <functionName> }`.
fn parse_event_types(value: Option<&Value>) -> Result<Vec<DeclaredEventType>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let map: &serde_json::Map<String, Value> = value.as_object().ok_or_else(|| {
        GatewayError::configuration("\"eventTypes\" must be a mapping of event type names")
    })?;

    // BTreeMap for deterministic reconciliation order.
    let sorted: BTreeMap<&String, &Value> = map.iter().collect();
    sorted
        .into_iter()
        .map(|(name, value)| {
            let authorizer = match value {
                Value::Null => None,
                Value::Object(obj) => obj
                    .get("authorizer")
                    .map(|a| {
                        a.as_str().map(ToString::to_string).ok_or_else(|| {
                            GatewayError::configuration(format!(
                                "event type \"{name}\": \"authorizer\" must be a function name"
                            ))
                        })
                    })
                    .transpose()?,
                _ => {
                    return Err(GatewayError::configuration(format!(
                        "event type \"{name}\" must be null or a mapping"
                    )));
                }
            };
            Ok(DeclaredEventType {
                name: name.clone(),
                authorizer,
            })
        })
        .collect()
}
