//! Declaration extraction.
//!
//! Walks the host's function map and produces the normalized in-memory model
//! the reconciler works from: compute functions that either carry
//! event-gateway subscriptions or serve as authorizers, connector functions
//! with validated inputs, and the declared event types. Raw event schemas
//! (legacy and current) are normalized exactly once here; the reconciler
//! never sees schema variants.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Deserialize;
use serde_json::{Value, json};

use egw_core::error::{GatewayError, Result};
use egw_core::model::{EventDefinition, EventSubscription, FunctionDeclaration};
use egw_core::naming::{arn_function_id, derived_function_id, output_key};

use crate::config::{DeclaredEventType, PluginConfig};
use crate::connector::{self, ConnectorInputs, ConnectorKind};

/// Stack outputs, fetched once per run and treated as an opaque map.
pub type StackOutputs = HashMap<String, String>;

/// Output key under which the deployment host exports the EG user access key.
pub const ACCESS_KEY_OUTPUT: &str = "EventGatewayUserAccessKey";
/// Output key under which the deployment host exports the EG user secret key.
pub const SECRET_KEY_OUTPUT: &str = "EventGatewayUserSecretKey";

/// The host's parsed service definition, reduced to what this plugin reads.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDeclaration {
    pub service: String,
    pub stage: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub custom: Option<Value>,
    #[serde(default)]
    pub functions: BTreeMap<String, FunctionDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDefinition {
    #[serde(default)]
    pub handler: Option<String>,
    /// Absent or `awslambda` for compute functions; a connector kind
    /// (`awskinesis` | `awssqs` | `awsfirehose`) otherwise.
    #[serde(rename = "type", default)]
    pub function_type: Option<String>,
    /// Explicit target ARN. Functions addressed this way take an ARN-hash
    /// identity instead of the derived service-stage-name id.
    #[serde(default)]
    pub arn: Option<String>,
    #[serde(default)]
    pub inputs: Option<Value>,
    #[serde(default)]
    pub events: Vec<Value>,
}

/// A compute function declaration together with its local name, which the
/// reconciler needs for authorizer wiring.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedFunction {
    pub name: String,
    pub declaration: FunctionDeclaration,
}

/// An extracted connector function. Provider resolution is deferred to the
/// reconciler, which has the fetched stack outputs in hand.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorFunction {
    pub name: String,
    pub function_id: String,
    pub kind: ConnectorKind,
    pub inputs: ConnectorInputs,
    pub region: String,
    pub events: Vec<EventSubscription>,
}

/// IAM-like permission statement a connector target requires.
#[derive(Debug, Clone, PartialEq)]
pub struct IamStatement {
    pub action: String,
    pub resource: Value,
}

/// Output descriptor registered so a provisioned resource identifier can be
/// fetched after infrastructure provisioning.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRequest {
    pub key: String,
    pub value: Value,
}

/// Packaging-time side effects of connector extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageRequirements {
    pub iam_statements: Vec<IamStatement>,
    pub output_requests: Vec<OutputRequest>,
}

/// The declared model a single reconciliation run works from.
#[derive(Debug, Clone)]
pub struct ExtractedModel {
    pub functions: Vec<NamedFunction>,
    pub connectors: Vec<ConnectorFunction>,
    pub event_types: Vec<DeclaredEventType>,
}

impl ExtractedModel {
    /// All declared subscriptions, compute and connector alike. The implicit
    /// event-type set is derived from this.
    pub fn declared_subscriptions(&self) -> impl Iterator<Item = &EventSubscription> {
        self.functions
            .iter()
            .flat_map(|f| f.declaration.events.iter())
            .chain(self.connectors.iter().flat_map(|c| c.events.iter()))
    }
}

fn connector_kind(name: &str, function: &FunctionDefinition) -> Result<Option<ConnectorKind>> {
    match function.function_type.as_deref() {
        None | Some("awslambda") => Ok(None),
        Some(other) => match ConnectorKind::parse(other) {
            Some(kind) => Ok(Some(kind)),
            None => Err(GatewayError::validation(format!(
                "function \"{name}\" has unrecognized connector type \"{other}\""
            ))),
        },
    }
}

fn gateway_events(name: &str, function: &FunctionDefinition) -> Result<Vec<EventDefinition>> {
    function
        .events
        .iter()
        .filter_map(|entry| entry.get("eventgateway"))
        .map(|raw| {
            serde_json::from_value(raw.clone()).map_err(|e| {
                GatewayError::validation(format!(
                    "function \"{name}\" has a malformed eventgateway event: {e}"
                ))
            })
        })
        .collect()
}

/// Packaging hook: validate connector declarations and collect the IAM
/// statements and output descriptors their targets require. Runs before
/// provisioning, so no stack outputs are available yet.
pub fn extract_requirements(declaration: &ServiceDeclaration) -> Result<PackageRequirements> {
    let mut requirements = PackageRequirements::default();
    for (name, function) in &declaration.functions {
        let Some(kind) = connector_kind(name, function)? else {
            continue;
        };
        let inputs = connector::validate_inputs(kind, name, function.inputs.as_ref())?;
        match &inputs {
            ConnectorInputs::LogicalId(logical_id) => {
                requirements.iam_statements.push(IamStatement {
                    action: kind.iam_action().to_string(),
                    resource: json!({"Fn::GetAtt": [logical_id, "Arn"]}),
                });
                requirements.output_requests.push(OutputRequest {
                    key: output_key(name, kind.resource_field()),
                    value: json!({"Ref": logical_id}),
                });
            }
            ConnectorInputs::Explicit { arn, .. } => {
                requirements.iam_statements.push(IamStatement {
                    action: kind.iam_action().to_string(),
                    resource: json!(arn),
                });
            }
        }
    }
    Ok(requirements)
}

/// Deployment hook: produce the declared model. Compute functions resolve
/// their target ARN from the fetched stack outputs (under
/// `capitalize(name) + "Arn"`) unless the declaration carries an explicit
/// ARN; connector providers stay unresolved until registration.
pub fn extract_model(
    declaration: &ServiceDeclaration,
    config: &PluginConfig,
    outputs: &StackOutputs,
) -> Result<ExtractedModel> {
    for event_type in &config.event_types {
        if let Some(authorizer) = &event_type.authorizer
            && !declaration.functions.contains_key(authorizer)
        {
            return Err(GatewayError::validation(format!(
                "event type \"{}\" references unknown authorizer function \"{authorizer}\"",
                event_type.name
            )));
        }
    }

    let authorizer_names: BTreeSet<&str> = config
        .event_types
        .iter()
        .filter_map(|et| et.authorizer.as_deref())
        .collect();

    let region = declaration.region.as_deref().unwrap_or("us-east-1");
    let access_key = outputs.get(ACCESS_KEY_OUTPUT);
    let secret_key = outputs.get(SECRET_KEY_OUTPUT);

    let mut functions = Vec::new();
    let mut connectors = Vec::new();

    for (name, function) in &declaration.functions {
        let events: Vec<EventSubscription> = gateway_events(name, function)?
            .into_iter()
            .map(|event| event.normalize(&config.space))
            .collect();

        if let Some(kind) = connector_kind(name, function)? {
            let inputs = connector::validate_inputs(kind, name, function.inputs.as_ref())?;
            connectors.push(ConnectorFunction {
                name: name.clone(),
                function_id: derived_function_id(&config.service, &config.stage, name),
                kind,
                inputs,
                region: region.to_string(),
                events,
            });
            continue;
        }

        let is_authorizer = authorizer_names.contains(name.as_str());
        if events.is_empty() && !is_authorizer {
            // Plain compute function outside this plugin's concern.
            continue;
        }

        let (function_id, arn) = match &function.arn {
            Some(arn) => (arn_function_id(arn), arn.clone()),
            None => {
                let arn_key = output_key(name, "arn");
                let arn = outputs
                    .get(&arn_key)
                    .cloned()
                    .ok_or_else(|| GatewayError::missing_output(arn_key))?;
                (
                    derived_function_id(&config.service, &config.stage, name),
                    arn,
                )
            }
        };

        let mut provider = serde_json::Map::new();
        provider.insert("arn".to_string(), json!(arn));
        provider.insert("region".to_string(), json!(region));
        if let (Some(key), Some(secret)) = (access_key, secret_key) {
            provider.insert("awsAccessKeyId".to_string(), json!(key));
            provider.insert("awsSecretAccessKey".to_string(), json!(secret));
        }

        functions.push(NamedFunction {
            name: name.clone(),
            declaration: FunctionDeclaration {
                function_id,
                function_type: "awslambda".to_string(),
                provider: Value::Object(provider),
                events,
            },
        });
    }

    Ok(ExtractedModel {
        functions,
        connectors,
        event_types: config.event_types.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use egw_core::model::SubscriptionKind;

    fn declaration(functions: Value) -> ServiceDeclaration {
        serde_json::from_value(json!({
            "service": "svcA",
            "stage": "dev",
            "region": "us-east-1",
            "functions": functions
        }))
        .unwrap()
    }

    fn config(event_types: Value) -> PluginConfig {
        let custom = json!({"eventgateway": {
            "url": "https://eg.example.com",
            "space": "default",
            "eventTypes": event_types
        }});
        PluginConfig::from_custom(Some(&custom), "svcA", "dev").unwrap()
    }

    fn outputs_with_arn(key: &str) -> StackOutputs {
        HashMap::from([(key.to_string(), format!("arn:aws:lambda:::{key}"))])
    }

    #[test]
    fn test_plain_compute_function_is_ignored() {
        let decl = declaration(json!({
            "worker": {"handler": "worker.run", "events": [{"schedule": "rate(1 hour)"}]}
        }));
        let model = extract_model(&decl, &config(json!({})), &HashMap::new()).unwrap();
        assert!(model.functions.is_empty());
        assert!(model.connectors.is_empty());
    }

    #[test]
    fn test_function_with_gateway_event_is_extracted_and_normalized() {
        let decl = declaration(json!({
            "hello": {
                "handler": "hello.run",
                "events": [
                    {"eventgateway": {"event": "http", "path": "/hello", "method": "get"}},
                    {"schedule": "rate(1 hour)"}
                ]
            }
        }));
        let model = extract_model(&decl, &config(json!({})), &outputs_with_arn("HelloArn")).unwrap();
        assert_eq!(model.functions.len(), 1);
        let function = &model.functions[0];
        assert_eq!(function.name, "hello");
        assert_eq!(function.declaration.function_id, "svcA-dev-hello");
        assert_eq!(function.declaration.function_type, "awslambda");
        assert_eq!(
            function.declaration.provider["arn"],
            json!("arn:aws:lambda:::HelloArn")
        );

        let event = &function.declaration.events[0];
        assert_eq!(event.event_type, "http.request");
        assert_eq!(event.kind, SubscriptionKind::Sync);
        assert_eq!(event.path, "/default/hello");
        assert_eq!(event.method, "GET");
    }

    #[test]
    fn test_missing_lambda_arn_output_is_fatal() {
        let decl = declaration(json!({
            "hello": {
                "handler": "hello.run",
                "events": [{"eventgateway": {"event": "http", "path": "/hello"}}]
            }
        }));
        let err = extract_model(&decl, &config(json!({})), &HashMap::new()).unwrap_err();
        assert!(matches!(err, GatewayError::MissingOutput(ref key) if key == "HelloArn"));
    }

    #[test]
    fn test_explicit_arn_takes_hash_identity() {
        let decl = declaration(json!({
            "hello": {
                "arn": "arn:aws:lambda:us-east-1:1:function:hello",
                "events": [{"eventgateway": {"event": "http", "path": "/hello"}}]
            }
        }));
        let model = extract_model(&decl, &config(json!({})), &HashMap::new()).unwrap();
        let id = &model.functions[0].declaration.function_id;
        assert_eq!(id.len(), 64);
        assert_eq!(id, &arn_function_id("arn:aws:lambda:us-east-1:1:function:hello"));
    }

    #[test]
    fn test_authorizer_function_is_extracted_without_events() {
        let decl = declaration(json!({
            "auth": {"handler": "auth.run"}
        }));
        let cfg = config(json!({"user.created": {"authorizer": "auth"}}));
        let model = extract_model(&decl, &cfg, &outputs_with_arn("AuthArn")).unwrap();
        assert_eq!(model.functions.len(), 1);
        assert_eq!(model.functions[0].name, "auth");
        assert!(model.functions[0].declaration.events.is_empty());
    }

    #[test]
    fn test_authorizer_referencing_unknown_function_is_fatal() {
        let decl = declaration(json!({}));
        let cfg = config(json!({"user.created": {"authorizer": "ghost"}}));
        let err = extract_model(&decl, &cfg, &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_connector_is_split_out_of_compute_set() {
        let decl = declaration(json!({
            "producer": {
                "type": "awssqs",
                "inputs": {"logicalId": "ProducerQueue"},
                "events": [{"eventgateway": {"event": "user.created"}}]
            }
        }));
        let model = extract_model(&decl, &config(json!({})), &HashMap::new()).unwrap();
        assert!(model.functions.is_empty());
        assert_eq!(model.connectors.len(), 1);
        let connector = &model.connectors[0];
        assert_eq!(connector.function_id, "svcA-dev-producer");
        assert_eq!(connector.kind, ConnectorKind::Sqs);
        assert_eq!(connector.events[0].event_type, "user.created");
        assert_eq!(connector.events[0].method, "POST");
    }

    #[test]
    fn test_unrecognized_connector_type_is_fatal() {
        let decl = declaration(json!({
            "producer": {"type": "azurequeue", "inputs": {"logicalId": "Q"}}
        }));
        let err = extract_model(&decl, &config(json!({})), &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("azurequeue"));
    }

    #[test]
    fn test_connector_input_validation_happens_at_extraction() {
        let decl = declaration(json!({
            "producer": {"type": "awssqs", "inputs": {}}
        }));
        let err = extract_model(&decl, &config(json!({})), &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("\"queueUrl\""));
    }

    #[test]
    fn test_requirements_for_logical_id_connector() {
        let decl = declaration(json!({
            "producer": {
                "type": "awssqs",
                "inputs": {"logicalId": "ProducerQueue"},
                "events": [{"eventgateway": {"event": "user.created"}}]
            }
        }));
        let requirements = extract_requirements(&decl).unwrap();
        assert_eq!(
            requirements.iam_statements,
            vec![IamStatement {
                action: "sqs:SendMessage".into(),
                resource: json!({"Fn::GetAtt": ["ProducerQueue", "Arn"]}),
            }]
        );
        assert_eq!(
            requirements.output_requests,
            vec![OutputRequest {
                key: "ProducerQueueUrl".into(),
                value: json!({"Ref": "ProducerQueue"}),
            }]
        );
    }

    #[test]
    fn test_requirements_for_explicit_connector_need_no_outputs() {
        let decl = declaration(json!({
            "clicks": {
                "type": "awskinesis",
                "inputs": {"arn": "arn:aws:kinesis:us-east-1:1:stream/clicks", "streamName": "clicks"}
            }
        }));
        let requirements = extract_requirements(&decl).unwrap();
        assert_eq!(requirements.iam_statements.len(), 1);
        assert_eq!(requirements.iam_statements[0].action, "kinesis:PutRecord");
        assert!(requirements.output_requests.is_empty());
    }

    #[test]
    fn test_provider_includes_gateway_user_credentials_when_exported() {
        let decl = declaration(json!({
            "hello": {
                "handler": "hello.run",
                "events": [{"eventgateway": {"event": "http", "path": "/hello"}}]
            }
        }));
        let mut outputs = outputs_with_arn("HelloArn");
        outputs.insert(ACCESS_KEY_OUTPUT.to_string(), "AKIA".to_string());
        outputs.insert(SECRET_KEY_OUTPUT.to_string(), "SECRET".to_string());

        let model = extract_model(&decl, &config(json!({})), &outputs).unwrap();
        let provider = &model.functions[0].declaration.provider;
        assert_eq!(provider["awsAccessKeyId"], json!("AKIA"));
        assert_eq!(provider["awsSecretAccessKey"], json!("SECRET"));
    }
}
