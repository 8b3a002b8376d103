//! Connector-function resolution.
//!
//! A connector function is not compute: it is a typed pass-through into a
//! queue/stream/firehose-like sink. Each sink kind fixes a resource field
//! name, the IAM action the deployment must grant, and the stack-output key
//! under which the provisioned resource identifier is exported
//! (capitalized function name + capitalized field name).

use serde_json::{Value, json};

use egw_core::error::{GatewayError, Result};
use egw_core::naming::output_key;

use crate::extract::StackOutputs;

/// The recognized connector sink kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorKind {
    Kinesis,
    Sqs,
    Firehose,
}

impl ConnectorKind {
    pub fn parse(function_type: &str) -> Option<Self> {
        match function_type {
            "awskinesis" => Some(Self::Kinesis),
            "awssqs" => Some(Self::Sqs),
            "awsfirehose" => Some(Self::Firehose),
            _ => None,
        }
    }

    /// The gateway-side function type string.
    pub fn gateway_type(self) -> &'static str {
        match self {
            Self::Kinesis => "awskinesis",
            Self::Sqs => "awssqs",
            Self::Firehose => "awsfirehose",
        }
    }

    /// Provider field holding the sink resource identifier.
    pub fn resource_field(self) -> &'static str {
        match self {
            Self::Kinesis => "streamName",
            Self::Sqs => "queueUrl",
            Self::Firehose => "deliveryStreamName",
        }
    }

    /// IAM action the connector target requires.
    pub fn iam_action(self) -> &'static str {
        match self {
            Self::Kinesis => "kinesis:PutRecord",
            Self::Sqs => "sqs:SendMessage",
            Self::Firehose => "firehose:PutRecord",
        }
    }
}

/// Validated `inputs` block of a connector function: either a local resource
/// reference resolved from stack outputs after provisioning, or an explicit
/// ARN paired with the sink's resource identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorInputs {
    LogicalId(String),
    Explicit { arn: String, resource_value: String },
}

/// Validate a connector's `inputs` block. Fails fast naming the exact
/// missing field so a misdeclared function aborts the run before any remote
/// call is made.
pub fn validate_inputs(
    kind: ConnectorKind,
    function_name: &str,
    inputs: Option<&Value>,
) -> Result<ConnectorInputs> {
    let field = kind.resource_field();
    let inputs = inputs.ok_or_else(|| {
        GatewayError::validation(format!(
            "connector function \"{function_name}\" has no \"inputs\" block"
        ))
    })?;

    if let Some(logical_id) = inputs.get("logicalId").and_then(|v| v.as_str()) {
        return Ok(ConnectorInputs::LogicalId(logical_id.to_string()));
    }

    let arn = inputs.get("arn").and_then(|v| v.as_str());
    let resource_value = inputs.get(field).and_then(|v| v.as_str());
    match (arn, resource_value) {
        (Some(arn), Some(value)) => Ok(ConnectorInputs::Explicit {
            arn: arn.to_string(),
            resource_value: value.to_string(),
        }),
        (Some(_), None) | (None, None) => Err(GatewayError::validation(format!(
            "connector function \"{function_name}\" is missing required input \"{field}\". \
             Provide either \"logicalId\" or both \"arn\" and \"{field}\""
        ))),
        (None, Some(_)) => Err(GatewayError::validation(format!(
            "connector function \"{function_name}\" is missing required input \"arn\". \
             Provide either \"logicalId\" or both \"arn\" and \"{field}\""
        ))),
    }
}

/// Resolve the sink resource identifier: explicit values pass through,
/// logical references are looked up in the fetched stack outputs under the
/// derived key.
pub fn resolve_resource_value(
    kind: ConnectorKind,
    function_name: &str,
    inputs: &ConnectorInputs,
    outputs: &StackOutputs,
) -> Result<String> {
    match inputs {
        ConnectorInputs::Explicit { resource_value, .. } => Ok(resource_value.clone()),
        ConnectorInputs::LogicalId(_) => {
            let key = output_key(function_name, kind.resource_field());
            outputs
                .get(&key)
                .cloned()
                .ok_or_else(|| GatewayError::missing_output(key))
        }
    }
}

/// Registration payload for the sink provider.
pub fn build_provider(
    kind: ConnectorKind,
    resource_value: &str,
    region: &str,
    aws_access_key_id: Option<&str>,
    aws_secret_access_key: Option<&str>,
) -> Value {
    let mut provider = serde_json::Map::new();
    provider.insert(kind.resource_field().to_string(), json!(resource_value));
    provider.insert("region".to_string(), json!(region));
    if let (Some(key), Some(secret)) = (aws_access_key_id, aws_secret_access_key) {
        provider.insert("awsAccessKeyId".to_string(), json!(key));
        provider.insert("awsSecretAccessKey".to_string(), json!(secret));
    }
    Value::Object(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_parse_connector_kinds() {
        assert_eq!(ConnectorKind::parse("awskinesis"), Some(ConnectorKind::Kinesis));
        assert_eq!(ConnectorKind::parse("awssqs"), Some(ConnectorKind::Sqs));
        assert_eq!(ConnectorKind::parse("awsfirehose"), Some(ConnectorKind::Firehose));
        assert_eq!(ConnectorKind::parse("awslambda"), None);
        assert_eq!(ConnectorKind::parse("azurequeue"), None);
    }

    #[test]
    fn test_kind_mappings() {
        assert_eq!(ConnectorKind::Sqs.resource_field(), "queueUrl");
        assert_eq!(ConnectorKind::Sqs.iam_action(), "sqs:SendMessage");
        assert_eq!(ConnectorKind::Kinesis.resource_field(), "streamName");
        assert_eq!(ConnectorKind::Kinesis.iam_action(), "kinesis:PutRecord");
        assert_eq!(ConnectorKind::Firehose.resource_field(), "deliveryStreamName");
        assert_eq!(ConnectorKind::Firehose.iam_action(), "firehose:PutRecord");
    }

    #[test]
    fn test_missing_inputs_block() {
        let err = validate_inputs(ConnectorKind::Sqs, "producer", None).unwrap_err();
        assert!(err.to_string().contains("no \"inputs\" block"));
    }

    #[test]
    fn test_empty_inputs_names_the_paired_field() {
        let inputs = json!({});
        let err = validate_inputs(ConnectorKind::Sqs, "producer", Some(&inputs)).unwrap_err();
        assert!(err.to_string().contains("\"queueUrl\""));
    }

    #[test]
    fn test_arn_without_resource_field_names_the_field() {
        let inputs = json!({"arn": "arn:aws:sqs:us-east-1:1:queue"});
        let err = validate_inputs(ConnectorKind::Sqs, "producer", Some(&inputs)).unwrap_err();
        assert!(err.to_string().contains("\"queueUrl\""));
    }

    #[test]
    fn test_resource_field_without_arn_names_arn() {
        let inputs = json!({"queueUrl": "https://sqs.us-east-1.amazonaws.com/1/queue"});
        let err = validate_inputs(ConnectorKind::Sqs, "producer", Some(&inputs)).unwrap_err();
        assert!(err.to_string().contains("\"arn\""));
    }

    #[test]
    fn test_logical_id_branch() {
        let inputs = json!({"logicalId": "ProducerQueue"});
        let parsed = validate_inputs(ConnectorKind::Sqs, "producer", Some(&inputs)).unwrap();
        assert_eq!(parsed, ConnectorInputs::LogicalId("ProducerQueue".into()));
    }

    #[test]
    fn test_explicit_branch_passes_through() {
        let inputs = json!({
            "arn": "arn:aws:sqs:us-east-1:1:queue",
            "queueUrl": "https://sqs.us-east-1.amazonaws.com/1/queue"
        });
        let parsed = validate_inputs(ConnectorKind::Sqs, "producer", Some(&inputs)).unwrap();
        let value =
            resolve_resource_value(ConnectorKind::Sqs, "producer", &parsed, &HashMap::new())
                .unwrap();
        assert_eq!(value, "https://sqs.us-east-1.amazonaws.com/1/queue");
    }

    #[test]
    fn test_logical_id_resolution_from_outputs() {
        let parsed = ConnectorInputs::LogicalId("ProducerQueue".into());
        let outputs = HashMap::from([(
            "ProducerQueueUrl".to_string(),
            "https://sqs.us-east-1.amazonaws.com/1/queue".to_string(),
        )]);
        let value =
            resolve_resource_value(ConnectorKind::Sqs, "producer", &parsed, &outputs).unwrap();
        assert_eq!(value, "https://sqs.us-east-1.amazonaws.com/1/queue");
    }

    #[test]
    fn test_missing_output_fails_with_derived_key() {
        let parsed = ConnectorInputs::LogicalId("ProducerQueue".into());
        let err = resolve_resource_value(ConnectorKind::Sqs, "producer", &parsed, &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, GatewayError::MissingOutput(ref key) if key == "ProducerQueueUrl"));
    }

    #[test]
    fn test_build_provider_with_credentials() {
        let provider = build_provider(
            ConnectorKind::Kinesis,
            "clicks",
            "us-east-1",
            Some("AKIA"),
            Some("SECRET"),
        );
        assert_eq!(
            provider,
            json!({
                "streamName": "clicks",
                "region": "us-east-1",
                "awsAccessKeyId": "AKIA",
                "awsSecretAccessKey": "SECRET"
            })
        );
    }

    #[test]
    fn test_build_provider_without_credentials() {
        let provider = build_provider(ConnectorKind::Sqs, "https://q", "eu-west-1", None, None);
        assert_eq!(provider, json!({"queueUrl": "https://q", "region": "eu-west-1"}));
    }
}
