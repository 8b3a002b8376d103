//! Identifier and path derivation conventions.
//!
//! Function ids are derived from the owning service, stage and function name
//! so that ownership can be recovered from the id alone on gateways that
//! predate metadata tagging. Functions addressed by an explicit ARN use a
//! SHA-256 digest of the ARN instead.

use sha2::{Digest, Sha256};

/// Function id for a named function owned by a service/stage pair.
pub fn derived_function_id(service: &str, stage: &str, name: &str) -> String {
    format!("{service}-{stage}-{name}")
}

/// Function id for a function addressed by an explicit ARN.
pub fn arn_function_id(arn: &str) -> String {
    hex::encode(Sha256::digest(arn.as_bytes()))
}

/// Ownership prefix shared by all derived function ids of a service/stage.
pub fn ownership_prefix(service: &str, stage: &str) -> String {
    format!("{service}-{stage}")
}

/// Upper-case the first ASCII character, leaving the rest untouched.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Stack-output key under which a connector resource identifier is exported,
/// e.g. function `producer` + field `queueUrl` -> `ProducerQueueUrl`.
pub fn output_key(function_name: &str, resource_field: &str) -> String {
    format!("{}{}", capitalize(function_name), capitalize(resource_field))
}

/// Fully-qualified subscription path: the ownership space segment followed by
/// the declared relative path (defaulting to `/`).
pub fn event_path(space: &str, relative: Option<&str>) -> String {
    let mut path = relative.unwrap_or("/").to_string();
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    format!("/{space}{path}")
}
