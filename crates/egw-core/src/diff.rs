//! State-diff primitives: the equality predicates deciding "already matches,
//! skip" versus "needs an update" during reconciliation.
//!
//! Subscription identity is (event type, path, method) with case-insensitive
//! methods — never the remote-assigned subscription id. Changing a path or
//! method therefore reconciles as delete-old + create-new.

use crate::model::{
    CorsRule, EventSubscription, FunctionDeclaration, GatewayFunction, Metadata, Subscription,
};
use crate::naming::ownership_prefix;

/// Remote method defaults to POST when absent, mirroring the declared-side
/// default for async subscriptions.
fn remote_method(sub: &Subscription) -> &str {
    sub.method.as_deref().unwrap_or("POST")
}

/// Does a declared event match a remote subscription of the same function?
pub fn subscriptions_match(declared: &EventSubscription, remote: &Subscription) -> bool {
    declared.event_type == remote.event_type
        && declared.path == remote.path
        && declared.method.eq_ignore_ascii_case(remote_method(remote))
}

/// Deep equality of the registration payload: type plus provider descriptor.
pub fn functions_match(declared: &FunctionDeclaration, remote: &GatewayFunction) -> bool {
    declared.function_type == remote.function_type && declared.provider == remote.provider
}

/// Is this CORS rule the one keyed by (path, method)?
pub fn cors_rule_matches(path: &str, method: &str, rule: &CorsRule) -> bool {
    rule.path == path && rule.method.eq_ignore_ascii_case(method)
}

/// Ownership test for resources that may predate metadata tagging: exact
/// metadata match when the tag is present, function-id prefix otherwise.
pub fn is_owned(
    metadata: Option<&Metadata>,
    function_id: &str,
    service: &str,
    stage: &str,
) -> bool {
    match metadata {
        Some(meta) => meta.owned_by(service, stage),
        None => function_id.starts_with(&ownership_prefix(service, stage)),
    }
}
