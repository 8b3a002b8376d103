//! Wire and domain types shared across the plugin.
//!
//! Everything here serializes to the gateway's camelCase JSON shapes. The
//! declared-side types are produced once by the declaration extractor and are
//! immutable afterwards; the remote-side types mirror what the gateway
//! returns from its list operations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::naming::event_path;

/// Ownership tag carried by every resource this plugin manages.
///
/// Extra fields (e.g. authorizer linkage set by the gateway) are preserved
/// verbatim across re-stamping; only `service` and `stage` are overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub service: String,
    pub stage: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Metadata {
    pub fn new(service: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            stage: stage.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// Stamp ownership onto possibly pre-existing metadata. Existing extra
    /// fields survive; service and stage are always overwritten.
    pub fn stamp(existing: Option<Metadata>, service: &str, stage: &str) -> Metadata {
        match existing {
            Some(mut meta) => {
                meta.service = service.to_string();
                meta.stage = stage.to_string();
                meta
            }
            None => Metadata::new(service, stage),
        }
    }

    /// Exact ownership match against a service/stage pair.
    pub fn owned_by(&self, service: &str, stage: &str) -> bool {
        self.service == service && self.stage == stage
    }
}

/// Delivery semantics of a subscription. Sync implies HTTP-like
/// request/response delivery; async is fire-and-forget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionKind {
    Sync,
    Async,
}

impl SubscriptionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Async => "async",
        }
    }
}

/// CORS allow-list attached to a subscription endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    /// Gateway defaults, also used for the `cors: true` shorthand.
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".into()],
            allowed_methods: vec!["HEAD".into(), "GET".into(), "POST".into()],
            allowed_headers: vec!["Origin".into(), "Accept".into(), "Content-Type".into()],
            allow_credentials: false,
        }
    }
}

/// CORS rule as stored by the gateway, keyed by (path, method).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors_id: Option<String>,
    pub path: String,
    pub method: String,
    #[serde(flatten)]
    pub config: CorsConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Declared CORS setting: boolean shorthand or an explicit allow-list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CorsSetting {
    Flag(bool),
    Config(CorsConfig),
}

impl CorsSetting {
    fn into_config(self) -> Option<CorsConfig> {
        match self {
            CorsSetting::Flag(true) => Some(CorsConfig::default()),
            CorsSetting::Flag(false) => None,
            CorsSetting::Config(config) => Some(config),
        }
    }
}

/// Canonical declared subscription, produced once by the extractor.
///
/// `path` is fully qualified (`/<space><relative>`), `method` upper-cased.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSubscription {
    pub event_type: String,
    pub kind: SubscriptionKind,
    pub path: String,
    pub method: String,
    pub cors: Option<CorsConfig>,
}

/// Subscription as stored by the gateway. The `subscription_id` is assigned
/// remotely and is never known ahead of time, which is why declared/remote
/// matching keys off (event type, path, method) instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    pub function_id: String,
    pub event_type: String,
    #[serde(rename = "type")]
    pub kind: SubscriptionKind,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Subscription {
    /// Wire payload for subscribing a declared event on behalf of a function.
    pub fn from_declared(function_id: &str, event: &EventSubscription) -> Self {
        Self {
            subscription_id: None,
            function_id: function_id.to_string(),
            event_type: event.event_type.clone(),
            kind: event.kind,
            path: event.path.clone(),
            method: Some(event.method.clone()),
            metadata: None,
        }
    }
}

/// Named event channel, independently lifecycled from its subscriptions.
/// An event type without ownership metadata is foreign/shared and must never
/// be deleted by this service's reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventType {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorizer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl EventType {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            authorizer_id: None,
            metadata: None,
        }
    }
}

/// Function as registered with the gateway. `provider` is an opaque
/// provider-specific payload compared by deep equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayFunction {
    pub function_id: String,
    #[serde(rename = "type")]
    pub function_type: String,
    pub provider: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Declared function after extraction: identity, provider payload and its
/// normalized event-gateway subscriptions. Immutable once extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    pub function_id: String,
    pub function_type: String,
    pub provider: Value,
    pub events: Vec<EventSubscription>,
}

impl FunctionDeclaration {
    /// Registration payload, before metadata stamping.
    pub fn to_gateway(&self) -> GatewayFunction {
        GatewayFunction {
            function_id: self.function_id.clone(),
            function_type: self.function_type.clone(),
            provider: self.provider.clone(),
            metadata: None,
        }
    }
}

/// Legacy event name that maps onto the `http.request` event type.
const LEGACY_HTTP_EVENT: &str = "http";

/// Canonical name of the HTTP request event type.
pub const HTTP_REQUEST_EVENT: &str = "http.request";

/// Collapse the legacy `http` shorthand onto its canonical event type name.
pub fn canonical_event_type(name: &str) -> &str {
    if name == LEGACY_HTTP_EVENT {
        HTTP_REQUEST_EVENT
    } else {
        name
    }
}

/// Raw subscription schema as it appears in a function's `events` list.
/// Two historical shapes exist; both normalize to [`EventSubscription`]
/// exactly once, at the extractor boundary.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EventDefinition {
    /// Current schema: explicit `eventType` plus optional sync/async `type`.
    Explicit {
        #[serde(rename = "eventType")]
        event_type: String,
        #[serde(rename = "type")]
        kind: Option<SubscriptionKind>,
        path: Option<String>,
        method: Option<String>,
        cors: Option<CorsSetting>,
    },
    /// Legacy schema: `event` names either `http` or a custom event type.
    Legacy {
        event: String,
        path: Option<String>,
        method: Option<String>,
        cors: Option<CorsSetting>,
    },
}

impl EventDefinition {
    /// Normalize into the canonical declared form. `space` prefixes the
    /// subscription path; methods are upper-cased with GET defaulting for
    /// sync (HTTP-like) subscriptions and POST otherwise.
    pub fn normalize(self, space: &str) -> EventSubscription {
        let (raw_event, kind, path, method, cors) = match self {
            EventDefinition::Explicit {
                event_type,
                kind,
                path,
                method,
                cors,
            } => {
                let kind = kind.unwrap_or(SubscriptionKind::Async);
                (event_type, kind, path, method, cors)
            }
            EventDefinition::Legacy {
                event,
                path,
                method,
                cors,
            } => {
                let kind = if event == LEGACY_HTTP_EVENT {
                    SubscriptionKind::Sync
                } else {
                    SubscriptionKind::Async
                };
                (event, kind, path, method, cors)
            }
        };

        let default_method = match kind {
            SubscriptionKind::Sync => "GET",
            SubscriptionKind::Async => "POST",
        };
        let method = method
            .map(|m| m.to_uppercase())
            .unwrap_or_else(|| default_method.to_string());

        EventSubscription {
            event_type: canonical_event_type(&raw_event).to_string(),
            kind,
            path: event_path(space, path.as_deref()),
            method,
            cors: cors.and_then(CorsSetting::into_config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse_event(value: Value) -> EventDefinition {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_metadata_stamp_fresh() {
        let meta = Metadata::stamp(None, "svcA", "dev");
        assert_eq!(meta.service, "svcA");
        assert_eq!(meta.stage, "dev");
        assert!(meta.extra.is_empty());
    }

    #[test]
    fn test_metadata_stamp_is_idempotent_and_preserves_extra() {
        let mut existing = Metadata::new("other", "prod");
        existing
            .extra
            .insert("foo".into(), Value::String("bar".into()));

        let stamped = Metadata::stamp(Some(existing), "svcA", "dev");
        assert_eq!(stamped.service, "svcA");
        assert_eq!(stamped.stage, "dev");
        assert_eq!(stamped.extra.get("foo"), Some(&json!("bar")));

        // Stamping again with the same ownership changes nothing.
        let restamped = Metadata::stamp(Some(stamped.clone()), "svcA", "dev");
        assert_eq!(restamped, stamped);
    }

    #[test]
    fn test_metadata_flattens_extra_fields() {
        let meta: Metadata =
            serde_json::from_value(json!({"service": "s", "stage": "dev", "foo": "bar"})).unwrap();
        assert_eq!(meta.extra.get("foo"), Some(&json!("bar")));
        let round = serde_json::to_value(&meta).unwrap();
        assert_eq!(round, json!({"service": "s", "stage": "dev", "foo": "bar"}));
    }

    #[test]
    fn test_legacy_http_event_normalization() {
        let event = parse_event(json!({"event": "http", "path": "hello", "method": "get"}));
        let sub = event.normalize("default");
        assert_eq!(sub.event_type, "http.request");
        assert_eq!(sub.kind, SubscriptionKind::Sync);
        assert_eq!(sub.path, "/default/hello");
        assert_eq!(sub.method, "GET");
        assert!(sub.cors.is_none());
    }

    #[test]
    fn test_legacy_custom_event_defaults_to_async_post() {
        let event = parse_event(json!({"event": "user.created"}));
        let sub = event.normalize("default");
        assert_eq!(sub.event_type, "user.created");
        assert_eq!(sub.kind, SubscriptionKind::Async);
        assert_eq!(sub.path, "/default/");
        assert_eq!(sub.method, "POST");
    }

    #[test]
    fn test_explicit_sync_subscription_defaults_to_get() {
        let event = parse_event(json!({"eventType": "http.request", "type": "sync", "path": "/users"}));
        let sub = event.normalize("myspace");
        assert_eq!(sub.event_type, "http.request");
        assert_eq!(sub.kind, SubscriptionKind::Sync);
        assert_eq!(sub.path, "/myspace/users");
        assert_eq!(sub.method, "GET");
    }

    #[test]
    fn test_explicit_schema_wins_over_legacy_parse() {
        // A payload carrying eventType must parse as the current schema.
        let event = parse_event(json!({"eventType": "user.created", "method": "put"}));
        match &event {
            EventDefinition::Explicit { event_type, .. } => {
                assert_eq!(event_type, "user.created")
            }
            EventDefinition::Legacy { .. } => panic!("parsed as legacy schema"),
        }
        let sub = event.normalize("default");
        assert_eq!(sub.method, "PUT");
        assert_eq!(sub.kind, SubscriptionKind::Async);
    }

    #[test]
    fn test_cors_true_shorthand_expands_to_defaults() {
        let event = parse_event(json!({"event": "http", "path": "/hello", "cors": true}));
        let sub = event.normalize("default");
        let cors = sub.cors.unwrap();
        assert_eq!(cors.allowed_origins, vec!["*"]);
        assert_eq!(cors.allowed_methods, vec!["HEAD", "GET", "POST"]);
        assert!(!cors.allow_credentials);
    }

    #[test]
    fn test_cors_false_means_none() {
        let event = parse_event(json!({"event": "http", "path": "/hello", "cors": false}));
        assert!(event.normalize("default").cors.is_none());
    }

    #[test]
    fn test_cors_explicit_record() {
        let event = parse_event(json!({
            "eventType": "http.request",
            "type": "sync",
            "path": "/hello",
            "cors": {
                "allowedOrigins": ["https://example.com"],
                "allowedMethods": ["GET"],
                "allowedHeaders": ["X-Api-Key"],
                "allowCredentials": true
            }
        }));
        let cors = event.normalize("default").cors.unwrap();
        assert_eq!(cors.allowed_origins, vec!["https://example.com"]);
        assert!(cors.allow_credentials);
    }

    #[test]
    fn test_subscription_wire_shape() {
        let sub = Subscription {
            subscription_id: Some("sub1".into()),
            function_id: "svcA-dev-hello".into(),
            event_type: "http.request".into(),
            kind: SubscriptionKind::Sync,
            path: "/default/hello".into(),
            method: Some("GET".into()),
            metadata: None,
        };
        let value = serde_json::to_value(&sub).unwrap();
        assert_eq!(value["subscriptionId"], "sub1");
        assert_eq!(value["type"], "sync");
        assert_eq!(value["eventType"], "http.request");
    }

    #[test]
    fn test_cors_rule_flattens_config() {
        let rule = CorsRule {
            cors_id: None,
            path: "/default/hello".into(),
            method: "GET".into(),
            config: CorsConfig::default(),
            metadata: None,
        };
        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(value["allowedOrigins"], json!(["*"]));
        assert!(value.get("config").is_none());
    }

    #[test]
    fn test_canonical_event_type() {
        assert_eq!(canonical_event_type("http"), "http.request");
        assert_eq!(canonical_event_type("http.request"), "http.request");
        assert_eq!(canonical_event_type("user.created"), "user.created");
    }
}
