use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use egw_core::diff::is_owned;
use egw_core::error::{GatewayError, Result};
use egw_core::model::{
    CorsRule, EventType, GatewayFunction, Metadata, Subscription, SubscriptionKind,
};

/// Connection settings for one gateway space, supplied once at startup.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Events API base URL (event emission).
    pub events_url: String,
    /// Configuration API base URL (all resource CRUD).
    pub configuration_url: String,
    /// Ownership namespace prefixed onto subscription paths.
    pub space: String,
    /// Optional access key sent as a bearer token.
    pub api_key: Option<String>,
    /// Owning service name, stamped into resource metadata.
    pub service: String,
    /// Owning deployment stage, stamped into resource metadata.
    pub stage: String,
}

/// Client for the Event Gateway REST APIs.
///
/// Owns an inner transport client and layers two concerns on top of the raw
/// wire calls: every mutating operation on an owned resource kind stamps
/// `metadata: {service, stage}` (preserving caller-supplied extra fields such
/// as authorizer linkage), and the `list_service_*` wrappers degrade read
/// failures to empty results — a failed list is indistinguishable from a
/// gateway with nothing registered yet, and both must allow a from-scratch
/// deployment to proceed.
pub struct EventGatewayClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl EventGatewayClient {
    pub fn new(mut config: ClientConfig) -> Self {
        config.events_url = config.events_url.trim_end_matches('/').to_string();
        config.configuration_url = config.configuration_url.trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn space(&self) -> &str {
        &self.config.space
    }

    pub fn service(&self) -> &str {
        &self.config.service
    }

    pub fn stage(&self) -> &str {
        &self.config.stage
    }

    pub fn events_url(&self) -> &str {
        &self.config.events_url
    }

    fn space_url(&self, segment: &str) -> String {
        format!(
            "{}/v1/spaces/{}/{segment}",
            self.config.configuration_url, self.config.space
        )
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.request(method, url);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    fn stamp(&self, metadata: Option<Metadata>) -> Option<Metadata> {
        Some(Metadata::stamp(
            metadata,
            &self.config.service,
            &self.config.stage,
        ))
    }

    // ==================== Functions ====================

    pub async fn create_function(&self, mut function: GatewayFunction) -> Result<GatewayFunction> {
        function.metadata = self.stamp(function.metadata.take());
        let function_id = function.function_id.clone();
        let resp = self
            .request(Method::POST, &self.space_url("functions"))
            .json(&function)
            .send()
            .await
            .map_err(|e| GatewayError::function_registration(&function_id, e.to_string()))?;
        handle_response(resp)
            .await
            .map_err(|e| GatewayError::function_registration(&function_id, e.to_string()))
    }

    pub async fn update_function(&self, mut function: GatewayFunction) -> Result<GatewayFunction> {
        function.metadata = self.stamp(function.metadata.take());
        let url = self.space_url(&format!("functions/{}", function.function_id));
        let resp = self
            .request(Method::PUT, &url)
            .json(&function)
            .send()
            .await?;
        handle_response(resp).await
    }

    pub async fn delete_function(&self, function_id: &str) -> Result<()> {
        let url = self.space_url(&format!("functions/{function_id}"));
        let resp = self.request(Method::DELETE, &url).send().await?;
        expect_success(resp).await
    }

    pub async fn list_functions(&self) -> Result<Vec<GatewayFunction>> {
        self.list_resource("functions", "functions", false).await
    }

    /// Functions owned by this service/stage. Read failures degrade to an
    /// empty list.
    pub async fn list_service_functions(&self) -> Vec<GatewayFunction> {
        match self.list_resource::<GatewayFunction>("functions", "functions", true).await {
            Ok(functions) => functions
                .into_iter()
                .filter(|f| {
                    is_owned(
                        f.metadata.as_ref(),
                        &f.function_id,
                        &self.config.service,
                        &self.config.stage,
                    )
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "listing functions failed, assuming none registered");
                Vec::new()
            }
        }
    }

    // ==================== Event types ====================

    pub async fn create_event_type(&self, mut event_type: EventType) -> Result<EventType> {
        event_type.metadata = self.stamp(event_type.metadata.take());
        let resp = self
            .request(Method::POST, &self.space_url("eventtypes"))
            .json(&event_type)
            .send()
            .await?;
        handle_response(resp).await
    }

    pub async fn update_event_type(&self, mut event_type: EventType) -> Result<EventType> {
        event_type.metadata = self.stamp(event_type.metadata.take());
        let url = self.space_url(&format!("eventtypes/{}", event_type.name));
        let resp = self
            .request(Method::PUT, &url)
            .json(&event_type)
            .send()
            .await?;
        handle_response(resp).await
    }

    pub async fn delete_event_type(&self, name: &str) -> Result<()> {
        let url = self.space_url(&format!("eventtypes/{name}"));
        let resp = self.request(Method::DELETE, &url).send().await?;
        expect_success(resp).await
    }

    /// All event types in the space, unscoped. Used to detect foreign types
    /// that must be adopted rather than recreated. Degrades to empty.
    pub async fn list_event_types(&self) -> Vec<EventType> {
        match self.list_resource("eventtypes", "eventTypes", false).await {
            Ok(event_types) => event_types,
            Err(e) => {
                warn!(error = %e, "listing event types failed, assuming none registered");
                Vec::new()
            }
        }
    }

    // ==================== Subscriptions ====================

    pub async fn subscribe(&self, mut subscription: Subscription) -> Result<Subscription> {
        subscription.metadata = self.stamp(subscription.metadata.take());
        let resp = self
            .request(Method::POST, &self.space_url("subscriptions"))
            .json(&subscription)
            .send()
            .await
            .map_err(|e| {
                GatewayError::subscription_failure(
                    &subscription.function_id,
                    &subscription.path,
                    e.to_string(),
                )
            })?;
        handle_response(resp).await.map_err(|e| {
            if subscription.kind == SubscriptionKind::Sync && e.is_already_exists() {
                GatewayError::SubscriptionConflict {
                    function_id: subscription.function_id.clone(),
                    path: subscription.path.clone(),
                }
            } else {
                GatewayError::subscription_failure(
                    &subscription.function_id,
                    &subscription.path,
                    e.to_string(),
                )
            }
        })
    }

    pub async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        let url = self.space_url(&format!("subscriptions/{subscription_id}"));
        let resp = self.request(Method::DELETE, &url).send().await?;
        expect_success(resp).await
    }

    pub async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.list_resource("subscriptions", "subscriptions", false)
            .await
    }

    /// Subscriptions owned by this service/stage. Read failures degrade to
    /// an empty list.
    pub async fn list_service_subscriptions(&self) -> Vec<Subscription> {
        match self
            .list_resource::<Subscription>("subscriptions", "subscriptions", true)
            .await
        {
            Ok(subscriptions) => subscriptions
                .into_iter()
                .filter(|s| {
                    is_owned(
                        s.metadata.as_ref(),
                        &s.function_id,
                        &self.config.service,
                        &self.config.stage,
                    )
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "listing subscriptions failed, assuming none registered");
                Vec::new()
            }
        }
    }

    // ==================== CORS ====================

    pub async fn create_cors(&self, mut rule: CorsRule) -> Result<CorsRule> {
        rule.metadata = self.stamp(rule.metadata.take());
        let resp = self
            .request(Method::POST, &self.space_url("cors"))
            .json(&rule)
            .send()
            .await?;
        handle_response(resp).await
    }

    pub async fn update_cors(&self, mut rule: CorsRule) -> Result<CorsRule> {
        rule.metadata = self.stamp(rule.metadata.take());
        let cors_id = rule.cors_id.clone().ok_or_else(|| {
            GatewayError::validation("cannot update a CORS rule without a corsId")
        })?;
        let url = self.space_url(&format!("cors/{cors_id}"));
        let resp = self.request(Method::PUT, &url).json(&rule).send().await?;
        handle_response(resp).await
    }

    pub async fn delete_cors(&self, cors_id: &str) -> Result<()> {
        let url = self.space_url(&format!("cors/{cors_id}"));
        let resp = self.request(Method::DELETE, &url).send().await?;
        expect_success(resp).await
    }

    pub async fn list_cors(&self) -> Result<Vec<CorsRule>> {
        self.list_resource("cors", "cors", false).await
    }

    /// CORS rules owned by this service/stage. Read failures degrade to an
    /// empty list. Rules carry no function id, so ownership is metadata-only.
    pub async fn list_service_cors(&self) -> Vec<CorsRule> {
        match self.list_resource::<CorsRule>("cors", "cors", true).await {
            Ok(rules) => rules
                .into_iter()
                .filter(|r| {
                    r.metadata
                        .as_ref()
                        .is_some_and(|m| m.owned_by(&self.config.service, &self.config.stage))
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "listing CORS rules failed, assuming none registered");
                Vec::new()
            }
        }
    }

    // ==================== Events ====================

    /// Fire a test event at the events API. Debug utility, not part of
    /// reconciliation.
    pub async fn emit(&self, event: Value) -> Result<()> {
        let resp = self
            .request(Method::POST, &format!("{}/", self.config.events_url))
            .header("Content-Type", "application/cloudevents+json")
            .json(&event)
            .send()
            .await?;
        expect_success(resp).await
    }

    async fn list_resource<T: DeserializeOwned>(
        &self,
        segment: &str,
        key: &str,
        scoped: bool,
    ) -> Result<Vec<T>> {
        let mut req = self.request(Method::GET, &self.space_url(segment));
        if scoped {
            req = req.query(&[
                ("metadata.service", self.config.service.as_str()),
                ("metadata.stage", self.config.stage.as_str()),
            ]);
        }
        let body: Value = handle_response(req.send().await?).await?;
        let items = body.get(key).cloned().unwrap_or(Value::Array(Vec::new()));
        Ok(serde_json::from_value(items)?)
    }
}

async fn handle_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();

    if !status.is_success() {
        return Err(GatewayError::Api {
            status: status.as_u16(),
            message: extract_error_message(&body),
        });
    }

    Ok(serde_json::from_str(&body)?)
}

async fn expect_success(resp: reqwest::Response) -> Result<()> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(GatewayError::Api {
            status: status.as_u16(),
            message: extract_error_message(&body),
        });
    }
    Ok(())
}

/// The gateway wraps failures as `{"errors": [{"message": "..."}]}`; fall
/// back to the raw body for anything else.
fn extract_error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body)
        && let Some(errors) = json.get("errors").and_then(|e| e.as_array())
    {
        let messages: Vec<&str> = errors
            .iter()
            .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
            .collect();
        if !messages.is_empty() {
            return messages.join("; ");
        }
    }
    body.to_string()
}
