//! The reconciliation engine.
//!
//! One pass per deployment run, driven by remote snapshots taken up front
//! and the extracted declared model. Step ordering is a correctness
//! invariant, not an optimization:
//!
//! 1. event types (declared + implicitly used) are created/adopted,
//! 2. each declared compute function is registered or diffed, its
//!    subscriptions and CORS rules reconciled, its authorizer bindings wired,
//! 3. connector functions are resolved and registered (never updated),
//! 4. orphaned remote functions are torn down (subscriptions first, then
//!    authorizer unlinking, then the function),
//! 5. orphaned owned event types are deleted,
//! 6. unclaimed owned CORS rules are deleted.
//!
//! Independent operations inside a step fan out via `try_join_all`; anything
//! ordered (a function before its subscriptions, a subscription before its
//! CORS rule, deletions after the per-function pass) stays sequential. A
//! failed write aborts the run; the next run's diff converges the remainder.

use std::collections::BTreeSet;

use futures_util::future::try_join_all;
use tracing::{debug, info};

use egw_client::EventGatewayClient;
use egw_core::diff::{cors_rule_matches, functions_match, subscriptions_match};
use egw_core::error::Result;
use egw_core::model::{CorsRule, EventSubscription, EventType, GatewayFunction, Subscription};

use crate::connector;
use crate::extract::{
    ACCESS_KEY_OUTPUT, ExtractedModel, NamedFunction, SECRET_KEY_OUTPUT, StackOutputs,
};

pub struct Reconciler<'a> {
    client: &'a EventGatewayClient,
    outputs: &'a StackOutputs,
}

impl<'a> Reconciler<'a> {
    pub fn new(client: &'a EventGatewayClient, outputs: &'a StackOutputs) -> Self {
        Self { client, outputs }
    }

    /// Converge the remote gateway onto the declared model.
    pub async fn reconcile(&self, model: &ExtractedModel) -> Result<()> {
        let mut remote_functions = self.client.list_service_functions().await;
        let mut remote_subscriptions = self.client.list_service_subscriptions().await;
        let mut remote_cors = self.client.list_service_cors().await;
        let remote_event_types = self.client.list_event_types().await;

        self.reconcile_event_types(model, &remote_event_types).await?;

        for function in &model.functions {
            self.reconcile_function(
                function,
                model,
                &remote_event_types,
                &mut remote_functions,
                &mut remote_subscriptions,
                &mut remote_cors,
            )
            .await?;
        }

        self.register_connectors(model, &mut remote_functions, &mut remote_cors)
            .await?;

        self.delete_orphan_functions(
            model,
            remote_functions,
            remote_subscriptions,
            &remote_event_types,
        )
        .await?;
        self.delete_orphan_event_types(model, &remote_event_types)
            .await?;
        self.delete_orphan_cors(remote_cors).await?;

        Ok(())
    }

    /// Delete every resource owned by this service/stage.
    pub async fn remove(&self) -> Result<()> {
        let functions = self.client.list_service_functions().await;
        let subscriptions = self.client.list_service_subscriptions().await;
        let cors = self.client.list_service_cors().await;
        let event_types = self.client.list_event_types().await;

        try_join_all(
            subscriptions
                .iter()
                .filter_map(|s| s.subscription_id.as_deref())
                .map(|id| self.client.unsubscribe(id)),
        )
        .await?;

        try_join_all(
            cors.iter()
                .filter_map(|r| r.cors_id.as_deref())
                .map(|id| self.client.delete_cors(id)),
        )
        .await?;

        // Owned event types go before functions: the gateway rejects
        // deleting a function that still authorizes an event type.
        let owned = event_types.iter().filter(|et| {
            et.metadata
                .as_ref()
                .is_some_and(|m| m.owned_by(self.client.service(), self.client.stage()))
        });
        try_join_all(owned.map(|et| self.client.delete_event_type(&et.name))).await?;

        try_join_all(
            functions
                .iter()
                .map(|f| self.client.delete_function(&f.function_id)),
        )
        .await?;

        info!(
            service = self.client.service(),
            stage = self.client.stage(),
            "removed all event gateway resources"
        );
        Ok(())
    }

    // ==================== Step 1: event types ====================

    async fn reconcile_event_types(
        &self,
        model: &ExtractedModel,
        remote: &[EventType],
    ) -> Result<()> {
        let declared: BTreeSet<&str> = model
            .event_types
            .iter()
            .map(|et| et.name.as_str())
            .collect();
        let mut needed = declared.clone();
        for event in model.declared_subscriptions() {
            needed.insert(event.event_type.as_str());
        }

        let mut to_create = Vec::new();
        let mut to_adopt = Vec::new();
        for name in needed {
            match remote.iter().find(|et| et.name == name) {
                None => to_create.push(name),
                // Existing but metadata-less types are adopted only when this
                // service explicitly declares them; a type we merely use stays
                // foreign and keeps its deletion protection.
                Some(existing) if existing.metadata.is_none() && declared.contains(name) => {
                    to_adopt.push(existing.clone());
                }
                Some(_) => debug!(event_type = name, "event type already registered"),
            }
        }

        try_join_all(to_create.iter().map(|name| self.create_event_type_tolerant(name))).await?;
        try_join_all(to_adopt.into_iter().map(|event_type| async move {
            info!(event_type = %event_type.name, "adopting unowned event type");
            self.client.update_event_type(event_type).await.map(drop)
        }))
        .await?;

        Ok(())
    }

    /// Create an event type, swallowing an "already exists" race with a
    /// concurrent creator. This is the only tolerated write failure.
    async fn create_event_type_tolerant(&self, name: &str) -> Result<()> {
        info!(event_type = name, "creating event type");
        match self.client.create_event_type(EventType::named(name)).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_already_exists() => {
                debug!(event_type = name, "event type created concurrently");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // ==================== Step 2: declared functions ====================

    async fn reconcile_function(
        &self,
        function: &NamedFunction,
        model: &ExtractedModel,
        remote_event_types: &[EventType],
        remote_functions: &mut Vec<GatewayFunction>,
        remote_subscriptions: &mut Vec<Subscription>,
        remote_cors: &mut Vec<CorsRule>,
    ) -> Result<()> {
        let declared = &function.declaration;
        let function_id = declared.function_id.as_str();

        match remote_functions
            .iter()
            .position(|f| f.function_id == declared.function_id)
        {
            None => {
                info!(function_id, "registering function");
                self.client.create_function(declared.to_gateway()).await?;
                for event in &declared.events {
                    self.create_subscription(function_id, event, remote_cors).await?;
                }
            }
            Some(index) => {
                let remote = remote_functions.swap_remove(index);
                if functions_match(declared, &remote) {
                    debug!(function_id, "function already up to date");
                } else {
                    info!(function_id, "updating function definition");
                    let mut updated = declared.to_gateway();
                    updated.metadata = remote.metadata;
                    self.client.update_function(updated).await?;
                }

                let mut existing = Vec::new();
                remote_subscriptions.retain(|s| {
                    if s.function_id == declared.function_id {
                        existing.push(s.clone());
                        false
                    } else {
                        true
                    }
                });

                for event in &declared.events {
                    match existing.iter().position(|s| subscriptions_match(event, s)) {
                        Some(matched) => {
                            existing.swap_remove(matched);
                            debug!(
                                path = %event.path,
                                method = %event.method,
                                "subscription already matches"
                            );
                            self.reconcile_cors(event, remote_cors).await?;
                        }
                        None => {
                            self.create_subscription(function_id, event, remote_cors).await?;
                        }
                    }
                }

                for stale in existing {
                    info!(path = %stale.path, function_id, "removing stale subscription");
                    if let Some(id) = &stale.subscription_id {
                        self.client.unsubscribe(id).await?;
                    }
                    let method = stale.method.as_deref().unwrap_or("POST");
                    if let Some(index) = remote_cors
                        .iter()
                        .position(|rule| cors_rule_matches(&stale.path, method, rule))
                    {
                        let rule = remote_cors.swap_remove(index);
                        if let Some(cors_id) = &rule.cors_id {
                            self.client.delete_cors(cors_id).await?;
                        }
                    }
                }
            }
        }

        // Wire this function into any event type declaring it as authorizer.
        for event_type in &model.event_types {
            if event_type.authorizer.as_deref() == Some(function.name.as_str()) {
                let metadata = remote_event_types
                    .iter()
                    .find(|et| et.name == event_type.name)
                    .and_then(|et| et.metadata.clone());
                info!(event_type = %event_type.name, function_id, "binding authorizer");
                self.client
                    .update_event_type(EventType {
                        name: event_type.name.clone(),
                        authorizer_id: Some(declared.function_id.clone()),
                        metadata,
                    })
                    .await?;
            }
        }

        Ok(())
    }

    /// Subscribe a declared event, then reconcile its CORS rule. The CORS
    /// write must follow the subscription write, since CORS lookups key off
    /// the subscription's resolved (path, method).
    async fn create_subscription(
        &self,
        function_id: &str,
        event: &EventSubscription,
        remote_cors: &mut Vec<CorsRule>,
    ) -> Result<()> {
        info!(
            function_id,
            event_type = %event.event_type,
            path = %event.path,
            method = %event.method,
            "creating subscription"
        );
        self.client
            .subscribe(Subscription::from_declared(function_id, event))
            .await?;
        self.reconcile_cors(event, remote_cors).await
    }

    /// Create or overwrite the CORS rule at the event's (path, method),
    /// claiming it out of the remote working set so cleanup leaves it alone.
    async fn reconcile_cors(
        &self,
        event: &EventSubscription,
        remote_cors: &mut Vec<CorsRule>,
    ) -> Result<()> {
        let Some(config) = &event.cors else {
            return Ok(());
        };

        match remote_cors
            .iter()
            .position(|rule| cors_rule_matches(&event.path, &event.method, rule))
        {
            Some(index) => {
                let existing = remote_cors.swap_remove(index);
                info!(path = %event.path, method = %event.method, "updating CORS rule");
                self.client
                    .update_cors(CorsRule {
                        cors_id: existing.cors_id,
                        path: event.path.clone(),
                        method: event.method.clone(),
                        config: config.clone(),
                        metadata: existing.metadata,
                    })
                    .await?;
            }
            None => {
                info!(path = %event.path, method = %event.method, "creating CORS rule");
                self.client
                    .create_cors(CorsRule {
                        cors_id: None,
                        path: event.path.clone(),
                        method: event.method.clone(),
                        config: config.clone(),
                        metadata: None,
                    })
                    .await?;
            }
        }
        Ok(())
    }

    // ==================== Step 3: connector functions ====================

    async fn register_connectors(
        &self,
        model: &ExtractedModel,
        remote_functions: &mut Vec<GatewayFunction>,
        remote_cors: &mut Vec<CorsRule>,
    ) -> Result<()> {
        for connector in &model.connectors {
            if let Some(index) = remote_functions
                .iter()
                .position(|f| f.function_id == connector.function_id)
            {
                // Connectors are never diffed: either fresh or left alone.
                remote_functions.swap_remove(index);
                debug!(function_id = %connector.function_id, "connector already registered");
                continue;
            }

            let resource_value = connector::resolve_resource_value(
                connector.kind,
                &connector.name,
                &connector.inputs,
                self.outputs,
            )?;
            let provider = connector::build_provider(
                connector.kind,
                &resource_value,
                &connector.region,
                self.outputs.get(ACCESS_KEY_OUTPUT).map(String::as_str),
                self.outputs.get(SECRET_KEY_OUTPUT).map(String::as_str),
            );

            info!(
                function_id = %connector.function_id,
                kind = connector.kind.gateway_type(),
                "registering connector function"
            );
            self.client
                .create_function(GatewayFunction {
                    function_id: connector.function_id.clone(),
                    function_type: connector.kind.gateway_type().to_string(),
                    provider,
                    metadata: None,
                })
                .await?;

            for event in &connector.events {
                self.create_subscription(&connector.function_id, event, remote_cors)
                    .await?;
            }
        }
        Ok(())
    }

    // ==================== Steps 4-6: cleanup ====================

    async fn delete_orphan_functions(
        &self,
        model: &ExtractedModel,
        orphans: Vec<GatewayFunction>,
        mut subscriptions: Vec<Subscription>,
        remote_event_types: &[EventType],
    ) -> Result<()> {
        // Event types whose authorizer the declared model binds; step 2
        // already wrote those bindings and they must survive cleanup.
        let rebound: BTreeSet<&str> = model
            .event_types
            .iter()
            .filter(|et| et.authorizer.is_some())
            .map(|et| et.name.as_str())
            .collect();

        let teardowns = orphans.into_iter().map(|function| {
            let mut owned_subs = Vec::new();
            subscriptions.retain(|s| {
                if s.function_id == function.function_id {
                    owned_subs.push(s.clone());
                    false
                } else {
                    true
                }
            });
            self.remove_orphan_function(function, owned_subs, remote_event_types, &rebound)
        });
        try_join_all(teardowns).await?;
        Ok(())
    }

    /// Tear down an orphan: its subscriptions, then any authorizer binding
    /// pointing at it, then the function itself. The order matters — the
    /// gateway rejects deleting a function that is still subscribed or still
    /// authorizing an event type.
    async fn remove_orphan_function(
        &self,
        function: GatewayFunction,
        subscriptions: Vec<Subscription>,
        remote_event_types: &[EventType],
        rebound: &BTreeSet<&str>,
    ) -> Result<()> {
        info!(function_id = %function.function_id, "deleting orphaned function");

        try_join_all(
            subscriptions
                .iter()
                .filter_map(|s| s.subscription_id.as_deref())
                .map(|id| self.client.unsubscribe(id)),
        )
        .await?;

        for event_type in remote_event_types {
            if event_type.authorizer_id.as_deref() != Some(function.function_id.as_str()) {
                continue;
            }
            // The snapshot still names the orphan, but the declared model
            // binds its own authorizer here and step 2 already wrote it.
            // Clearing now would clobber that write.
            if rebound.contains(event_type.name.as_str()) {
                debug!(
                    event_type = %event_type.name,
                    "authorizer already rebound, skipping clear"
                );
                continue;
            }
            info!(
                event_type = %event_type.name,
                function_id = %function.function_id,
                "clearing authorizer binding"
            );
            let mut cleared = event_type.clone();
            cleared.authorizer_id = None;
            self.client.update_event_type(cleared).await?;
        }

        self.client.delete_function(&function.function_id).await?;
        Ok(())
    }

    async fn delete_orphan_event_types(
        &self,
        model: &ExtractedModel,
        remote: &[EventType],
    ) -> Result<()> {
        let declared: BTreeSet<&str> = model
            .event_types
            .iter()
            .map(|et| et.name.as_str())
            .collect();
        let used: BTreeSet<&str> = model
            .declared_subscriptions()
            .map(|e| e.event_type.as_str())
            .collect();

        let deletions = remote
            .iter()
            .filter(|et| {
                // Foreign (metadata-less or differently-owned) types survive
                // even when unused.
                et.metadata
                    .as_ref()
                    .is_some_and(|m| m.owned_by(self.client.service(), self.client.stage()))
                    && !declared.contains(et.name.as_str())
                    && !used.contains(et.name.as_str())
            })
            .map(|et| {
                info!(event_type = %et.name, "deleting orphaned event type");
                self.client.delete_event_type(&et.name)
            });
        try_join_all(deletions).await?;
        Ok(())
    }

    async fn delete_orphan_cors(&self, unclaimed: Vec<CorsRule>) -> Result<()> {
        let deletions = unclaimed
            .iter()
            .filter_map(|rule| rule.cors_id.as_deref())
            .map(|cors_id| {
                info!(cors_id, "deleting orphaned CORS rule");
                self.client.delete_cors(cors_id)
            });
        try_join_all(deletions).await?;
        Ok(())
    }
}
