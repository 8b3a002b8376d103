//! Core data model and state-diff primitives for the Event Gateway
//! deployment plugin.
//!
//! This crate performs no I/O. It defines the declared and remote resource
//! shapes, the normalization of raw event schemas into canonical
//! subscriptions, the naming conventions that tie local declarations to
//! remote identifiers, and the equality predicates the reconciler uses to
//! decide what to create, update or delete.

pub mod diff;
pub mod error;
pub mod model;
pub mod naming;

pub use error::{GatewayError, Result};
pub use model::{
    CorsConfig, CorsRule, CorsSetting, EventDefinition, EventSubscription, EventType,
    FunctionDeclaration, GatewayFunction, Metadata, Subscription, SubscriptionKind,
    HTTP_REQUEST_EVENT, canonical_event_type,
};
