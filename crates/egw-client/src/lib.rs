//! Typed client for the Event Gateway configuration and events APIs.
//!
//! Covers the four managed resource kinds (functions, event types,
//! subscriptions, CORS rules), ownership metadata stamping, scoped listing
//! with graceful read degradation, and the `emit` debug utility.

mod client;

pub use client::{ClientConfig, EventGatewayClient};
