//! In-process publish/subscribe message hub routed by message type.
//!
//! Subscribers register a delivery action for a concrete message type,
//! optionally with a filter, and choose whether the hub holds the action
//! strongly or weakly. Publishing a message synchronously delivers it to
//! every live subscriber of exactly that type, in subscription order.

/// Hub settings loading.
pub mod config;
/// Error types: invalid arguments, subscriber faults, limits.
pub mod error;
/// Message hub: messages, tokens, deliveries, proxies, registry.
pub mod hub;
/// Logging setup (tracing-subscriber).
pub mod logging;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

pub use config::HubSettings;
pub use error::{DeliveryError, HubError, HubResult};
pub use hub::{
    CancellableGenericMessage, Delivery, DeliveryProxy, DirectProxy, Envelope, GenericMessage,
    HubStats, Message, MessageHub, MessageSender, ReferenceStrength, SubscriptionToken,
    TracingProxy,
};
pub use logging::{init_logging, LogFormat, LoggingConfig};
