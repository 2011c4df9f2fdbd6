//! Хаб сообщений с маршрутизацией по типу (publish–subscribe).
//!
//! - `message`: контракт сообщения, ссылка на отправителя, generic-сообщения.
//! - `token`: токен подписки для отписки.
//! - `delivery`: описание подписки, сильные и слабые ссылки на действие.
//! - `proxy`: перехват доставки.
//! - `record` (приватный): запись подписки со стёртым типом.
//! - `registry`: сам `MessageHub`.

pub mod delivery;
pub mod message;
pub mod proxy;
mod record;
pub mod registry;
pub mod token;

pub use delivery::{Delivery, ReferenceStrength};
pub use message::{CancellableGenericMessage, GenericMessage, Message, MessageSender};
pub use proxy::{DeliveryProxy, DirectProxy, Envelope, TracingProxy};
pub use registry::{HubStats, MessageHub};
pub use token::SubscriptionToken;
