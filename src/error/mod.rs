pub mod hub;

pub use hub::{DeliveryError, HubError, HubResult};
