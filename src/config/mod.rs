pub mod settings;

pub use settings::HubSettings;
