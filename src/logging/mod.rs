pub mod config;
mod filters;
mod formatter;

pub use config::{LogFormat, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Устанавливает глобальный `tracing` subscriber по конфигурации.
///
/// Повторный вызов возвращает ошибку, а не паникует.
pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    config.validate()?;

    let env_filter = filters::build_filter_from_config(&config);
    let console_layer = formatter::build_formatter_from_config(&config);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        format = ?config.format,
        "Logging system initialized"
    );

    Ok(())
}
