use std::io::{self, Stderr};

use tracing_subscriber::{fmt, layer::Layer, registry::LookupSpan};

use crate::logging::config::{LogFormat, LoggingConfig};

/// Собирает консольный layer по конфигурации. Тип формата стирается в
/// `Box<dyn Layer>`.
pub fn build_formatter_from_config<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let writer: fn() -> Stderr = io::stderr;

    match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(writer)
            .with_ansi(false)
            .with_target(config.with_target)
            .with_thread_ids(config.with_thread_ids)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_ansi(config.with_ansi)
            .with_target(config.with_target)
            .with_thread_ids(config.with_thread_ids)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(writer)
            .with_ansi(config.with_ansi)
            .with_target(config.with_target)
            .with_thread_ids(config.with_thread_ids)
            .boxed(),
    }
}
