use tracing_subscriber::EnvFilter;

use crate::logging::config::LoggingConfig;

pub fn build_filter_from_config(config: &LoggingConfig) -> EnvFilter {
    // RUST_LOG, если задан, важнее конфигурации.
    match EnvFilter::try_from_default_env() {
        Ok(env_filter) => env_filter,
        Err(_) => {
            let directive = config.build_filter_directive();
            EnvFilter::try_new(&directive).unwrap_or_else(|e| {
                eprintln!("Invalid log filter directive '{directive}': {e}; falling back to 'info'");
                EnvFilter::new("info")
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        sync::{Arc, Mutex},
    };

    use serial_test::serial;
    use tracing_subscriber::{fmt, prelude::*, registry::Registry};

    use super::*;

    // Мини-буферный writer для тестов
    struct VecMakeWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> fmt::MakeWriter<'a> for VecMakeWriter {
        type Writer = VecWriterGuard;

        fn make_writer(&'a self) -> Self::Writer {
            VecWriterGuard(self.0.clone())
        }
    }

    struct VecWriterGuard(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for VecWriterGuard {
        fn write(
            &mut self,
            buf: &[u8],
        ) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Тест проверяет, что фильтр из конфигурации пропускает warn и
    /// отбрасывает info.
    #[test]
    #[serial]
    fn test_filter_from_config_levels() {
        env::remove_var("RUST_LOG");
        let cfg = LoggingConfig {
            level: "warn".into(),
            ..Default::default()
        };
        let filter = build_filter_from_config(&cfg);

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(VecMakeWriter(buffer.clone()))
            .with_filter(filter);
        let subscriber = Registry::default().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("filtered info message");
            tracing::warn!("visible warn message");
        });

        let out = buffer.lock().unwrap();
        let s = String::from_utf8_lossy(&out);
        assert!(s.contains("visible warn message"));
        assert!(!s.contains("filtered info message"));
    }

    /// Тест проверяет, что некорректная директива не приводит к панике.
    #[test]
    #[serial]
    fn test_filter_from_config_invalid_directive() {
        env::remove_var("RUST_LOG");
        let cfg = LoggingConfig {
            level: "[invalid".into(),
            ..Default::default()
        };
        let _filter = build_filter_from_config(&cfg);
    }

    /// Тест проверяет, что RUST_LOG важнее конфигурации.
    #[test]
    #[serial]
    fn test_env_overrides_config() {
        env::set_var("RUST_LOG", "error");
        let cfg = LoggingConfig {
            level: "trace".into(),
            ..Default::default()
        };
        let filter = build_filter_from_config(&cfg);
        env::remove_var("RUST_LOG");

        assert_eq!(filter.to_string(), "error");
    }
}
