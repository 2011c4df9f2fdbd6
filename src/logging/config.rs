use serde::{Deserialize, Serialize};

/// Формат консольного вывода.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Уровень по умолчанию (`trace`, `debug`, `info`, `warn`, `error`),
    /// используется, если не задан `RUST_LOG`.
    pub level: String,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    /// Проверяет уровень логирования.
    pub fn validate(&self) -> Result<(), String> {
        match self.level.to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" | "off" => Ok(()),
            other => Err(format!("unknown log level '{other}'")),
        }
    }

    /// Директива для `EnvFilter`, например `"warn,msghub=warn"`.
    pub fn build_filter_directive(&self) -> String {
        let level = self.level.to_ascii_lowercase();
        format!("{level},msghub={level}")
    }
}
