use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

/// Настройки `MessageHub`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    /// Имя хаба в логах и в `Envelope`.
    pub name: String,
    /// Максимум подписок на один тип сообщения, `0` означает без ограничения.
    pub max_subscribers_per_type: usize,
    /// Оборачивать доставки без явного прокси в `TracingProxy`.
    pub trace_deliveries: bool,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            max_subscribers_per_type: 0,
            trace_deliveries: false,
        }
    }
}

impl HubSettings {
    /// Загружает настройки из переменных окружения с префиксом `MSGHUB_`
    /// поверх значений по умолчанию.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = HubSettings::default();
        let cfg = Config::builder()
            .set_default("name", defaults.name)?
            .set_default("max_subscribers_per_type", defaults.max_subscribers_per_type as u64)?
            .set_default("trace_deliveries", defaults.trace_deliveries)?
            .add_source(Environment::with_prefix("MSGHUB").try_parsing(true))
            .build()?;

        cfg.try_deserialize()
    }

    pub fn with_name(
        mut self,
        name: impl Into<String>,
    ) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_subscribers_per_type(
        mut self,
        limit: usize,
    ) -> Self {
        self.max_subscribers_per_type = limit;
        self
    }

    pub fn with_trace_deliveries(
        mut self,
        enabled: bool,
    ) -> Self {
        self.trace_deliveries = enabled;
        self
    }
}
