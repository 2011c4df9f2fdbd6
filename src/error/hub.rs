use thiserror::Error;

/// Ошибка, которую возвращает действие доставки подписчика.
///
/// Хаб её не оборачивает и не подавляет: она прерывает `publish` и
/// возвращается издателю внутри [`HubError::SubscriberFault`].
pub type DeliveryError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Результат операций хаба.
pub type HubResult<T> = Result<T, HubError>;

/// Ошибки операций `MessageHub`.
#[derive(Debug, Error)]
pub enum HubError {
    /// Некорректный аргумент на границе вызова. Состояние хаба не меняется.
    #[error("invalid argument `{argument}`: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: &'static str,
    },

    /// Действие доставки подписчика завершилось ошибкой. Оставшиеся
    /// подписчики в этом вызове `publish` не уведомлялись.
    #[error("subscriber #{token} failed while handling `{message_type}`")]
    SubscriberFault {
        message_type: &'static str,
        token: u64,
        #[source]
        source: DeliveryError,
    },

    /// Превышен лимит подписчиков на один тип сообщения.
    #[error("subscriber limit of {limit} exceeded for `{message_type}`")]
    SubscriberLimitExceeded {
        message_type: &'static str,
        limit: usize,
    },
}

impl HubError {
    pub(crate) fn invalid_argument(
        argument: &'static str,
        reason: &'static str,
    ) -> Self {
        HubError::InvalidArgument { argument, reason }
    }

    /// Возвращает `true`, если ошибка вызвана некорректным аргументом.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, HubError::InvalidArgument { .. })
    }

    /// Возвращает `true`, если ошибку вернул подписчик.
    pub fn is_subscriber_fault(&self) -> bool {
        matches!(self, HubError::SubscriberFault { .. })
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_invalid_argument_display() {
        let err = HubError::invalid_argument("delivery", "owner has already been dropped");
        assert_eq!(
            err.to_string(),
            "invalid argument `delivery`: owner has already been dropped"
        );
        assert!(err.is_invalid_argument());
        assert!(!err.is_subscriber_fault());
    }

    #[test]
    fn test_subscriber_fault_keeps_source() {
        let source: DeliveryError = "disk is full".into();
        let err = HubError::SubscriberFault {
            message_type: "Saved",
            token: 7,
            source,
        };
        assert_eq!(err.to_string(), "subscriber #7 failed while handling `Saved`");
        assert_eq!(err.source().map(|s| s.to_string()), Some("disk is full".into()));
        assert!(err.is_subscriber_fault());
    }

    #[test]
    fn test_limit_display() {
        let err = HubError::SubscriberLimitExceeded {
            message_type: "Ping",
            limit: 2,
        };
        assert_eq!(err.to_string(), "subscriber limit of 2 exceeded for `Ping`");
    }
}
