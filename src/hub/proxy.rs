use std::any::Any;

use tracing::{trace, trace_span, warn};

use crate::error::DeliveryError;

/// Сведения о доставке, которые видит прокси.
#[derive(Clone, Copy)]
pub struct Envelope<'a> {
    /// Имя хаба, выполняющего публикацию.
    pub hub: &'a str,
    /// Полное имя типа сообщения.
    pub message_type: &'static str,
    /// Идентификатор токена подписки.
    pub token: u64,
    /// Само сообщение.
    pub message: &'a (dyn Any + Send + Sync),
}

impl std::fmt::Debug for Envelope<'_> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("hub", &self.hub)
            .field("message_type", &self.message_type)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// Перехватчик доставки сообщения подписчику.
///
/// Вызывается синхронно вместо прямого вызова действия доставки. Прокси
/// решает, вызывать ли `invoke`; ошибка, которую он вернёт, прерывает
/// публикацию так же, как ошибка самого подписчика.
pub trait DeliveryProxy: Send + Sync {
    fn deliver(
        &self,
        envelope: &Envelope<'_>,
        invoke: &dyn Fn() -> Result<(), DeliveryError>,
    ) -> Result<(), DeliveryError>;
}

/// Прокси по умолчанию: просто вызывает подписчика.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectProxy;

impl DeliveryProxy for DirectProxy {
    fn deliver(
        &self,
        _envelope: &Envelope<'_>,
        invoke: &dyn Fn() -> Result<(), DeliveryError>,
    ) -> Result<(), DeliveryError> {
        invoke()
    }
}

/// Прокси, оборачивающий каждую доставку в `tracing` span.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProxy;

impl DeliveryProxy for TracingProxy {
    fn deliver(
        &self,
        envelope: &Envelope<'_>,
        invoke: &dyn Fn() -> Result<(), DeliveryError>,
    ) -> Result<(), DeliveryError> {
        let span = trace_span!(
            "deliver",
            hub = envelope.hub,
            message_type = envelope.message_type,
            token = envelope.token
        );
        let _enter = span.enter();

        let result = invoke();
        match &result {
            Ok(()) => trace!("message delivered"),
            Err(error) => warn!(%error, "subscriber returned an error"),
        }
        result
    }
}

impl<P: DeliveryProxy + ?Sized> DeliveryProxy for std::sync::Arc<P> {
    fn deliver(
        &self,
        envelope: &Envelope<'_>,
        invoke: &dyn Fn() -> Result<(), DeliveryError>,
    ) -> Result<(), DeliveryError> {
        (**self).deliver(envelope, invoke)
    }
}
