use std::{
    any::Any,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
};

use super::{
    delivery::{DeliveryRef, FilterFn},
    message::Message,
    proxy::{DeliveryProxy, Envelope},
};
use crate::error::DeliveryError;

const ACTIVE: u8 = 0;
const REMOVED: u8 = 1;
const DEAD: u8 = 2;

/// Состояние записи подписки. `Removed` и `Dead` терминальные.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordState {
    Active,
    Removed,
    Dead,
}

/// Итог попытки доставить сообщение одной записи.
pub(crate) enum DeliveryOutcome {
    Delivered,
    Filtered,
    /// Запись удалена отпиской, пока публикация шла по снимку.
    Removed,
    /// Владелец слабой подписки уничтожен, запись нужно вытеснить.
    Dead,
    Failed(DeliveryError),
}

/// Запись подписки со стёртым типом сообщения.
///
/// Хаб хранит однородные списки таких записей; типизированная точка
/// входа `deliver` сама приводит сообщение к своему типу.
pub(crate) trait ErasedRecord: Send + Sync {
    fn token_id(&self) -> u64;

    fn state(&self) -> RecordState;

    /// Переводит активную запись в `Removed`. Возвращает `false`, если
    /// запись уже была в терминальном состоянии.
    fn mark_removed(&self) -> bool;

    /// `true`, пока запись активна и её действие доставки разрешается.
    fn is_alive(&self) -> bool;

    /// `message` это `&Arc<M>` со стёртым типом.
    fn deliver(
        &self,
        hub: &str,
        message: &(dyn Any + Send + Sync),
    ) -> DeliveryOutcome;
}

pub(crate) struct Record<M: Message> {
    id: u64,
    state: AtomicU8,
    target: DeliveryRef<M>,
    filter: Option<Box<FilterFn<M>>>,
    proxy: Option<Arc<dyn DeliveryProxy>>,
}

impl<M: Message> Record<M> {
    pub(crate) fn new(
        id: u64,
        target: DeliveryRef<M>,
        filter: Option<Box<FilterFn<M>>>,
        proxy: Option<Arc<dyn DeliveryProxy>>,
    ) -> Self {
        Self {
            id,
            state: AtomicU8::new(ACTIVE),
            target,
            filter,
            proxy,
        }
    }

    fn accepts(
        &self,
        message: &M,
    ) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(message))
    }

    fn mark_dead(&self) {
        let _ = self
            .state
            .compare_exchange(ACTIVE, DEAD, Ordering::AcqRel, Ordering::Acquire);
    }
}

impl<M: Message> ErasedRecord for Record<M> {
    fn token_id(&self) -> u64 {
        self.id
    }

    fn state(&self) -> RecordState {
        match self.state.load(Ordering::Acquire) {
            ACTIVE => RecordState::Active,
            REMOVED => RecordState::Removed,
            _ => RecordState::Dead,
        }
    }

    fn mark_removed(&self) -> bool {
        self.state
            .compare_exchange(ACTIVE, REMOVED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_alive(&self) -> bool {
        self.state() == RecordState::Active && self.target.is_alive()
    }

    fn deliver(
        &self,
        hub: &str,
        message: &(dyn Any + Send + Sync),
    ) -> DeliveryOutcome {
        match self.state() {
            RecordState::Active => {}
            RecordState::Removed => return DeliveryOutcome::Removed,
            RecordState::Dead => return DeliveryOutcome::Dead,
        }

        let Some(message) = message.downcast_ref::<Arc<M>>() else {
            // Список записей ключуется по TypeId, сюда попадает только Arc<M>.
            return DeliveryOutcome::Filtered;
        };

        let Some(resolved) = self.target.try_resolve() else {
            self.mark_dead();
            return DeliveryOutcome::Dead;
        };

        if !self.accepts(message) {
            return DeliveryOutcome::Filtered;
        }

        let invoke = || resolved.invoke(message);
        let result = match &self.proxy {
            Some(proxy) => {
                let envelope = Envelope {
                    hub,
                    message_type: std::any::type_name::<M>(),
                    token: self.id,
                    message: &**message,
                };
                proxy.deliver(&envelope, &invoke)
            }
            None => invoke(),
        };

        match result {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(error) => DeliveryOutcome::Failed(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::hub::{Delivery, GenericMessage, MessageSender};

    type Tick = GenericMessage<u32>;

    fn record_from(
        id: u64,
        delivery: Delivery<Tick>,
    ) -> Record<Tick> {
        Record::new(id, delivery.target, delivery.filter, delivery.proxy)
    }

    fn tick(n: u32) -> Arc<Tick> {
        Arc::new(Tick::new(MessageSender::anonymous(), n))
    }

    /// Тест проверяет переходы Active → Removed и отсутствие доставки после
    /// отписки.
    #[test]
    fn test_removed_record_is_not_invoked() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let record = record_from(
            1,
            Delivery::strong(move |_: &Arc<Tick>| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(record.state(), RecordState::Active);
        assert!(matches!(record.deliver("t", &tick(1)), DeliveryOutcome::Delivered));

        assert!(record.mark_removed());
        assert!(!record.mark_removed());
        assert_eq!(record.state(), RecordState::Removed);
        assert!(matches!(record.deliver("t", &tick(2)), DeliveryOutcome::Removed));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    /// Тест проверяет, что мёртвая слабая запись остаётся мёртвой.
    #[test]
    fn test_dead_is_terminal() {
        let action = Arc::new(|_: &Arc<Tick>| {});
        let record = record_from(2, Delivery::<Tick>::weak(&action));
        drop(action);

        assert!(matches!(record.deliver("t", &tick(1)), DeliveryOutcome::Dead));
        assert_eq!(record.state(), RecordState::Dead);
        assert!(!record.mark_removed());
        assert!(matches!(record.deliver("t", &tick(1)), DeliveryOutcome::Dead));
    }

    /// Тест проверяет, что запись с уничтоженным владельцем или после
    /// отписки не считается живой, даже до первой доставки.
    #[test]
    fn test_is_alive_follows_owner_and_state() {
        let action = Arc::new(|_: &Arc<Tick>| {});
        let weak = record_from(5, Delivery::<Tick>::weak(&action));
        assert!(weak.is_alive());
        drop(action);
        assert!(!weak.is_alive());
        assert_eq!(weak.state(), RecordState::Active);

        let strong = record_from(6, Delivery::<Tick>::strong(|_| {}));
        assert!(strong.is_alive());
        strong.mark_removed();
        assert!(!strong.is_alive());
    }

    #[test]
    fn test_filter_rejects() {
        let record = record_from(3, Delivery::<Tick>::strong(|_| {}).filter(|t| t.content > 10));
        assert!(matches!(record.deliver("t", &tick(5)), DeliveryOutcome::Filtered));
        assert!(matches!(record.deliver("t", &tick(50)), DeliveryOutcome::Delivered));
    }

    #[test]
    fn test_failure_is_reported() {
        let record = record_from(4, Delivery::<Tick>::try_strong(|_| Err("broken".into())));
        match record.deliver("t", &tick(1)) {
            DeliveryOutcome::Failed(error) => assert_eq!(error.to_string(), "broken"),
            _ => panic!("expected a failure"),
        }
    }
}
