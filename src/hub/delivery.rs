use std::{
    any::Any,
    fmt,
    sync::{Arc, Weak},
};

use super::{message::Message, proxy::DeliveryProxy};
use crate::error::DeliveryError;

pub(crate) type ActionFn<M> = dyn Fn(&Arc<M>) -> Result<(), DeliveryError> + Send + Sync;
pub(crate) type OwnerFn<M> =
    dyn Fn(&(dyn Any + Send + Sync), &Arc<M>) -> Result<(), DeliveryError> + Send + Sync;
pub(crate) type FilterFn<M> = dyn Fn(&M) -> bool + Send + Sync;

/// Удерживает ли хаб действие доставки.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceStrength {
    /// Хаб владеет действием до явной отписки.
    Strong,
    /// Хаб держит слабую ссылку: подписка умирает вместе с владельцем.
    Weak,
}

/// Ссылка на действие доставки: сильная или слабая.
///
/// Слабая ссылка хранит `Weak` на объект-владелец и отдельно функцию,
/// которая связывает владельца с сообщением при каждом разрешении.
pub(crate) enum DeliveryRef<M> {
    Strong(Box<ActionFn<M>>),
    Weak {
        owner: Weak<dyn Any + Send + Sync>,
        invoke: Box<OwnerFn<M>>,
    },
}

/// Разрешённое действие доставки. Для слабой ссылки удерживает владельца
/// на время вызова.
pub(crate) enum Resolved<'a, M> {
    Strong(&'a ActionFn<M>),
    Weak {
        owner: Arc<dyn Any + Send + Sync>,
        invoke: &'a OwnerFn<M>,
    },
}

impl<M> DeliveryRef<M> {
    /// Возвращает вызываемое действие или `None`, если владелец уже
    /// уничтожен.
    pub(crate) fn try_resolve(&self) -> Option<Resolved<'_, M>> {
        match self {
            DeliveryRef::Strong(action) => Some(Resolved::Strong(action.as_ref())),
            DeliveryRef::Weak { owner, invoke } => owner.upgrade().map(|owner| Resolved::Weak {
                owner,
                invoke: invoke.as_ref(),
            }),
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        match self {
            DeliveryRef::Strong(_) => true,
            DeliveryRef::Weak { owner, .. } => owner.strong_count() > 0,
        }
    }

    pub(crate) fn strength(&self) -> ReferenceStrength {
        match self {
            DeliveryRef::Strong(_) => ReferenceStrength::Strong,
            DeliveryRef::Weak { .. } => ReferenceStrength::Weak,
        }
    }
}

impl<M> Resolved<'_, M> {
    pub(crate) fn invoke(
        &self,
        message: &Arc<M>,
    ) -> Result<(), DeliveryError> {
        match self {
            Resolved::Strong(action) => action(message),
            Resolved::Weak { owner, invoke } => invoke(owner.as_ref(), message),
        }
    }
}

/// Описание подписки на сообщения типа `M`.
///
/// Собирается из действия доставки (сильного или слабого), необязательного
/// фильтра и необязательного прокси и передаётся в `MessageHub::subscribe`.
///
/// ```ignore
/// let handler = Arc::new(|m: &Arc<Saved>| println!("saved {}", m.id));
/// let token = hub.subscribe(Delivery::weak(&handler).filter(|m| m.id > 10))?;
/// ```
pub struct Delivery<M: Message> {
    pub(crate) target: DeliveryRef<M>,
    pub(crate) filter: Option<Box<FilterFn<M>>>,
    pub(crate) proxy: Option<Arc<dyn DeliveryProxy>>,
}

impl<M: Message> Delivery<M> {
    fn from_target(target: DeliveryRef<M>) -> Self {
        Self {
            target,
            filter: None,
            proxy: None,
        }
    }

    /// Хаб владеет замыканием до явной отписки.
    pub fn strong<F>(action: F) -> Self
    where
        F: Fn(&Arc<M>) + Send + Sync + 'static,
    {
        Self::from_target(DeliveryRef::Strong(Box::new(move |message: &Arc<M>| {
            action(message);
            Ok(())
        })))
    }

    /// Как [`Delivery::strong`], но действие может вернуть ошибку, которая
    /// прервёт публикацию.
    pub fn try_strong<F>(action: F) -> Self
    where
        F: Fn(&Arc<M>) -> Result<(), DeliveryError> + Send + Sync + 'static,
    {
        Self::from_target(DeliveryRef::Strong(Box::new(action)))
    }

    /// Хаб держит только слабую ссылку на замыкание. Подписка живёт, пока
    /// вызывающий код удерживает `action`.
    pub fn weak<F>(action: &Arc<F>) -> Self
    where
        F: Fn(&Arc<M>) + Send + Sync + 'static,
    {
        Self::weak_method(action, |action: &F, message| action(message))
    }

    /// Слабая подписка метода объекта: хаб держит `Weak<O>` и вызывает
    /// `method(&owner, message)`, пока владелец жив.
    pub fn weak_method<O, F>(
        owner: &Arc<O>,
        method: F,
    ) -> Self
    where
        O: Any + Send + Sync,
        F: Fn(&O, &Arc<M>) + Send + Sync + 'static,
    {
        Self::try_weak_method(owner, move |owner: &O, message| {
            method(owner, message);
            Ok(())
        })
    }

    /// Слабая подписка метода с возможной ошибкой.
    pub fn try_weak_method<O, F>(
        owner: &Arc<O>,
        method: F,
    ) -> Self
    where
        O: Any + Send + Sync,
        F: Fn(&O, &Arc<M>) -> Result<(), DeliveryError> + Send + Sync + 'static,
    {
        let erased: Arc<dyn Any + Send + Sync> = owner.clone();
        let invoke = move |owner: &(dyn Any + Send + Sync), message: &Arc<M>| match owner
            .downcast_ref::<O>()
        {
            Some(owner) => method(owner, message),
            None => Ok(()),
        };
        Self::from_target(DeliveryRef::Weak {
            owner: Arc::downgrade(&erased),
            invoke: Box::new(invoke),
        })
    }

    /// Доставлять только сообщения, для которых `predicate` вернул `true`.
    pub fn filter<P>(
        mut self,
        predicate: P,
    ) -> Self
    where
        P: Fn(&M) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Доставлять через прокси.
    pub fn via<P>(
        mut self,
        proxy: P,
    ) -> Self
    where
        P: DeliveryProxy + 'static,
    {
        self.proxy = Some(Arc::new(proxy));
        self
    }

    pub fn strength(&self) -> ReferenceStrength {
        self.target.strength()
    }

    /// `false`, если владелец слабой подписки уже уничтожен.
    pub fn is_alive(&self) -> bool {
        self.target.is_alive()
    }
}

impl<M: Message> fmt::Debug for Delivery<M> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("message_type", &std::any::type_name::<M>())
            .field("strength", &self.strength())
            .field("filtered", &self.filter.is_some())
            .field("proxied", &self.proxy.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::hub::{GenericMessage, MessageSender};

    type Note = GenericMessage<&'static str>;

    fn note(text: &'static str) -> Arc<Note> {
        Arc::new(Note::new(MessageSender::anonymous(), text))
    }

    struct Counter {
        hits: AtomicUsize,
    }

    impl Counter {
        fn on_note(
            &self,
            _note: &Arc<Note>,
        ) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Тест проверяет, что сильная ссылка всегда разрешается.
    #[test]
    fn test_strong_always_resolves() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let delivery = Delivery::<Note>::strong(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(delivery.strength(), ReferenceStrength::Strong);
        let resolved = delivery.target.try_resolve().expect("strong must resolve");
        resolved.invoke(&note("a")).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    /// Тест проверяет, что слабая ссылка разрешается, пока замыкание живо,
    /// и перестаёт разрешаться после его удаления.
    #[test]
    fn test_weak_closure_dies_with_owner() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let action = Arc::new(move |_: &Arc<Note>| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let delivery = Delivery::<Note>::weak(&action);
        assert_eq!(delivery.strength(), ReferenceStrength::Weak);

        delivery.target.try_resolve().unwrap().invoke(&note("a")).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        drop(action);
        assert!(!delivery.is_alive());
        assert!(delivery.target.try_resolve().is_none());
    }

    /// Тест проверяет привязку метода к живому владельцу.
    #[test]
    fn test_weak_method_binds_owner() {
        let counter = Arc::new(Counter {
            hits: AtomicUsize::new(0),
        });
        let delivery = Delivery::<Note>::weak_method(&counter, Counter::on_note);

        delivery.target.try_resolve().unwrap().invoke(&note("x")).unwrap();
        delivery.target.try_resolve().unwrap().invoke(&note("y")).unwrap();
        assert_eq!(counter.hits.load(Ordering::SeqCst), 2);

        drop(counter);
        assert!(delivery.target.try_resolve().is_none());
    }

    /// Тест проверяет, что разрешённая слабая ссылка удерживает владельца на
    /// время вызова.
    #[test]
    fn test_resolved_keeps_owner_alive() {
        let counter = Arc::new(Counter {
            hits: AtomicUsize::new(0),
        });
        let delivery = Delivery::<Note>::weak_method(&counter, Counter::on_note);
        let weak_counter = Arc::downgrade(&counter);

        let resolved = delivery.target.try_resolve().unwrap();
        drop(counter);
        assert!(weak_counter.upgrade().is_some());

        resolved.invoke(&note("late")).unwrap();
        drop(resolved);
        assert!(weak_counter.upgrade().is_none());
    }

    #[test]
    fn test_try_strong_propagates_error() {
        let delivery = Delivery::<Note>::try_strong(|_| Err("boom".into()));
        let err = delivery
            .target
            .try_resolve()
            .unwrap()
            .invoke(&note("z"))
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_debug_output() {
        let delivery = Delivery::<Note>::strong(|_| {}).filter(|n| n.content.is_empty());
        let dbg = format!("{delivery:?}");
        assert!(dbg.contains("Strong"));
        assert!(dbg.contains("filtered: true"));
    }
}
