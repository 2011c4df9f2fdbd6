use std::{
    any::Any,
    fmt,
    sync::{Arc, Weak},
};

/// Контракт сообщения, которое можно опубликовать через `MessageHub`.
///
/// Маршрутизация идёт строго по конкретному типу сообщения: подписка на `T`
/// получает только экземпляры, опубликованные как `T`. Структурно от
/// сообщения требуется только ссылка на отправителя.
pub trait Message: Any + Send + Sync {
    /// Отправитель сообщения.
    fn sender(&self) -> &MessageSender;
}

/// Непрозрачная ссылка на отправителя сообщения.
///
/// Хранит слабую ссылку, поэтому сообщение не продлевает жизнь отправителя.
#[derive(Clone)]
pub struct MessageSender {
    inner: Option<Weak<dyn Any + Send + Sync>>,
}

impl MessageSender {
    /// Создаёт ссылку на отправителя.
    pub fn new<S>(sender: &Arc<S>) -> Self
    where
        S: Any + Send + Sync,
    {
        let sender: Arc<dyn Any + Send + Sync> = sender.clone();
        Self {
            inner: Some(Arc::downgrade(&sender)),
        }
    }

    /// Отправитель без владельца: код, публикующий сообщение, не является
    /// объектом с временем жизни.
    pub fn anonymous() -> Self {
        Self { inner: None }
    }

    /// Возвращает отправителя, если он ещё жив.
    pub fn get(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner.as_ref().and_then(Weak::upgrade)
    }

    /// Возвращает отправителя, приведённого к типу `S`.
    pub fn downcast<S>(&self) -> Option<Arc<S>>
    where
        S: Any + Send + Sync,
    {
        self.get().and_then(|sender| sender.downcast::<S>().ok())
    }

    /// Проверяет, что отправителем является именно этот объект.
    pub fn is<S>(
        &self,
        sender: &Arc<S>,
    ) -> bool
    where
        S: Any + Send + Sync,
    {
        match self.downcast::<S>() {
            Some(own) => Arc::ptr_eq(&own, sender),
            None => false,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.inner.is_none()
    }
}

impl fmt::Debug for MessageSender {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let state = match &self.inner {
            None => "anonymous",
            Some(weak) if weak.strong_count() > 0 => "alive",
            Some(_) => "dropped",
        };
        f.debug_tuple("MessageSender").field(&state).finish()
    }
}

/// Сообщение с произвольным содержимым.
///
/// `GenericMessage<String>` и `GenericMessage<u64>` это разные типы и
/// маршрутизируются независимо.
#[derive(Debug, Clone)]
pub struct GenericMessage<C> {
    sender: MessageSender,
    /// Содержимое сообщения.
    pub content: C,
}

impl<C> GenericMessage<C> {
    pub fn new(
        sender: MessageSender,
        content: C,
    ) -> Self {
        Self { sender, content }
    }

    pub fn content(&self) -> &C {
        &self.content
    }

    pub fn into_content(self) -> C {
        self.content
    }
}

impl<C> Message for GenericMessage<C>
where
    C: Send + Sync + 'static,
{
    fn sender(&self) -> &MessageSender {
        &self.sender
    }
}

type CancelFn = Box<dyn Fn() + Send + Sync>;

/// Сообщение с содержимым и обратным вызовом отмены.
///
/// Издатель объявляет операцию, подписчик может её отменить через
/// [`CancellableGenericMessage::cancel`].
pub struct CancellableGenericMessage<C> {
    sender: MessageSender,
    pub content: C,
    cancel: CancelFn,
}

impl<C> CancellableGenericMessage<C> {
    pub fn new<F>(
        sender: MessageSender,
        content: C,
        cancel: F,
    ) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            sender,
            content,
            cancel: Box::new(cancel),
        }
    }

    pub fn content(&self) -> &C {
        &self.content
    }

    /// Вызывает обратный вызов отмены, переданный издателем.
    pub fn cancel(&self) {
        (self.cancel)()
    }
}

impl<C> Message for CancellableGenericMessage<C>
where
    C: Send + Sync + 'static,
{
    fn sender(&self) -> &MessageSender {
        &self.sender
    }
}

impl<C: fmt::Debug> fmt::Debug for CancellableGenericMessage<C> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("CancellableGenericMessage")
            .field("sender", &self.sender)
            .field("content", &self.content)
            .finish_non_exhaustive()
    }
}
