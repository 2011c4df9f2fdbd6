use std::{
    any::{type_name, Any, TypeId},
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use dashmap::{mapref::entry::Entry, DashMap};
use rustc_hash::FxBuildHasher;
use tracing::{debug, trace, warn};

use super::{
    delivery::Delivery,
    message::Message,
    proxy::{DeliveryProxy, TracingProxy},
    record::{DeliveryOutcome, ErasedRecord, Record},
    token::SubscriptionToken,
};
use crate::{
    config::HubSettings,
    error::{HubError, HubResult},
};

type RecordList = Vec<Arc<dyn ErasedRecord>>;

/// Снимок счётчиков хаба.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Количество вызовов `publish`.
    pub published: u64,
    /// Количество успешных вызовов действий доставки.
    pub delivered: u64,
    /// Количество доставок, отклонённых фильтром.
    pub filtered: u64,
    /// Количество вытесненных мёртвых слабых подписок.
    pub evicted: u64,
    /// Количество ошибок подписчиков.
    pub faults: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    published: AtomicU64,
    delivered: AtomicU64,
    filtered: AtomicU64,
    evicted: AtomicU64,
    faults: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> HubStats {
        HubStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }
}

/// Общее состояние хаба. Токены держат на него `Weak`.
pub(crate) struct HubShared {
    name: String,
    /// Тип сообщения → подписки в порядке регистрации
    registry: DashMap<TypeId, RecordList, FxBuildHasher>,
    /// Счётчик для генерации токенов, начинается с 1
    next_id: AtomicU64,
    max_per_type: usize,
    default_proxy: Option<Arc<dyn DeliveryProxy>>,
    stats: StatsCounters,
}

impl HubShared {
    /// Удаляет запись по токену. Неизвестный токен не считается ошибкой.
    ///
    /// Запись освобождается после снятия блокировки шарда: её замыкание
    /// может владеть объектами, чей `Drop` снова обращается к хабу.
    pub(crate) fn remove(
        &self,
        token: &SubscriptionToken,
    ) -> bool {
        let type_id = token.message_type();
        let mut emptied = false;

        let removed = match self.registry.get_mut(&type_id) {
            Some(mut list) => {
                let record = list
                    .iter()
                    .position(|r| r.token_id() == token.id())
                    .map(|pos| {
                        list[pos].mark_removed();
                        list.remove(pos)
                    });
                emptied = list.is_empty();
                record
            }
            None => None,
        };

        if emptied {
            self.registry.remove_if(&type_id, |_, list| list.is_empty());
        }

        let Some(record) = removed else {
            return false;
        };
        drop(record);

        debug!(
            hub = %self.name,
            token = token.id(),
            message_type = token.message_type_name(),
            "Subscription removed"
        );
        true
    }

    /// Вытесняет мёртвые записи, найденные при публикации.
    fn evict(
        &self,
        type_id: TypeId,
        message_type: &'static str,
        dead: &[u64],
    ) {
        let mut emptied = false;

        let evicted = match self.registry.get_mut(&type_id) {
            Some(mut list) => {
                let gone = split_off_where(&mut list, |r| dead.contains(&r.token_id()));
                emptied = list.is_empty();
                gone
            }
            None => RecordList::new(),
        };

        if emptied {
            self.registry.remove_if(&type_id, |_, list| list.is_empty());
        }

        self.count_evicted(message_type, evicted);
    }

    fn count_evicted(
        &self,
        message_type: &'static str,
        evicted: RecordList,
    ) {
        if evicted.is_empty() {
            return;
        }
        let count = evicted.len();
        drop(evicted);

        self.stats
            .evicted
            .fetch_add(count as u64, Ordering::Relaxed);
        debug!(
            hub = %self.name,
            message_type,
            evicted = count,
            "Evicted dead weak subscriptions"
        );
    }
}

/// Забирает из списка записи, для которых `doomed` вернул `true`, сохраняя
/// порядок оставшихся. Забранные записи освобождает вызывающий код.
fn split_off_where(
    list: &mut RecordList,
    mut doomed: impl FnMut(&Arc<dyn ErasedRecord>) -> bool,
) -> RecordList {
    let (gone, kept): (RecordList, RecordList) = list.drain(..).partition(|r| doomed(r));
    *list = kept;
    gone
}

/// Внутрипроцессный хаб сообщений с маршрутизацией по типу.
///
/// Подписка оформляется на конкретный тип сообщения `M`, публикация
/// синхронно доставляет экземпляр `M` всем живым подписчикам этого типа
/// в порядке подписки.
///
/// `MessageHub` дёшево клонируется: все клоны разделяют один реестр.
///
/// ```ignore
/// let hub = MessageHub::new();
/// let token = hub.subscribe(Delivery::strong(|m: &Arc<GenericMessage<String>>| {
///     println!("got {}", m.content);
/// }))?;
/// hub.publish(GenericMessage::new(MessageSender::anonymous(), "hi".to_string()))?;
/// hub.unsubscribe(&token)?;
/// ```
#[derive(Clone)]
pub struct MessageHub {
    shared: Arc<HubShared>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl MessageHub {
    /// Создаёт пустой хаб с настройками по умолчанию.
    pub fn new() -> Self {
        Self::with_settings(HubSettings::default())
    }

    /// Создаёт пустой хаб с заданными настройками.
    pub fn with_settings(settings: HubSettings) -> Self {
        let default_proxy: Option<Arc<dyn DeliveryProxy>> = if settings.trace_deliveries {
            Some(Arc::new(TracingProxy))
        } else {
            None
        };

        debug!(
            hub = %settings.name,
            max_subscribers_per_type = settings.max_subscribers_per_type,
            trace_deliveries = settings.trace_deliveries,
            "Message hub created"
        );

        Self {
            shared: Arc::new(HubShared {
                name: settings.name,
                registry: DashMap::with_hasher(FxBuildHasher),
                next_id: AtomicU64::new(1),
                max_per_type: settings.max_subscribers_per_type,
                default_proxy,
                stats: StatsCounters::default(),
            }),
        }
    }

    /// Регистрирует действие доставки для сообщений типа `M`.
    ///
    /// # Ошибки
    /// - `InvalidArgument`, если владелец слабой подписки уже уничтожен;
    /// - `SubscriberLimitExceeded`, если для `M` достигнут лимит живых
    ///   подписок. Мёртвые слабые записи перед проверкой вытесняются.
    ///
    /// В обоих случаях подписка не регистрируется.
    pub fn subscribe<M: Message>(
        &self,
        delivery: Delivery<M>,
    ) -> HubResult<SubscriptionToken> {
        if !delivery.is_alive() {
            return Err(HubError::invalid_argument(
                "delivery",
                "weakly referenced delivery action has already been dropped",
            ));
        }

        let shared = &self.shared;
        let type_id = TypeId::of::<M>();
        let message_type = type_name::<M>();
        let strength = delivery.strength();
        let proxy = delivery.proxy.or_else(|| shared.default_proxy.clone());

        let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
        let record: Arc<dyn ErasedRecord> =
            Arc::new(Record::new(id, delivery.target, delivery.filter, proxy));

        // Всё, что выходит из-под блокировки шарда, освобождается после неё.
        let mut pruned = RecordList::new();
        let rejected = match shared.registry.entry(type_id) {
            Entry::Occupied(mut entry) => {
                let list = entry.get_mut();
                let limited = shared.max_per_type > 0;
                if limited && list.len() >= shared.max_per_type {
                    pruned = split_off_where(list, |r| !r.is_alive());
                }
                if limited && list.len() >= shared.max_per_type {
                    Some(record)
                } else {
                    list.push(record);
                    None
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(vec![record]);
                None
            }
        };

        shared.count_evicted(message_type, pruned);

        if let Some(record) = rejected {
            drop(record);
            warn!(
                hub = %shared.name,
                message_type,
                limit = shared.max_per_type,
                "Subscriber limit exceeded"
            );
            return Err(HubError::SubscriberLimitExceeded {
                message_type,
                limit: shared.max_per_type,
            });
        }

        debug!(
            hub = %shared.name,
            token = id,
            message_type,
            ?strength,
            "Subscription added"
        );

        Ok(SubscriptionToken::new(
            id,
            type_id,
            message_type,
            Arc::downgrade(shared),
        ))
    }

    /// Сильная подписка замыканием без фильтра.
    pub fn subscribe_fn<M, F>(
        &self,
        action: F,
    ) -> HubResult<SubscriptionToken>
    where
        M: Message,
        F: Fn(&Arc<M>) + Send + Sync + 'static,
    {
        self.subscribe(Delivery::<M>::strong(action))
    }

    /// Удаляет подписку по токену.
    ///
    /// Неизвестный или уже удалённый токен не считается ошибкой. Токен другого хаба
    /// отклоняется с `InvalidArgument`.
    pub fn unsubscribe(
        &self,
        token: &SubscriptionToken,
    ) -> HubResult<()> {
        if !token.issued_by(&self.shared) {
            return Err(HubError::invalid_argument(
                "token",
                "token was issued by a different hub",
            ));
        }
        self.shared.remove(token);
        Ok(())
    }

    /// Удаляет все подписки на тип `M`. Возвращает количество удалённых.
    pub fn unsubscribe_all<M: Message>(&self) -> usize {
        let Some((_, list)) = self.shared.registry.remove(&TypeId::of::<M>()) else {
            return 0;
        };
        for record in &list {
            record.mark_removed();
        }
        debug!(
            hub = %self.shared.name,
            message_type = type_name::<M>(),
            removed = list.len(),
            "All subscriptions removed"
        );
        list.len()
    }

    /// Публикует сообщение. См. [`MessageHub::publish_shared`].
    pub fn publish<M: Message>(
        &self,
        message: M,
    ) -> HubResult<()> {
        self.publish_shared(Arc::new(message))
    }

    /// Синхронно доставляет `message` всем живым подписчикам типа `M`,
    /// чей фильтр его принимает, в порядке подписки.
    ///
    /// Работает по снимку списка подписок, снятому под блокировкой;
    /// действия доставки вызываются без блокировки и могут сами
    /// подписываться, отписываться и публиковать. Мёртвые слабые подписки
    /// пропускаются и вытесняются в этом же вызове.
    ///
    /// Первая ошибка подписчика прерывает доставку и возвращается как
    /// `SubscriberFault`. Паника подписчика не перехватывается.
    pub fn publish_shared<M: Message>(
        &self,
        message: Arc<M>,
    ) -> HubResult<()> {
        let shared = &self.shared;
        shared.stats.published.fetch_add(1, Ordering::Relaxed);

        let type_id = TypeId::of::<M>();
        let message_type = type_name::<M>();
        let snapshot: RecordList = match shared.registry.get(&type_id) {
            Some(list) => list.value().clone(),
            None => {
                trace!(hub = %shared.name, message_type, "No subscribers");
                return Ok(());
            }
        };

        let erased: &(dyn Any + Send + Sync) = &message;
        let mut dead = Vec::new();
        let mut result = Ok(());

        for record in &snapshot {
            match record.deliver(&shared.name, erased) {
                DeliveryOutcome::Delivered => {
                    shared.stats.delivered.fetch_add(1, Ordering::Relaxed);
                }
                DeliveryOutcome::Filtered => {
                    shared.stats.filtered.fetch_add(1, Ordering::Relaxed);
                }
                DeliveryOutcome::Removed => {}
                DeliveryOutcome::Dead => dead.push(record.token_id()),
                DeliveryOutcome::Failed(source) => {
                    shared.stats.faults.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        hub = %shared.name,
                        token = record.token_id(),
                        message_type,
                        error = %source,
                        "Subscriber failed, publish aborted"
                    );
                    result = Err(HubError::SubscriberFault {
                        message_type,
                        token: record.token_id(),
                        source,
                    });
                    break;
                }
            }
        }

        if !dead.is_empty() {
            shared.evict(type_id, message_type, &dead);
        }

        trace!(
            hub = %shared.name,
            message_type,
            subscribers = snapshot.len(),
            "Message published"
        );
        result
    }

    /// Количество записей в списке подписок типа `M`.
    pub fn subscriber_count<M: Message>(&self) -> usize {
        self.shared
            .registry
            .get(&TypeId::of::<M>())
            .map(|list| list.len())
            .unwrap_or(0)
    }

    /// Количество типов сообщений, на которые есть подписки.
    pub fn message_type_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// `true`, если в хабе нет ни одной подписки.
    pub fn is_empty(&self) -> bool {
        self.shared.registry.is_empty()
    }

    /// Имя хаба из настроек.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Текущие значения счётчиков.
    pub fn stats(&self) -> HubStats {
        self.shared.stats.snapshot()
    }
}

impl Default for MessageHub {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessageHub {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("MessageHub")
            .field("name", &self.shared.name)
            .field("message_types", &self.shared.registry.len())
            .field("max_subscribers_per_type", &self.shared.max_per_type)
            .finish()
    }
}
