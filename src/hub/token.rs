use std::{
    any::TypeId,
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, Weak},
};

use super::registry::HubShared;

/// Токен подписки, возвращаемый `MessageHub::subscribe`.
///
/// Непрозрачный дескриптор: служит только для отписки. Идентификатор
/// выдаётся хабом один раз и никогда не переиспользуется. Токен хранит
/// слабую ссылку на выдавший его хаб и не владеет подписчиком.
#[derive(Clone)]
pub struct SubscriptionToken {
    id: u64,
    message_type: TypeId,
    type_name: &'static str,
    hub: Weak<HubShared>,
}

impl SubscriptionToken {
    pub(crate) fn new(
        id: u64,
        message_type: TypeId,
        type_name: &'static str,
        hub: Weak<HubShared>,
    ) -> Self {
        Self {
            id,
            message_type,
            type_name,
            hub,
        }
    }

    /// Числовой идентификатор подписки (уникален в пределах хаба).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Имя типа сообщения, на который оформлена подписка.
    pub fn message_type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn message_type(&self) -> TypeId {
        self.message_type
    }

    /// Проверяет, что токен выдан именно этим хабом.
    pub(crate) fn issued_by(
        &self,
        hub: &Arc<HubShared>,
    ) -> bool {
        std::ptr::eq(self.hub.as_ptr(), Arc::as_ptr(hub))
    }

    /// Отписывается через выдавший токен хаб.
    ///
    /// Если хаб уже уничтожен или подписка уже удалена, ничего не делает.
    pub fn cancel(&self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self);
        }
    }
}

impl PartialEq for SubscriptionToken {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.id == other.id && Weak::ptr_eq(&self.hub, &other.hub)
    }
}

impl Eq for SubscriptionToken {}

impl Hash for SubscriptionToken {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        self.id.hash(state);
    }
}

impl fmt::Debug for SubscriptionToken {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SubscriptionToken")
            .field("id", &self.id)
            .field("message_type", &self.type_name)
            .finish()
    }
}
