use std::{collections::HashMap, fmt};

use crate::types::SubscriptionEvent;

/// Client assigned identifier of a subscription, unique for the lifetime of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for SubscriptionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubscriptionId {
    fn from(id: &str) -> Self {
        SubscriptionId(id.to_string())
    }
}

pub(crate) type EventCallback = Box<dyn FnMut(SubscriptionEvent) + Send>;

pub(crate) struct Subscriber {
    on_event: EventCallback,
}

impl Subscriber {
    pub fn new(on_event: EventCallback) -> Self {
        Subscriber { on_event }
    }

    pub fn deliver(&mut self, event: SubscriptionEvent) {
        (self.on_event)(event)
    }
}

/// Live subscriptions of a single connection, keyed by id.
///
/// Ids come from a counter that only moves forward, so an id is never handed out
/// twice and late frames for a removed subscription can't reach a newer one.
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    last_id: u64,
    subscribers: HashMap<SubscriptionId, Subscriber>,
}

impl SubscriptionRegistry {
    pub fn register(&mut self, subscriber: Subscriber) -> SubscriptionId {
        self.last_id += 1;
        let id = SubscriptionId(self.last_id.to_string());
        self.subscribers.insert(id.clone(), subscriber);
        id
    }

    pub fn lookup(&mut self, id: &str) -> Option<&mut Subscriber> {
        self.subscribers.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Subscriber> {
        self.subscribers.remove(id)
    }

    pub fn clear(&mut self) {
        self.subscribers.clear();
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
