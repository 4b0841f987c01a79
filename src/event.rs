//! Events raised by the dispatcher and the per-connection event bus.
//!
//! Each [`EventKind`] is its own publish point. Handlers run synchronously on
//! the receive flow, in the order lines were framed; there is no ordering
//! between kinds. Handlers can be added or removed at any time, including
//! from inside another handler.
//!
//! # Example
//!
//! ```
//! use slirc_client::event::{Event, EventBus, EventKind};
//!
//! let bus = EventBus::new();
//! let id = bus.subscribe(EventKind::RawLine, |event| {
//!     if let Event::RawLine(line) = event {
//!         println!("<< {line}");
//!     }
//! });
//! bus.publish(Event::RawLine("PING :x".into()));
//! assert!(bus.unsubscribe(id));
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::trace;

use crate::cache::{Channel, User};
use crate::hostmask::Hostmask;

/// A chat message (`PRIVMSG` or `NOTICE`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub sender: Option<Hostmask>,
    pub target: String,
    pub text: String,
    /// The line as received.
    pub raw: String,
}

/// What a `MODE` line was aimed at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModeTarget {
    Channel(Channel),
    User(User),
    /// Not in the cache. The name is kept as received.
    Unresolved(String),
}

/// A `MODE` change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModeChange {
    pub sender: Hostmask,
    pub target: ModeTarget,
    /// Mode string and arguments, e.g. `+o nick`.
    pub modes: String,
}

/// Someone joined or left a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Membership {
    pub hostmask: Hostmask,
    /// Channel name as received, prefix included.
    pub channel: String,
    /// The actor is the local identity.
    pub is_self: bool,
}

/// Events published on the bus.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Event {
    /// Every framed line, before it is interpreted.
    RawLine(String),
    Message(Message),
    Notice(Message),
    ModeChange(ModeChange),
    Join(Membership),
    Part(Membership),
    /// A complete `CAP LS` listing: every supported capability, space-separated.
    CapLs(String),
    /// The capabilities in one `CAP ACK`.
    CapAck(String),
    /// The capabilities in one `CAP NAK`.
    CapNak(String),
}

/// Publish point an [`Event`] goes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    RawLine,
    Message,
    Notice,
    ModeChange,
    Join,
    Part,
    CapLs,
    CapAck,
    CapNak,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RawLine(_) => EventKind::RawLine,
            Self::Message(_) => EventKind::Message,
            Self::Notice(_) => EventKind::Notice,
            Self::ModeChange(_) => EventKind::ModeChange,
            Self::Join(_) => EventKind::Join,
            Self::Part(_) => EventKind::Part,
            Self::CapLs(_) => EventKind::CapLs,
            Self::CapAck(_) => EventKind::CapAck,
            Self::CapNak(_) => EventKind::CapNak,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Returns false once the subscriber is gone and should be detached.
type Handler = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Publish/subscribe fan-out, owned by one client.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<EventKind, Vec<(SubscriptionId, Handler)>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subscribers = self.subscribers.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<_, _> = subscribers.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventBus").field("subscribers", &counts).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `handler` to `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.attach(
            kind,
            Arc::new(move |event: &Event| {
                handler(event);
                true
            }),
        )
    }

    fn attach(&self, kind: EventKind, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, handler));
        id
    }

    /// Forward every event of `kind` into a channel, for async consumers.
    ///
    /// The subscription is detached on the first publish after the receiver
    /// is dropped.
    pub fn subscribe_channel(&self, kind: EventKind) -> (SubscriptionId, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.attach(
            kind,
            Arc::new(move |event: &Event| tx.send(event.clone()).is_ok()),
        );
        (id, rx)
    }

    /// Detach a handler. Returns false if it was not attached.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        for handlers in subscribers.values_mut() {
            if let Some(pos) = handlers.iter().position(|(sid, _)| *sid == id) {
                handlers.remove(pos);
                return true;
            }
        }
        false
    }

    /// Number of handlers attached to `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Deliver `event` to every handler of its kind, in subscription order.
    pub fn publish(&self, event: Event) {
        let handlers: Vec<(SubscriptionId, Handler)> = {
            let subscribers = self.subscribers.read().unwrap_or_else(PoisonError::into_inner);
            match subscribers.get(&event.kind()) {
                Some(list) => list.iter().map(|(id, h)| (*id, Arc::clone(h))).collect(),
                None => return,
            }
        };
        let gone: Vec<SubscriptionId> = handlers
            .into_iter()
            .filter(|(_, handler)| !handler(&event))
            .map(|(id, _)| id)
            .collect();
        if gone.is_empty() {
            return;
        }

        trace!(kind = ?event.kind(), count = gone.len(), "detaching closed subscribers");
        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = subscribers.get_mut(&event.kind()) {
            list.retain(|(id, _)| !gone.contains(id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_publish_reaches_only_matching_kind() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        bus.subscribe(EventKind::CapAck, move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        bus.publish(Event::CapNak("sasl".into()));
        bus.publish(Event::CapAck("sasl".into()));

        assert_eq!(*seen.lock().unwrap(), vec![Event::CapAck("sasl".into())]);
    }

    #[test]
    fn test_delivery_order_within_kind() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let sink = Arc::clone(&seen);
            bus.subscribe(EventKind::RawLine, move |event| {
                if let Event::RawLine(line) = event {
                    sink.lock().unwrap().push(format!("{tag}:{line}"));
                }
            });
        }

        bus.publish(Event::RawLine("a".into()));
        bus.publish(Event::RawLine("b".into()));

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:a", "second:a", "first:b", "second:b"]
        );
    }

    #[test]
    fn test_dropped_channel_receiver_is_detached() {
        let bus = EventBus::new();
        let (_, mut live) = bus.subscribe_channel(EventKind::CapAck);
        let (_, dropped) = bus.subscribe_channel(EventKind::CapAck);
        drop(dropped);
        assert_eq!(bus.subscriber_count(EventKind::CapAck), 2);

        // Other kinds leave it alone.
        bus.publish(Event::CapNak("sasl".into()));
        assert_eq!(bus.subscriber_count(EventKind::CapAck), 2);

        bus.publish(Event::CapAck("sasl".into()));
        assert_eq!(bus.subscriber_count(EventKind::CapAck), 1);
        assert_eq!(live.try_recv().unwrap(), Event::CapAck("sasl".into()));
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let id = bus.subscribe(EventKind::Notice, |_| {});
        assert_eq!(bus.subscriber_count(EventKind::Notice), 1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(EventKind::Notice), 0);
    }

    #[test]
    fn test_subscribe_from_handler() {
        let bus = Arc::new(EventBus::new());
        let inner = Arc::clone(&bus);
        bus.subscribe(EventKind::RawLine, move |_| {
            inner.subscribe(EventKind::Notice, |_| {});
        });
        bus.publish(Event::RawLine("x".into()));
        assert_eq!(bus.subscriber_count(EventKind::Notice), 1);
    }

    #[tokio::test]
    async fn test_subscribe_channel() {
        let bus = EventBus::new();
        let (_id, mut rx) = bus.subscribe_channel(EventKind::CapLs);
        bus.publish(Event::CapLs("sasl".into()));
        assert_eq!(rx.recv().await, Some(Event::CapLs("sasl".into())));
    }
}
