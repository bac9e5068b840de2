use axum::extract::ws::{Message, Utf8Bytes};
use log::{debug, error};
use mcpanel_protocol::v1::event::Envelope;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc::UnboundedSender;

struct Subscriber {
    sender: UnboundedSender<Message>,
    authenticated: bool,
}

/// The set of connected subscribers.
///
/// Ids are handed out to connections by [`BroadcastHub::next_id`]; entries
/// are inserted, authenticated and removed by the panel loop. Broadcasts
/// only reach authenticated subscribers and a failed write never affects
/// the others.
pub struct BroadcastHub {
    id: AtomicUsize,
    subscribers: scc::HashMap<usize, Subscriber, ahash::RandomState>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            id: AtomicUsize::new(0),
            subscribers: scc::HashMap::default(),
        }
    }

    pub fn next_id(&self) -> usize {
        self.id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert(&self, id: usize, sender: UnboundedSender<Message>) {
        let subscriber = Subscriber {
            sender,
            authenticated: false,
        };
        if self.subscribers.insert(id, subscriber).is_err() {
            debug!("subscriber {} registered twice", id);
        }
    }

    pub fn remove(&self, id: usize) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    /// Returns `false` for an unknown id.
    pub fn authenticate(&self, id: usize) -> bool {
        self.subscribers
            .update(&id, |_, subscriber| subscriber.authenticated = true)
            .is_some()
    }

    pub fn is_authenticated(&self, id: usize) -> bool {
        self.subscribers
            .read(&id, |_, subscriber| subscriber.authenticated)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn authenticated_count(&self) -> usize {
        let mut count = 0;
        self.subscribers.scan(|_, subscriber| {
            if subscriber.authenticated {
                count += 1;
            }
        });
        count
    }

    /// Sends to one subscriber regardless of its authentication.
    pub fn send_to(&self, id: usize, envelope: &Envelope) {
        let Some(text) = encode(envelope) else {
            return;
        };
        self.subscribers.read(&id, |_, subscriber| {
            if subscriber.sender.send(Message::Text(text)).is_err() {
                debug!("subscriber {} is gone", id);
            }
        });
    }

    /// Serializes once and sends to every authenticated subscriber.
    pub fn broadcast(&self, envelope: &Envelope) {
        let Some(text) = encode(envelope) else {
            return;
        };
        self.subscribers.scan(|id, subscriber| {
            if !subscriber.authenticated {
                return;
            }
            if subscriber.sender.send(Message::Text(text.clone())).is_err() {
                debug!("subscriber {} is gone", id);
            }
        });
    }
}

fn encode(envelope: &Envelope) -> Option<Utf8Bytes> {
    match envelope.to_text() {
        Ok(text) => Some(Utf8Bytes::from(text)),
        Err(err) => {
            error!("could not serialize envelope: {}", err);
            None
        }
    }
}
