use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc::{Receiver, Sender, channel, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use super::base::Event;


pub type ObserverId = Uuid;


pub const DEFAULT_OBSERVER_CAPACITY: usize = 256;


/// Live observers of store changes.
///
/// `publish` hands each observer its own copy through a bounded channel
/// while holding the registry lock, so every observer sees events in the
/// order they were published. An observer whose channel is gone or full is
/// dropped from the registry and its stream ends; the others are unaffected.
pub struct BroadcastHub {
    observers: Mutex<HashMap<ObserverId, Sender<Event>>>,
    capacity: usize,
}

impl BroadcastHub {

    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_OBSERVER_CAPACITY)
    }

    /// `capacity` is how many undelivered events an observer may fall behind.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            observers: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }


    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = Uuid::new_v4();
        let (sender, receiver) = channel(self.capacity);
        let count = {
            let mut observers = self.observers.lock();
            observers.insert(id, sender);
            observers.len()
        };
        debug!("Observer {} subscribed ({} live)", id, count);

        Subscription {
            id,
            receiver,
            hub: Arc::downgrade(self),
        }
    }


    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let removed = self.observers.lock().remove(&id).is_some();
        if removed {
            debug!("Observer {} unsubscribed", id);
        }
        removed
    }

    /// Returns how many observers accepted the event.
    pub fn publish(&self, event: Event) -> usize {
        let mut observers = self.observers.lock();
        let mut dead = Vec::new();

        for (id, sender) in observers.iter() {
            match sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Observer {} fell {} events behind, dropping it", id, self.capacity);
                    dead.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Observer {} went away", id);
                    dead.push(*id);
                }
            }
        }
        for id in &dead {
            observers.remove(id);
        }

        let delivered = observers.len();
        debug!("Published {} to {} observers", event.event_type, delivered);
        delivered
    }


    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    /// Drops every sender; open subscriptions end after draining.
    pub fn close_all(&self) -> usize {
        let mut observers = self.observers.lock();
        let closed = observers.len();
        observers.clear();
        closed
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}


pub struct Subscription {
    id: ObserverId,
    receiver: Receiver<Event>,
    hub: Weak<BroadcastHub>,
}

impl Subscription {
    pub fn id(&self) -> ObserverId {
        self.id
    }


    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }


    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}
