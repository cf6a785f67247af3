//! # Event Bus
//!
//! Fan-out of [`RouteEvent`]s to any number of observers. Every subscriber
//! owns an unbounded queue drained by its own dispatcher thread, so a slow
//! observer never stalls the probe loop or its peers, and each observer sees
//! events in exactly the order they were published.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use parking_lot::RwLock;
use tcproute_common::event::RouteEvent;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

/// Receives the notifications of one subscription.
pub trait RouteObserver: Send + 'static {
    fn on_event(&mut self, event: &RouteEvent);

    /// The run finished; no further calls follow.
    fn on_completed(&mut self) {}

    /// The run aborted; no further calls follow.
    fn on_error(&mut self, _message: &str) {}
}

#[derive(Debug, Clone)]
enum Notification {
    Event(Arc<RouteEvent>),
    Completed,
    Error(Arc<str>),
}

struct Slot {
    tx: UnboundedSender<Notification>,
    active: Arc<AtomicBool>,
}

type Slots = RwLock<HashMap<u64, Slot>>;

#[derive(Clone, Default)]
pub struct EventBus {
    slots: Arc<Slots>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<O: RouteObserver>(&self, observer: O) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let active = Arc::new(AtomicBool::new(true));

        let worker = {
            let active = active.clone();
            std::thread::spawn(move || dispatch(observer, rx, active))
        };

        self.slots.write().insert(
            id,
            Slot {
                tx,
                active: active.clone(),
            },
        );
        debug!("Subscriber {id} attached");

        Subscription {
            id,
            slots: Arc::downgrade(&self.slots),
            active,
            worker: Some(worker),
        }
    }

    pub fn publish(&self, event: RouteEvent) {
        self.broadcast(Notification::Event(Arc::new(event)));
    }

    pub fn publish_completed(&self) {
        self.broadcast(Notification::Completed);
    }

    pub fn publish_error(&self, message: &str) {
        self.broadcast(Notification::Error(Arc::from(message)));
    }

    pub fn subscriber_count(&self) -> usize {
        self.slots.read().len()
    }

    fn broadcast(&self, notification: Notification) {
        let slots = self.slots.read();
        for slot in slots.values() {
            if slot.active.load(Ordering::Acquire) {
                // A closed queue means the dispatcher already finished.
                let _ = slot.tx.send(notification.clone());
            }
        }
    }
}

fn dispatch<O: RouteObserver>(
    mut observer: O,
    mut rx: UnboundedReceiver<Notification>,
    active: Arc<AtomicBool>,
) {
    while let Some(notification) = rx.blocking_recv() {
        if !active.load(Ordering::Acquire) {
            break;
        }
        match notification {
            Notification::Event(event) => observer.on_event(&event),
            Notification::Completed => {
                observer.on_completed();
                break;
            }
            Notification::Error(message) => {
                observer.on_error(&message);
                break;
            }
        }
    }
}

/// Handle to a subscriber. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    slots: Weak<Slots>,
    active: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stops delivery to this subscriber. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        self.active.store(false, Ordering::Release);
        let Some(slots) = self.slots.upgrade() else {
            return;
        };
        if slots.write().remove(&self.id).is_some() {
            debug!("Subscriber {} detached", self.id);
        }
    }

    /// Blocks until the observer has seen the final notification of the run,
    /// or until it was unsubscribed.
    pub fn wait(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Observer {} panicked", self.id);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
