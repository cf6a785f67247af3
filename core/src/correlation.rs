//! Request/response correlation over a shared capture stream.
//!
//! Every frame the capture thread reads is offered to each pending exchange.
//! An exchange resolves exactly once: with the first frame its predicate
//! accepts, with [`TraceError::Timeout`] once its deadline passes, or with
//! [`TraceError::LinkClosed`] when the link shuts down.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tcproute_common::error::TraceError;
use tracing::trace;

/// Decides whether a captured frame answers an exchange.
pub type Predicate = Box<dyn Fn(&[u8]) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExchangeId(u64);

/// A frame accepted by an exchange's predicate.
#[derive(Debug, Clone)]
pub struct Reply {
    /// The frame that was sent to start the exchange.
    pub request: Vec<u8>,
    pub frame: Vec<u8>,
    pub sent_at: Instant,
    pub received_at: Instant,
}

impl Reply {
    pub fn latency(&self) -> Duration {
        self.received_at.saturating_duration_since(self.sent_at)
    }
}

type Outcome = Result<Reply, TraceError>;

struct Exchange {
    predicate: Predicate,
    request: Vec<u8>,
    submitted: Instant,
    timeout: Duration,
    completion: SyncSender<Outcome>,
}

impl Exchange {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.submitted) > self.timeout
    }
}

/// Caller side of a registered exchange.
#[derive(Debug)]
pub struct ExchangeHandle {
    id: ExchangeId,
    deadline: Instant,
    completion: Receiver<Outcome>,
}

impl ExchangeHandle {
    pub fn id(&self) -> ExchangeId {
        self.id
    }
}

/// Pending exchanges, keyed by the id handed out at registration.
#[derive(Default)]
pub struct ExchangeRegistry {
    pending: Mutex<BTreeMap<ExchangeId, Exchange>>,
    next_id: AtomicU64,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking an exchange. Register before sending `request` so a
    /// fast reply cannot slip past.
    pub fn register(&self, request: Vec<u8>, predicate: Predicate, timeout: Duration) -> ExchangeHandle {
        let id = ExchangeId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let submitted = Instant::now();
        let (completion, rx) = mpsc::sync_channel(1);

        self.pending.lock().insert(
            id,
            Exchange {
                predicate,
                request,
                submitted,
                timeout,
                completion,
            },
        );

        ExchangeHandle {
            id,
            deadline: submitted + timeout,
            completion: rx,
        }
    }

    /// Offers a captured frame to every pending exchange.
    ///
    /// A match is checked before expiry, so a reply that arrives together
    /// with the deadline still counts.
    pub fn on_frame_arrival(&self, frame: &[u8], now: Instant) {
        let mut pending = self.pending.lock();
        pending.retain(|id, exchange| {
            if (exchange.predicate)(frame) {
                trace!("exchange {id:?} matched a {} byte frame", frame.len());
                let reply = Reply {
                    request: std::mem::take(&mut exchange.request),
                    frame: frame.to_vec(),
                    sent_at: exchange.submitted,
                    received_at: now,
                };
                let _ = exchange.completion.send(Ok(reply));
                false
            } else if exchange.is_expired(now) {
                trace!("exchange {id:?} expired");
                let _ = exchange.completion.send(Err(TraceError::Timeout));
                false
            } else {
                true
            }
        });
    }

    /// Blocks until the exchange behind `handle` resolves.
    pub fn wait(&self, handle: ExchangeHandle) -> Result<Reply, TraceError> {
        let remaining = handle.deadline.saturating_duration_since(Instant::now());
        match handle.completion.recv_timeout(remaining) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                // A frame may have matched in the meantime; whoever removes the
                // exchange is the one who resolves it.
                self.expire(handle.id);
                handle.completion.recv().unwrap_or(Err(TraceError::LinkClosed))
            }
            Err(RecvTimeoutError::Disconnected) => Err(TraceError::LinkClosed),
        }
    }

    /// Resolves the exchange with [`TraceError::Timeout`] if it is still pending.
    pub fn expire(&self, id: ExchangeId) {
        if let Some(exchange) = self.pending.lock().remove(&id) {
            let _ = exchange.completion.send(Err(TraceError::Timeout));
        }
    }

    /// Drops an exchange whose request never made it onto the wire.
    pub fn cancel(&self, id: ExchangeId) {
        self.pending.lock().remove(&id);
    }

    /// Fails every pending exchange with [`TraceError::LinkClosed`].
    pub fn close(&self) {
        let drained = std::mem::take(&mut *self.pending.lock());
        for exchange in drained.into_values() {
            let _ = exchange.completion.send(Err(TraceError::LinkClosed));
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
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
