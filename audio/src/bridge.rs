//! Marshals change notifications from the server mixer thread onto the
//! main-loop lock.
//!
//! The server library calls back on its own thread while holding its own
//! loop lock. That callback must never wait for the main-loop lock: the
//! main thread may be holding it while waiting for the server loop lock
//! inside a mutation. The callback therefore only flips an atomic and sends
//! a message; a single worker thread takes the main-loop lock first and
//! then runs the resync, which takes the server loop lock per query.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

const WORKER_THREAD_NAME: &str = "audio-resync";

/// Implemented by whatever the main-loop lock guards.
pub trait ResyncTarget: Send + 'static {
    /// Called with the main-loop lock held.
    fn resync(&mut self);
}

#[derive(Debug)]
enum BridgeMessage {
    Resync,
    Quit,
}

/// Cheap handle given to backends. Safe to call from any thread, never
/// blocks.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    in_flight: Arc<AtomicBool>,
    tx: Sender<BridgeMessage>,
}

impl ChangeNotifier {
    /// Requests a resync. Returns false when one is already in flight and
    /// this notification was coalesced into it.
    pub fn notify(&self) -> bool {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return false;
        }
        if self.tx.send(BridgeMessage::Resync).is_err() {
            self.in_flight.store(false, Ordering::Release);
            return false;
        }
        true
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// A notifier whose messages go nowhere.
    pub fn disconnected() -> Self {
        let (tx, _rx) = channel();
        Self {
            in_flight: Arc::new(AtomicBool::new(false)),
            tx,
        }
    }
}

#[derive(Debug)]
pub struct ChangeBridge {
    notifier: ChangeNotifier,
    handle: Option<JoinHandle<()>>,
}

impl ChangeBridge {
    /// Starts the worker. `shutdown` belongs to one backend session; once
    /// set, the worker exits without touching `target` again.
    pub fn spawn<T: ResyncTarget>(
        target: Weak<Mutex<T>>,
        shutdown: Arc<AtomicBool>,
    ) -> std::io::Result<Self> {
        let (tx, rx) = channel();
        let in_flight = Arc::new(AtomicBool::new(false));
        let notifier = ChangeNotifier {
            in_flight: in_flight.clone(),
            tx,
        };
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || work(rx, target, in_flight, shutdown))?;
        Ok(Self {
            notifier,
            handle: Some(handle),
        })
    }

    pub fn notifier(&self) -> ChangeNotifier {
        self.notifier.clone()
    }

    /// Tells the worker to quit without joining it. The caller usually
    /// holds the main-loop lock the worker may be parked on.
    pub fn detach(mut self) {
        if self.notifier.tx.send(BridgeMessage::Quit).is_err() {
            debug!("{WORKER_THREAD_NAME} already gone");
        }
        drop(self.handle.take());
    }

    /// Stops the worker and waits for it. Must not be called with the
    /// main-loop lock held.
    pub fn join(mut self) {
        let _ = self.notifier.tx.send(BridgeMessage::Quit);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("{WORKER_THREAD_NAME} panicked");
        }
    }
}

fn work<T: ResyncTarget>(
    rx: Receiver<BridgeMessage>,
    target: Weak<Mutex<T>>,
    in_flight: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
) {
    for message in &rx {
        match message {
            BridgeMessage::Quit => return,
            BridgeMessage::Resync => {
                if shutdown.load(Ordering::Acquire) {
                    return;
                }
                let Some(target) = target.upgrade() else {
                    return;
                };
                {
                    let mut guard = target.lock();
                    if shutdown.load(Ordering::Acquire) {
                        return;
                    }
                    guard.resync();
                }
                in_flight.store(false, Ordering::Release);
            }
        }
    }
}
