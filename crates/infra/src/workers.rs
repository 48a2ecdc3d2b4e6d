//! Background worker plumbing (plain threads, graceful shutdown).

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::warn;

use scholarhub_events::{EventBus, Subscription};

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Generic bus-subscriber worker loop.
///
/// - Subscribes to an event bus
/// - Applies an idempotent handler for each message
/// - Supports graceful shutdown
#[derive(Debug)]
pub struct SubscriberWorker;

impl SubscriberWorker {
    /// Spawn a worker thread that processes messages from the bus.
    ///
    /// `handler` must be idempotent (at-least-once delivery safe); handler
    /// errors are logged and the loop continues.
    pub fn spawn<M, B, H, E>(name: &'static str, bus: B, mut handler: H) -> WorkerHandle
    where
        M: Send + 'static,
        B: EventBus<M> + Send + Sync + 'static,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || subscriber_loop(name, sub, shutdown_rx, &mut handler))
            .expect("failed to spawn subscriber worker thread");

        WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}

fn subscriber_loop<M, H, E>(
    name: &'static str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    handler: &mut H,
) where
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Debug,
{
    let tick = Duration::from_millis(250);

    loop {
        // Shutdown check (non-blocking)
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => {
                if let Err(err) = handler(msg) {
                    warn!(worker = name, error = ?err, "subscriber worker handler failed");
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Fixed-interval worker (e.g. the overdue-invoice sweep).
#[derive(Debug)]
pub struct PeriodicWorker;

impl PeriodicWorker {
    /// Spawn a worker thread invoking `task` every `interval`.
    ///
    /// Task errors are logged and the schedule continues.
    pub fn spawn<T, E>(name: &'static str, interval: Duration, mut task: T) -> WorkerHandle
    where
        T: FnMut() -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                loop {
                    // recv_timeout doubles as the schedule: a shutdown message
                    // wakes the loop early, a timeout runs the task.
                    match shutdown_rx.recv_timeout(interval) {
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            if let Err(err) = task() {
                                warn!(worker = name, error = ?err, "periodic worker task failed");
                            }
                        }
                    }
                }
            })
            .expect("failed to spawn periodic worker thread");

        WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}
