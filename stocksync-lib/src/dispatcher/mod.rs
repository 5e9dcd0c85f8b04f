//! Rate-limited task dispatcher.
//!
//! A [`Dispatcher`] owns a bounded queue of pending [`Task`]s. Its dispatch
//! loop pairs every queued task with a permit from the permit clock and
//! launches an independent executor for it, so the configured rate limits
//! how many calls are *started* per second, not how many complete.
//! Completed tasks, successful or not, are delivered on a results channel in
//! completion order.
//!
//! # Lifecycle
//!
//! - [`Dispatcher::add`] admits tasks, before or after `start`.
//! - [`Dispatcher::seal`] announces that no more tasks will be added.
//! - [`Dispatcher::start`] runs the permit clock and the dispatch loop until
//!   [`Dispatcher::stop`] is called.
//! - [`Dispatcher::stop`] fires the shared shutdown signal. It is idempotent
//!   and safe to call from several places at once.
//!
//! ```
//! use stocksync_lib::{Dispatcher, DispatcherConfig, Endpoint, HttpTransport, Task, TransportConfig};
//! use url::Url;
//!
//! # #[tokio::main]
//! # async fn main() -> stocksync_lib::Result<()> {
//! let transport = HttpTransport::new(&TransportConfig::default())?;
//! let dispatcher = Dispatcher::new(DispatcherConfig::default(), transport)?;
//! let endpoint = Endpoint::get(Url::parse("https://example.com/").unwrap());
//! dispatcher.add(vec![Task::new("home", endpoint, ())]).await;
//! dispatcher.seal();
//! assert_eq!(dispatcher.status(), "tasks(0/1)");
//! # Ok(())
//! # }
//! ```
mod config;
mod executor;
mod ledger;
mod permit;

use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

pub use config::{DispatcherConfig, DEFAULT_RATE};
pub use ledger::Progress;
pub use permit::interval_for;

use ledger::Ledger;
use permit::{Permit, PermitClock};

use crate::{ErrorKind, Result, Task, Transport};

/// Completed tasks, in completion order
pub type ResultStream<C> = ReceiverStream<Task<C>>;

/// State shared by the dispatch loop and all executors
struct Shared<C> {
    rate: NonZeroU32,
    transport: Arc<dyn Transport>,
    queue: mpsc::Sender<Task<C>>,
    pending: Mutex<Option<mpsc::Receiver<Task<C>>>>,
    results: mpsc::Sender<Task<C>>,
    results_rx: Mutex<Option<mpsc::Receiver<Task<C>>>>,
    ledger: Mutex<Ledger>,
    limit: Option<Arc<Semaphore>>,
    shutdown: CancellationToken,
    stopped: AtomicBool,
}

/// Issues tasks against a remote service at a bounded rate.
///
/// Cloning a `Dispatcher` is cheap and yields another handle to the same
/// dispatcher.
pub struct Dispatcher<C> {
    shared: Arc<Shared<C>>,
}

impl<C> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C> fmt::Debug for Dispatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("rate", &self.shared.rate)
            .field("progress", &self.shared.ledger.lock().progress())
            .field("stopped", &self.shared.stopped.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<C: Send + 'static> Dispatcher<C> {
    /// Create a dispatcher for one batch
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, most notably a
    /// rate of zero. No task can be admitted in that case.
    pub fn new<T: Transport + 'static>(config: DispatcherConfig, transport: T) -> Result<Self> {
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a dispatcher that shares an existing transport
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    pub fn with_transport(config: DispatcherConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let rate = config.validate()?;
        let (queue, pending) = mpsc::channel(config.queue_capacity);
        let (results, results_rx) = mpsc::channel(config.results_capacity);

        Ok(Self {
            shared: Arc::new(Shared {
                rate,
                transport,
                queue,
                pending: Mutex::new(Some(pending)),
                results,
                results_rx: Mutex::new(Some(results_rx)),
                ledger: Mutex::new(Ledger::default()),
                limit: config
                    .max_in_flight
                    .map(|max| Arc::new(Semaphore::new(max))),
                shutdown: CancellationToken::new(),
                stopped: AtomicBool::new(false),
            }),
        })
    }

    /// Admit tasks to the pending queue and return how many were accepted.
    ///
    /// Waits while the queue is full. Stops early, dropping the remaining
    /// tasks, once the dispatcher is stopped or sealed.
    pub async fn add<I>(&self, tasks: I) -> usize
    where
        I: IntoIterator<Item = Task<C>>,
    {
        let shared = &self.shared;
        let mut admitted = 0;
        for task in tasks {
            let slot = tokio::select! {
                biased;
                () = shared.shutdown.cancelled() => break,
                slot = shared.queue.reserve() => match slot {
                    Ok(slot) => slot,
                    Err(_) => break,
                },
            };
            let accepted = shared.ledger.lock().admit();
            if !accepted {
                warn!("Dispatcher is sealed, dropping task {}", task.id());
                break;
            }
            slot.send(task);
            admitted += 1;
        }
        if shared.shutdown.is_cancelled() {
            debug!("Dispatcher stopped while adding tasks, {admitted} admitted");
        }
        admitted
    }

    /// Announce that no more tasks will be added
    pub fn seal(&self) {
        self.shared.ledger.lock().seal();
    }

    /// Run the permit clock and the dispatch loop until [`Dispatcher::stop`]
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatcher was already started
    pub async fn start(&self) -> Result<()> {
        let pending = self
            .shared
            .pending
            .lock()
            .take()
            .ok_or(ErrorKind::AlreadyStarted)?;
        let (clock, permits) = PermitClock::new(self.shared.rate, self.shared.shutdown.clone());

        info!(
            "Dispatcher started at {} requests per second",
            self.shared.rate
        );
        tokio::join!(clock.run(), self.dispatch(pending, permits));
        info!("Dispatcher stopped at {}", self.status());
        Ok(())
    }

    async fn dispatch(
        &self,
        mut pending: mpsc::Receiver<Task<C>>,
        mut permits: mpsc::Receiver<Permit>,
    ) {
        let shared = &self.shared;
        loop {
            let task = tokio::select! {
                biased;
                () = shared.shutdown.cancelled() => break,
                task = pending.recv() => match task {
                    Some(task) => task,
                    None => break,
                },
            };
            tokio::select! {
                biased;
                () = shared.shutdown.cancelled() => break,
                permit = permits.recv() => if permit.is_none() {
                    break;
                },
            }
            let slot = match &shared.limit {
                Some(limit) => tokio::select! {
                    biased;
                    () = shared.shutdown.cancelled() => break,
                    slot = Arc::clone(limit).acquire_owned() => match slot {
                        Ok(slot) => Some(slot),
                        Err(_) => break,
                    },
                },
                None => None,
            };
            self.launch(task, slot);
        }
    }

    /// Spawn the executor for a task, unless its identifier is in flight
    fn launch(&self, task: Task<C>, slot: Option<OwnedSemaphorePermit>) {
        let started = self.shared.ledger.lock().begin(task.id());
        if started {
            debug!("Dispatching task {}", task.id());
            tokio::spawn(executor::execute(Arc::clone(&self.shared), task, slot));
        } else {
            warn!("Task {} is already in flight, dropping duplicate", task.id());
            tokio::spawn(executor::reject(Arc::clone(&self.shared), task));
        }
    }

    /// Fire the shutdown signal.
    ///
    /// Returns `true` for the call that actually stopped the dispatcher and
    /// `false` for every later one.
    pub fn stop(&self) -> bool {
        let first = !self.shared.stopped.swap(true, Ordering::SeqCst);
        if first {
            info!("Stopping dispatcher at {}", self.status());
            self.shared.shutdown.cancel();
        }
        first
    }

    /// Returns `true` once [`Dispatcher::stop`] was called
    pub fn is_stopped(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Wait until the dispatcher is stopped
    pub async fn stopped(&self) {
        self.shared.shutdown.cancelled().await;
    }

    /// Take the stream of completed tasks
    ///
    /// # Errors
    ///
    /// Returns an error if the stream was already taken
    pub fn results(&self) -> Result<ResultStream<C>> {
        self.shared
            .results_rx
            .lock()
            .take()
            .map(ReceiverStream::new)
            .ok_or(ErrorKind::ResultsTaken)
    }

    /// Snapshot of the dispatcher's counters
    pub fn progress(&self) -> Progress {
        self.shared.ledger.lock().progress()
    }

    /// Human-readable `tasks(finished/total)` summary
    pub fn status(&self) -> String {
        self.progress().to_string()
    }

    /// Number of tasks delivered so far
    pub fn finished_count(&self) -> usize {
        self.progress().finished
    }

    /// Number of admitted tasks
    pub fn total(&self) -> usize {
        self.progress().total
    }

    /// Number of executors currently running
    pub fn in_flight(&self) -> usize {
        self.progress().in_flight
    }

    /// Returns `true` once the dispatcher is sealed and every admitted task
    /// has been delivered
    pub fn is_complete(&self) -> bool {
        self.shared.ledger.lock().is_complete()
    }
}
