use std::time::Duration;

use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::Dispatcher;

/// Default time between two progress polls
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Polls a dispatcher's progress and signals completion.
///
/// The monitor only reads counters, so it can never block the dispatch loop
/// or an executor.
#[derive(Debug, Clone, Copy)]
pub struct ProgressMonitor {
    interval: Duration,
}

impl Default for ProgressMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl ProgressMonitor {
    /// Create a monitor polling at the given interval
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Log the dispatcher's status once per interval until all admitted
    /// tasks are delivered, then cancel `completion`.
    ///
    /// Returns early, without signalling completion, if the dispatcher is
    /// stopped first.
    pub async fn run<C: Send + 'static>(
        &self,
        dispatcher: &Dispatcher<C>,
        completion: CancellationToken,
    ) {
        loop {
            info!("{}", dispatcher.status());
            if dispatcher.is_complete() {
                debug!("All tasks delivered, signalling completion");
                completion.cancel();
                return;
            }
            tokio::select! {
                biased;
                () = dispatcher.stopped() => return,
                () = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
