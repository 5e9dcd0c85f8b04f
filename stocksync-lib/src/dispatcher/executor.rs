use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::OwnedSemaphorePermit;

use super::Shared;
use crate::{ErrorKind, Task};

/// Run one task to completion and deliver it.
///
/// Failures never escape: they are attached to the task, which is published
/// like any other result. The identifier is released only after the publish
/// step, so a second task with the same identifier stays a duplicate until
/// the first one has been handed over.
pub(super) async fn execute<C: Send + 'static>(
    shared: Arc<Shared<C>>,
    mut task: Task<C>,
    slot: Option<OwnedSemaphorePermit>,
) {
    let id = task.id().clone();
    let outcome = shared.transport.call(task.endpoint()).await;
    if let Err(e) = &outcome {
        warn!("Task {id} failed: {e}");
    }
    task.complete(outcome);

    publish(&shared, task).await;
    shared.ledger.lock().complete(&id);
    drop(slot);
}

/// Deliver a duplicate without executing it
pub(super) async fn reject<C: Send + 'static>(shared: Arc<Shared<C>>, mut task: Task<C>) {
    let id = task.id().clone();
    task.complete(Err(ErrorKind::DuplicateTask(id)));
    publish(&shared, task).await;
    shared.ledger.lock().reject_duplicate();
}

/// Hand the task to the results channel, or drop it once shutdown fired
async fn publish<C: Send + 'static>(shared: &Shared<C>, task: Task<C>) {
    let id = task.id().clone();
    tokio::select! {
        biased;
        () = shared.shutdown.cancelled() => {
            debug!("Discarding result of task {id} after shutdown");
        }
        sent = shared.results.send(task) => {
            if sent.is_err() {
                debug!("Results receiver is gone, discarding task {id}");
            }
        }
    }
}
