use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::Frame;
use crate::{Dispatcher, Result, Task};

/// Default idle time after which a keep-alive frame is sent
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 30;

/// Default wall-clock ceiling of a single stream
pub const DEFAULT_CEILING_SECS: u64 = 60 * 60;

/// Timing of a result stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamConfig {
    /// Idle time after which a `ping` frame is sent
    #[serde(default = "default_keep_alive", with = "humantime_serde")]
    pub keep_alive: Duration,

    /// Total time after which the stream ends with a `timeout` frame
    #[serde(default = "default_ceiling", with = "humantime_serde")]
    pub ceiling: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            keep_alive: default_keep_alive(),
            ceiling: default_ceiling(),
        }
    }
}

const fn default_keep_alive() -> Duration {
    Duration::from_secs(DEFAULT_KEEP_ALIVE_SECS)
}

const fn default_ceiling() -> Duration {
    Duration::from_secs(DEFAULT_CEILING_SECS)
}

/// How a result stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEnd {
    /// Every task was delivered and `eof` was sent
    Completed,
    /// The ceiling was reached and `timeout` was sent
    TimedOut,
    /// The consumer went away; nothing more was sent
    Disconnected,
    /// The dispatcher was stopped by someone else
    Stopped,
}

/// Forwards completed tasks to an outward frame sink.
///
/// The sink is the sending half of a channel whose receiver feeds the
/// consumer, e.g. a streaming HTTP body. Dropping that receiver is how a
/// disconnect is observed.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamAdapter {
    config: StreamConfig,
}

impl StreamAdapter {
    /// Create an adapter with the given timing
    #[must_use]
    pub const fn new(config: StreamConfig) -> Self {
        Self { config }
    }

    /// Drive the stream until completion, timeout, disconnect or an
    /// external stop, and stop the dispatcher on the way out.
    ///
    /// `transform` turns a completed task into an optional record; `None`
    /// means the task produces no output. Records that fail to serialize
    /// are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatcher's results were already taken.
    /// No frame is sent in that case.
    pub async fn run<C, R, F>(
        &self,
        dispatcher: &Dispatcher<C>,
        completion: CancellationToken,
        sink: mpsc::Sender<Bytes>,
        mut transform: F,
    ) -> Result<StreamEnd>
    where
        C: Send + 'static,
        R: Serialize,
        F: FnMut(Task<C>) -> Option<R>,
    {
        let mut results = dispatcher.results()?;
        if sink.send(Frame::Ping.to_bytes()).await.is_err() {
            return Ok(disconnected(dispatcher));
        }

        let ceiling = tokio::time::sleep(self.config.ceiling);
        tokio::pin!(ceiling);
        // Restarted only when bytes reach the sink, so results that produce
        // no record do not starve the consumer of pings
        let idle = tokio::time::sleep(self.config.keep_alive);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                biased;
                () = sink.closed() => return Ok(disconnected(dispatcher)),
                () = &mut ceiling => {
                    info!("Stream reached its ceiling of {:?} at {}", self.config.ceiling, dispatcher.status());
                    // A consumer that left in the meantime needs no marker
                    let _ = sink.send(Frame::Timeout.to_bytes()).await;
                    dispatcher.stop();
                    return Ok(StreamEnd::TimedOut);
                }
                () = completion.cancelled() => {
                    // Completion implies every result was already published
                    while let Ok(task) = results.as_mut().try_recv() {
                        if forward(&sink, &mut transform, task).await == Forwarded::Closed {
                            return Ok(disconnected(dispatcher));
                        }
                    }
                    let _ = sink.send(Frame::Eof.to_bytes()).await;
                    dispatcher.stop();
                    return Ok(StreamEnd::Completed);
                }
                () = dispatcher.stopped() => {
                    debug!("Dispatcher stopped while streaming");
                    return Ok(StreamEnd::Stopped);
                }
                task = results.next() => {
                    let Some(task) = task else {
                        return Ok(StreamEnd::Stopped);
                    };
                    match forward(&sink, &mut transform, task).await {
                        Forwarded::Sent => {
                            idle.as_mut().reset(Instant::now() + self.config.keep_alive);
                        }
                        Forwarded::Skipped => {}
                        Forwarded::Closed => return Ok(disconnected(dispatcher)),
                    }
                }
                () = &mut idle => {
                    if sink.send(Frame::Ping.to_bytes()).await.is_err() {
                        return Ok(disconnected(dispatcher));
                    }
                    idle.as_mut().reset(Instant::now() + self.config.keep_alive);
                }
            }
        }
    }
}

fn disconnected<C: Send + 'static>(dispatcher: &Dispatcher<C>) -> StreamEnd {
    info!("Consumer disconnected at {}", dispatcher.status());
    dispatcher.stop();
    StreamEnd::Disconnected
}

/// What happened to one completed task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Forwarded {
    /// A record frame reached the sink
    Sent,
    /// Nothing was written
    Skipped,
    /// The sink is closed
    Closed,
}

/// Transform and send one task
async fn forward<C, R, F>(sink: &mpsc::Sender<Bytes>, transform: &mut F, task: Task<C>) -> Forwarded
where
    R: Serialize,
    F: FnMut(Task<C>) -> Option<R>,
{
    let id = task.id().clone();
    let Some(record) = transform(task) else {
        debug!("Task {id} produced no record");
        return Forwarded::Skipped;
    };
    match Frame::record(&record) {
        Ok(frame) => {
            if sink.send(frame.to_bytes()).await.is_ok() {
                Forwarded::Sent
            } else {
                Forwarded::Closed
            }
        }
        Err(e) => {
            error!("Cannot encode record of task {id}: {e}");
            Forwarded::Skipped
        }
    }
}
