use std::num::NonZeroU32;
use std::time::Duration;

use log::trace;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Lower bound for the permit interval, so absurd rates don't spin
const MIN_INTERVAL: Duration = Duration::from_micros(1);

/// Time between two permits for the given requests-per-second threshold
#[must_use]
pub fn interval_for(rate: NonZeroU32) -> Duration {
    (Duration::from_secs(1) / rate.get()).max(MIN_INTERVAL)
}

/// The right to start one task
#[derive(Debug)]
pub(crate) struct Permit;

/// Emits one [`Permit`] per interval until shutdown.
///
/// Permits are buffered up to `rate`, which caps the burst a briefly busy
/// dispatch loop can catch up with. When the buffer is full, the permit for
/// that tick is dropped rather than stalling the clock.
#[derive(Debug)]
pub(crate) struct PermitClock {
    period: Duration,
    permits: mpsc::Sender<Permit>,
    shutdown: CancellationToken,
}

impl PermitClock {
    pub(crate) fn new(rate: NonZeroU32, shutdown: CancellationToken) -> (Self, mpsc::Receiver<Permit>) {
        // NonZeroU32 always fits a usize on supported targets
        let capacity = usize::try_from(rate.get()).unwrap_or(usize::MAX);
        let (permits, receiver) = mpsc::channel(capacity);
        let clock = Self {
            period: interval_for(rate),
            permits,
            shutdown,
        };
        (clock, receiver)
    }

    pub(crate) async fn run(self) {
        // The first permit is due one full period after start
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                _ = ticker.tick() => match self.permits.try_send(Permit) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => trace!("Permit buffer full, skipping tick"),
                    Err(TrySendError::Closed(_)) => break,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(value: u32) -> NonZeroU32 {
        NonZeroU32::new(value).unwrap()
    }

    fn drain(receiver: &mut mpsc::Receiver<Permit>) -> usize {
        let mut count = 0;
        while receiver.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    #[test]
    fn test_interval_for_rate() {
        assert_eq!(interval_for(rate(1)), Duration::from_secs(1));
        assert_eq!(interval_for(rate(3)), Duration::from_nanos(333_333_333));
        assert_eq!(interval_for(rate(1000)), Duration::from_millis(1));
        assert_eq!(interval_for(rate(u32::MAX)), MIN_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permits_are_paced() {
        let shutdown = CancellationToken::new();
        let (clock, mut permits) = PermitClock::new(rate(4), shutdown.clone());
        let handle = tokio::spawn(clock.run());

        tokio::time::sleep(Duration::from_millis(240)).await;
        assert_eq!(drain(&mut permits), 0);

        tokio::time::sleep(Duration::from_millis(770)).await;
        assert_eq!(drain(&mut permits), 4);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffer_caps_burst_at_rate() {
        let shutdown = CancellationToken::new();
        let (clock, mut permits) = PermitClock::new(rate(2), shutdown.clone());
        let handle = tokio::spawn(clock.run());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(drain(&mut permits), 2);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        let (clock, mut permits) = PermitClock::new(rate(10), shutdown.clone());
        let handle = tokio::spawn(clock.run());

        shutdown.cancel();
        handle.await.unwrap();

        // The sender is gone together with the clock
        assert!(permits.recv().await.is_none());
    }
}
