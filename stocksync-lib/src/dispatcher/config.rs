use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::{ErrorKind, Result};

/// Default number of requests started per second
pub const DEFAULT_RATE: u32 = 3;

/// Default capacity of the pending task queue
const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Default capacity of the results channel.
/// A capacity of one keeps executors close to a rendezvous with the consumer.
const DEFAULT_RESULTS_CAPACITY: usize = 1;

/// Configuration of a [`Dispatcher`](crate::Dispatcher)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Requests-per-second threshold; one task is started per permit
    #[serde(default = "default_rate")]
    pub rate: u32,

    /// Capacity of the pending queue; `add` waits while it is full
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Capacity of the results channel; executors wait while it is full
    #[serde(default = "default_results_capacity")]
    pub results_capacity: usize,

    /// Optional ceiling on concurrently running executors
    #[serde(default)]
    pub max_in_flight: Option<usize>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            queue_capacity: default_queue_capacity(),
            results_capacity: default_results_capacity(),
            max_in_flight: None,
        }
    }
}

const fn default_rate() -> u32 {
    DEFAULT_RATE
}

const fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

const fn default_results_capacity() -> usize {
    DEFAULT_RESULTS_CAPACITY
}

impl DispatcherConfig {
    /// Create a `DispatcherConfig` from CLI options, using defaults for missing values
    #[must_use]
    pub fn from_options(rate: Option<u32>, max_in_flight: Option<usize>) -> Self {
        Self {
            rate: rate.unwrap_or(DEFAULT_RATE),
            max_in_flight,
            ..Self::default()
        }
    }

    /// Check the configuration and return the validated rate
    ///
    /// # Errors
    ///
    /// Returns an error if the rate is zero or any capacity is zero
    pub fn validate(&self) -> Result<NonZeroU32> {
        let rate = NonZeroU32::new(self.rate).ok_or(ErrorKind::InvalidRate(self.rate))?;
        if self.queue_capacity == 0 {
            return Err(ErrorKind::InvalidCapacity {
                name: "queue_capacity",
            });
        }
        if self.results_capacity == 0 {
            return Err(ErrorKind::InvalidCapacity {
                name: "results_capacity",
            });
        }
        if self.max_in_flight == Some(0) {
            return Err(ErrorKind::InvalidCapacity {
                name: "max_in_flight",
            });
        }
        Ok(rate)
    }
}
