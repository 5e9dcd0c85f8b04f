use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use parking_lot::Mutex;
use tokio::time::Instant;
use url::Url;

use crate::{Endpoint, ErrorKind, Result, Task, Transport};

#[macro_export]
/// Creates a mock web server, which responds with a predefined status when
/// handling a matching request
macro_rules! mock_server {
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let response_template = wiremock::ResponseTemplate::new(http::StatusCode::from($status));
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::method("GET")).respond_with(template).mount(&mock_server).await;
        mock_server
    }};
}

/// In-process transport for dispatcher tests.
///
/// The last path segment of the endpoint is used as the call name. Calls
/// sleep for the configured latency on the tokio clock, so tests can run
/// with paused time.
#[derive(Debug, Default)]
pub(crate) struct FakeTransport {
    latency: Duration,
    failing: HashSet<String>,
    calls: Mutex<Vec<(String, Instant)>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeTransport {
    pub(crate) fn new(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Make calls for the given name fail with a server error
    pub(crate) fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// Start instants of all calls made so far, in call order
    pub(crate) fn call_instants(&self) -> Vec<Instant> {
        self.calls.lock().iter().map(|(_, at)| *at).collect()
    }

    /// Names of all calls made so far, in call order
    pub(crate) fn call_names(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Highest number of calls that were running at the same time
    pub(crate) fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn call(&self, endpoint: &Endpoint) -> Result<Bytes> {
        let name = endpoint
            .url()
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string();
        self.calls.lock().push((name.clone(), Instant::now()));

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&name) {
            return Err(ErrorKind::RejectedStatus(StatusCode::INTERNAL_SERVER_ERROR));
        }
        Ok(Bytes::from(name))
    }
}

/// Helper to build a task whose endpoint is understood by [`FakeTransport`]
///
/// # Panic
///
/// This panics if the name is not a valid path segment, so it should only be
/// used for testing
pub(crate) fn fake_task<C>(name: &str, context: C) -> Task<C> {
    let url = Url::parse(&format!("http://fake.test/{name}")).expect("Expected valid fake URL");
    Task::new(name, Endpoint::get(url), context)
}
