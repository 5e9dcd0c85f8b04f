//! `stocksync` synchronises an inventory spreadsheet with a commerce
//! platform without exceeding the platform's request quota.
//!
//! The heart of the crate is the [`Dispatcher`]: it admits a batch of
//! [`Task`]s, starts them no faster than a configured number per second,
//! runs them concurrently and delivers every outcome, success or failure,
//! on a results stream. The [`stream`] module turns that stream into a
//! long-lived framed response with keep-alives, a ceiling and disconnect
//! handling.
//!
//! Any [`Transport`] can execute tasks. A minimal run against a fake
//! transport looks like this:
//!
//! ```
//! use async_trait::async_trait;
//! use bytes::Bytes;
//! use futures::StreamExt;
//! use stocksync_lib::{Dispatcher, DispatcherConfig, Endpoint, Result, Task, Transport};
//! use url::Url;
//!
//! #[derive(Debug)]
//! struct Echo;
//!
//! #[async_trait]
//! impl Transport for Echo {
//!     async fn call(&self, endpoint: &Endpoint) -> Result<Bytes> {
//!         Ok(Bytes::from(endpoint.url().to_string()))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let dispatcher = Dispatcher::new(DispatcherConfig::default(), Echo)?;
//!     let mut results = dispatcher.results()?;
//!
//!     let url = Url::parse("https://example.com/").unwrap();
//!     dispatcher.add(vec![Task::new("home", Endpoint::get(url), "row 1")]).await;
//!     dispatcher.seal();
//!
//!     let runner = {
//!         let dispatcher = dispatcher.clone();
//!         tokio::spawn(async move { dispatcher.start().await })
//!     };
//!     let task = results.next().await.unwrap();
//!     assert_eq!(task.context(), &"row 1");
//!     assert!(task.is_success());
//!
//!     dispatcher.stop();
//!     runner.await.unwrap()
//! }
//! ```
// #![deny(missing_docs)]

mod dispatcher;
mod transport;
mod types;

pub mod spreadsheet;
pub mod stream;
pub mod sync;
pub mod youzan;

#[cfg(test)]
#[macro_use]
pub mod test_utils;

pub use dispatcher::{
    interval_for, Dispatcher, DispatcherConfig, Progress, ResultStream, DEFAULT_RATE,
};
pub use transport::{
    HttpTransport, Transport, TransportConfig, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT,
};
pub use types::*;
