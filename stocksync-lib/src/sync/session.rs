use std::sync::Arc;

use bytes::Bytes;
use log::info;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::delta;
use super::plan::{plan, SkuContext};
use crate::spreadsheet::Inventory;
use crate::stream::{ProgressMonitor, StreamAdapter, StreamConfig, StreamEnd};
use crate::youzan::YouzanClient;
use crate::{Dispatcher, DispatcherConfig, Result, Task, Transport};

/// A complete inventory synchronisation run
#[derive(Debug, Clone)]
pub struct SyncSession {
    client: YouzanClient,
    transport: Arc<dyn Transport>,
    dispatcher: DispatcherConfig,
    stream: StreamConfig,
    monitor: ProgressMonitor,
}

impl SyncSession {
    /// Create a session whose detail tasks share the client's connections
    #[must_use]
    pub fn new(client: YouzanClient, dispatcher: DispatcherConfig, stream: StreamConfig) -> Self {
        let transport = Arc::new(client.transport());
        Self {
            client,
            transport,
            dispatcher,
            stream,
            monitor: ProgressMonitor::default(),
        }
    }

    /// Run detail tasks through another transport
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Poll progress with another monitor
    #[must_use]
    pub const fn with_monitor(mut self, monitor: ProgressMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    /// Fetch the store directory and the catalog, and plan the detail tasks
    ///
    /// # Errors
    ///
    /// Returns an error if either listing fails
    pub async fn prepare(&self, inventory: &Inventory) -> Result<Vec<Task<SkuContext>>> {
        let (offlines, items) =
            futures::try_join!(self.client.list_offlines(), self.client.list_items())?;
        plan(&self.client, &items, &offlines, inventory)
    }

    /// Dispatch the tasks and stream the resulting records into `sink`
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatcher configuration is invalid. Nothing
    /// is sent to the sink in that case.
    pub async fn stream(
        &self,
        tasks: Vec<Task<SkuContext>>,
        sink: mpsc::Sender<Bytes>,
    ) -> Result<StreamEnd> {
        let dispatcher = Dispatcher::with_transport(self.dispatcher, Arc::clone(&self.transport))?;
        let completion = CancellationToken::new();

        let adder = async {
            let admitted = dispatcher.add(tasks).await;
            dispatcher.seal();
            info!("Admitted {admitted} detail requests");
        };
        let streamer = async {
            let end = StreamAdapter::new(self.stream)
                .run(&dispatcher, completion.clone(), sink, delta::transform)
                .await;
            dispatcher.stop();
            end
        };
        let (started, (), (), end) = tokio::join!(
            dispatcher.start(),
            adder,
            self.monitor.run(&dispatcher, completion.clone()),
            streamer,
        );
        started?;
        let end = end?;
        info!("Stream ended ({end:?}) at {}", dispatcher.status());
        Ok(end)
    }
}
