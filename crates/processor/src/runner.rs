//! Processor supervision: lazily spawn one supervised worker per path
//! on first event sighting, deduped via a fiber map.

use std::{collections::HashMap, sync::Arc};

use broker_stream::{EventStream, StreamManager};
use event_types::StreamPath;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{error, info};

#[async_trait::async_trait]
pub trait Processor: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn run(&self, manager: Arc<StreamManager>, stream: Arc<EventStream>) -> Result<(), ProcessorError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("storage failure: {0}")]
    Storage(#[from] broker_stream::StorageFailure),
    #[error("upstream failure: {0}")]
    Upstream(String),
}

/// Wraps a [`Processor`] into a background service: one worker per
/// path, spawned only if no worker currently exists for that path.
pub struct ProcessorService {
    workers: Mutex<HashMap<StreamPath, JoinHandle<()>>>,
}

impl Default for ProcessorService {
    fn default() -> Self {
        ProcessorService {
            workers: Mutex::new(HashMap::new()),
        }
    }
}

impl ProcessorService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to the global bus, signals `started` only once that
    /// subscription is live, then spawns a worker per newly-seen path.
    ///
    /// The returned `JoinHandle` runs until the manager's bus closes;
    /// aborting it tears down the dispatch loop but not already-spawned
    /// workers — callers that need full teardown should also drain
    /// [`ProcessorService::abort_all`].
    pub async fn start(
        self: Arc<Self>,
        manager: Arc<StreamManager>,
        processor: Arc<dyn Processor>,
        started: oneshot::Sender<()>,
    ) -> Result<JoinHandle<()>, broker_stream::StorageFailure> {
        let mut events = manager.subscribe(None).await?;
        let _ = started.send(());

        let service = self.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                service.only_if_missing(&event.path, &manager, &processor);
            }
        });
        Ok(handle)
    }

    fn only_if_missing(
        &self,
        path: &StreamPath,
        manager: &Arc<StreamManager>,
        processor: &Arc<dyn Processor>,
    ) {
        let mut workers = self.workers.lock();
        if let Some(existing) = workers.get(path)
            && !existing.is_finished()
        {
            return; // at most one live worker per path
        }

        let manager = manager.clone();
        let processor = processor.clone();
        let task_path = path.clone();
        let processor_name = processor.name().to_string();

        let handle = tokio::spawn(async move {
            let stream = match manager.for_path(&task_path).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!(path = %task_path, processor = %processor_name, error = %e, "failed to open stream for processor");
                    return;
                }
            };

            info!(path = %task_path, processor = %processor_name, "processor worker starting");
            match processor.run(manager, stream).await {
                Ok(()) => info!(path = %task_path, processor = %processor_name, "processor worker finished"),
                Err(e) => error!(path = %task_path, processor = %processor_name, error = %e, "processor worker failed"),
            }
        });

        workers.insert(path.clone(), handle);
    }

    /// Aborts every spawned worker; used for full supervisory teardown.
    pub fn abort_all(&self) {
        for (_, handle) in self.workers.lock().drain() {
            handle.abort();
        }
    }
}
