//! `StreamManager`: path registry and cross-path multiplexing.

use std::{collections::HashMap, sync::Arc};

use event_types::{Event, EventInput, Offset, StreamPath};
use futures::{stream, StreamExt};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::{
    event_stream::{EventStream, SubscribeFrom},
    storage::{ReadRange, StorageFailure, StreamStorage},
};

const GLOBAL_BUS_CAPACITY: usize = 4096;

/// Registry of `EventStream`s keyed by path, plus a process-wide bus
/// that receives every event appended to any stream.
pub struct StreamManager {
    storage: Arc<dyn StreamStorage>,
    streams: RwLock<HashMap<StreamPath, Arc<EventStream>>>,
    global_bus: broadcast::Sender<Event>,
}

impl StreamManager {
    pub fn new(storage: Arc<dyn StreamStorage>) -> Arc<Self> {
        let (global_bus, _) = broadcast::channel(GLOBAL_BUS_CAPACITY);
        Arc::new(StreamManager {
            storage,
            streams: RwLock::new(HashMap::new()),
            global_bus,
        })
    }

    /// Returns (lazily creating) the per-path `EventStream`.
    pub async fn for_path(&self, path: &StreamPath) -> Result<Arc<EventStream>, StorageFailure> {
        if let Some(stream) = self.streams.read().get(path) {
            return Ok(stream.clone());
        }

        let stream = Arc::new(EventStream::new(self.storage.clone(), path.clone()).await?);

        let mut streams = self.streams.write();
        Ok(streams.entry(path.clone()).or_insert(stream).clone())
    }

    /// Appends to the per-path stream, then republishes on the global bus.
    pub async fn append(&self, path: &StreamPath, input: EventInput) -> Result<Event, StorageFailure> {
        let stream = self.for_path(path).await?;
        let event = stream.append(input).await?;
        let _ = self.global_bus.send(event.clone());
        Ok(event)
    }

    /// With `path`, delegates to the per-path `subscribe`. Without one,
    /// returns live-only events from the global bus (no historical
    /// cross-path replay; use [`StreamManager::read`] for that).
    pub async fn subscribe(
        &self,
        path: Option<&StreamPath>,
    ) -> Result<std::pin::Pin<Box<dyn futures::Stream<Item = Event> + Send>>, StorageFailure> {
        match path {
            Some(path) => {
                let stream = self.for_path(path).await?;
                Ok(Box::pin(stream.subscribe(SubscribeFrom::after(Offset::none()))))
            }
            None => {
                let rx = self.global_bus.subscribe();
                let live = tokio_stream::wrappers::BroadcastStream::new(rx)
                    .filter_map(|r| async move { r.ok() });
                Ok(Box::pin(live))
            }
        }
    }

    /// With `path`, delegates to the per-path `read`. Without one,
    /// merge-reads every known path's history concurrently; ordering
    /// across paths is not guaranteed, only within a path.
    pub async fn read(
        &self,
        path: Option<&StreamPath>,
        range: ReadRange,
    ) -> Result<Vec<Event>, StorageFailure> {
        match path {
            Some(path) => {
                let stream = self.for_path(path).await?;
                stream.read(range).await
            }
            None => {
                let paths = self.storage.list_paths().await?;
                let storage = self.storage.clone();
                let reads = stream::iter(paths)
                    .map(|p| {
                        let storage = storage.clone();
                        async move { storage.read(&p, range).await }
                    })
                    .buffer_unordered(8)
                    .collect::<Vec<_>>()
                    .await;

                let mut all = Vec::new();
                for result in reads {
                    all.extend(result?);
                }
                Ok(all)
            }
        }
    }
}
