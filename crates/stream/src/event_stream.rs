//! `EventStream`: single source of truth for one path's offset
//! sequence and live bus.

use std::sync::Arc;

use chrono::Utc;
use event_types::{Event, EventInput, Offset, StreamPath, TraceContext};
use tokio::sync::{broadcast, Mutex};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use crate::storage::{ReadRange, StorageFailure, StreamStorage};

const BUS_CAPACITY: usize = 4096;

/// Live-subscribe filter: where to start, and whether to include history.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscribeFrom {
    pub from: Option<Offset>,
    pub history_only: bool,
    pub live_only: bool,
}

impl SubscribeFrom {
    pub fn after(offset: Offset) -> Self {
        SubscribeFrom {
            from: Some(offset),
            ..Default::default()
        }
    }
}

/// Per-path append-offset assignment, durable persistence, and
/// in-memory fan-out to live subscribers.
pub struct EventStream {
    path: StreamPath,
    storage: Arc<dyn StreamStorage>,
    /// Serializes appends; also guards `last_offset` so readers never
    /// observe a bus publish before the corresponding state update.
    write_lock: Mutex<Offset>,
    bus: broadcast::Sender<Event>,
}

impl EventStream {
    /// Boots by reducing history to a `lastOffset`, then creates the bus.
    pub async fn new(storage: Arc<dyn StreamStorage>, path: StreamPath) -> Result<Self, StorageFailure> {
        let last_offset = storage.last_offset(&path).await?;
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Ok(EventStream {
            path,
            storage,
            write_lock: Mutex::new(last_offset),
            bus,
        })
    }

    pub fn path(&self) -> &StreamPath {
        &self.path
    }

    /// Computes the next offset, persists, publishes, and returns the event.
    ///
    /// Serial within this stream. On storage failure the in-memory
    /// `lastOffset` is not advanced.
    pub async fn append(&self, input: EventInput) -> Result<Event, StorageFailure> {
        let mut last_offset = self.write_lock.lock().await;
        let next = last_offset.next();
        let trace = TraceContext::synthesize(Utc::now().timestamp_millis());
        let event = Event::from_input(input, self.path.clone(), next, Utc::now(), trace);

        let event = self.storage.append(event).await?;
        *last_offset = next;
        // No subscribers is not an error; it just means nobody is listening yet.
        let _ = self.bus.send(event.clone());
        Ok(event)
    }

    /// History-then-live replay with no-gap, no-duplicate handover.
    ///
    /// Subscribes to the bus *before* reading history, so no append
    /// during replay is lost; then emits historical events with
    /// offset `> from`, then live events, suppressing any live event
    /// whose offset falls at or below the highest historical offset
    /// already emitted.
    pub fn subscribe(&self, opts: SubscribeFrom) -> impl futures::Stream<Item = Event> + Send + 'static {
        let rx = self.bus.subscribe();
        let storage = self.storage.clone();
        let path = self.path.clone();
        let from = opts.from.unwrap_or_else(Offset::none);
        let history_only = opts.history_only;
        let live_only = opts.live_only;

        async_stream::stream! {
            let mut live = BroadcastStream::new(rx);
            let mut highest_emitted = from;

            if !live_only {
                let range = ReadRange::from(from);
                if let Ok(history) = storage.read(&path, range).await {
                    for event in history {
                        highest_emitted = event.offset;
                        yield event;
                    }
                }
            }

            if history_only {
                return;
            }

            while let Some(next) = live.next().await {
                match next {
                    Ok(event) if event.offset > highest_emitted => {
                        highest_emitted = event.offset;
                        yield event;
                    }
                    Ok(_) => continue, // already covered by history replay
                    Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(_)) => {
                        continue;
                    }
                }
            }
        }
    }

    /// Historical-only read, bounded by filter semantics identical to storage.
    pub async fn read(&self, range: ReadRange) -> Result<Vec<Event>, StorageFailure> {
        self.storage.read(&self.path, range).await
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use event_types::{EventType, Version};
    use futures::StreamExt as _;

    use super::{EventStream, SubscribeFrom};
    use crate::storage::{InMemoryStorage, ReadRange, StreamStorage};
    use event_types::{EventInput, Offset, StreamPath};

    fn input(ty: &str, n: i64) -> EventInput {
        EventInput {
            r#type: EventType::new(ty).unwrap(),
            payload: serde_json::Map::from_iter([("n".to_string(), serde_json::Value::from(n))]),
            version: Version::default(),
        }
    }

    #[tokio::test]
    async fn append_assigns_dense_monotonic_offsets() {
        let storage: Arc<dyn StreamStorage> = Arc::new(InMemoryStorage::new());
        let stream = EventStream::new(storage, StreamPath::new("test/read").unwrap())
            .await
            .unwrap();

        let e0 = stream.append(input("t", 1)).await.unwrap();
        let e1 = stream.append(input("t", 2)).await.unwrap();

        assert_eq!(e0.offset.to_string(), "0000000000000000");
        assert_eq!(e1.offset.to_string(), "0000000000000001");

        let events = stream.read(ReadRange::default()).await.unwrap();
        assert_eq!(events[0].payload["n"], 1);
        assert_eq!(events[1].payload["n"], 2);
    }

    #[tokio::test]
    async fn subscribe_handover_sees_each_event_exactly_once_in_order() {
        let storage: Arc<dyn StreamStorage> = Arc::new(InMemoryStorage::new());
        let path = StreamPath::new("p").unwrap();
        let stream = Arc::new(EventStream::new(storage, path).await.unwrap());

        let sub_stream = stream.clone();
        let mut sub = Box::pin(sub_stream.subscribe(SubscribeFrom::after(Offset::none())));

        // Give the subscriber a chance to attach to the bus before appends land.
        tokio::task::yield_now().await;

        stream.append(input("a", 1)).await.unwrap();
        stream.append(input("b", 2)).await.unwrap();
        stream.append(input("c", 3)).await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            let event = tokio::time::timeout(Duration::from_secs(1), sub.next())
                .await
                .unwrap()
                .unwrap();
            seen.push(event.r#type.to_string());
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn subscribe_after_append_still_replays_history_without_duplication() {
        let storage: Arc<dyn StreamStorage> = Arc::new(InMemoryStorage::new());
        let path = StreamPath::new("p").unwrap();
        let stream = Arc::new(EventStream::new(storage, path).await.unwrap());

        stream.append(input("a", 1)).await.unwrap();
        stream.append(input("b", 2)).await.unwrap();

        let mut sub = Box::pin(stream.subscribe(SubscribeFrom::after(Offset::none())));
        let mut seen = Vec::new();
        for _ in 0..2 {
            let event = tokio::time::timeout(Duration::from_millis(200), sub.next())
                .await
                .unwrap()
                .unwrap();
            seen.push(event.offset);
        }
        assert_eq!(seen, vec![Offset::zero(), Offset::from_u64(1)]);
    }
}
