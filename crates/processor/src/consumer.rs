//! Consumer hydrate/react loop: fold history with side effects
//! disabled, then react only to newly arrived live events.

use std::sync::Arc;

use broker_stream::{EventStream, ReadRange, StreamManager, SubscribeFrom};
use event_types::{Event, EventInput, Offset, StreamPath};
use futures::StreamExt;
use tracing::warn;

/// A pure state fold plus an effectful reaction, decoupled so that the
/// same reducer replays both history and live events deterministically.
#[async_trait::async_trait]
pub trait Consumer: Send + Sync {
    type State: Send;

    fn initial(&self) -> Self::State;

    /// Pure fold. Called for every event, in both hydrate and react phases.
    fn apply(&self, state: Self::State, event: &Event) -> Self::State;

    /// Effectful reaction. Called only for live events, once each, in order.
    async fn react(&self, state: &Self::State, event: &Event, path: &StreamPath, emit: &Emit);
}

/// Funnels consumer-issued appends back through the `StreamManager` on
/// the same path the consumer is reacting to.
#[derive(Clone)]
pub struct Emit {
    manager: Arc<StreamManager>,
    path: StreamPath,
}

impl Emit {
    pub fn new(manager: Arc<StreamManager>, path: StreamPath) -> Self {
        Emit { manager, path }
    }

    /// Appends `input`, logging and swallowing any failure so the
    /// react loop stays alive.
    pub async fn emit(&self, input: EventInput) {
        if let Err(e) = self.manager.append(&self.path, input).await {
            warn!(path = %self.path, error = %e, "emit failed, dropping");
        }
    }
}

/// Runs `consumer` against `stream` to completion of the stream (i.e.
/// until the caller drops the returned task or the process exits).
///
/// Phase 1 (hydrate): fold history with `apply`; `react` is never
/// called. A hydration failure is logged and `last_offset` defaults to
/// [`Offset::none`].
///
/// Phase 2 (react): subscribe from `last_offset`; for each live event,
/// `apply` then `react`.
pub async fn run_consumer<C: Consumer>(
    consumer: &C,
    manager: Arc<StreamManager>,
    stream: Arc<EventStream>,
) {
    let path = stream.path().clone();

    let (mut state, last_offset) = match stream.read(ReadRange::default()).await {
        Ok(history) => {
            let mut state = consumer.initial();
            let mut last_offset = Offset::none();
            for event in &history {
                state = consumer.apply(state, event);
                last_offset = event.offset;
            }
            (state, last_offset)
        }
        Err(e) => {
            warn!(path = %path, error = %e, "hydration failed, starting from offset -1");
            (consumer.initial(), Offset::none())
        }
    };

    let emit = Emit::new(manager, path.clone());
    let mut live = Box::pin(stream.subscribe(SubscribeFrom::after(last_offset)));
    while let Some(event) = live.next().await {
        state = consumer.apply(state, &event);
        consumer.react(&state, &event, &path, &emit).await;
    }
}
