//! The LLM-loop processor: drives at most one outbound model call per
//! path via [`ActiveRequest`], emitting `request-started`, then on
//! preemption `request-interrupted` followed by `request-cancelled`
//! for the superseded request, and otherwise streaming response
//! deltas through to `request-ended`.
//!
//! Real model backends are not implemented here; [`LanguageModel`]
//! is the seam external collaborators implement.

use std::sync::Arc;

use broker_stream::{EventStream, StreamManager};
use event_types::{registry, Event, StreamPath};
use futures::stream::BoxStream;
use serde_json::Value;

use crate::{
    active_request::ActiveRequest,
    consumer::{run_consumer, Consumer, Emit},
    runner::{Processor, ProcessorError},
};

/// A single streamed delta from a model response.
#[derive(Debug, Clone)]
pub struct DeltaPart(pub Value);

/// External collaborator producing a stream of response deltas for a
/// user message. Real backends (OpenAI/Grok/Claude/PI) are out of
/// scope; this trait is the seam they would implement.
pub trait LanguageModel: Send + Sync {
    fn stream_text(&self, prompt: &str) -> BoxStream<'static, DeltaPart>;
}

/// Test double: replays a fixed delta sequence with a configurable
/// per-delta delay, so interruption timing is deterministic in tests.
pub struct FakeLanguageModel {
    pub deltas: Vec<Value>,
    pub delay: std::time::Duration,
}

impl LanguageModel for FakeLanguageModel {
    fn stream_text(&self, _prompt: &str) -> BoxStream<'static, DeltaPart> {
        let deltas = self.deltas.clone();
        let delay = self.delay;
        Box::pin(futures::stream::unfold(deltas.into_iter(), move |mut it| async move {
            let next = it.next()?;
            tokio::time::sleep(delay).await;
            Some((DeltaPart(next), it))
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelSelection {
    #[default]
    Openai,
    Grok,
}

#[derive(Default)]
pub struct LlmLoopState {
    pub model: ModelSelection,
}

/// Consumer half of the LLM loop: folds `config:set` into the selected
/// model, and on each `send-user-message` starts (and, if needed,
/// interrupts) an outbound call via [`ActiveRequest`].
pub struct LlmLoopConsumer<M: LanguageModel> {
    model: Arc<M>,
    active: Arc<ActiveRequest>,
}

impl<M: LanguageModel + 'static> LlmLoopConsumer<M> {
    pub fn new(model: Arc<M>) -> Self {
        LlmLoopConsumer {
            model,
            active: Arc::new(ActiveRequest::new()),
        }
    }
}

#[async_trait::async_trait]
impl<M: LanguageModel + 'static> Consumer for LlmLoopConsumer<M> {
    type State = LlmLoopState;

    fn initial(&self) -> LlmLoopState {
        LlmLoopState::default()
    }

    fn apply(&self, mut state: LlmLoopState, event: &Event) -> LlmLoopState {
        if let Some(config) = registry::decode_config_set(event) {
            state.model = match config.model {
                registry::ModelKind::Grok => ModelSelection::Grok,
                _ => ModelSelection::Openai,
            };
        }
        state
    }

    /// On a `send-user-message`, emits `request-started`, then (if a
    /// prior request was preempted) `request-cancelled` followed by
    /// `request-interrupted`, then drives the model stream in the
    /// background, emitting `response:sse` per delta and finally
    /// `request-ended`.
    async fn react(&self, _state: &LlmLoopState, event: &Event, _path: &StreamPath, emit: &Emit) {
        let Some(message) = registry::decode_send_user_message(event) else {
            return;
        };
        let request_offset = event.offset;

        emit.emit(registry::make_request_started()).await;

        let model = self.model.clone();
        let task_emit = emit.clone();
        let active = self.active.clone();
        let content = message.content;

        let previous = self.active.run(request_offset, async move {
            use futures::StreamExt;
            let mut deltas = model.stream_text(&content);
            while let Some(part) = deltas.next().await {
                task_emit.emit(registry::make_response_sse(part.0, request_offset)).await;
            }
            // Clear before the final append becomes visible, so a `run`
            // racing against this completion never mistakes it for a
            // still-active request and emits a spurious interruption.
            active.complete(request_offset);
            task_emit.emit(registry::make_request_ended(request_offset)).await;
        });

        if let Some(prev) = previous {
            emit.emit(registry::make_request_interrupted(Some(prev))).await;
            emit.emit(registry::make_request_cancelled(prev, "interrupted", None)).await;
        }
    }
}

/// Processor wrapper: hydrate/react the LLM loop for one path.
pub struct LlmLoopProcessor<M: LanguageModel> {
    model: Arc<M>,
}

impl<M: LanguageModel + 'static> LlmLoopProcessor<M> {
    pub fn new(model: Arc<M>) -> Self {
        LlmLoopProcessor { model }
    }
}

#[async_trait::async_trait]
impl<M: LanguageModel + 'static> Processor for LlmLoopProcessor<M> {
    fn name(&self) -> &str {
        "iterate:llm-loop"
    }

    async fn run(&self, manager: Arc<StreamManager>, stream: Arc<EventStream>) -> Result<(), ProcessorError> {
        let consumer = LlmLoopConsumer::new(self.model.clone());
        run_consumer(&consumer, manager, stream).await;
        Ok(())
    }
}
