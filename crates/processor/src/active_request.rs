//! `ActiveRequest`: at-most-one in-flight outbound call per path, with
//! preemption on a newer triggering event.

use std::{future::Future, sync::Arc};

use event_types::Offset;
use parking_lot::Mutex;
use tokio::task::{AbortHandle, JoinHandle};

struct State {
    current_offset: Option<Offset>,
    current_handle: Option<AbortHandle>,
}

/// Per-path controller used by any consumer that drives an at-most-one
/// outbound call per path (the LLM loop is the canonical example).
pub struct ActiveRequest {
    state: Mutex<State>,
}

impl Default for ActiveRequest {
    fn default() -> Self {
        ActiveRequest {
            state: Mutex::new(State {
                current_offset: None,
                current_handle: None,
            }),
        }
    }
}

impl ActiveRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `effect` as the current request, interrupting whatever
    /// was running before. Returns the offset that was preempted, if any.
    ///
    /// `effect` must honor cancellation at its `.await` points; a
    /// caller that needs a guaranteed cleanup on interruption should
    /// wrap the body so that cleanup runs even when the task is
    /// aborted (e.g. spawn the cleanup from a `Drop` guard moved into
    /// the task, since a plain `.await` after an abort point never
    /// resumes).
    pub fn run<F>(&self, request_offset: Offset, effect: F) -> Option<Offset>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.state.lock();
        let previous = state.current_offset;

        if let Some(handle) = state.current_handle.take() {
            handle.abort();
        }

        let join: JoinHandle<()> = tokio::spawn(effect);
        state.current_handle = Some(join.abort_handle());
        state.current_offset = Some(request_offset);
        drop(state);

        previous
    }

    /// Clears `current_offset` back to `None`, but only if `request_offset`
    /// is still the current one (a later `run` may have already replaced it).
    pub fn complete(&self, request_offset: Offset) {
        let mut state = self.state.lock();
        if state.current_offset == Some(request_offset) {
            state.current_offset = None;
            state.current_handle = None;
        }
    }

    /// Cancels any active fiber and clears state, without starting a new one.
    pub fn interrupt_only(&self) -> Option<Offset> {
        let mut state = self.state.lock();
        let previous = state.current_offset.take();
        if let Some(handle) = state.current_handle.take() {
            handle.abort();
        }
        previous
    }

    pub fn current_offset(&self) -> Option<Offset> {
        self.state.lock().current_offset
    }
}

pub type SharedActiveRequest = Arc<ActiveRequest>;

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    };

    use super::*;

    #[tokio::test]
    async fn second_run_interrupts_first_and_returns_its_offset() {
        let active = ActiveRequest::new();
        let a_cancelled = Arc::new(AtomicBool::new(false));

        let flag = a_cancelled.clone();
        let prev = active.run(Offset::zero(), async move {
            let _guard = scopeguard(flag);
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        assert_eq!(prev, None);

        tokio::task::yield_now().await;

        let prev = active.run(Offset::from_u64(1), async {
            tokio::time::sleep(Duration::from_millis(1)).await;
        });
        assert_eq!(prev, Some(Offset::zero()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(a_cancelled.load(Ordering::SeqCst), "first effect's cleanup must run on interrupt");
    }

    #[tokio::test]
    async fn complete_only_clears_if_still_current() {
        let active = ActiveRequest::new();
        active.run(Offset::zero(), async {});
        active.run(Offset::from_u64(1), async {});

        // A stale completion for the superseded offset must not clear
        // state that now belongs to the newer request.
        active.complete(Offset::zero());
        assert_eq!(active.current_offset(), Some(Offset::from_u64(1)));

        active.complete(Offset::from_u64(1));
        assert_eq!(active.current_offset(), None);
    }

    #[tokio::test]
    async fn run_after_already_completed_does_not_report_a_preemption() {
        let active = ActiveRequest::new();
        active.run(Offset::zero(), async {});
        // Simulates the first request's body clearing its own offset
        // just before its final append, ahead of a new trigger.
        active.complete(Offset::zero());

        let prev = active.run(Offset::from_u64(1), async {});
        assert_eq!(prev, None, "a request that already completed must not be reported as preempted");
    }

    fn scopeguard(flag: Arc<AtomicBool>) -> impl Drop {
        struct Guard(Arc<AtomicBool>);
        impl Drop for Guard {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }
        Guard(flag)
    }
}
