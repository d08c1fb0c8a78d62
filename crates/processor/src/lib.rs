//! Consumer hydrate/react runtime, processor supervision, and the
//! `ActiveRequest` interruption controller for single-flight outbound
//! calls.

mod active_request;
mod consumer;
pub mod llm_loop;
mod runner;

pub use active_request::{ActiveRequest, SharedActiveRequest};
pub use consumer::{run_consumer, Consumer, Emit};
pub use runner::{Processor, ProcessorError, ProcessorService};
