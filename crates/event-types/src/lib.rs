//! Domain types and event schema registry for the durable event-stream
//! broker: branded primitives (`StreamPath`, `Offset`, `EventType`,
//! `Version`), typed event constructors, and the JSON wire codec.

mod event;
mod offset;
mod path;
pub mod registry;
mod trace;

pub use event::{EmptyEventType, Event, EventInput, EventType, Version};
pub use offset::{InvalidOffset, Offset, NONE_OFFSET};
pub use path::{EmptyPath, StreamPath};
pub use trace::TraceContext;
