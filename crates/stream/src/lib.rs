//! Durable, per-path event log with live fan-out.
//!
//! Three layers, leaves first:
//!
//! - [`storage`]: durable append-only persistence (in-memory or NDJSON files).
//! - [`event_stream`]: per-path offset assignment and the history/live handover.
//! - [`manager`]: the path registry and cross-path bus.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use broker_stream::{InMemoryStorage, StreamManager};
//! use event_types::{EventInput, EventType, StreamPath};
//!
//! # async fn run() {
//! let manager = StreamManager::new(Arc::new(InMemoryStorage::new()));
//! let path = StreamPath::new("pi/session-42").unwrap();
//! let input = EventInput::new(EventType::new("note").unwrap(), Default::default());
//! manager.append(&path, input).await.unwrap();
//! # }
//! ```

mod event_stream;
mod manager;
mod storage;

pub use event_stream::{EventStream, SubscribeFrom};
pub use manager::StreamManager;
pub use storage::{FileStorage, InMemoryStorage, ReadRange, StorageFailure, StreamStorage};
