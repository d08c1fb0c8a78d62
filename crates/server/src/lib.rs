//! HTTP/SSE edge exposing the broker over `/agents/<path>`.

mod routes;

pub use routes::{create_router, AppState};
