//! Thin HTTP binding of the trade service.

pub mod routes;
pub mod ws;

pub use routes::{router, AppState};
