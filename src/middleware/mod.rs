//! HTTP middleware: request logging and CORS.

pub mod cors;
pub mod logging;
