//! HTTP surface: `POST /query`.
pub mod handlers;
pub mod server;
