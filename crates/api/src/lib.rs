//! HTTP API: routing, request/response mapping and runtime wiring.

pub mod app;
pub mod middleware;
