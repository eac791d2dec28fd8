//! Optimizer agent: hosts the adaptive optimizer in an axum HTTP server

pub mod api;
pub mod config;
pub mod middleware;
