//! Pairlink Server - Axum-based HTTP entry point
//!
//! Exposes `GET /pair?number=` plus health and info endpoints, and hands
//! every pairing request to the session orchestrator.

pub mod http;
pub mod state;

pub use http::create_router;
pub use state::AppState;
