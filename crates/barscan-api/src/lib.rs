//! barscan-api: HTTP API layer
//!
//! This crate provides the API layer including:
//! - HTTP REST endpoints via Axum
//! - Middleware (request ids, logging, metrics, CORS)
//! - Observability setup (logging, Prometheus)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 barscan-api                  │
//! ├─────────────────────────────────────────────┤
//! │  http/          - REST endpoints            │
//! │  middleware/    - Request ids, logging,     │
//! │                   metrics, CORS             │
//! │  observability/ - Logging and metrics setup │
//! └─────────────────────────────────────────────┘
//! ```

pub mod http;
pub mod middleware;
pub mod observability;
