//! # Foreman Server
//!
//! Mission-control server for work-effort repositories.
//!
//! ## Overview
//!
//! Foreman ingests project-management artifacts stored as markdown
//! files on disk, parses them into structured records, watches them for
//! change, and streams a live view of aggregated state to connected
//! clients:
//!
//! - **Live state**: per-repository snapshots refreshed by a debounced
//!   file watcher
//! - **Real-time fan-out**: WebSocket broadcast of snapshots and
//!   repo-set changes
//! - **Control plane**: HTTP endpoints for repo management, status
//!   transitions, filesystem browsing, and counter administration
//!
//! ## Architecture
//!
//! The server is built on Axum and delegates all domain logic to
//! `foreman-core`; this crate owns only the transport surfaces and
//! process lifecycle.

/// Error types and handling
pub mod errors;

/// HTTP endpoint handlers
pub mod handlers;

/// Application state shared across handlers
pub mod infra;

/// Route organization
pub mod routes;

/// WebSocket connection management
pub mod websocket;

/// Dev-only static asset watching
#[cfg(feature = "hot-reload")]
pub mod dev;

pub use infra::app_state::AppState;
