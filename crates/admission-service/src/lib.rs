//! Fan Meeting Admission Service Library
//!
//! Admits fans and organizers into live fan-meeting rooms: fans wait in a
//! wait room and are later moved into a tele room with the organizer.
//! Dropped connections are recovered by replaying the recorded position.
//!
//! # Architecture
//!
//! Handler -> Service -> Repository:
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/admission.rs -> repositories/*.rs
//!                                            \-> services/provider.rs (media provider)
//! ```
//!
//! # Modules
//!
//! - `auth` - Caller token resolution
//! - `config` - Service configuration from environment
//! - `errors` - Error taxonomy with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Authentication and HTTP metrics middleware
//! - `models` - Data models
//! - `observability` - Prometheus metrics
//! - `repositories` - Storage (PostgreSQL and in-memory)
//! - `routes` - Axum router setup
//! - `services` - Admission orchestrator and its collaborators

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
