//! Observability for the admission service.
//!
//! Provides metric definitions and recording helpers.

pub mod metrics;
