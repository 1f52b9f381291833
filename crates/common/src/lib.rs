//! Common utilities and types shared across fan meeting components.

#![warn(clippy::pedantic)]

/// Module for strongly typed identifiers
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for caller token claims and pre-verification checks
pub mod jwt;
