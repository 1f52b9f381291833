//! Service layer for the admission service.
//!
//! # Components
//!
//! - `admission` - Admission orchestrator (`enter`, `can_enter`, `advance`)
//! - `keyed_lock` - Per-key async locks used to serialize admissions
//! - `progress_tracker` - Per-(participant, meeting) position records
//! - `progression` - Pluggable room progression policy
//! - `provider` - Media provider session gateway (OpenVidu REST client + mock)
//! - `room_registry` - Ordered wait rooms and tele rooms of a meeting

pub mod admission;
pub mod keyed_lock;
pub mod progress_tracker;
pub mod progression;
pub mod provider;
pub mod room_registry;

pub use admission::AdmissionService;
pub use progression::{HoldPosition, ProgressionDecision, ProgressionPolicy};
pub use provider::{OpenViduClient, ProviderError, ProviderGateway};
