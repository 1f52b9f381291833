//! HTTP request handlers.

pub mod fan_meetings;
pub mod health;
pub mod metrics;

pub use fan_meetings::{apply, can_enter, enter, next_meeting};
pub use health::health_check;
pub use metrics::metrics_handler;
