//! Admission service error types.
//!
//! Every outcome of `Enter` / `CanEnter` other than success is an
//! [`EntryError`] variant. Variants group into classes (see [`ErrorClass`]) so
//! the HTTP layer can render "wait", "retry" and "error" messages distinctly.
//! Messages returned to clients are generic; details are logged server-side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::types::RoomId;
use serde::Serialize;
use thiserror::Error;

/// Coarse grouping of [`EntryError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Entity or prerequisite room session does not exist (yet).
    NotFound,
    /// A create-if-absent race was lost; the desired effect already holds.
    Conflict,
    /// Caller identity or role does not permit the action.
    Unauthorized,
    /// The media provider failed or timed out.
    Provider,
    /// Persistence or other internal failure.
    Internal,
}

/// Admission error type.
///
/// Maps to HTTP status codes:
/// - `MeetingNotFound`, `SessionNotFound`, `RoomIndexInvalid`, `ParticipantNotEntered`: 404
/// - `RoomAlreadyActive`: 409
/// - `Unauthenticated`: 401
/// - `UnauthorizedRole`: 403
/// - `ProviderUnavailable`: 503
/// - `Database`, `Internal`: 500
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("Meeting not found")]
    MeetingNotFound,

    /// The room's provider session has not been started by the organizer yet.
    #[error("Session not found for room {0}")]
    SessionNotFound(RoomId),

    /// A progress record points at a room index the meeting does not have.
    #[error("Room index {index} is out of range")]
    RoomIndexInvalid { index: u32 },

    /// The participant has no progress record for this meeting.
    #[error("Participant has not entered the meeting")]
    ParticipantNotEntered,

    #[error("Room already active")]
    RoomAlreadyActive,

    #[error("Role not permitted for this operation")]
    UnauthorizedRole,

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error")]
    Internal,
}

impl EntryError {
    /// Returns the class this error belongs to.
    pub fn class(&self) -> ErrorClass {
        match self {
            EntryError::MeetingNotFound
            | EntryError::SessionNotFound(_)
            | EntryError::RoomIndexInvalid { .. }
            | EntryError::ParticipantNotEntered => ErrorClass::NotFound,
            EntryError::RoomAlreadyActive => ErrorClass::Conflict,
            EntryError::UnauthorizedRole | EntryError::Unauthenticated(_) => {
                ErrorClass::Unauthorized
            }
            EntryError::ProviderUnavailable(_) => ErrorClass::Provider,
            EntryError::Database(_) | EntryError::Internal => ErrorClass::Internal,
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            EntryError::MeetingNotFound
            | EntryError::SessionNotFound(_)
            | EntryError::RoomIndexInvalid { .. }
            | EntryError::ParticipantNotEntered => 404,
            EntryError::RoomAlreadyActive => 409,
            EntryError::Unauthenticated(_) => 401,
            EntryError::UnauthorizedRole => 403,
            EntryError::ProviderUnavailable(_) => 503,
            EntryError::Database(_) | EntryError::Internal => 500,
        }
    }

    /// Whether a caller may reasonably retry the same request later.
    ///
    /// The core itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EntryError::SessionNotFound(_) | EntryError::ProviderUnavailable(_)
        )
    }

    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            EntryError::MeetingNotFound => "MEETING_NOT_FOUND",
            EntryError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            EntryError::RoomIndexInvalid { .. } => "ROOM_INDEX_INVALID",
            EntryError::ParticipantNotEntered => "PARTICIPANT_NOT_ENTERED",
            EntryError::RoomAlreadyActive => "ROOM_ALREADY_ACTIVE",
            EntryError::UnauthorizedRole => "UNAUTHORIZED_ROLE",
            EntryError::Unauthenticated(_) => "UNAUTHENTICATED",
            EntryError::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            EntryError::Database(_) => "DATABASE_ERROR",
            EntryError::Internal => "INTERNAL_ERROR",
        }
    }

    /// Client-safe message (no internal details).
    pub fn client_message(&self) -> String {
        match self {
            EntryError::MeetingNotFound => "Fan meeting not found".to_string(),
            EntryError::SessionNotFound(_) => {
                "The room has not been opened yet, please wait".to_string()
            }
            EntryError::RoomIndexInvalid { .. } => "Room assignment is invalid".to_string(),
            EntryError::ParticipantNotEntered => {
                "Participant has not entered this fan meeting".to_string()
            }
            EntryError::RoomAlreadyActive => "The room is already active".to_string(),
            EntryError::UnauthorizedRole => "Your role cannot perform this action".to_string(),
            EntryError::Unauthenticated(_) => "The access token is invalid or expired".to_string(),
            EntryError::ProviderUnavailable(_) => {
                "Media service temporarily unavailable, please retry".to_string()
            }
            EntryError::Database(_) | EntryError::Internal => {
                "An internal error occurred".to_string()
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for EntryError {
    fn into_response(self) -> Response {
        match &self {
            EntryError::Database(err) => {
                tracing::error!(target: "fm.errors", error = %err, "Database operation failed");
            }
            EntryError::ProviderUnavailable(reason) => {
                tracing::warn!(target: "fm.errors", reason = %reason, "Provider unavailable");
            }
            EntryError::RoomIndexInvalid { index } => {
                tracing::error!(target: "fm.errors", index = index, "Progress record points outside room list");
            }
            _ => {}
        }

        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.client_message(),
            },
        };

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer realm=\"fan-meeting\", error=\"invalid_token\"".parse()
            {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}
