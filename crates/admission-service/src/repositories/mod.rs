//! Repository layer for the admission service.
//!
//! The orchestrator only ever talks to [`AdmissionRepository`]. Two
//! implementations exist: [`PgRepository`] for production and
//! [`InMemoryRepository`] for tests and local runs.
//!
//! Every method is a suspension point and may fail; none retries internally.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PgRepository;

use crate::errors::EntryError;
use crate::models::{
    ApplyRecord, Meeting, ParticipantProgress, ProgressInsert, RoomKind, RoomRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{MeetingId, ParticipantId, RoomId};
use thiserror::Error;

/// Storage failure.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(String),

    /// A stored value could not be mapped back to a model.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        RepositoryError::Database(err.to_string())
    }
}

impl From<RepositoryError> for EntryError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Database(msg) => EntryError::Database(msg),
            RepositoryError::Corrupt(msg) => {
                tracing::error!(target: "fm.repo", error = %msg, "Stored record is corrupt");
                EntryError::Internal
            }
        }
    }
}

/// Meeting, room, progress and apply-record storage.
#[async_trait]
pub trait AdmissionRepository: Send + Sync {
    /// Load a meeting with its rooms ordered by position.
    async fn get_meeting(&self, meeting_id: MeetingId) -> Result<Option<Meeting>, RepositoryError>;

    /// Store a new meeting (rooms are not stored by this call).
    async fn insert_meeting(&self, meeting: &Meeting) -> Result<(), RepositoryError>;

    /// Insert a room unless one already occupies `position` or already
    /// carries `room_id` for this meeting and kind.
    ///
    /// Returns the stored room and whether this call inserted it.
    async fn insert_room_if_absent(
        &self,
        meeting_id: MeetingId,
        kind: RoomKind,
        position: u32,
        room_id: &RoomId,
    ) -> Result<(RoomRecord, bool), RepositoryError>;

    /// Set the first-wait-room-created flag. Idempotent.
    async fn mark_first_wait_room_created(
        &self,
        meeting_id: MeetingId,
    ) -> Result<(), RepositoryError>;

    async fn find_progress(
        &self,
        participant_id: ParticipantId,
        meeting_id: MeetingId,
    ) -> Result<Option<ParticipantProgress>, RepositoryError>;

    /// Atomically create a progress row with indices 0 unless one exists.
    async fn create_progress_if_absent(
        &self,
        participant_id: ParticipantId,
        meeting_id: MeetingId,
        connection_id: &str,
    ) -> Result<ProgressInsert, RepositoryError>;

    /// Overwrite the stored connection id. Returns false if no row exists.
    async fn record_connection(
        &self,
        participant_id: ParticipantId,
        meeting_id: MeetingId,
        connection_id: &str,
    ) -> Result<bool, RepositoryError>;

    /// Overwrite both room indices. Returns false if no row exists.
    async fn update_progress_indices(
        &self,
        participant_id: ParticipantId,
        meeting_id: MeetingId,
        next_wait_room_index: u32,
        next_tele_room_index: u32,
    ) -> Result<bool, RepositoryError>;

    async fn find_apply_record(
        &self,
        participant_id: ParticipantId,
        meeting_id: MeetingId,
    ) -> Result<Option<ApplyRecord>, RepositoryError>;

    async fn upsert_apply_record(&self, record: &ApplyRecord) -> Result<(), RepositoryError>;

    /// Store `record` unless the participant already applied to the meeting.
    ///
    /// Returns the stored record and whether it was inserted.
    async fn create_apply_record_if_absent(
        &self,
        record: &ApplyRecord,
    ) -> Result<(ApplyRecord, bool), RepositoryError>;

    /// Earliest meeting starting after `after` that the participant was
    /// approved for.
    async fn find_next_approved_meeting(
        &self,
        participant_id: ParticipantId,
        after: DateTime<Utc>,
    ) -> Result<Option<Meeting>, RepositoryError>;

    /// Progress rows whose next room of `kind` is at `index`, oldest first.
    async fn participants_in_room(
        &self,
        meeting_id: MeetingId,
        kind: RoomKind,
        index: u32,
    ) -> Result<Vec<ParticipantProgress>, RepositoryError>;

    /// Connectivity check for readiness reporting.
    async fn ping(&self) -> Result<(), RepositoryError>;
}
