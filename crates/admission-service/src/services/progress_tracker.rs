//! Participant Progress Tracker.
//!
//! One record per (participant, meeting). Its presence is the only signal
//! separating a first entry from a reconnection. The tracker never advances
//! indices on its own.

use crate::errors::EntryError;
use crate::models::{ParticipantProgress, ProgressInsert};
use crate::repositories::AdmissionRepository;
use common::types::{MeetingId, ParticipantId};
use std::sync::Arc;
use tracing::instrument;

#[derive(Clone)]
pub struct ProgressTracker {
    repo: Arc<dyn AdmissionRepository>,
}

impl ProgressTracker {
    pub fn new(repo: Arc<dyn AdmissionRepository>) -> Self {
        Self { repo }
    }

    pub async fn find(
        &self,
        participant_id: ParticipantId,
        meeting_id: MeetingId,
    ) -> Result<Option<ParticipantProgress>, EntryError> {
        Ok(self.repo.find_progress(participant_id, meeting_id).await?)
    }

    /// Create the initial record (indices 0) carrying the first connection id.
    ///
    /// Called only after the connection was issued. If another process won
    /// the race the stored record is returned as `Existing`.
    #[instrument(skip_all, fields(meeting_id = %meeting_id, participant_id = %participant_id))]
    pub async fn create_initial(
        &self,
        participant_id: ParticipantId,
        meeting_id: MeetingId,
        connection_id: &str,
    ) -> Result<ProgressInsert, EntryError> {
        let outcome = self
            .repo
            .create_progress_if_absent(participant_id, meeting_id, connection_id)
            .await?;

        if matches!(outcome, ProgressInsert::Existing(_)) {
            tracing::info!(
                target: "fm.services.progress_tracker",
                "Progress already recorded by a concurrent entry"
            );
        }

        Ok(outcome)
    }

    /// Overwrite the stored connection id.
    ///
    /// # Errors
    ///
    /// `ParticipantNotEntered` if no record exists.
    pub async fn record_connection(
        &self,
        progress: &ParticipantProgress,
        connection_id: &str,
    ) -> Result<(), EntryError> {
        let updated = self
            .repo
            .record_connection(progress.participant_id, progress.meeting_id, connection_id)
            .await?;

        if updated {
            Ok(())
        } else {
            Err(EntryError::ParticipantNotEntered)
        }
    }

    /// Move a participant to new room indices.
    pub async fn set_position(
        &self,
        progress: &ParticipantProgress,
        next_wait_room_index: u32,
        next_tele_room_index: u32,
    ) -> Result<(), EntryError> {
        let updated = self
            .repo
            .update_progress_indices(
                progress.participant_id,
                progress.meeting_id,
                next_wait_room_index,
                next_tele_room_index,
            )
            .await?;

        if updated {
            Ok(())
        } else {
            Err(EntryError::ParticipantNotEntered)
        }
    }
}
