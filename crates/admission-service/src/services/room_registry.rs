//! Room Registry.
//!
//! Records a meeting's ordered wait rooms and tele rooms. A room at a given
//! position is created at most once per meeting; concurrent callers asking
//! for the same position observe the same stored room.
//!
//! Only the organizer path creates rooms. Fans use the read-only lookups.

use crate::errors::EntryError;
use crate::models::{Meeting, ParticipantProgress, RoomKind, RoomRecord, TeleRoom, WaitRoom};
use crate::repositories::AdmissionRepository;
use common::types::RoomId;
use std::sync::Arc;
use tracing::instrument;

#[derive(Clone)]
pub struct RoomRegistry {
    repo: Arc<dyn AdmissionRepository>,
}

impl RoomRegistry {
    pub fn new(repo: Arc<dyn AdmissionRepository>) -> Self {
        Self { repo }
    }

    /// Wait room at `index` in an already loaded meeting.
    ///
    /// # Errors
    ///
    /// `RoomIndexInvalid` if the meeting has no room at that position.
    pub fn wait_room_at(meeting: &Meeting, index: u32) -> Result<&WaitRoom, EntryError> {
        meeting
            .wait_room(index)
            .ok_or(EntryError::RoomIndexInvalid { index })
    }

    /// Tele room at `index` in an already loaded meeting.
    pub fn tele_room_at(meeting: &Meeting, index: u32) -> Result<&TeleRoom, EntryError> {
        meeting
            .tele_room(index)
            .ok_or(EntryError::RoomIndexInvalid { index })
    }

    /// Make sure the meeting's first wait room (its main room) is recorded.
    ///
    /// Returns the stored room and whether this call recorded it.
    #[instrument(skip_all, fields(meeting_id = %meeting.meeting_id))]
    pub async fn ensure_first_wait_room(
        &self,
        meeting: &Meeting,
    ) -> Result<(WaitRoom, bool), EntryError> {
        if let Some(room) = meeting.wait_room(0) {
            return Ok((room.clone(), false));
        }

        let (record, inserted) = self
            .repo
            .insert_room_if_absent(meeting.meeting_id, RoomKind::Wait, 0, &meeting.main_room_id)
            .await?;

        Ok((record.into_wait_room(), inserted))
    }

    /// Wait room at `index`, recording it under `room_id` if absent.
    pub async fn get_or_create_wait_room(
        &self,
        meeting: &Meeting,
        index: u32,
        room_id: &RoomId,
    ) -> Result<WaitRoom, EntryError> {
        if let Some(room) = meeting.wait_room(index) {
            return Ok(room.clone());
        }
        let record = self
            .insert_at(meeting, RoomKind::Wait, meeting.wait_rooms.len(), index, room_id)
            .await?;
        Ok(record.into_wait_room())
    }

    /// Tele room at `index`, recording it under `room_id` if absent.
    pub async fn get_or_create_tele_room(
        &self,
        meeting: &Meeting,
        index: u32,
        room_id: &RoomId,
    ) -> Result<TeleRoom, EntryError> {
        if let Some(room) = meeting.tele_room(index) {
            return Ok(room.clone());
        }
        let record = self
            .insert_at(meeting, RoomKind::Tele, meeting.tele_rooms.len(), index, room_id)
            .await?;
        Ok(record.into_tele_room())
    }

    /// Participants whose recorded wait room is the one at `index`.
    ///
    /// # Errors
    ///
    /// `RoomIndexInvalid` if the meeting has no wait room at that position.
    #[instrument(skip_all, fields(meeting_id = %meeting.meeting_id, index = index))]
    pub async fn participants_in_wait_room(
        &self,
        meeting: &Meeting,
        index: u32,
    ) -> Result<Vec<ParticipantProgress>, EntryError> {
        Self::wait_room_at(meeting, index)?;
        Ok(self
            .repo
            .participants_in_room(meeting.meeting_id, RoomKind::Wait, index)
            .await?)
    }

    /// Participants whose next tele room is the one at `index`.
    #[instrument(skip_all, fields(meeting_id = %meeting.meeting_id, index = index))]
    pub async fn participants_in_tele_room(
        &self,
        meeting: &Meeting,
        index: u32,
    ) -> Result<Vec<ParticipantProgress>, EntryError> {
        Self::tele_room_at(meeting, index)?;
        Ok(self
            .repo
            .participants_in_room(meeting.meeting_id, RoomKind::Tele, index)
            .await?)
    }

    /// Append a wait room unless one with `room_id` is already recorded.
    pub async fn append_wait_room(
        &self,
        meeting: &Meeting,
        room_id: &RoomId,
    ) -> Result<WaitRoom, EntryError> {
        if let Some(room) = meeting.wait_rooms.iter().find(|r| &r.room_id == room_id) {
            return Ok(room.clone());
        }
        let index = next_position(meeting.wait_rooms.len())?;
        self.get_or_create_wait_room(meeting, index, room_id).await
    }

    /// Append a tele room unless one with `room_id` is already recorded.
    pub async fn append_tele_room(
        &self,
        meeting: &Meeting,
        room_id: &RoomId,
    ) -> Result<TeleRoom, EntryError> {
        if let Some(room) = meeting.tele_rooms.iter().find(|r| &r.room_id == room_id) {
            return Ok(room.clone());
        }
        let index = next_position(meeting.tele_rooms.len())?;
        self.get_or_create_tele_room(meeting, index, room_id).await
    }

    #[instrument(skip_all, fields(meeting_id = %meeting.meeting_id, kind = kind.as_str(), index = index))]
    async fn insert_at(
        &self,
        meeting: &Meeting,
        kind: RoomKind,
        current_len: usize,
        index: u32,
        room_id: &RoomId,
    ) -> Result<RoomRecord, EntryError> {
        // Rooms are dense: the only creatable position is the next one.
        if index != next_position(current_len)? {
            return Err(EntryError::RoomIndexInvalid { index });
        }

        let (record, inserted) = self
            .repo
            .insert_room_if_absent(meeting.meeting_id, kind, index, room_id)
            .await?;

        if inserted {
            tracing::info!(
                target: "fm.services.room_registry",
                room_id = %record.room_id,
                "Room recorded"
            );
        }

        Ok(record)
    }
}

fn next_position(len: usize) -> Result<u32, EntryError> {
    u32::try_from(len).map_err(|_| EntryError::Internal)
}
