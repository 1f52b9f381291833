//! In-process repository backed by `RwLock`-guarded maps.
//!
//! All mutations take the single write lock, so create-if-absent and
//! insert-if-absent are atomic with respect to each other.

use super::{AdmissionRepository, RepositoryError};
use crate::models::{
    ApplyRecord, ApplyStatus, Meeting, ParticipantProgress, ProgressInsert, RoomKind, RoomRecord,
    TeleRoom, WaitRoom,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{MeetingId, ParticipantId, RoomId};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::instrument;

#[derive(Default)]
struct Store {
    meetings: HashMap<MeetingId, Meeting>,
    progress: HashMap<(ParticipantId, MeetingId), ParticipantProgress>,
    applies: HashMap<(ParticipantId, MeetingId), ApplyRecord>,
}

/// Repository that keeps everything in memory.
#[derive(Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of progress rows stored for a meeting.
    pub async fn progress_count(&self, meeting_id: MeetingId) -> usize {
        let store = self.store.read().await;
        store
            .progress
            .keys()
            .filter(|(_, m)| *m == meeting_id)
            .count()
    }
}

fn room_record(meeting_id: MeetingId, kind: RoomKind, room_id: &RoomId, position: u32) -> RoomRecord {
    RoomRecord {
        meeting_id,
        kind,
        position,
        room_id: room_id.clone(),
    }
}

fn position_of(len: usize) -> Result<u32, RepositoryError> {
    u32::try_from(len).map_err(|_| RepositoryError::Corrupt("room list too long".to_string()))
}

#[async_trait]
impl AdmissionRepository for InMemoryRepository {
    async fn get_meeting(&self, meeting_id: MeetingId) -> Result<Option<Meeting>, RepositoryError> {
        Ok(self.store.read().await.meetings.get(&meeting_id).cloned())
    }

    #[instrument(skip_all, fields(meeting_id = %meeting.meeting_id))]
    async fn insert_meeting(&self, meeting: &Meeting) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;
        if store.meetings.contains_key(&meeting.meeting_id) {
            return Err(RepositoryError::Database(format!(
                "meeting {} already exists",
                meeting.meeting_id
            )));
        }
        store.meetings.insert(meeting.meeting_id, meeting.clone());
        Ok(())
    }

    #[instrument(skip_all, fields(meeting_id = %meeting_id, kind = kind.as_str(), position = position))]
    async fn insert_room_if_absent(
        &self,
        meeting_id: MeetingId,
        kind: RoomKind,
        position: u32,
        room_id: &RoomId,
    ) -> Result<(RoomRecord, bool), RepositoryError> {
        let mut store = self.store.write().await;
        let meeting = store
            .meetings
            .get_mut(&meeting_id)
            .ok_or_else(|| RepositoryError::Database(format!("meeting {meeting_id} not found")))?;

        // Rooms are kept dense and ordered, so position == list index.
        let existing: Vec<(RoomId, u32)> = match kind {
            RoomKind::Wait => meeting
                .wait_rooms
                .iter()
                .map(|r| (r.room_id.clone(), r.position))
                .collect(),
            RoomKind::Tele => meeting
                .tele_rooms
                .iter()
                .map(|r| (r.room_id.clone(), r.position))
                .collect(),
        };

        if let Some((id, pos)) = existing
            .iter()
            .find(|(id, pos)| *pos == position || id == room_id)
        {
            return Ok((room_record(meeting_id, kind, id, *pos), false));
        }

        if position != position_of(existing.len())? {
            return Err(RepositoryError::Database(format!(
                "room position {position} would leave a gap"
            )));
        }

        match kind {
            RoomKind::Wait => meeting.wait_rooms.push(WaitRoom {
                room_id: room_id.clone(),
                position,
            }),
            RoomKind::Tele => meeting.tele_rooms.push(TeleRoom {
                room_id: room_id.clone(),
                position,
            }),
        }

        tracing::debug!(target: "fm.repo.memory", room_id = %room_id, "Room inserted");
        Ok((room_record(meeting_id, kind, room_id, position), true))
    }

    async fn mark_first_wait_room_created(
        &self,
        meeting_id: MeetingId,
    ) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;
        let meeting = store
            .meetings
            .get_mut(&meeting_id)
            .ok_or_else(|| RepositoryError::Database(format!("meeting {meeting_id} not found")))?;
        meeting.first_wait_room_created = true;
        Ok(())
    }

    async fn find_progress(
        &self,
        participant_id: ParticipantId,
        meeting_id: MeetingId,
    ) -> Result<Option<ParticipantProgress>, RepositoryError> {
        Ok(self
            .store
            .read()
            .await
            .progress
            .get(&(participant_id, meeting_id))
            .cloned())
    }

    #[instrument(skip_all, fields(meeting_id = %meeting_id, participant_id = %participant_id))]
    async fn create_progress_if_absent(
        &self,
        participant_id: ParticipantId,
        meeting_id: MeetingId,
        connection_id: &str,
    ) -> Result<ProgressInsert, RepositoryError> {
        let mut store = self.store.write().await;
        if let Some(existing) = store.progress.get(&(participant_id, meeting_id)) {
            return Ok(ProgressInsert::Existing(existing.clone()));
        }

        let now = Utc::now();
        let progress = ParticipantProgress {
            participant_id,
            meeting_id,
            next_wait_room_index: 0,
            next_tele_room_index: 0,
            connection_id: Some(connection_id.to_string()),
            created_at: now,
            updated_at: now,
        };
        store
            .progress
            .insert((participant_id, meeting_id), progress.clone());

        tracing::debug!(target: "fm.repo.memory", "Progress row created");
        Ok(ProgressInsert::Created(progress))
    }

    async fn record_connection(
        &self,
        participant_id: ParticipantId,
        meeting_id: MeetingId,
        connection_id: &str,
    ) -> Result<bool, RepositoryError> {
        let mut store = self.store.write().await;
        match store.progress.get_mut(&(participant_id, meeting_id)) {
            Some(progress) => {
                progress.connection_id = Some(connection_id.to_string());
                progress.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_progress_indices(
        &self,
        participant_id: ParticipantId,
        meeting_id: MeetingId,
        next_wait_room_index: u32,
        next_tele_room_index: u32,
    ) -> Result<bool, RepositoryError> {
        let mut store = self.store.write().await;
        match store.progress.get_mut(&(participant_id, meeting_id)) {
            Some(progress) => {
                progress.next_wait_room_index = next_wait_room_index;
                progress.next_tele_room_index = next_tele_room_index;
                progress.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_apply_record(
        &self,
        participant_id: ParticipantId,
        meeting_id: MeetingId,
    ) -> Result<Option<ApplyRecord>, RepositoryError> {
        Ok(self
            .store
            .read()
            .await
            .applies
            .get(&(participant_id, meeting_id))
            .cloned())
    }

    async fn upsert_apply_record(&self, record: &ApplyRecord) -> Result<(), RepositoryError> {
        self.store
            .write()
            .await
            .applies
            .insert((record.participant_id, record.meeting_id), record.clone());
        Ok(())
    }

    async fn create_apply_record_if_absent(
        &self,
        record: &ApplyRecord,
    ) -> Result<(ApplyRecord, bool), RepositoryError> {
        let mut store = self.store.write().await;
        let key = (record.participant_id, record.meeting_id);
        if let Some(existing) = store.applies.get(&key) {
            return Ok((existing.clone(), false));
        }
        store.applies.insert(key, record.clone());
        Ok((record.clone(), true))
    }

    async fn find_next_approved_meeting(
        &self,
        participant_id: ParticipantId,
        after: DateTime<Utc>,
    ) -> Result<Option<Meeting>, RepositoryError> {
        let store = self.store.read().await;
        Ok(store
            .applies
            .values()
            .filter(|a| a.participant_id == participant_id && a.status == ApplyStatus::Approved)
            .filter_map(|a| store.meetings.get(&a.meeting_id))
            .filter(|m| m.start_time > after)
            .min_by_key(|m| (m.start_time, m.meeting_id))
            .cloned())
    }

    async fn participants_in_room(
        &self,
        meeting_id: MeetingId,
        kind: RoomKind,
        index: u32,
    ) -> Result<Vec<ParticipantProgress>, RepositoryError> {
        let store = self.store.read().await;
        let mut rows: Vec<ParticipantProgress> = store
            .progress
            .values()
            .filter(|p| p.meeting_id == meeting_id)
            .filter(|p| match kind {
                RoomKind::Wait => p.next_wait_room_index == index,
                RoomKind::Tele => p.next_tele_room_index == index,
            })
            .cloned()
            .collect();
        rows.sort_by_key(|p| (p.created_at, p.participant_id));
        Ok(rows)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    async fn seeded() -> (InMemoryRepository, MeetingId) {
        let repo = InMemoryRepository::new();
        let now = Utc::now();
        let meeting = Meeting::new(
            MeetingId::new(),
            "test",
            50,
            now,
            now,
            RoomId::new("main"),
        );
        let id = meeting.meeting_id;
        repo.insert_meeting(&meeting).await.unwrap();
        (repo, id)
    }

    #[tokio::test]
    async fn test_insert_room_if_absent_returns_existing_at_position() {
        let (repo, meeting_id) = seeded().await;

        let (first, inserted) = repo
            .insert_room_if_absent(meeting_id, RoomKind::Wait, 0, &RoomId::new("main"))
            .await
            .unwrap();
        assert!(inserted);

        let (second, inserted) = repo
            .insert_room_if_absent(meeting_id, RoomKind::Wait, 0, &RoomId::new("other"))
            .await
            .unwrap();
        assert!(!inserted);
        assert_eq!(first, second);

        let meeting = repo.get_meeting(meeting_id).await.unwrap().unwrap();
        assert_eq!(meeting.wait_rooms.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_room_if_absent_matches_by_room_id() {
        let (repo, meeting_id) = seeded().await;
        repo.insert_room_if_absent(meeting_id, RoomKind::Tele, 0, &RoomId::new("tele-x"))
            .await
            .unwrap();

        let (room, inserted) = repo
            .insert_room_if_absent(meeting_id, RoomKind::Tele, 1, &RoomId::new("tele-x"))
            .await
            .unwrap();
        assert!(!inserted);
        assert_eq!(room.position, 0);
    }

    #[tokio::test]
    async fn test_insert_room_rejects_gap() {
        let (repo, meeting_id) = seeded().await;
        let result = repo
            .insert_room_if_absent(meeting_id, RoomKind::Wait, 2, &RoomId::new("w2"))
            .await;
        assert!(matches!(result, Err(RepositoryError::Database(_))));
    }

    #[tokio::test]
    async fn test_create_progress_if_absent_is_once_per_key() {
        let (repo, meeting_id) = seeded().await;
        let participant = ParticipantId::new();

        let first = repo
            .create_progress_if_absent(participant, meeting_id, "con_1")
            .await
            .unwrap();
        assert!(matches!(first, ProgressInsert::Created(_)));

        let second = repo
            .create_progress_if_absent(participant, meeting_id, "con_2")
            .await
            .unwrap();
        assert!(matches!(
            second,
            ProgressInsert::Existing(ref p) if p.connection_id.as_deref() == Some("con_1")
        ));
        assert_eq!(repo.progress_count(meeting_id).await, 1);
    }

    #[tokio::test]
    async fn test_record_connection_without_row() {
        let (repo, meeting_id) = seeded().await;
        let updated = repo
            .record_connection(ParticipantId::new(), meeting_id, "con_1")
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn test_apply_record_upsert() {
        let (repo, meeting_id) = seeded().await;
        let participant = ParticipantId::new();
        let mut record = ApplyRecord {
            participant_id: participant,
            meeting_id,
            status: ApplyStatus::Pending,
        };
        repo.upsert_apply_record(&record).await.unwrap();
        record.status = ApplyStatus::Approved;
        repo.upsert_apply_record(&record).await.unwrap();

        let stored = repo
            .find_apply_record(participant, meeting_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ApplyStatus::Approved);
    }

    #[tokio::test]
    async fn test_create_apply_record_if_absent_keeps_first() {
        let (repo, meeting_id) = seeded().await;
        let participant = ParticipantId::new();
        let rejected = ApplyRecord {
            participant_id: participant,
            meeting_id,
            status: ApplyStatus::Rejected,
        };
        repo.upsert_apply_record(&rejected).await.unwrap();

        let (stored, inserted) = repo
            .create_apply_record_if_absent(&ApplyRecord {
                status: ApplyStatus::Approved,
                ..rejected.clone()
            })
            .await
            .unwrap();

        assert!(!inserted);
        assert_eq!(stored, rejected);
    }

    #[tokio::test]
    async fn test_find_next_approved_meeting() {
        let repo = InMemoryRepository::new();
        let fan = ParticipantId::new();
        let now = Utc::now();

        let mut ids = Vec::new();
        for (hours, status) in [
            (-1, ApplyStatus::Approved),
            (5, ApplyStatus::Approved),
            (2, ApplyStatus::Approved),
            (1, ApplyStatus::Pending),
        ] {
            let start = now + chrono::Duration::hours(hours);
            let meeting = Meeting::new(
                MeetingId::new(),
                "m",
                10,
                start,
                start + chrono::Duration::hours(1),
                RoomId::new("main"),
            );
            repo.insert_meeting(&meeting).await.unwrap();
            repo.upsert_apply_record(&ApplyRecord {
                participant_id: fan,
                meeting_id: meeting.meeting_id,
                status,
            })
            .await
            .unwrap();
            ids.push(meeting.meeting_id);
        }

        let next = repo
            .find_next_approved_meeting(fan, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Some(&next.meeting_id), ids.get(2));

        let none = repo
            .find_next_approved_meeting(ParticipantId::new(), now)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_participants_in_room_filters_by_index() {
        let (repo, meeting_id) = seeded().await;
        let a = ParticipantId::new();
        let b = ParticipantId::new();
        repo.create_progress_if_absent(a, meeting_id, "con_a")
            .await
            .unwrap();
        repo.create_progress_if_absent(b, meeting_id, "con_b")
            .await
            .unwrap();
        repo.update_progress_indices(b, meeting_id, 1, 0)
            .await
            .unwrap();

        let wait0 = repo
            .participants_in_room(meeting_id, RoomKind::Wait, 0)
            .await
            .unwrap();
        let wait1 = repo
            .participants_in_room(meeting_id, RoomKind::Wait, 1)
            .await
            .unwrap();
        let tele0 = repo
            .participants_in_room(meeting_id, RoomKind::Tele, 0)
            .await
            .unwrap();

        assert_eq!(wait0.iter().map(|p| p.participant_id).collect::<Vec<_>>(), [a]);
        assert_eq!(wait1.iter().map(|p| p.participant_id).collect::<Vec<_>>(), [b]);
        assert_eq!(tele0.len(), 2);
    }
}
