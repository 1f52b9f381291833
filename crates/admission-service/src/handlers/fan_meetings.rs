//! Fan meeting admission handlers.
//!
//! Every route sits behind `require_caller`, which puts the resolved
//! [`Caller`] into request extensions.

use crate::errors::EntryError;
use crate::models::{
    ApplyResponse, CanEnterResponse, Caller, EntryResult, MeetingSummary, Role,
};
use crate::routes::AppState;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use common::types::MeetingId;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// POST /api/v1/fan-meetings/:meeting_id/enter
///
/// Returns the entry result for the caller's role. The connection token
/// appears only in this response body.
#[instrument(skip_all, name = "fm.handlers.enter", fields(meeting_id = %meeting_id))]
pub async fn enter(
    State(state): State<Arc<AppState>>,
    Path(meeting_id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<EntryResult>, EntryError> {
    let result = state
        .admission
        .enter(MeetingId(meeting_id), caller.participant_id, caller.role)
        .await?;

    Ok(Json(result))
}

/// GET /api/v1/fan-meetings/:meeting_id/can-enter
///
/// Fans only.
#[instrument(skip_all, name = "fm.handlers.can_enter", fields(meeting_id = %meeting_id))]
pub async fn can_enter(
    State(state): State<Arc<AppState>>,
    Path(meeting_id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<CanEnterResponse>, EntryError> {
    require_fan(&caller)?;

    let can_enter = state
        .admission
        .can_enter(MeetingId(meeting_id), caller.participant_id)
        .await?;

    Ok(Json(CanEnterResponse { can_enter }))
}

/// POST /api/v1/fan-meetings/:meeting_id/apply
///
/// Fans only. A first application is approved on the spot.
#[instrument(skip_all, name = "fm.handlers.apply", fields(meeting_id = %meeting_id))]
pub async fn apply(
    State(state): State<Arc<AppState>>,
    Path(meeting_id): Path<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<ApplyResponse>, EntryError> {
    require_fan(&caller)?;

    let record = state
        .admission
        .apply(MeetingId(meeting_id), caller.participant_id)
        .await?;

    Ok(Json(record.into()))
}

/// GET /api/v1/me/fan-meetings/latest
///
/// Fans only. The caller's next approved meeting.
#[instrument(skip_all, name = "fm.handlers.next_meeting")]
pub async fn next_meeting(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<MeetingSummary>, EntryError> {
    require_fan(&caller)?;

    let meeting = state.admission.next_meeting(caller.participant_id).await?;

    Ok(Json(MeetingSummary::from(&meeting)))
}

fn require_fan(caller: &Caller) -> Result<(), EntryError> {
    if caller.role == Role::Fan {
        Ok(())
    } else {
        Err(EntryError::UnauthorizedRole)
    }
}
