use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;

use super::access::{board_for_manager, board_for_reader, meeting_with_board, require_manager, require_reader};
use super::AppState;
use crate::auth::AuthUser;
use crate::error::GovernanceError;
use crate::governance::{Attendance, BoardMeeting, MeetingStatus, NewMeeting, QuorumStatus};

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: MeetingStatus,
}

#[derive(Debug, Deserialize)]
pub struct AttendanceRequest {
    pub member_id: i64,
    pub present: bool,
}

pub async fn schedule_meeting(
    State(state): State<AppState>,
    user: AuthUser,
    Path(board_id): Path<i64>,
    Json(request): Json<NewMeeting>,
) -> Result<(StatusCode, Json<BoardMeeting>), GovernanceError> {
    board_for_manager(&state, board_id, &user).await?;
    let meeting = state
        .services
        .meetings
        .schedule_meeting(board_id, &request, &user.profile_id)
        .await?;
    Ok((StatusCode::CREATED, Json(meeting)))
}

pub async fn list_meetings(
    State(state): State<AppState>,
    user: AuthUser,
    Path(board_id): Path<i64>,
) -> Result<Json<Vec<BoardMeeting>>, GovernanceError> {
    board_for_reader(&state, board_id, &user).await?;
    Ok(Json(state.services.meetings.list_meetings(board_id).await?))
}

pub async fn get_meeting(
    State(state): State<AppState>,
    user: AuthUser,
    Path(meeting_id): Path<i64>,
) -> Result<Json<BoardMeeting>, GovernanceError> {
    let (meeting, board) = meeting_with_board(&state, meeting_id).await?;
    require_reader(&state, board.entity_id, &user).await?;
    Ok(Json(meeting))
}

pub async fn transition_meeting(
    State(state): State<AppState>,
    user: AuthUser,
    Path(meeting_id): Path<i64>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<BoardMeeting>, GovernanceError> {
    let (_, board) = meeting_with_board(&state, meeting_id).await?;
    require_manager(&state, board.entity_id, &user).await?;
    let meeting = state
        .services
        .meetings
        .transition_meeting(meeting_id, request.status, &user.profile_id)
        .await?;
    Ok(Json(meeting))
}

pub async fn record_attendance(
    State(state): State<AppState>,
    user: AuthUser,
    Path(meeting_id): Path<i64>,
    Json(request): Json<AttendanceRequest>,
) -> Result<Json<Attendance>, GovernanceError> {
    let (_, board) = meeting_with_board(&state, meeting_id).await?;
    require_manager(&state, board.entity_id, &user).await?;
    let attendance = state
        .services
        .meetings
        .record_attendance(meeting_id, request.member_id, request.present, &user.profile_id)
        .await?;
    Ok(Json(attendance))
}

pub async fn list_attendance(
    State(state): State<AppState>,
    user: AuthUser,
    Path(meeting_id): Path<i64>,
) -> Result<Json<Vec<Attendance>>, GovernanceError> {
    let (_, board) = meeting_with_board(&state, meeting_id).await?;
    require_reader(&state, board.entity_id, &user).await?;
    Ok(Json(state.services.meetings.list_attendance(meeting_id).await?))
}

pub async fn quorum(
    State(state): State<AppState>,
    user: AuthUser,
    Path(meeting_id): Path<i64>,
) -> Result<Json<QuorumStatus>, GovernanceError> {
    let (_, board) = meeting_with_board(&state, meeting_id).await?;
    require_reader(&state, board.entity_id, &user).await?;
    Ok(Json(
        state
            .services
            .meetings
            .check_meeting_quorum(meeting_id)
            .await?,
    ))
}
