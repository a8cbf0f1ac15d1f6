use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;

use super::access::{meeting_with_board, require_minutes_keeper, require_reader};
use super::AppState;
use crate::auth::AuthUser;
use crate::error::GovernanceError;
use crate::governance::{ApprovalSignature, FinalizedMinutes, MeetingMinutes};

#[derive(Debug, Deserialize)]
pub struct DraftRequest {
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct FinalizeRequest {
    pub signature: Option<ApprovalSignature>,
}

#[derive(Debug, Deserialize)]
pub struct AmendRequest {
    pub content: String,
    pub reason: String,
}

pub async fn create_draft(
    State(state): State<AppState>,
    user: AuthUser,
    Path(meeting_id): Path<i64>,
    Json(request): Json<DraftRequest>,
) -> Result<(StatusCode, Json<MeetingMinutes>), GovernanceError> {
    let (_, board) = meeting_with_board(&state, meeting_id).await?;
    require_minutes_keeper(&state, &board, &user).await?;
    let minutes = state
        .services
        .minutes
        .create_draft(meeting_id, &request.content, &user.profile_id)
        .await?;
    Ok((StatusCode::CREATED, Json(minutes)))
}

pub async fn list_minutes(
    State(state): State<AppState>,
    user: AuthUser,
    Path(meeting_id): Path<i64>,
) -> Result<Json<Vec<MeetingMinutes>>, GovernanceError> {
    let (_, board) = meeting_with_board(&state, meeting_id).await?;
    require_reader(&state, board.entity_id, &user).await?;
    Ok(Json(state.services.minutes.list_minutes(meeting_id).await?))
}

pub async fn get_minutes(
    State(state): State<AppState>,
    user: AuthUser,
    Path(minutes_id): Path<i64>,
) -> Result<Json<MeetingMinutes>, GovernanceError> {
    let board = state.services.minutes.board_for_minutes(minutes_id).await?;
    require_reader(&state, board.entity_id, &user).await?;
    Ok(Json(state.services.minutes.get_minutes(minutes_id).await?))
}

pub async fn update_draft(
    State(state): State<AppState>,
    user: AuthUser,
    Path(minutes_id): Path<i64>,
    Json(request): Json<DraftRequest>,
) -> Result<Json<MeetingMinutes>, GovernanceError> {
    let board = state.services.minutes.board_for_minutes(minutes_id).await?;
    require_minutes_keeper(&state, &board, &user).await?;
    Ok(Json(
        state
            .services
            .minutes
            .update_draft(minutes_id, &request.content, &user.profile_id)
            .await?,
    ))
}

pub async fn finalize(
    State(state): State<AppState>,
    user: AuthUser,
    Path(minutes_id): Path<i64>,
    body: Bytes,
) -> Result<Json<FinalizedMinutes>, GovernanceError> {
    // Only an empty body means "unsigned"; anything else must parse.
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        FinalizeRequest::default()
    } else {
        serde_json::from_slice::<FinalizeRequest>(&body)?
    };
    let board = state.services.minutes.board_for_minutes(minutes_id).await?;
    require_minutes_keeper(&state, &board, &user).await?;
    Ok(Json(
        state
            .services
            .minutes
            .finalize(minutes_id, &user.profile_id, request.signature)
            .await?,
    ))
}

pub async fn amend(
    State(state): State<AppState>,
    user: AuthUser,
    Path(minutes_id): Path<i64>,
    Json(request): Json<AmendRequest>,
) -> Result<(StatusCode, Json<MeetingMinutes>), GovernanceError> {
    let board = state.services.minutes.board_for_minutes(minutes_id).await?;
    require_minutes_keeper(&state, &board, &user).await?;
    let amendment = state
        .services
        .minutes
        .amend(minutes_id, &request.content, &request.reason, &user.profile_id)
        .await?;
    Ok((StatusCode::CREATED, Json(amendment)))
}
