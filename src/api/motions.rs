use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;

use super::access::{meeting_with_board, require_manager, require_reader};
use super::AppState;
use crate::auth::AuthUser;
use crate::error::GovernanceError;
use crate::governance::{Board, Motion, NewMotion, Vote, VoteChoice, VoteResult, VoteTally};

#[derive(Debug, Deserialize)]
pub struct CastVoteRequest {
    pub choice: VoteChoice,
}

async fn motion_with_board(
    state: &AppState,
    motion_id: i64,
) -> Result<(Motion, Board), GovernanceError> {
    let motion = state.services.motions.get_motion(motion_id).await?;
    let (_, board) = meeting_with_board(state, motion.meeting_id).await?;
    Ok((motion, board))
}

pub async fn create_motion(
    State(state): State<AppState>,
    user: AuthUser,
    Path(meeting_id): Path<i64>,
    Json(request): Json<NewMotion>,
) -> Result<(StatusCode, Json<Motion>), GovernanceError> {
    let (_, board) = meeting_with_board(&state, meeting_id).await?;
    require_manager(&state, board.entity_id, &user).await?;
    let motion = state
        .services
        .motions
        .create_motion(meeting_id, &request, &user.profile_id)
        .await?;
    Ok((StatusCode::CREATED, Json(motion)))
}

pub async fn list_motions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(meeting_id): Path<i64>,
) -> Result<Json<Vec<Motion>>, GovernanceError> {
    let (_, board) = meeting_with_board(&state, meeting_id).await?;
    require_reader(&state, board.entity_id, &user).await?;
    Ok(Json(state.services.motions.list_motions(meeting_id).await?))
}

pub async fn get_motion(
    State(state): State<AppState>,
    user: AuthUser,
    Path(motion_id): Path<i64>,
) -> Result<Json<Motion>, GovernanceError> {
    let (motion, board) = motion_with_board(&state, motion_id).await?;
    require_reader(&state, board.entity_id, &user).await?;
    Ok(Json(motion))
}

pub async fn open_voting(
    State(state): State<AppState>,
    user: AuthUser,
    Path(motion_id): Path<i64>,
) -> Result<Json<Motion>, GovernanceError> {
    let (_, board) = motion_with_board(&state, motion_id).await?;
    require_manager(&state, board.entity_id, &user).await?;
    Ok(Json(
        state
            .services
            .motions
            .open_voting(motion_id, &user.profile_id)
            .await?,
    ))
}

pub async fn close_voting(
    State(state): State<AppState>,
    user: AuthUser,
    Path(motion_id): Path<i64>,
) -> Result<Json<VoteResult>, GovernanceError> {
    let (_, board) = motion_with_board(&state, motion_id).await?;
    require_manager(&state, board.entity_id, &user).await?;
    Ok(Json(
        state
            .services
            .motions
            .close_voting(motion_id, &user.profile_id)
            .await?,
    ))
}

pub async fn table_motion(
    State(state): State<AppState>,
    user: AuthUser,
    Path(motion_id): Path<i64>,
) -> Result<Json<Motion>, GovernanceError> {
    let (_, board) = motion_with_board(&state, motion_id).await?;
    require_manager(&state, board.entity_id, &user).await?;
    Ok(Json(
        state
            .services
            .motions
            .table_motion(motion_id, &user.profile_id)
            .await?,
    ))
}

pub async fn resume_motion(
    State(state): State<AppState>,
    user: AuthUser,
    Path(motion_id): Path<i64>,
) -> Result<Json<Motion>, GovernanceError> {
    let (_, board) = motion_with_board(&state, motion_id).await?;
    require_manager(&state, board.entity_id, &user).await?;
    Ok(Json(
        state
            .services
            .motions
            .resume_motion(motion_id, &user.profile_id)
            .await?,
    ))
}

/// Votes are cast by the caller's own board seat; no entity role is needed.
pub async fn cast_vote(
    State(state): State<AppState>,
    user: AuthUser,
    Path(motion_id): Path<i64>,
    Json(request): Json<CastVoteRequest>,
) -> Result<Json<Vote>, GovernanceError> {
    let vote = state
        .services
        .motions
        .cast_vote_as(motion_id, &user.profile_id, request.choice)
        .await?;
    Ok(Json(vote))
}

pub async fn list_votes(
    State(state): State<AppState>,
    user: AuthUser,
    Path(motion_id): Path<i64>,
) -> Result<Json<Vec<Vote>>, GovernanceError> {
    let (_, board) = motion_with_board(&state, motion_id).await?;
    require_reader(&state, board.entity_id, &user).await?;
    Ok(Json(state.services.motions.list_votes(motion_id).await?))
}

pub async fn tally(
    State(state): State<AppState>,
    user: AuthUser,
    Path(motion_id): Path<i64>,
) -> Result<Json<VoteTally>, GovernanceError> {
    let (_, board) = motion_with_board(&state, motion_id).await?;
    require_reader(&state, board.entity_id, &user).await?;
    Ok(Json(state.services.motions.tally(motion_id).await?))
}
