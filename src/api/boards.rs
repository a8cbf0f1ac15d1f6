use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use super::access::{board_for_manager, board_for_reader, require_manager, require_reader};
use super::AppState;
use crate::auth::AuthUser;
use crate::error::GovernanceError;
use crate::governance::{Board, BoardMember, MemberStatus, NewBoard, NewBoardMember};

#[derive(Debug, Deserialize)]
pub struct MembersQuery {
    pub status: Option<MemberStatus>,
}

#[derive(Debug, Deserialize)]
pub struct MemberStatusRequest {
    pub status: MemberStatus,
}

#[derive(Debug, Deserialize)]
pub struct RenewTermRequest {
    pub term_end: Option<NaiveDate>,
}

pub async fn create_board(
    State(state): State<AppState>,
    user: AuthUser,
    Path(entity_id): Path<i64>,
    Json(request): Json<NewBoard>,
) -> Result<(StatusCode, Json<Board>), GovernanceError> {
    require_manager(&state, entity_id, &user).await?;
    let board = state
        .services
        .boards
        .create_board(
            entity_id,
            &request,
            state.config.governance.default_quorum_percent,
            &user.profile_id,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(board)))
}

pub async fn list_boards(
    State(state): State<AppState>,
    user: AuthUser,
    Path(entity_id): Path<i64>,
) -> Result<Json<Vec<Board>>, GovernanceError> {
    require_reader(&state, entity_id, &user).await?;
    Ok(Json(state.services.boards.list_boards(entity_id).await?))
}

pub async fn get_board(
    State(state): State<AppState>,
    user: AuthUser,
    Path(board_id): Path<i64>,
) -> Result<Json<Board>, GovernanceError> {
    Ok(Json(board_for_reader(&state, board_id, &user).await?))
}

pub async fn add_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path(board_id): Path<i64>,
    Json(request): Json<NewBoardMember>,
) -> Result<(StatusCode, Json<BoardMember>), GovernanceError> {
    board_for_manager(&state, board_id, &user).await?;
    let member = state
        .services
        .boards
        .add_member(board_id, &request, &user.profile_id)
        .await?;
    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn list_members(
    State(state): State<AppState>,
    user: AuthUser,
    Path(board_id): Path<i64>,
    Query(query): Query<MembersQuery>,
) -> Result<Json<Vec<BoardMember>>, GovernanceError> {
    board_for_reader(&state, board_id, &user).await?;
    Ok(Json(
        state
            .services
            .boards
            .list_members(board_id, query.status)
            .await?,
    ))
}

pub async fn update_member_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path((board_id, member_id)): Path<(i64, i64)>,
    Json(request): Json<MemberStatusRequest>,
) -> Result<Json<BoardMember>, GovernanceError> {
    board_for_manager(&state, board_id, &user).await?;
    ensure_member_on_board(&state, board_id, member_id).await?;
    let member = state
        .services
        .boards
        .update_member_status(member_id, request.status, &user.profile_id)
        .await?;
    Ok(Json(member))
}

pub async fn renew_member_term(
    State(state): State<AppState>,
    user: AuthUser,
    Path((board_id, member_id)): Path<(i64, i64)>,
    Json(request): Json<RenewTermRequest>,
) -> Result<Json<BoardMember>, GovernanceError> {
    board_for_manager(&state, board_id, &user).await?;
    ensure_member_on_board(&state, board_id, member_id).await?;
    let member = state
        .services
        .boards
        .renew_member_term(member_id, request.term_end, &user.profile_id)
        .await?;
    Ok(Json(member))
}

async fn ensure_member_on_board(
    state: &AppState,
    board_id: i64,
    member_id: i64,
) -> Result<(), GovernanceError> {
    let member = state.services.boards.get_member(member_id).await?;
    if member.board_id != board_id {
        return Err(GovernanceError::not_found(
            "Board member",
            format!("{} on board {}", member_id, board_id),
        ));
    }
    Ok(())
}
