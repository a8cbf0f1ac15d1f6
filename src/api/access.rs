//! Role checks shared by the handlers

use tracing::debug;

use super::AppState;
use crate::auth::AuthUser;
use crate::entities::EntityRole;
use crate::error::GovernanceError;
use crate::governance::{Board, BoardMeeting};

/// Any role on the entity.
pub async fn require_reader(
    state: &AppState,
    entity_id: i64,
    user: &AuthUser,
) -> Result<EntityRole, GovernanceError> {
    state
        .services
        .entities
        .require_role(entity_id, &user.profile_id, |_| true)
        .await
}

/// Admin or editor.
pub async fn require_manager(
    state: &AppState,
    entity_id: i64,
    user: &AuthUser,
) -> Result<EntityRole, GovernanceError> {
    state
        .services
        .entities
        .require_role(entity_id, &user.profile_id, |role| role.can_manage_governance())
        .await
}

pub async fn require_admin(
    state: &AppState,
    entity_id: i64,
    user: &AuthUser,
) -> Result<EntityRole, GovernanceError> {
    state
        .services
        .entities
        .require_role(entity_id, &user.profile_id, |role| role.can_manage_users())
        .await
}

pub async fn board_for_reader(
    state: &AppState,
    board_id: i64,
    user: &AuthUser,
) -> Result<Board, GovernanceError> {
    let board = state.services.boards.get_board(board_id).await?;
    require_reader(state, board.entity_id, user).await?;
    Ok(board)
}

pub async fn board_for_manager(
    state: &AppState,
    board_id: i64,
    user: &AuthUser,
) -> Result<Board, GovernanceError> {
    let board = state.services.boards.get_board(board_id).await?;
    require_manager(state, board.entity_id, user).await?;
    Ok(board)
}

pub async fn meeting_with_board(
    state: &AppState,
    meeting_id: i64,
) -> Result<(BoardMeeting, Board), GovernanceError> {
    let meeting = state.services.meetings.get_meeting(meeting_id).await?;
    let board = state.services.boards.get_board(meeting.board_id).await?;
    Ok((meeting, board))
}

/// Entity admin or editor, or the active chair or secretary of the board.
pub async fn require_minutes_keeper(
    state: &AppState,
    board: &Board,
    user: &AuthUser,
) -> Result<(), GovernanceError> {
    let role = state
        .services
        .entities
        .role_for(board.entity_id, &user.profile_id)
        .await?;
    if role.map_or(false, |r| r.can_manage_governance()) {
        return Ok(());
    }

    let seat = state
        .services
        .boards
        .member_for_profile(board.id, &user.profile_id)
        .await?;
    match seat {
        Some(member) if member.role.can_keep_minutes() => {
            debug!("Profile {} keeps minutes as {}", user.profile_id, member.role);
            Ok(())
        }
        _ => Err(GovernanceError::Forbidden(format!(
            "Profile {} may not keep minutes for board {}",
            user.profile_id, board.id
        ))),
    }
}

/// Entity admin or editor, or any active member of one of the entity's boards.
pub async fn require_approver(
    state: &AppState,
    entity_id: i64,
    user: &AuthUser,
) -> Result<(), GovernanceError> {
    let role = state
        .services
        .entities
        .role_for(entity_id, &user.profile_id)
        .await?;
    if role.map_or(false, |r| r.can_manage_governance()) {
        return Ok(());
    }

    for board in state.services.boards.list_boards(entity_id).await? {
        let seat = state
            .services
            .boards
            .member_for_profile(board.id, &user.profile_id)
            .await?;
        if seat.is_some() {
            return Ok(());
        }
    }

    Err(GovernanceError::Forbidden(format!(
        "Profile {} may not record approvals for entity {}",
        user.profile_id, entity_id
    )))
}
