use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;

use super::access::{require_approver, require_reader};
use super::AppState;
use crate::audit::ChainVerification;
use crate::auth::AuthUser;
use crate::error::GovernanceError;
use crate::governance::{ApprovalSignature, ApprovalSubject, GovernanceApproval, NewApproval};

#[derive(Debug, Deserialize)]
pub struct RecordApprovalRequest {
    pub subject_type: ApprovalSubject,
    pub subject_id: i64,
    pub payload: serde_json::Value,
    pub signature: Option<ApprovalSignature>,
}

pub async fn record_approval(
    State(state): State<AppState>,
    user: AuthUser,
    Path(entity_id): Path<i64>,
    Json(request): Json<RecordApprovalRequest>,
) -> Result<(StatusCode, Json<GovernanceApproval>), GovernanceError> {
    require_approver(&state, entity_id, &user).await?;

    let owner = subject_entity(&state, request.subject_type, request.subject_id).await?;
    if owner != entity_id {
        return Err(GovernanceError::not_found(
            request.subject_type.as_str(),
            format!("{} in entity {}", request.subject_id, entity_id),
        ));
    }

    let approval = state
        .services
        .approvals
        .record_approval(NewApproval {
            entity_id,
            subject_type: request.subject_type,
            subject_id: request.subject_id,
            actor_profile_id: user.profile_id,
            payload: request.payload,
            signature: request.signature,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(approval)))
}

pub async fn list_approvals(
    State(state): State<AppState>,
    user: AuthUser,
    Path(entity_id): Path<i64>,
) -> Result<Json<Vec<GovernanceApproval>>, GovernanceError> {
    require_reader(&state, entity_id, &user).await?;
    Ok(Json(state.services.approvals.list_approvals(entity_id).await?))
}

pub async fn verify_chain(
    State(state): State<AppState>,
    user: AuthUser,
    Path(entity_id): Path<i64>,
) -> Result<Json<ChainVerification>, GovernanceError> {
    require_reader(&state, entity_id, &user).await?;
    Ok(Json(state.services.approvals.verify_chain(entity_id).await?))
}

/// Entity that owns the approved subject
async fn subject_entity(
    state: &AppState,
    subject_type: ApprovalSubject,
    subject_id: i64,
) -> Result<i64, GovernanceError> {
    let services = &state.services;
    let board_id = match subject_type {
        ApprovalSubject::Board => subject_id,
        ApprovalSubject::Meeting => services.meetings.get_meeting(subject_id).await?.board_id,
        ApprovalSubject::Motion => {
            let motion = services.motions.get_motion(subject_id).await?;
            services.meetings.get_meeting(motion.meeting_id).await?.board_id
        }
        ApprovalSubject::Minutes => {
            return Ok(services.minutes.board_for_minutes(subject_id).await?.entity_id)
        }
    };
    Ok(services.boards.get_board(board_id).await?.entity_id)
}
