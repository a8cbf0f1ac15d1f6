//! Motion and vote ledger tests

mod common;

use civic_governance::audit::recent_events;
use civic_governance::governance::{
    BoardRole, MeetingStatus, MemberStatus, MotionStatus, NewBoardMember, NewMotion, VoteChoice,
};
use civic_governance::GovernanceError;
use common::*;

fn motion(title: &str) -> NewMotion {
    NewMotion {
        title: title.to_string(),
        description: String::new(),
        moved_by: None,
        seconded_by: None,
    }
}

#[tokio::test]
async fn test_motion_passes_with_quorum_and_majority() {
    let fx = board_fixture(5).await;
    let meeting = fx.meeting_in_session(&[0, 1, 2, 3]).await;

    let created = fx
        .services
        .motions
        .create_motion(
            meeting.id,
            &NewMotion {
                title: "Approve annual budget".to_string(),
                description: "FY budget as circulated".to_string(),
                moved_by: Some(fx.members[0].id),
                seconded_by: Some(fx.members[1].id),
            },
            ADMIN,
        )
        .await
        .unwrap();
    assert_eq!(created.status, MotionStatus::Pending);

    let opened = fx
        .services
        .motions
        .open_voting(created.id, ADMIN)
        .await
        .unwrap();
    assert_eq!(opened.status, MotionStatus::Voting);

    let motions = &fx.services.motions;
    motions.cast_vote_as(created.id, &member_profile(0), VoteChoice::Yes).await.unwrap();
    motions.cast_vote_as(created.id, &member_profile(1), VoteChoice::Yes).await.unwrap();
    motions.cast_vote_as(created.id, &member_profile(2), VoteChoice::No).await.unwrap();
    motions.cast_vote_as(created.id, &member_profile(3), VoteChoice::Abstain).await.unwrap();

    let result = motions.close_voting(created.id, ADMIN).await.unwrap();
    assert_eq!(result.motion.status, MotionStatus::Passed);
    assert_eq!(result.tally.yes, 2);
    assert_eq!(result.tally.no, 1);
    assert_eq!(result.tally.abstain, 1);
    assert_eq!(result.motion.yes_count, 2);
    assert!(result.motion.decided_at.is_some());
    assert!(result.quorum.met);
}

#[tokio::test]
async fn test_tie_fails() {
    let fx = board_fixture(4).await;
    let meeting = fx.meeting_in_session(&[0, 1, 2, 3]).await;
    let motions = &fx.services.motions;

    let m = motions.create_motion(meeting.id, &motion("Sell the van"), ADMIN).await.unwrap();
    motions.open_voting(m.id, ADMIN).await.unwrap();
    motions.cast_vote_as(m.id, &member_profile(0), VoteChoice::Yes).await.unwrap();
    motions.cast_vote_as(m.id, &member_profile(1), VoteChoice::No).await.unwrap();

    let result = motions.close_voting(m.id, ADMIN).await.unwrap();
    assert_eq!(result.motion.status, MotionStatus::Failed);
}

#[tokio::test]
async fn test_voting_requires_quorum() {
    let fx = board_fixture(5).await;
    let meeting = fx.meeting_in_session(&[0, 1]).await;
    let motions = &fx.services.motions;

    let m = motions.create_motion(meeting.id, &motion("Hire an auditor"), ADMIN).await.unwrap();
    let result = motions.open_voting(m.id, ADMIN).await;
    match result {
        Err(GovernanceError::QuorumNotMet { present, required }) => {
            assert_eq!(present, 2);
            assert_eq!(required, 3);
        }
        other => panic!("expected QuorumNotMet, got {:?}", other),
    }
    assert_eq!(motions.get_motion(m.id).await.unwrap().status, MotionStatus::Pending);
}

#[tokio::test]
async fn test_voting_requires_meeting_in_session() {
    let fx = board_fixture(3).await;
    let meeting = fx.schedule_meeting().await;
    let motions = &fx.services.motions;

    let m = motions.create_motion(meeting.id, &motion("Adopt bylaws"), ADMIN).await.unwrap();
    assert!(motions.open_voting(m.id, ADMIN).await.is_err());
}

#[tokio::test]
async fn test_repeat_vote_replaces_previous_choice() {
    let fx = board_fixture(3).await;
    let meeting = fx.meeting_in_session(&[0, 1, 2]).await;
    let motions = &fx.services.motions;

    let m = motions.create_motion(meeting.id, &motion("Move office"), ADMIN).await.unwrap();
    motions.open_voting(m.id, ADMIN).await.unwrap();
    motions.cast_vote_as(m.id, &member_profile(2), VoteChoice::No).await.unwrap();
    let vote = motions.cast_vote_as(m.id, &member_profile(2), VoteChoice::Yes).await.unwrap();
    assert_eq!(vote.choice, VoteChoice::Yes);

    let votes = motions.list_votes(m.id).await.unwrap();
    assert_eq!(votes.len(), 1);
    let tally = motions.tally(m.id).await.unwrap();
    assert_eq!(tally.yes, 1);
    assert_eq!(tally.no, 0);
}

#[tokio::test]
async fn test_only_seated_current_members_vote() {
    let fx = board_fixture(3).await;
    let lapsed = fx
        .services
        .boards
        .add_member(
            fx.board.id,
            &NewBoardMember {
                profile_id: Some("lapsed".to_string()),
                name: "Lapsed Director".to_string(),
                role: BoardRole::Director,
                term_start: days_ago(400),
                term_end: Some(days_ago(1)),
            },
            ADMIN,
        )
        .await
        .unwrap();
    let meeting = fx.meeting_in_session(&[0, 1, 2]).await;
    let motions = &fx.services.motions;

    let m = motions.create_motion(meeting.id, &motion("Renew lease"), ADMIN).await.unwrap();
    motions.open_voting(m.id, ADMIN).await.unwrap();

    let outsider = motions.cast_vote_as(m.id, "not-on-board", VoteChoice::Yes).await;
    assert!(matches!(outsider, Err(GovernanceError::Forbidden(_))));

    let lapsed_vote = motions.cast_vote(m.id, lapsed.id, VoteChoice::Yes, ADMIN).await;
    assert!(matches!(lapsed_vote, Err(GovernanceError::Forbidden(_))));

    fx.services
        .boards
        .update_member_status(fx.members[2].id, MemberStatus::Resigned, ADMIN)
        .await
        .unwrap();
    let resigned = motions.cast_vote_as(m.id, &member_profile(2), VoteChoice::Yes).await;
    assert!(matches!(resigned, Err(GovernanceError::Forbidden(_))));
}

#[tokio::test]
async fn test_no_votes_before_open_or_after_close() {
    let fx = board_fixture(3).await;
    let meeting = fx.meeting_in_session(&[0, 1, 2]).await;
    let motions = &fx.services.motions;

    let m = motions.create_motion(meeting.id, &motion("Buy a printer"), ADMIN).await.unwrap();
    let early = motions.cast_vote_as(m.id, &member_profile(0), VoteChoice::Yes).await;
    assert!(matches!(early, Err(GovernanceError::Conflict(_))));

    motions.open_voting(m.id, ADMIN).await.unwrap();
    motions.cast_vote_as(m.id, &member_profile(0), VoteChoice::Yes).await.unwrap();
    motions.close_voting(m.id, ADMIN).await.unwrap();

    let late = motions.cast_vote_as(m.id, &member_profile(1), VoteChoice::No).await;
    assert!(matches!(late, Err(GovernanceError::Conflict(_))));

    let again = motions.close_voting(m.id, ADMIN).await;
    assert!(matches!(again, Err(GovernanceError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_adjourn_blocked_while_voting() {
    let fx = board_fixture(3).await;
    let meeting = fx.meeting_in_session(&[0, 1, 2]).await;
    let motions = &fx.services.motions;

    let m = motions.create_motion(meeting.id, &motion("Change bank"), ADMIN).await.unwrap();
    motions.open_voting(m.id, ADMIN).await.unwrap();

    let blocked = fx
        .services
        .meetings
        .transition_meeting(meeting.id, MeetingStatus::Adjourned, ADMIN)
        .await;
    assert!(blocked.is_err());

    motions.close_voting(m.id, ADMIN).await.unwrap();
    fx.services
        .meetings
        .transition_meeting(meeting.id, MeetingStatus::Adjourned, ADMIN)
        .await
        .unwrap();

    let after = motions.create_motion(meeting.id, &motion("Too late"), ADMIN).await;
    assert!(matches!(after, Err(GovernanceError::Conflict(_))));
}

#[tokio::test]
async fn test_table_and_resume() {
    let fx = board_fixture(3).await;
    let meeting = fx.meeting_in_session(&[0, 1, 2]).await;
    let motions = &fx.services.motions;

    let m = motions.create_motion(meeting.id, &motion("Rename the org"), ADMIN).await.unwrap();
    motions.open_voting(m.id, ADMIN).await.unwrap();
    motions.cast_vote_as(m.id, &member_profile(0), VoteChoice::Yes).await.unwrap();

    let tabled = motions.table_motion(m.id, ADMIN).await.unwrap();
    assert_eq!(tabled.status, MotionStatus::Tabled);
    assert!(motions.cast_vote_as(m.id, &member_profile(1), VoteChoice::Yes).await.is_err());
    assert!(motions.open_voting(m.id, ADMIN).await.is_err());

    let resumed = motions.resume_motion(m.id, ADMIN).await.unwrap();
    assert_eq!(resumed.status, MotionStatus::Pending);
    motions.open_voting(m.id, ADMIN).await.unwrap();
}

#[tokio::test]
async fn test_reopened_motion_discards_earlier_ballots() {
    let fx = board_fixture(3).await;
    let meeting = fx.meeting_in_session(&[0, 1, 2]).await;
    let motions = &fx.services.motions;

    let m = motions.create_motion(meeting.id, &motion("Merge committees"), ADMIN).await.unwrap();
    motions.open_voting(m.id, ADMIN).await.unwrap();
    motions.cast_vote_as(m.id, &member_profile(0), VoteChoice::Yes).await.unwrap();

    motions.table_motion(m.id, ADMIN).await.unwrap();
    motions.resume_motion(m.id, ADMIN).await.unwrap();
    motions.open_voting(m.id, ADMIN).await.unwrap();
    assert!(motions.list_votes(m.id).await.unwrap().is_empty());

    let result = motions.close_voting(m.id, ADMIN).await.unwrap();
    assert_eq!(result.tally.yes, 0);
    assert_eq!(result.tally.no, 0);
    assert_eq!(result.motion.status, MotionStatus::Failed);
}

#[tokio::test]
async fn test_motion_fails_when_quorum_lost_before_close() {
    let fx = board_fixture(5).await;
    let meeting = fx.meeting_in_session(&[0, 1, 2, 3]).await;
    let motions = &fx.services.motions;

    let m = motions.create_motion(meeting.id, &motion("Extend hours"), ADMIN).await.unwrap();
    motions.open_voting(m.id, ADMIN).await.unwrap();
    motions.cast_vote_as(m.id, &member_profile(0), VoteChoice::Yes).await.unwrap();
    motions.cast_vote_as(m.id, &member_profile(1), VoteChoice::Yes).await.unwrap();

    for i in [2, 3] {
        fx.services
            .meetings
            .record_attendance(meeting.id, fx.members[i].id, false, ADMIN)
            .await
            .unwrap();
    }

    let result = motions.close_voting(m.id, ADMIN).await.unwrap();
    assert!(!result.quorum.met);
    assert_eq!(result.tally.yes, 2);
    assert_eq!(result.tally.no, 0);
    assert_eq!(result.motion.status, MotionStatus::Failed);
}

#[tokio::test]
async fn test_member_resigning_mid_session_cannot_vote() {
    let fx = board_fixture(3).await;
    let meeting = fx.meeting_in_session(&[0, 1, 2]).await;
    let motions = &fx.services.motions;

    let m = motions.create_motion(meeting.id, &motion("Close the branch"), ADMIN).await.unwrap();
    motions.open_voting(m.id, ADMIN).await.unwrap();
    motions.cast_vote_as(m.id, &member_profile(0), VoteChoice::Yes).await.unwrap();

    fx.services
        .boards
        .update_member_status(fx.members[1].id, MemberStatus::Resigned, ADMIN)
        .await
        .unwrap();

    let refused = motions.cast_vote(m.id, fx.members[1].id, VoteChoice::No, ADMIN).await;
    assert!(matches!(refused, Err(GovernanceError::Forbidden(_))));
    assert_eq!(motions.list_votes(m.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_rejected_vote_leaves_no_event() {
    let fx = board_fixture(3).await;
    let meeting = fx.meeting_in_session(&[0, 1, 2]).await;
    let motions = &fx.services.motions;

    let m = motions.create_motion(meeting.id, &motion("Buy a freezer"), ADMIN).await.unwrap();
    motions.open_voting(m.id, ADMIN).await.unwrap();
    motions.cast_vote_as(m.id, &member_profile(0), VoteChoice::Yes).await.unwrap();
    motions.close_voting(m.id, ADMIN).await.unwrap();
    assert!(motions.cast_vote_as(m.id, &member_profile(1), VoteChoice::No).await.is_err());

    let events = recent_events(fx.db.pool(), fx.entity.id, 100).await.unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(kinds[0], "voting_closed");
    assert_eq!(kinds.iter().filter(|k| **k == "vote_cast").count(), 1);
    assert!(kinds.contains(&"voting_opened"));
    assert!(kinds.contains(&"motion_created"));
}

#[tokio::test]
async fn test_mover_cannot_second() {
    let fx = board_fixture(3).await;
    let meeting = fx.meeting_in_session(&[0, 1, 2]).await;

    let result = fx
        .services
        .motions
        .create_motion(
            meeting.id,
            &NewMotion {
                title: "Self-seconded".to_string(),
                description: String::new(),
                moved_by: Some(fx.members[0].id),
                seconded_by: Some(fx.members[0].id),
            },
            ADMIN,
        )
        .await;
    assert!(matches!(result, Err(GovernanceError::ValidationError(_))));
}
