#![allow(dead_code)]

use chrono::{Duration, NaiveDate, Utc};
use civic_governance::config::AppConfig;
use civic_governance::database::Database;
use civic_governance::entities::{Entity, EntityKind, NewEntity};
use civic_governance::governance::{
    Board, BoardMeeting, BoardMember, BoardRole, GovernanceServices, MeetingStatus, NewBoard,
    NewBoardMember, NewMeeting,
};

pub const ADMIN: &str = "admin-profile";

/// Setup an in-memory SQLite database for testing
pub async fn setup_test_db() -> Database {
    Database::new_in_memory()
        .await
        .expect("Failed to create test database")
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn days_ago(days: i64) -> NaiveDate {
    today() - Duration::days(days)
}

pub fn member_profile(index: usize) -> String {
    format!("member-{}", index)
}

/// Services, a nonprofit owned by `ADMIN`, and one board with its roster
pub struct BoardFixture {
    pub db: Database,
    pub config: AppConfig,
    pub services: GovernanceServices,
    pub entity: Entity,
    pub board: Board,
    pub members: Vec<BoardMember>,
}

/// Member 0 chairs, member 1 is secretary, the rest are directors. Member
/// `i` is bound to profile `member-i`.
pub async fn board_fixture(member_count: usize) -> BoardFixture {
    board_fixture_with_config(member_count, AppConfig::for_testing()).await
}

pub async fn board_fixture_with_config(member_count: usize, config: AppConfig) -> BoardFixture {
    let db = setup_test_db().await;
    let services = GovernanceServices::new(&db, &config);

    let entity = services
        .entities
        .create_entity(
            &NewEntity {
                kind: EntityKind::Nonprofit,
                name: "Riverside Food Bank".to_string(),
                slug: None,
            },
            ADMIN,
        )
        .await
        .expect("Failed to create entity");

    let board = services
        .boards
        .create_board(
            entity.id,
            &NewBoard {
                name: "Board of Directors".to_string(),
                quorum_percent: None,
            },
            config.governance.default_quorum_percent,
            ADMIN,
        )
        .await
        .expect("Failed to create board");

    let mut members = Vec::new();
    for i in 0..member_count {
        let role = match i {
            0 => BoardRole::Chair,
            1 => BoardRole::Secretary,
            _ => BoardRole::Director,
        };
        let member = services
            .boards
            .add_member(
                board.id,
                &NewBoardMember {
                    profile_id: Some(member_profile(i)),
                    name: format!("Member {}", i),
                    role,
                    term_start: days_ago(365),
                    term_end: None,
                },
                ADMIN,
            )
            .await
            .expect("Failed to add member");
        members.push(member);
    }

    BoardFixture {
        db,
        config,
        services,
        entity,
        board,
        members,
    }
}

impl BoardFixture {
    pub async fn schedule_meeting(&self) -> BoardMeeting {
        self.services
            .meetings
            .schedule_meeting(
                self.board.id,
                &NewMeeting {
                    title: "Regular meeting".to_string(),
                    scheduled_for: Utc::now(),
                    location: Some("Community hall".to_string()),
                },
                ADMIN,
            )
            .await
            .expect("Failed to schedule meeting")
    }

    /// A meeting in session with the listed members marked present
    pub async fn meeting_in_session(&self, present: &[usize]) -> BoardMeeting {
        let meeting = self.schedule_meeting().await;
        for &i in present {
            self.services
                .meetings
                .record_attendance(meeting.id, self.members[i].id, true, ADMIN)
                .await
                .expect("Failed to record attendance");
        }
        self.services
            .meetings
            .transition_meeting(meeting.id, MeetingStatus::InSession, ADMIN)
            .await
            .expect("Failed to start meeting")
    }
}
