//! Governance Types and Transition Tables
//!
//! Every status enum owns its transition table; the services only ever
//! move a row along an edge that `can_transition_to` accepts.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Implements `as_str`, `FromStr` and `Display` over the snake_case names
/// stored in the database.
macro_rules! string_enum {
    ($name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!("Invalid {}: {}", $label, s)),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Officer role held by a board member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardRole {
    Chair,
    ViceChair,
    Secretary,
    Treasurer,
    Director,
}

string_enum!(BoardRole, "board role", {
    Chair => "chair",
    ViceChair => "vice_chair",
    Secretary => "secretary",
    Treasurer => "treasurer",
    Director => "director",
});

impl BoardRole {
    /// Officer seats are held by at most one active member at a time.
    pub fn is_single_seat(&self) -> bool {
        !matches!(self, BoardRole::Director)
    }

    pub fn can_keep_minutes(&self) -> bool {
        matches!(self, BoardRole::Chair | BoardRole::Secretary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Active,
    Expired,
    Resigned,
    Removed,
}

string_enum!(MemberStatus, "member status", {
    Active => "active",
    Expired => "expired",
    Resigned => "resigned",
    Removed => "removed",
});

impl MemberStatus {
    pub fn can_transition_to(&self, next: MemberStatus) -> bool {
        use MemberStatus::*;
        matches!(
            (self, next),
            (Active, Expired) | (Active, Resigned) | (Active, Removed) | (Expired, Active)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Scheduled,
    InSession,
    Adjourned,
    Cancelled,
}

string_enum!(MeetingStatus, "meeting status", {
    Scheduled => "scheduled",
    InSession => "in_session",
    Adjourned => "adjourned",
    Cancelled => "cancelled",
});

impl MeetingStatus {
    pub fn can_transition_to(&self, next: MeetingStatus) -> bool {
        use MeetingStatus::*;
        matches!(
            (self, next),
            (Scheduled, InSession) | (Scheduled, Cancelled) | (InSession, Adjourned)
        )
    }

    /// Adjourned and cancelled meetings accept no further business.
    pub fn is_closed(&self) -> bool {
        matches!(self, MeetingStatus::Adjourned | MeetingStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionStatus {
    Pending,
    Voting,
    Passed,
    Failed,
    Tabled,
}

string_enum!(MotionStatus, "motion status", {
    Pending => "pending",
    Voting => "voting",
    Passed => "passed",
    Failed => "failed",
    Tabled => "tabled",
});

impl MotionStatus {
    pub fn can_transition_to(&self, next: MotionStatus) -> bool {
        use MotionStatus::*;
        matches!(
            (self, next),
            (Pending, Voting)
                | (Pending, Tabled)
                | (Voting, Passed)
                | (Voting, Failed)
                | (Voting, Tabled)
                | (Tabled, Pending)
        )
    }

    pub fn is_decided(&self) -> bool {
        matches!(self, MotionStatus::Passed | MotionStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    Yes,
    No,
    Abstain,
}

string_enum!(VoteChoice, "vote choice", {
    Yes => "yes",
    No => "no",
    Abstain => "abstain",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinutesStatus {
    Draft,
    Finalized,
    Amended,
}

string_enum!(MinutesStatus, "minutes status", {
    Draft => "draft",
    Finalized => "finalized",
    Amended => "amended",
});

impl MinutesStatus {
    pub fn can_transition_to(&self, next: MinutesStatus) -> bool {
        use MinutesStatus::*;
        matches!((self, next), (Draft, Finalized) | (Finalized, Amended))
    }

    pub fn is_editable(&self) -> bool {
        matches!(self, MinutesStatus::Draft)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub id: i64,
    pub entity_id: i64,
    pub name: String,
    pub quorum_percent: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardMember {
    pub id: i64,
    pub board_id: i64,
    pub profile_id: Option<String>,
    pub name: String,
    pub role: BoardRole,
    pub status: MemberStatus,
    pub term_start: NaiveDate,
    pub term_end: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl BoardMember {
    /// Active with `term_start <= on <= term_end` (open-ended terms never lapse).
    pub fn is_eligible_on(&self, on: NaiveDate) -> bool {
        self.status == MemberStatus::Active
            && crate::governance::quorum::is_term_current(self.term_start, self.term_end, on)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardMeeting {
    pub id: i64,
    pub board_id: i64,
    pub title: String,
    pub scheduled_for: DateTime<Utc>,
    pub location: Option<String>,
    pub status: MeetingStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attendance {
    pub meeting_id: i64,
    pub member_id: i64,
    pub present: bool,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Motion {
    pub id: i64,
    pub meeting_id: i64,
    pub title: String,
    pub description: String,
    pub moved_by: Option<i64>,
    pub seconded_by: Option<i64>,
    pub status: MotionStatus,
    pub yes_count: i64,
    pub no_count: i64,
    pub abstain_count: i64,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: i64,
    pub motion_id: i64,
    pub member_id: i64,
    pub choice: VoteChoice,
    pub cast_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub yes: i64,
    pub no: i64,
    pub abstain: i64,
}

impl VoteTally {
    pub fn total(&self) -> i64 {
        self.yes + self.no + self.abstain
    }

    /// Simple majority of votes cast; abstentions count toward neither side.
    pub fn carries(&self) -> bool {
        self.yes > self.no
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingMinutes {
    pub id: i64,
    pub meeting_id: i64,
    pub version: i64,
    pub content: String,
    pub status: MinutesStatus,
    pub amends_id: Option<i64>,
    pub amendment_reason: Option<String>,
    pub content_hash: Option<String>,
    pub finalized_by: Option<String>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBoard {
    pub name: String,
    pub quorum_percent: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBoardMember {
    pub profile_id: Option<String>,
    pub name: String,
    pub role: BoardRole,
    pub term_start: NaiveDate,
    pub term_end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMeeting {
    pub title: String,
    pub scheduled_for: DateTime<Utc>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMotion {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub moved_by: Option<i64>,
    pub seconded_by: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meeting_transitions() {
        use MeetingStatus::*;
        assert!(Scheduled.can_transition_to(InSession));
        assert!(Scheduled.can_transition_to(Cancelled));
        assert!(InSession.can_transition_to(Adjourned));
        assert!(!InSession.can_transition_to(Cancelled));
        assert!(!Adjourned.can_transition_to(InSession));
        assert!(!Cancelled.can_transition_to(Scheduled));
        assert!(Adjourned.is_closed() && Cancelled.is_closed());
    }

    #[test]
    fn test_motion_transitions() {
        use MotionStatus::*;
        assert!(Pending.can_transition_to(Voting));
        assert!(Voting.can_transition_to(Passed));
        assert!(Voting.can_transition_to(Failed));
        assert!(Tabled.can_transition_to(Pending));
        assert!(!Passed.can_transition_to(Voting));
        assert!(!Pending.can_transition_to(Passed));
        assert!(!Tabled.can_transition_to(Voting));
    }

    #[test]
    fn test_minutes_transitions() {
        use MinutesStatus::*;
        assert!(Draft.can_transition_to(Finalized));
        assert!(Finalized.can_transition_to(Amended));
        assert!(!Finalized.can_transition_to(Draft));
        assert!(!Amended.can_transition_to(Finalized));
        assert!(Draft.is_editable());
        assert!(!Finalized.is_editable());
    }

    #[test]
    fn test_member_transitions() {
        use MemberStatus::*;
        assert!(Active.can_transition_to(Resigned));
        assert!(Expired.can_transition_to(Active));
        assert!(!Removed.can_transition_to(Active));
        assert!(!Resigned.can_transition_to(Active));
    }

    #[test]
    fn test_string_round_trip() {
        assert_eq!("vice_chair".parse::<BoardRole>(), Ok(BoardRole::ViceChair));
        assert_eq!(MeetingStatus::InSession.to_string(), "in_session");
        assert!("maybe".parse::<VoteChoice>().is_err());
    }

    #[test]
    fn test_tally_majority() {
        let tally = VoteTally { yes: 3, no: 2, abstain: 4 };
        assert!(tally.carries());
        assert_eq!(tally.total(), 9);
        let tie = VoteTally { yes: 2, no: 2, abstain: 0 };
        assert!(!tie.carries());
    }
}
